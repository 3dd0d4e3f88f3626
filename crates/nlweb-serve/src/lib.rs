//! HTTP surface for the NLWeb query core.
//!
//! Two endpoints on top of [`nlweb::QueryService`]:
//!
//! - `GET`/`POST /ask`: natural-language queries, unary JSON or SSE
//!   streaming (`data: {"type": T, "data": D}` frames)
//! - `POST /mcp`: `{method, params}` envelope over the MCP adapter
//!
//! plus `/health` and `/ready` probes, a correlation-id middleware and a
//! per-identifier rate limiter.
//!
//! # Quick Start
//!
//! ```ignore
//! use nlweb_serve::{create_app, AppState};
//!
//! let state = AppState::new(service);
//! let app = create_app(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

// Re-export main API
pub use error::{ProblemDocument, ServeError};
pub use middleware::{CorrelationId, CORRELATION_ID_HEADER};
pub use server::{create_app, create_app_with_cors, serve};
pub use state::AppState;
