//! Router assembly and server lifecycle.

use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the application router: `/ask`, `/mcp`, probes, middleware.
///
/// `/ask` and `/mcp` sit behind the correlation-id and rate-limit layers;
/// the probes are never throttled.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ask", get(handlers::ask_get).post(handlers::ask_post))
        .route("/mcp", post(handlers::mcp))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// [`create_app`] plus a CORS layer.
///
/// An empty origin list means permissive CORS; production deployments should
/// pass explicit origins.
pub fn create_app_with_cors(state: AppState, allowed_origins: Vec<String>) -> Router {
    use tower_http::cors::AllowOrigin;

    let cors = if allowed_origins.is_empty() {
        tracing::warn!(
            "No CORS origins configured; allowing all origins. \
             Pass explicit origins for production."
        );
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    create_app(state).layer(cors)
}

/// Liveness probe.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: the service only accepts queries while at least one
/// backend is enabled.
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    if state.service.backends().registry().enabled_count() == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "No backends enabled");
    }
    (StatusCode::OK, "OK")
}

/// Bind and serve until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "NLWeb server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
