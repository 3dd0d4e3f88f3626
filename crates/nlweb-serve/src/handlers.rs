//! Request handlers for `/ask` and `/mcp`.

use std::convert::Infallible;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use nlweb::NLWebRequest;

use crate::error::ServeError;
use crate::middleware::CorrelationId;
use crate::state::AppState;

/// Handler for `POST /ask`.
#[instrument(skip_all)]
pub async fn ask_post(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Result<Json<NLWebRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return ServeError::bad_request(rejection.body_text(), correlation.0).into_response()
        }
    };
    ask(state, correlation, request).await
}

/// Handler for `GET /ask`; same keys as the POST body, as URL parameters.
#[instrument(skip_all)]
pub async fn ask_get(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    params: Result<Query<NLWebRequest>, QueryRejection>,
) -> Response {
    let request = match params {
        Ok(Query(request)) => request,
        Err(rejection) => {
            return ServeError::bad_request(rejection.body_text(), correlation.0).into_response()
        }
    };
    ask(state, correlation, request).await
}

async fn ask(state: AppState, correlation: CorrelationId, request: NLWebRequest) -> Response {
    if request.effective_streaming(&state.config) {
        match stream_response(&state, request, &correlation.0) {
            Ok(sse) => sse.into_response(),
            Err(err) => err.into_response(),
        }
    } else {
        let cancel = CancellationToken::new();
        match state.service.process(&request, &cancel).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => ServeError::core(err, correlation.0).into_response(),
        }
    }
}

/// Build the SSE response. Each frame is one `data: {"type": T, "data": D}`
/// event; dropping the response (client disconnect) cancels the producer.
fn stream_response(
    state: &AppState,
    request: NLWebRequest,
    correlation_id: &str,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServeError> {
    let cancel = CancellationToken::new();
    let mut frames = std::sync::Arc::clone(&state.service)
        .process_stream(request, cancel.clone())
        .map_err(|err| ServeError::core(err, correlation_id))?;

    let guard = cancel.drop_guard();
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = frames.next().await {
            match Event::default().json_data(&frame) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize stream frame");
                    break;
                }
            }
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// The `/mcp` request envelope.
#[derive(Debug, serde::Deserialize)]
pub struct McpEnvelope {
    method: String,
    #[serde(default)]
    params: Value,
}

/// Handler for `POST /mcp`: `{method, params}` dispatched to the adapter.
///
/// Tool/prompt-level validation failures answer 200 with `is_error = true`;
/// only a malformed envelope or unknown method is a 400.
#[instrument(skip_all, fields(method))]
pub async fn mcp(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    body: Result<Json<McpEnvelope>, JsonRejection>,
) -> Response {
    let envelope = match body {
        Ok(Json(envelope)) => envelope,
        Err(rejection) => {
            return ServeError::bad_request(rejection.body_text(), correlation.0).into_response()
        }
    };
    tracing::Span::current().record("method", envelope.method.as_str());

    match envelope.method.as_str() {
        "list_tools" => Json(json!({ "tools": state.mcp.list_tools() })).into_response(),
        "list_prompts" => Json(json!({ "prompts": state.mcp.list_prompts() })).into_response(),
        "call_tool" => {
            let Some(name) = envelope.params.get("name").and_then(Value::as_str) else {
                return ServeError::bad_request("call_tool requires params.name", correlation.0)
                    .into_response();
            };
            let arguments = envelope
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let cancel = CancellationToken::new();
            Json(state.mcp.call_tool(name, &arguments, &cancel).await).into_response()
        }
        "get_prompt" => {
            let Some(name) = envelope.params.get("name").and_then(Value::as_str) else {
                return ServeError::bad_request("get_prompt requires params.name", correlation.0)
                    .into_response();
            };
            let arguments = envelope
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            Json(state.mcp.get_prompt(name, &arguments)).into_response()
        }
        other => {
            ServeError::bad_request(format!("unknown MCP method: {other}"), correlation.0)
                .into_response()
        }
    }
}
