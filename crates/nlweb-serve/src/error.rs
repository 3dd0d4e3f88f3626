//! HTTP error mapping: core errors become RFC 7807 problem documents.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC 7807 problem document, the body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDocument {
    /// Problem type URI
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short human-readable summary
    pub title: String,
    /// HTTP status code
    pub status: u16,
    /// Occurrence-specific detail
    pub detail: String,
    /// Occurrence identifier; carries the correlation id
    pub instance: String,
}

/// Error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum ServeError {
    /// A pipeline error, tagged with the request's correlation id
    #[error("{source}")]
    Core {
        /// The underlying core error
        source: nlweb::Error,
        /// Correlation id echoed into the problem document
        correlation_id: String,
    },

    /// Malformed `/mcp` envelope or unknown method
    #[error("Invalid request: {detail}")]
    BadRequest {
        /// What was wrong
        detail: String,
        /// Correlation id echoed into the problem document
        correlation_id: String,
    },
}

impl ServeError {
    /// Wrap a core error with the request's correlation id.
    #[must_use]
    pub fn core(source: nlweb::Error, correlation_id: impl Into<String>) -> Self {
        Self::Core {
            source,
            correlation_id: correlation_id.into(),
        }
    }

    /// A 400 for a malformed envelope.
    #[must_use]
    pub fn bad_request(detail: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
            correlation_id: correlation_id.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServeError::Core { source, .. } => match source {
                nlweb::Error::InvalidArgument(_) | nlweb::Error::Serialization(_) => {
                    StatusCode::BAD_REQUEST
                }
                nlweb::Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                nlweb::Error::BackendUnavailable(_) | nlweb::Error::NoBackends => {
                    StatusCode::BAD_GATEWAY
                }
                nlweb::Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServeError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ServeError::Core { source, .. } => match source {
                nlweb::Error::InvalidArgument(_) | nlweb::Error::Serialization(_) => {
                    "invalid-argument"
                }
                nlweb::Error::RateLimited { .. } => "rate-limited",
                nlweb::Error::BackendUnavailable(_) | nlweb::Error::NoBackends => {
                    "backend-unavailable"
                }
                nlweb::Error::Cancelled => "cancelled",
                _ => "internal",
            },
            ServeError::BadRequest { .. } => "invalid-argument",
        }
    }

    fn correlation_id(&self) -> &str {
        match self {
            ServeError::Core { correlation_id, .. }
            | ServeError::BadRequest { correlation_id, .. } => correlation_id,
        }
    }

    /// Build the problem document for this error.
    #[must_use]
    pub fn problem(&self) -> ProblemDocument {
        let status = self.status();
        let kind = self.kind();
        // Internal detail is not leaked; the correlation id lets operators
        // find the logged cause
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            format!("internal error; correlation id {}", self.correlation_id())
        } else {
            self.to_string()
        };
        ProblemDocument {
            problem_type: format!("https://nlweb.dev/problems/{kind}"),
            title: kind.replace('-', " "),
            status: status.as_u16(),
            detail,
            instance: format!("urn:correlation-id:{}", self.correlation_id()),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                correlation_id = self.correlation_id(),
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                correlation_id = self.correlation_id(),
                status = status.as_u16(),
                error = %self,
                "Request rejected"
            );
        }

        let mut response = (status, Json(self.problem())).into_response();
        if let ServeError::Core {
            source: nlweb::Error::RateLimited { retry_after_secs },
            ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for the HTTP surface
pub type Result<T> = std::result::Result<T, ServeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_maps_to_400() {
        let err = ServeError::core(nlweb::Error::InvalidArgument("bad".into()), "c-1");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let problem = err.problem();
        assert_eq!(problem.status, 400);
        assert!(problem.problem_type.ends_with("invalid-argument"));
        assert_eq!(problem.instance, "urn:correlation-id:c-1");
    }

    #[test]
    fn test_rate_limited_maps_to_429() {
        let err = ServeError::core(
            nlweb::Error::RateLimited {
                retry_after_secs: 30,
            },
            "c-2",
        );
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        let response = err.into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from_static("30")
        );
    }

    #[test]
    fn test_backend_unavailable_maps_to_502() {
        for source in [
            nlweb::Error::BackendUnavailable("all failed".into()),
            nlweb::Error::NoBackends,
        ] {
            let err = ServeError::core(source, "c-3");
            assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
            assert_eq!(err.kind(), "backend-unavailable");
        }
    }

    #[test]
    fn test_internal_hides_detail_but_keeps_correlation() {
        let err = ServeError::core(nlweb::Error::Internal("secret stack".into()), "c-4");
        let problem = err.problem();
        assert_eq!(problem.status, 500);
        assert!(!problem.detail.contains("secret stack"));
        assert!(problem.detail.contains("c-4"));
    }

    #[test]
    fn test_bad_request_envelope() {
        let err = ServeError::bad_request("unknown MCP method: frobnicate", "c-5");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.problem().detail.contains("frobnicate"));
    }

    #[test]
    fn test_problem_document_roundtrip() {
        let problem = ServeError::core(nlweb::Error::NoBackends, "c-6").problem();
        let json = serde_json::to_string(&problem).unwrap();
        assert!(json.contains("\"type\""));
        let back: ProblemDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, problem.status);
        assert_eq!(back.instance, problem.instance);
    }
}
