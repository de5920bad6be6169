//! Mapping lookup errors to HTTP responses.
//!
//! Clients get a `{"detail": ...}` body. Upstream failures are reported by
//! category only; provider status codes never reach the client.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::range::{LookupError, UpstreamFailure};

/// Seconds a client should wait after an upstream rate limit.
const RETRY_AFTER_SECS: &str = "30";

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// JSON error response with the given status.
pub fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(ErrorDetail { detail: detail.into() })).into_response()
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        match self {
            LookupError::InvalidPrefix(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
            LookupError::UpstreamUnavailable(failure) => {
                let status = match failure {
                    UpstreamFailure::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
                    UpstreamFailure::Unavailable | UpstreamFailure::BadResponse => StatusCode::BAD_GATEWAY,
                };
                let mut response = error_response(status, failure.message());
                if failure == UpstreamFailure::RateLimited {
                    response.headers_mut().insert(
                        header::RETRY_AFTER,
                        header::HeaderValue::from_static(RETRY_AFTER_SECS),
                    );
                }
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::InvalidPrefix;

    #[test]
    fn test_status_mapping() {
        let res = LookupError::from(InvalidPrefix).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = LookupError::UpstreamUnavailable(UpstreamFailure::RateLimited).into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.headers()[header::RETRY_AFTER], "30");

        let res = LookupError::UpstreamUnavailable(UpstreamFailure::BadResponse).into_response();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert!(res.headers().get(header::RETRY_AFTER).is_none());
    }
}
