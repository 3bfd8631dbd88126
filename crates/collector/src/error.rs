use agentscope_core::AgentscopeError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error returned by collector handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AgentscopeError> for ApiError {
    fn from(err: AgentscopeError) -> Self {
        match err {
            AgentscopeError::InvalidArgument(msg) | AgentscopeError::Parse(msg) => {
                Self::bad_request(msg)
            }
            AgentscopeError::Unauthorized(msg) => Self::unauthorized(msg),
            AgentscopeError::NotFound(msg) => Self::not_found(msg),
            AgentscopeError::Conflict(msg) => Self::conflict(msg),
            other => {
                tracing::error!(error = %other, "collector request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let cases = [
            (AgentscopeError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (AgentscopeError::Parse("x".into()), StatusCode::BAD_REQUEST),
            (AgentscopeError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AgentscopeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AgentscopeError::Conflict("x".into()), StatusCode::CONFLICT),
            (AgentscopeError::Store("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
