use crate::server::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use offload::DispatchError;
use serde_json::json;

/// Error half of every API response.
///
/// Domain errors keep their message; infrastructure failures from the
/// dispatch layer map onto 5xx statuses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DispatchError<StoreError>> for ApiError {
    fn from(err: DispatchError<StoreError>) -> Self {
        let status = match &err {
            DispatchError::Handler(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            DispatchError::Handler(StoreError::Invalid { .. }) => StatusCode::BAD_REQUEST,
            DispatchError::Handler(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            DispatchError::Rejected(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Panicked { .. } | DispatchError::Abandoned => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(%status, "Request failed: {err}");
        } else {
            tracing::debug!(%status, "Request failed: {err}");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
