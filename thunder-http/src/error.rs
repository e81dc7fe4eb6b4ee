use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thunder_core::error::ServiceError;
use tracing::error;
use uuid::Uuid;

/// HTTP projection of a [`ServiceError`].
///
/// Client classes surface their stable code and user-safe message; internal
/// faults are logged with a correlation id and answered with a generic body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0 {
            ServiceError::BadRequest(d) => (StatusCode::BAD_REQUEST, d.code, d.message),
            ServiceError::NotFound(d) => (StatusCode::NOT_FOUND, d.code, d.message),
            ServiceError::Conflict(d) => (StatusCode::CONFLICT, d.code, d.message),
            ServiceError::Internal(detail) => {
                let correlation_id = Uuid::now_v7().to_string();
                error!(correlation_id = %correlation_id, detail = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    format!("An internal error occurred (ref {correlation_id})"),
                )
            }
        };
        let body = serde_json::json!({ "code": code, "message": message });
        (status, Json(body)).into_response()
    }
}
