use agora_types::AgoraError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// `AgoraError` rendered as `{"error": {"message", "status"}}`.
#[derive(Debug)]
pub struct ApiError(pub AgoraError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AgoraError> for ApiError {
    fn from(err: AgoraError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgoraError::Validation(_) => StatusCode::BAD_REQUEST,
            AgoraError::Auth(_) => StatusCode::UNAUTHORIZED,
            AgoraError::NotFound(_) => StatusCode::NOT_FOUND,
            AgoraError::Conflict(_) => StatusCode::CONFLICT,
            AgoraError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            AgoraError::Store(detail) => {
                error!("store failure: {}", detail);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(json!({ "error": { "message": message, "status": status.as_u16() } })),
        )
            .into_response()
    }
}
