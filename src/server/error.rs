use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    /// The request is not a multipart form
    NotMultipart(MultipartRejection),
    /// The multipart body could not be read (malformed, or over the size limit)
    UploadError(MultipartError),
    InternalError(String),
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::UploadError(err)
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::NotMultipart(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotMultipart(rejection) => (rejection.status(), rejection.body_text()),
            AppError::UploadError(err) => (err.status(), err.body_text()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!("{}", message);
        } else {
            tracing::warn!("Rejected upload ({}): {}", status, message);
        }

        (status, Json(serde_json::json!({
            "error": message
        }))).into_response()
    }
}
