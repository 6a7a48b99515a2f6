use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::Instrument;
use uuid::Uuid;

use super::error::AppError;
use super::AppState;
use crate::engine::FlaggedResult;

const SERVICE_NAME: &str = "oru-risk";

/// Evaluate an uploaded ORU batch and return its flagged results
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<FlaggedResult>>, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("upload", %request_id);

    async move {
        let mut multipart = multipart?;
        let bytes = read_upload(&mut multipart, &state.upload_field).await?;
        tracing::info!("Received {} bytes", bytes.len());

        // Evaluation is CPU-bound; keep it off the async workers
        let evaluator = state.evaluator.clone();
        let span = tracing::Span::current();
        let results =
            tokio::task::spawn_blocking(move || span.in_scope(|| evaluator.evaluate_batch(&bytes)))
                .await
                .map_err(|e| AppError::InternalError(format!("Evaluation failed: {}", e)))?;

        Ok::<_, AppError>(Json(results))
    }
    .instrument(span)
    .await
}

/// Read the configured file part, ignoring every other part
async fn read_upload(multipart: &mut Multipart, field_name: &str) -> Result<Vec<u8>, AppError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(field_name) && upload.is_none() {
            upload = Some(field.bytes().await?);
        }
    }

    match upload {
        None => Err(AppError::ValidationError("No file uploaded".to_string())),
        Some(bytes) if bytes.is_empty() => {
            Err(AppError::ValidationError("Uploaded file is empty".to_string()))
        }
        Some(bytes) => Ok(bytes.to_vec()),
    }
}

/// Health check endpoint (liveness)
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint - reports the loaded reference table
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let table = state.evaluator.table();
    Json(serde_json::json!({
        "status": "ready",
        "service": SERVICE_NAME,
        "metrics": table.metrics().len(),
        "conditions": table.conditions().len(),
        "scope": state.evaluator.scope().to_string(),
    }))
}
