use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::AppState;
use crate::RagError;

pub const UPLOAD_MESSAGE: &str = "PDF uploaded and processed successfully.";

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
}

/// Index the first file in a multipart body, replacing the current document
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, RagError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RagError::UploadRead(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!("Skipping non-file field {:?}", field.name());
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| RagError::UploadRead(e.to_string()))?;
        if bytes.is_empty() {
            return Err(RagError::UploadRead(format!("{} is empty", file_name)));
        }

        let summary = state.orchestrator.upload(&file_name, &bytes).await?;
        info!(
            "Upload {} of {} finished with {} chunks",
            summary.upload_id, file_name, summary.chunks
        );

        return Ok(Json(UploadResponse {
            message: UPLOAD_MESSAGE.to_string(),
        }));
    }

    Err(RagError::UploadRead(
        "Request contained no file".to_string(),
    ))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, RagError> {
    let answer = state
        .orchestrator
        .ask(&request.session_id, &request.question)
        .await?;
    Ok(Json(AskResponse { answer }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let index_loaded = state.orchestrator.has_index().await;

    let model_server = match &state.ollama {
        Some(client) => {
            let client = client.clone();
            match tokio::task::spawn_blocking(move || client.ping_once()).await {
                Ok(Ok(())) => "reachable",
                _ => "unreachable",
            }
        }
        None => "unconfigured",
    };

    Json(json!({
        "status": "ok",
        "index_loaded": index_loaded,
        "model_server": model_server,
    }))
}
