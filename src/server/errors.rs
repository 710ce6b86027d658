use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::RagError;

impl RagError {
    /// HTTP status this error is reported with
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UploadRead(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            Self::NoIndexAvailable | Self::EmbeddingMismatch { .. } => StatusCode::CONFLICT,
            Self::EmbeddingService(_) | Self::Retrieval(_) | Self::Generation(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Extraction(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", message);
        } else {
            warn!(kind = self.kind(), "Request rejected: {}", message);
        }

        let body = Json(json!({ "error": message, "kind": self.kind() }));
        (status, body).into_response()
    }
}
