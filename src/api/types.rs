use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::DocAnalyzerError;

/// Body of `POST /documents`
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub content: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Error body returned by every failing route
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// A `DocAnalyzerError` on its way out of an HTTP handler
#[derive(Debug)]
pub struct ApiError(pub DocAnalyzerError);

impl From<DocAnalyzerError> for ApiError {
    fn from(err: DocAnalyzerError) -> Self {
        Self(err)
    }
}

/// Unreadable request bodies are client errors with the usual error body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DocAnalyzerError::InvalidInput(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DocAnalyzerError::NotFound(_) => StatusCode::NOT_FOUND,
            DocAnalyzerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DocAnalyzerError::UpstreamFailure(_)
            | DocAnalyzerError::AnalysisParse(_)
            | DocAnalyzerError::StorageUnavailable(_)
            | DocAnalyzerError::Config(_)
            | DocAnalyzerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors echo the error text; server errors get a fixed message
    /// and the details go to the log.
    fn public_message(&self) -> String {
        match &self.0 {
            DocAnalyzerError::NotFound(_) => "Document not found".to_string(),
            DocAnalyzerError::InvalidInput(msg) => msg.clone(),
            DocAnalyzerError::UpstreamFailure(_) => "Completion service request failed".to_string(),
            DocAnalyzerError::AnalysisParse(_) => "Failed to parse analysis results".to_string(),
            DocAnalyzerError::StorageUnavailable(_) => "Storage unavailable".to_string(),
            DocAnalyzerError::Config(_) | DocAnalyzerError::Io(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
