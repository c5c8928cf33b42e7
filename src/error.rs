use thiserror::Error;

use crate::store::DocumentId;

/// Main error type for Docanalyzer
#[derive(Error, Debug)]
pub enum DocAnalyzerError {
    /// Requested document id does not exist
    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    /// Content rejected before any external call was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Completion service call failed (network, auth, timeout, rate limit)
    #[error("Completion service error: {0}")]
    UpstreamFailure(String),

    /// Completion service answered, but not in the two-line labeled format
    #[error("Failed to parse analysis results: {0}")]
    AnalysisParse(String),

    /// Persistence layer failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocAnalyzerError {
    /// Stable snake_case name of the error kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DocAnalyzerError::NotFound(_) => "not_found",
            DocAnalyzerError::InvalidInput(_) => "invalid_input",
            DocAnalyzerError::UpstreamFailure(_) => "upstream_failure",
            DocAnalyzerError::AnalysisParse(_) => "analysis_parse_error",
            DocAnalyzerError::StorageUnavailable(_) => "storage_unavailable",
            DocAnalyzerError::Config(_) => "config",
            DocAnalyzerError::Io(_) => "io",
        }
    }
}

impl From<rusqlite::Error> for DocAnalyzerError {
    fn from(err: rusqlite::Error) -> Self {
        DocAnalyzerError::StorageUnavailable(err.to_string())
    }
}

/// Convenient Result type using DocAnalyzerError
pub type Result<T> = std::result::Result<T, DocAnalyzerError>;
