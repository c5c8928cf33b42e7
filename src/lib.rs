pub mod config;
pub mod error;
pub mod db;
pub mod store;
pub mod completion;
pub mod analysis;
pub mod api;

pub use config::Config;
pub use error::{DocAnalyzerError, Result};
pub use analysis::{Analyzer, DocumentAnalysis};
pub use store::{Document, DocumentId, DocumentPatch, DocumentStore};
