pub mod http;
pub mod types;

pub use http::{ApiServer, AppState};
pub use types::{ApiError, CreateDocumentRequest, ErrorBody};
