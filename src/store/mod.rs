//! Document persistence.
//!
//! `DocumentStore` is the only shared mutable resource in the service. Two
//! implementations exist and are picked when the process is wired:
//! [`SqliteDocumentStore`] for durable storage and [`MemoryDocumentStore`]
//! for tests and throwaway instances.
//!
//! Every operation on an unknown id fails with `DocAnalyzerError::NotFound`;
//! persistence failures surface as `DocAnalyzerError::StorageUnavailable`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Store-assigned document identifier. Never reused within one store.
pub type DocumentId = i64;

/// A stored text document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// True when no topic has been set. An empty topic counts as unset.
    pub fn is_untagged(&self) -> bool {
        self.topic.as_deref().map_or(true, str::is_empty)
    }
}

/// Partial update request: each field is independently present or absent.
///
/// Absent fields keep the stored value. The store itself only overwrites, so
/// callers resolve a patch with [`DocumentPatch::merge`] before calling
/// [`DocumentStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl DocumentPatch {
    /// Resolve the patch against the current document, returning the full
    /// `(content, topic)` pair to write.
    pub fn merge(self, current: &Document) -> (String, Option<String>) {
        let content = self.content.unwrap_or_else(|| current.content.clone());
        let topic = self.topic.or_else(|| current.topic.clone());
        (content, topic)
    }
}

/// Durable CRUD over document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return its id. Any content is accepted.
    async fn create(&self, content: String, topic: Option<String>) -> Result<DocumentId>;

    /// Look up one document.
    async fn get(&self, id: DocumentId) -> Result<Document>;

    /// All documents in insertion order.
    async fn list(&self) -> Result<Vec<Document>>;

    /// Overwrite content and topic with exactly the given values.
    async fn update(
        &self,
        id: DocumentId,
        content: String,
        topic: Option<String>,
    ) -> Result<Document>;

    /// Permanently remove a document.
    async fn delete(&self, id: DocumentId) -> Result<()>;

    /// Atomically set the topic only if the document is currently untagged.
    ///
    /// Content is left untouched. Returns `Ok(false)` when the document
    /// already carries a topic and nothing was written.
    async fn set_topic_if_untagged(&self, id: DocumentId, topic: String) -> Result<bool>;
}

/// Current time truncated to the microsecond precision both stores keep.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp for a mutation of a record last touched at `previous`.
/// Never earlier than `previous`, even if the wall clock stepped back.
pub(crate) fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    now().max(previous)
}

/// Fixed-width RFC 3339 form, so that text order equals time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
