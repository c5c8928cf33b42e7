use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{now, touch, Document, DocumentId, DocumentStore};
use crate::error::{DocAnalyzerError, Result};

#[derive(Debug)]
struct State {
    next_id: DocumentId,
    documents: BTreeMap<DocumentId, Document>,
}

/// In-memory document store.
///
/// Ids increase monotonically from 1 and are never reused. Ordered by id, so
/// `list` returns insertion order. Contents are lost when the store is dropped.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    state: Mutex<State>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                documents: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DocAnalyzerError::StorageUnavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, content: String, topic: Option<String>) -> Result<DocumentId> {
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id += 1;

        let ts = now();
        state.documents.insert(
            id,
            Document {
                id,
                content,
                topic,
                created_at: ts,
                updated_at: ts,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: DocumentId) -> Result<Document> {
        self.lock()?
            .documents
            .get(&id)
            .cloned()
            .ok_or(DocAnalyzerError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Ok(self.lock()?.documents.values().cloned().collect())
    }

    async fn update(
        &self,
        id: DocumentId,
        content: String,
        topic: Option<String>,
    ) -> Result<Document> {
        let mut state = self.lock()?;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(DocAnalyzerError::NotFound(id))?;

        doc.content = content;
        doc.topic = topic;
        doc.updated_at = touch(doc.updated_at);
        Ok(doc.clone())
    }

    async fn delete(&self, id: DocumentId) -> Result<()> {
        self.lock()?
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or(DocAnalyzerError::NotFound(id))
    }

    async fn set_topic_if_untagged(&self, id: DocumentId, topic: String) -> Result<bool> {
        let mut state = self.lock()?;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or(DocAnalyzerError::NotFound(id))?;

        if !doc.is_untagged() {
            return Ok(false);
        }
        doc.topic = Some(topic);
        doc.updated_at = touch(doc.updated_at);
        Ok(true)
    }
}
