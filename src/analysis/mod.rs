//! Topic and summary analysis of stored documents.
//!
//! The [`Analyzer`] reads a document, asks the completion client for a
//! two-line labeled answer, parses it, and backfills the topic onto documents
//! that had none. A caller-supplied topic is never overwritten.

pub mod parser;
pub mod prompt;

pub use parser::parse_analysis;
pub use prompt::build_prompt;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::config::CompletionConfig;
use crate::error::{DocAnalyzerError, Result};
use crate::store::{DocumentId, DocumentStore};

/// Minimum number of characters, after trimming, a document needs before it
/// is sent for analysis.
pub const MIN_CONTENT_CHARS: usize = 10;

/// Result of one analysis. Computed per request, never stored as a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub topic: String,
    pub summary: String,
}

/// Decoding parameters for analysis calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 300,
        }
    }
}

impl From<&CompletionConfig> for SamplingParams {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Reject content too short to analyze.
pub fn check_eligible(content: &str) -> Result<()> {
    let len = content.trim().chars().count();
    if len < MIN_CONTENT_CHARS {
        return Err(DocAnalyzerError::InvalidInput(format!(
            "Document content is too short for analysis ({} characters, minimum {})",
            len, MIN_CONTENT_CHARS
        )));
    }
    Ok(())
}

/// Analysis orchestrator over a document store and a completion client
pub struct Analyzer {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn CompletionClient>,
    sampling: SamplingParams,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn CompletionClient>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            store,
            client,
            sampling,
        }
    }

    /// Analyze document `id`.
    ///
    /// # Errors
    ///
    /// * `NotFound` - no document with this id (also if it disappears before
    ///   the topic is written back)
    /// * `InvalidInput` - content shorter than [`MIN_CONTENT_CHARS`]; the
    ///   completion client is not called
    /// * `UpstreamFailure` - the single completion call failed
    /// * `AnalysisParse` - the answer lacks a non-empty `Topic:` or `Summary:` line
    /// * `StorageUnavailable` - reading or backfilling the document failed
    pub async fn analyze(&self, id: DocumentId) -> Result<DocumentAnalysis> {
        let doc = self.store.get(id).await?;
        check_eligible(&doc.content)?;

        let request = CompletionRequest {
            system: prompt::SYSTEM_INSTRUCTION.to_string(),
            prompt: build_prompt(&doc.content),
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
        };
        let raw = self.client.complete(request).await?;

        let analysis = parse_analysis(&raw).map_err(|e| {
            log::warn!(
                "Error parsing completion response for document {}: {} (response: {:?})",
                id,
                e,
                truncate(&raw, 200)
            );
            e
        })?;

        if doc.is_untagged() {
            let written = self
                .store
                .set_topic_if_untagged(id, analysis.topic.clone())
                .await?;
            if written {
                log::debug!("Backfilled topic {:?} onto document {}", analysis.topic, id);
            } else {
                log::debug!("Document {} was tagged during analysis, keeping its topic", id);
            }
        }

        Ok(analysis)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
