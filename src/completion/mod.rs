pub mod openai;

pub use openai::OpenAiChatClient;

use async_trait::async_trait;

use crate::error::Result;

/// One completion call: a system instruction, a user prompt and sampling
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// External capability that turns a prompt into model-generated text.
///
/// Implementations make a single attempt. Transport, auth, rate-limit and
/// timeout faults are all reported as `DocAnalyzerError::UpstreamFailure`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
