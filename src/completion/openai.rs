use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionClient, CompletionRequest};
use crate::error::{DocAnalyzerError, Result};

/// Request structure for the OpenAI chat completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response structure from the OpenAI chat completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI chat completions client
///
/// Sends exactly one request per call. There is no retry: a timeout or an
/// error status is reported to the caller as an upstream failure.
pub struct OpenAiChatClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "gpt-3.5-turbo")
    /// * `base_url` - API root, e.g. "https://api.openai.com/v1"
    /// * `timeout` - Upper bound for one request, connect through body
    pub fn new(api_key: String, model: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocAnalyzerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn transport_error(&self, err: reqwest::Error) -> DocAnalyzerError {
        if err.is_timeout() {
            DocAnalyzerError::UpstreamFailure(format!(
                "request timed out after {}s",
                self.timeout.as_secs_f32()
            ))
        } else {
            DocAnalyzerError::UpstreamFailure(format!("Network error: {}", err))
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(DocAnalyzerError::UpstreamFailure(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                DocAnalyzerError::UpstreamFailure(format!("Failed to parse response: {}", e))
            }
        })?;

        log::debug!("Completion API call took {:?}", start.elapsed());

        let choice = result.choices.into_iter().next().ok_or_else(|| {
            DocAnalyzerError::UpstreamFailure("Empty response from OpenAI API".to_string())
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}
