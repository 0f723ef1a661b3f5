//! Google Gemini client wrapper built on the OpenAI-compatible transport.
//!
//! Google exposes an OpenAI compatibility endpoint for the Gemini models, so
//! this wrapper only supplies the right base URL and delegates the rest.
//! Both the `google-gla:` (Developer API) and `google-vertex:` prefixes
//! resolve here; Vertex deployments that need a different host can use
//! [`GeminiClient::new_with_base_url`].

use crate::mixseek::client_wrapper::{ClientWrapper, Message, TokenUsage, ToolDefinition};
use crate::mixseek::clients::openai::OpenAIClient;
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

/// Client wrapper for Google's Gemini models via the OpenAI-compatible
/// surface.
pub struct GeminiClient {
    delegate_client: OpenAIClient,
    model: String,
}

impl GeminiClient {
    /// Create a client from an API key and explicit model string.
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        GeminiClient {
            delegate_client: OpenAIClient::new_with_base_url(
                secret_key,
                model_name,
                "https://generativelanguage.googleapis.com/v1beta/openai",
            ),
            model: model_name.to_string(),
        }
    }

    /// Create a client pointing at a custom Gemini-compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        GeminiClient {
            delegate_client: OpenAIClient::new_with_base_url(secret_key, model_name, base_url),
            model: model_name.to_string(),
        }
    }

    /// Attach sampling parameters (builder pattern).
    pub fn with_sampling(mut self, sampling: crate::mixseek::clients::common::ClientSampling) -> Self {
        self.delegate_client = self.delegate_client.with_sampling(sampling);
        self
    }
}

#[async_trait]
impl ClientWrapper for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.delegate_client.send_message(messages, tools).await
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        self.delegate_client.usage_slot()
    }
}
