//! xAI Grok client wrapper built on the OpenAI-compatible transport.

use crate::mixseek::client_wrapper::{ClientWrapper, Message, TokenUsage, ToolDefinition};
use crate::mixseek::clients::openai::OpenAIClient;
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

/// Client wrapper for xAI's Grok API routed through the OpenAI-compatible
/// surface.
pub struct GrokClient {
    delegate_client: OpenAIClient,
    model: String,
}

impl GrokClient {
    /// Create a client from an API key and explicit model string.
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        GrokClient {
            delegate_client: OpenAIClient::new_with_base_url(
                secret_key,
                model_name,
                "https://api.x.ai/v1",
            ),
            model: model_name.to_string(),
        }
    }

    /// Create a client pointing at a custom Grok-compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        GrokClient {
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
impl ClientWrapper for GrokClient {
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
