//! OpenAI Chat Completions client that captures token usage statistics.
//!
//! This wrapper is also the transport every other provider in the crate
//! delegates to: Anthropic, Google, and xAI all expose OpenAI-compatible
//! surfaces, so swapping providers only requires a different base URL.
//!
//! # Example
//!
//! ```rust,no_run
//! use mixseek::{ClientWrapper, Message};
//! use mixseek::clients::openai::OpenAIClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY").unwrap();
//!     let client = OpenAIClient::new_with_model_string(&key, "gpt-4.1-mini");
//!     let reply = client
//!         .send_message(&[Message::user("Who are you?")], None)
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use openai_rust2 as openai_rust;
use tokio::sync::Mutex;

use crate::mixseek::client_wrapper::{
    ClientWrapper, Message, Role, TokenUsage, ToolDefinition,
};
use crate::mixseek::clients::common::{
    get_shared_http_client, send_and_track, send_chat_direct, ClientSampling,
};

/// Client wrapper for OpenAI's Chat Completions API (and any compatible
/// endpoint reachable through a custom base URL).
///
/// The wrapper maintains the selected model identifier plus an internal
/// [`TokenUsage`] slot so callers can inspect how many tokens each request
/// consumed. It reuses the shared pooled HTTP client from
/// [`crate::clients::common`].
pub struct OpenAIClient {
    /// Underlying SDK client pointing at the REST endpoint.
    client: openai_rust::Client,
    /// Model name that will be injected into each request.
    model: String,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
    /// API key needed for the direct tool-calling path.
    api_key: String,
    /// Base URL for API calls, no trailing slash (e.g. `https://api.openai.com/v1`).
    base_url: String,
    /// Optional sampling parameters; when set, requests take the direct
    /// wire path which supports them.
    sampling: Option<ClientSampling>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and model name,
    /// pointed at OpenAI's public endpoint.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, "https://api.openai.com/v1")
    }

    /// Construct a client targeting a custom OpenAI-compatible base URL.
    /// `base_url` should not have a trailing slash.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url_normalized = base_url.trim_end_matches('/');
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                &format!("{}/", base_url_normalized),
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
            api_key: secret_key.to_string(),
            base_url: base_url_normalized.to_string(),
            sampling: None,
        }
    }

    /// Attach sampling parameters (builder pattern). Requests then use the
    /// direct wire path, which supports them.
    pub fn with_sampling(mut self, sampling: ClientSampling) -> Self {
        self.sampling = if sampling.is_empty() {
            None
        } else {
            Some(sampling)
        };
        self
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        // Native tools and sampling parameters ride the direct wire path;
        // plain chat goes through the SDK path.
        let tools = tools.filter(|t| !t.is_empty());
        if tools.is_some() || self.sampling.is_some() {
            return send_chat_direct(
                &self.api_key,
                &self.base_url,
                &self.model,
                messages,
                tools.as_deref(),
                self.sampling.as_ref(),
                &self.token_usage,
            )
            .await;
        }

        let result = send_and_track(
            &self.client,
            &self.model,
            messages,
            Some("/chat/completions".to_string()),
            &self.token_usage,
        )
        .await;

        match result {
            Ok(content) => Ok(Message {
                role: Role::Assistant,
                content: Arc::from(content.as_str()),
                tool_calls: vec![],
            }),
            Err(e) => {
                if log::log_enabled!(log::Level::Error) {
                    log::error!("OpenAIClient::send_message: API error: {}", e);
                }
                Err(e)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
