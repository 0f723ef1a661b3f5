//! Model-string driven client construction.
//!
//! Configuration identifies models in the `provider:model` form (e.g.
//! `anthropic:claude-sonnet-4-0`). [`ProviderClientFactory`] parses that
//! identifier, resolves the provider-native credential from the environment,
//! and hands back the matching [`ClientWrapper`].
//!
//! Credentials deliberately use the provider's own variable names
//! (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GOOGLE_API_KEY`, `GROK_API_KEY`),
//! never the `MIXSEEK_` prefix. A missing key is an explicit configuration
//! error naming the expected variable, not a silent fallback.

use std::sync::Arc;

use crate::mixseek::client_wrapper::ClientWrapper;
use crate::mixseek::clients::claude::ClaudeClient;
use crate::mixseek::clients::common::ClientSampling;
use crate::mixseek::clients::gemini::GeminiClient;
use crate::mixseek::clients::grok::GrokClient;
use crate::mixseek::clients::openai::OpenAIClient;
use crate::mixseek::error::MixSeekError;

/// Supported provider prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
    GoogleGla,
    GoogleVertex,
    Grok,
}

impl Provider {
    /// The environment variable carrying this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::GoogleGla | Provider::GoogleVertex => "GOOGLE_API_KEY",
            Provider::Grok => "GROK_API_KEY",
        }
    }

    /// Whether this provider exposes a native web-fetch tool.
    pub fn supports_web_fetch(&self) -> bool {
        matches!(
            self,
            Provider::Anthropic | Provider::GoogleGla | Provider::GoogleVertex
        )
    }

    /// Whether this provider exposes a sandboxed code-execution tool.
    pub fn supports_code_execution(&self) -> bool {
        !matches!(self, Provider::Grok)
    }
}

/// A parsed `provider:model` identifier.
#[derive(Debug, Clone)]
pub struct ModelRef {
    pub provider: Provider,
    pub model_name: String,
}

impl ModelRef {
    /// Parse a `provider:model` string, rejecting unknown prefixes.
    pub fn parse(model: &str) -> Result<Self, MixSeekError> {
        let (prefix, name) = model.split_once(':').ok_or_else(|| {
            MixSeekError::config(
                "model",
                format!(
                    "invalid model '{}': expected 'provider:model-name' form",
                    model
                ),
            )
        })?;
        if name.trim().is_empty() {
            return Err(MixSeekError::config(
                "model",
                format!("invalid model '{}': empty model name", model),
            ));
        }
        let provider = match prefix {
            "openai" => Provider::OpenAI,
            "anthropic" => Provider::Anthropic,
            "google-gla" => Provider::GoogleGla,
            "google-vertex" => Provider::GoogleVertex,
            "grok" => Provider::Grok,
            other => {
                return Err(MixSeekError::config(
                    "model",
                    format!(
                        "unsupported provider prefix '{}'. Supported: openai:, anthropic:, \
                         google-gla:, google-vertex:, grok:",
                        other
                    ),
                ))
            }
        };
        Ok(ModelRef {
            provider,
            model_name: name.to_string(),
        })
    }
}

/// Seam for constructing provider clients.
///
/// The default implementation, [`ProviderClientFactory`], builds real HTTP
/// clients; tests inject factories that return scripted [`ClientWrapper`]s.
pub trait ClientFactory: Send + Sync {
    /// Build a client for a `provider:model` identifier.
    fn create(&self, model: &str) -> Result<Arc<dyn ClientWrapper>, MixSeekError> {
        self.create_with_sampling(model, ClientSampling::default())
    }

    /// Build a client carrying configured sampling parameters. Factories
    /// that cannot honor sampling (e.g. scripted test clients) may ignore it.
    fn create_with_sampling(
        &self,
        model: &str,
        sampling: ClientSampling,
    ) -> Result<Arc<dyn ClientWrapper>, MixSeekError>;
}

/// Default [`ClientFactory`] resolving credentials from provider-native
/// environment variables.
pub struct ProviderClientFactory;

impl ClientFactory for ProviderClientFactory {
    fn create_with_sampling(
        &self,
        model: &str,
        sampling: ClientSampling,
    ) -> Result<Arc<dyn ClientWrapper>, MixSeekError> {
        let model_ref = ModelRef::parse(model)?;
        let key_var = model_ref.provider.api_key_var();
        let key = std::env::var(key_var).map_err(|_| {
            MixSeekError::config(
                "model",
                format!(
                    "missing credential for '{}': set the {} environment variable",
                    model, key_var
                ),
            )
        })?;

        let client: Arc<dyn ClientWrapper> = match model_ref.provider {
            Provider::OpenAI => Arc::new(
                OpenAIClient::new_with_model_string(&key, &model_ref.model_name)
                    .with_sampling(sampling),
            ),
            Provider::Anthropic => Arc::new(
                ClaudeClient::new_with_model_str(&key, &model_ref.model_name)
                    .with_sampling(sampling),
            ),
            Provider::GoogleGla | Provider::GoogleVertex => Arc::new(
                GeminiClient::new_with_model_str(&key, &model_ref.model_name)
                    .with_sampling(sampling),
            ),
            Provider::Grok => Arc::new(
                GrokClient::new_with_model_str(&key, &model_ref.model_name)
                    .with_sampling(sampling),
            ),
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_prefixes() {
        let m = ModelRef::parse("anthropic:claude-sonnet-4-0").unwrap();
        assert_eq!(m.provider, Provider::Anthropic);
        assert_eq!(m.model_name, "claude-sonnet-4-0");

        assert_eq!(
            ModelRef::parse("google-gla:gemini-2.5-flash-lite")
                .unwrap()
                .provider,
            Provider::GoogleGla
        );
    }

    #[test]
    fn rejects_unknown_prefix_and_bad_shape() {
        assert!(ModelRef::parse("mistral:large").is_err());
        assert!(ModelRef::parse("no-colon-here").is_err());
        assert!(ModelRef::parse("openai:").is_err());
    }

    #[test]
    fn web_fetch_support_matrix() {
        assert!(Provider::Anthropic.supports_web_fetch());
        assert!(Provider::GoogleGla.supports_web_fetch());
        assert!(!Provider::OpenAI.supports_web_fetch());
        assert!(!Provider::Grok.supports_web_fetch());
    }
}
