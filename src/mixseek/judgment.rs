//! Judgment client: decides whether a team should run another round.
//!
//! The client builds the judgment prompt from the same context the team
//! prompt uses (history plus leader-board position), invokes the configured
//! LLM, and parses the structured verdict. Its failures are non-fatal by
//! contract: the round controller logs them and keeps iterating up to
//! `max_rounds`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mixseek::client_wrapper::Message;
use crate::mixseek::clients::common::{is_transient_error, ClientSampling};
use crate::mixseek::clients::factory::{ClientFactory, ProviderClientFactory};
use crate::mixseek::config::schema::{JudgmentSettings, PromptBuilderSettings};
use crate::mixseek::error::MixSeekError;
use crate::mixseek::prompt_builder::{RoundPromptContext, UserPromptBuilder};
use crate::mixseek::store::AggregationStore;

/// The judgment LLM's verdict on running another round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementJudgment {
    pub should_continue: bool,
    pub reasoning: String,
    /// 0.0..=1.0.
    pub confidence_score: f64,
}

/// Client for the improvement judgment LLM.
pub struct JudgmentClient {
    settings: JudgmentSettings,
    prompt_builder: UserPromptBuilder,
    clients: Arc<dyn ClientFactory>,
}

impl JudgmentClient {
    /// Create a judgment client. The store, when present, feeds the
    /// leader-board sections of the judgment prompt.
    pub fn new(
        settings: JudgmentSettings,
        prompt_builder_settings: PromptBuilderSettings,
        store: Option<AggregationStore>,
    ) -> Self {
        JudgmentClient {
            settings,
            prompt_builder: UserPromptBuilder::new(prompt_builder_settings, store),
            clients: Arc::new(ProviderClientFactory),
        }
    }

    /// Swap the client factory (tests inject scripted clients here).
    pub fn with_client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = clients;
        self
    }

    /// Ask the judgment LLM whether the team should run another round.
    pub async fn judge_improvement_prospects(
        &self,
        context: &RoundPromptContext,
    ) -> Result<ImprovementJudgment, MixSeekError> {
        let prompt = self.prompt_builder.build_judgment_prompt(context).await?;
        let sampling = ClientSampling {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            ..ClientSampling::default()
        };
        let client = self
            .clients
            .create_with_sampling(&self.settings.model, sampling)
            .map_err(|e| MixSeekError::Judgment(e.to_string()))?;
        let messages = vec![Message::user(prompt)];

        let mut attempt: u32 = 0;
        loop {
            let call = client.send_message(&messages, None);
            let outcome = match self.settings.timeout_seconds {
                Some(seconds) => {
                    match tokio::time::timeout(std::time::Duration::from_secs(seconds), call).await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            Err(format!("judgment call timed out after {}s", seconds).into())
                        }
                    }
                }
                None => call.await,
            };

            match outcome {
                Ok(reply) => return parse_judgment_response(reply.content.as_ref()),
                Err(err) => {
                    if is_transient_error(err.as_ref()) && attempt < self.settings.max_retries {
                        attempt += 1;
                        log::warn!(
                            "judgment: transient provider error, retry {}/{}: {}",
                            attempt,
                            self.settings.max_retries,
                            err
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(
                            200u64.saturating_mul(1 << attempt.min(6)),
                        ))
                        .await;
                        continue;
                    }
                    return Err(MixSeekError::Judgment(format!(
                        "judgment LLM call failed after {} retries: {}",
                        attempt, err
                    )));
                }
            }
        }
    }
}

/// Parse the judgment verdict out of the model reply, tolerating fences and
/// surrounding prose.
fn parse_judgment_response(text: &str) -> Result<ImprovementJudgment, MixSeekError> {
    let start = text
        .find('{')
        .ok_or_else(|| MixSeekError::Judgment("no JSON object in judgment response".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| MixSeekError::Judgment("no closing brace in judgment response".into()))?;
    if end < start {
        return Err(MixSeekError::Judgment(
            "malformed JSON object in judgment response".into(),
        ));
    }
    let judgment: ImprovementJudgment = serde_json::from_str(&text[start..=end])
        .map_err(|e| MixSeekError::Judgment(format!("malformed judgment output: {}", e)))?;
    if !(0.0..=1.0).contains(&judgment.confidence_score) {
        return Err(MixSeekError::Judgment(format!(
            "confidence_score out of range 0..=1: {}",
            judgment.confidence_score
        )));
    }
    Ok(judgment)
}
