//! Evaluator: assigns numeric quality scores to one submission.
//!
//! Metrics run sequentially in their declared order, never in parallel:
//! reproducible scores and simple rate-limit behavior against a single
//! provider are worth more here than throughput. The first metric failure
//! aborts the evaluation with the metric name attached; there are no
//! partial results.
//!
//! Per-metric LLM parameters resolve through the override chain
//! (metric config wins over evaluator defaults); the weighted overall score
//! is `sum(score * weight)` rounded to two decimals, with a missing weight
//! for a produced metric being a fatal error.

pub mod metrics;

use std::collections::HashMap;
use std::sync::Arc;

use crate::mixseek::client_wrapper::Message;
use crate::mixseek::clients::common::{is_transient_error, ClientSampling};
use crate::mixseek::clients::factory::{ClientFactory, ProviderClientFactory};
use crate::mixseek::config::schema::{EvaluatorSettings, LlmParams, PromptBuilderSettings};
use crate::mixseek::error::MixSeekError;
use crate::mixseek::prompt_builder::UserPromptBuilder;

pub use metrics::{builtin_metrics, Metric, MetricScore};

/// Instruction appended to every judge system prompt pinning the structured
/// output shape.
const JUDGE_OUTPUT_FORMAT: &str =
    "評価結果は次のJSONだけを出力してください: {\"score\": 0から100の数値, \"comment\": \"評価コメント\"}";

/// One evaluation request. Construction validates that neither the query
/// nor the submission is empty or whitespace-only.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub user_query: String,
    pub submission: String,
    pub team_id: Option<String>,
    /// Optional per-request configuration overriding the evaluator's own.
    pub config: Option<EvaluatorSettings>,
}

impl EvaluationRequest {
    pub fn new(
        user_query: impl Into<String>,
        submission: impl Into<String>,
        team_id: Option<String>,
    ) -> Result<Self, MixSeekError> {
        let user_query = user_query.into();
        let submission = submission.into();
        if user_query.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "user_query cannot be empty or whitespace-only".to_string(),
            ));
        }
        if submission.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "submission cannot be empty or whitespace-only".to_string(),
            ));
        }
        Ok(EvaluationRequest {
            user_query,
            submission,
            team_id,
            config: None,
        })
    }

    /// Attach a per-request configuration override (builder pattern).
    pub fn with_config(mut self, config: EvaluatorSettings) -> Self {
        self.config = Some(config);
        self
    }
}

/// Output of one evaluation: per-metric scores in declared order plus the
/// weighted overall score.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub metrics: Vec<MetricScore>,
    /// 0..=100, weighted, rounded to two decimals.
    pub overall_score: f64,
}

impl EvaluationResult {
    /// Per-metric scores keyed by metric name, as persisted to the leader
    /// board.
    pub fn score_details(&self) -> HashMap<String, f64> {
        self.metrics
            .iter()
            .map(|m| (m.metric_name.clone(), m.score))
            .collect()
    }
}

/// Constructor signature for plugin-provided custom metrics.
pub type MetricConstructor = Arc<dyn Fn() -> Arc<dyn Metric> + Send + Sync>;

/// Registry of custom-metric constructors, keyed by module path and class
/// name. Mirrors the member-agent plugin registry: resolution failures at
/// config-load time are warnings (the metric is simply unavailable), while
/// an unknown metric name at evaluation time is a hard error.
#[derive(Default)]
pub struct MetricPluginRegistry {
    modules: std::sync::RwLock<HashMap<String, HashMap<String, MetricConstructor>>>,
}

impl MetricPluginRegistry {
    pub fn new() -> Self {
        MetricPluginRegistry::default()
    }

    pub fn register_module(
        &self,
        module: impl Into<String>,
        class: impl Into<String>,
        constructor: MetricConstructor,
    ) {
        self.modules
            .write()
            .expect("metric registry poisoned")
            .entry(module.into())
            .or_default()
            .insert(class.into(), constructor);
    }

    fn resolve(&self, module: &str, class: &str) -> Result<Arc<dyn Metric>, String> {
        let modules = self.modules.read().expect("metric registry poisoned");
        let classes = modules
            .get(module)
            .ok_or_else(|| format!("module not found: '{}'", module))?;
        let constructor = classes.get(class).ok_or_else(|| {
            format!(
                "class '{}' not found in '{}'. Available classes: {}",
                class,
                module,
                classes.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;
        Ok(constructor())
    }
}

/// Main evaluator.
pub struct Evaluator {
    settings: EvaluatorSettings,
    prompt_builder: UserPromptBuilder,
    clients: Arc<dyn ClientFactory>,
    builtin: HashMap<String, Arc<dyn Metric>>,
    custom: HashMap<String, Arc<dyn Metric>>,
}

impl Evaluator {
    /// Create an evaluator from validated settings. The prompt builder
    /// settings feed the judge prompt template.
    pub fn new(
        settings: EvaluatorSettings,
        prompt_builder_settings: PromptBuilderSettings,
    ) -> Result<Self, MixSeekError> {
        settings.validate()?;
        let builtin = builtin_metrics()
            .into_iter()
            .map(|m| (m.name().to_string(), m))
            .collect();
        Ok(Evaluator {
            settings,
            prompt_builder: UserPromptBuilder::new(prompt_builder_settings, None),
            clients: Arc::new(ProviderClientFactory),
            builtin,
            custom: HashMap::new(),
        })
    }

    /// Swap the client factory (tests inject scripted clients here).
    pub fn with_client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = clients;
        self
    }

    /// Resolve the `[custom_metrics]` table against a plugin registry.
    /// Load failures are logged and skipped; the metric just stays
    /// unavailable.
    pub fn load_custom_metrics(&mut self, registry: &MetricPluginRegistry) {
        for (name, plugin) in self.settings.custom_metrics.clone() {
            match registry.resolve(&plugin.module, &plugin.class) {
                Ok(metric) => {
                    self.custom.insert(name, metric);
                }
                Err(reason) => {
                    log::warn!(
                        "failed to load custom metric '{}' from config: {}. \
                         This metric will not be available for evaluation.",
                        name,
                        reason
                    );
                }
            }
        }
    }

    /// Register a custom evaluation metric under a unique name.
    pub fn register_custom_metric(&mut self, name: impl Into<String>, metric: Arc<dyn Metric>) {
        self.custom.insert(name.into(), metric);
    }

    /// Look a metric up by class name: custom registry first, then the
    /// built-ins. Unknown names list what is available.
    fn get_metric(&self, metric_name: &str) -> Result<Arc<dyn Metric>, MixSeekError> {
        if let Some(metric) = self.custom.get(metric_name) {
            return Ok(metric.clone());
        }
        if let Some(metric) = self.builtin.get(metric_name) {
            return Ok(metric.clone());
        }
        let mut available: Vec<&str> = self
            .builtin
            .keys()
            .chain(self.custom.keys())
            .map(String::as_str)
            .collect();
        available.sort_unstable();
        Err(MixSeekError::Evaluator {
            metric: metric_name.to_string(),
            message: format!(
                "Metric class not found: '{}'. Available metrics: {}",
                metric_name,
                available.join(", ")
            ),
        })
    }

    /// Evaluate one submission with the configured metrics, sequentially and
    /// in declared order. The first metric failure aborts with the metric
    /// name attached.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationResult, MixSeekError> {
        let config = request.config.as_ref().unwrap_or(&self.settings);
        config.validate()?;

        let mut metric_scores = Vec::with_capacity(config.metrics.len());
        for metric_config in &config.metrics {
            let metric_name = &metric_config.name;
            let metric = self.get_metric(metric_name)?;

            let score = if metric.judge_instruction().is_some() {
                let params = config.params_for(metric_name);
                self.run_judge_metric(metric.as_ref(), &params, request)
                    .await?
            } else {
                metric
                    .evaluate(&request.user_query, &request.submission)
                    .await?
            };

            if !(0.0..=100.0).contains(&score.score) {
                return Err(MixSeekError::Evaluator {
                    metric: metric_name.clone(),
                    message: format!("score out of range 0..=100: {}", score.score),
                });
            }
            metric_scores.push(score);
        }

        let overall_score = self.calculate_overall_score(&metric_scores, config)?;
        Ok(EvaluationResult {
            metrics: metric_scores,
            overall_score,
        })
    }

    /// Weighted overall score, rounded to two decimals. A metric present in
    /// the results but missing from the weight table is a fatal error.
    fn calculate_overall_score(
        &self,
        metric_scores: &[MetricScore],
        config: &EvaluatorSettings,
    ) -> Result<f64, MixSeekError> {
        let weights = config.effective_weights()?;
        let mut total = 0.0;
        for score in metric_scores {
            let weight = weights.get(&score.metric_name).ok_or_else(|| {
                MixSeekError::Evaluator {
                    metric: score.metric_name.clone(),
                    message: format!("Weight not found for metric '{}'", score.metric_name),
                }
            })?;
            total += score.score * weight;
        }
        Ok((total * 100.0).round() / 100.0)
    }

    /// Drive one LLM-judge metric: resolve parameters, build the judge
    /// prompt, call the model with retries on transient faults, and parse
    /// the structured response. Malformed output is terminal (class 5), not
    /// retried.
    async fn run_judge_metric(
        &self,
        metric: &dyn Metric,
        params: &LlmParams,
        request: &EvaluationRequest,
    ) -> Result<MetricScore, MixSeekError> {
        let metric_name = metric.name().to_string();

        let prompt = self
            .prompt_builder
            .build_evaluator_prompt(&request.user_query, &request.submission)?;
        let instruction = params
            .system_instruction
            .clone()
            .or_else(|| metric.judge_instruction().map(str::to_owned))
            .unwrap_or_default();
        let system = format!("{}\n\n{}", instruction, JUDGE_OUTPUT_FORMAT);
        let messages = vec![Message::system(system), Message::user(prompt)];

        let sampling = ClientSampling {
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            seed: params.seed,
            stop_sequences: params.stop_sequences.clone(),
        };
        let client = self
            .clients
            .create_with_sampling(&params.model, sampling)
            .map_err(|e| evaluator_err(&metric_name, e.to_string()))?;

        let mut attempt: u32 = 0;
        loop {
            let call = client.send_message(&messages, None);
            let outcome = match params.timeout_seconds {
                Some(seconds) => {
                    match tokio::time::timeout(std::time::Duration::from_secs(seconds), call).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(format!("judge call timed out after {}s", seconds).into()),
                    }
                }
                None => call.await,
            };

            match outcome {
                Ok(reply) => {
                    let (score, comment) =
                        parse_judge_response(reply.content.as_ref()).map_err(|reason| {
                            evaluator_err(
                                &metric_name,
                                format!("malformed judge output: {}", reason),
                            )
                        })?;
                    return Ok(MetricScore::new(metric_name, score, comment));
                }
                Err(err) => {
                    let transient = is_transient_error(err.as_ref());
                    if transient && attempt < params.max_retries {
                        attempt += 1;
                        log::warn!(
                            "judge metric '{}': transient provider error, retry {}/{}: {}",
                            metric_name,
                            attempt,
                            params.max_retries,
                            err
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(
                            200u64.saturating_mul(1 << attempt.min(6)),
                        ))
                        .await;
                        continue;
                    }
                    return Err(evaluator_err(
                        &metric_name,
                        format!("judge LLM call failed after {} retries: {}", attempt, err),
                    ));
                }
            }
        }
    }
}

fn evaluator_err(metric: &str, message: String) -> MixSeekError {
    MixSeekError::Evaluator {
        metric: metric.to_string(),
        message,
    }
}

/// Extract `{"score": …, "comment": …}` from a judge reply, tolerating
/// markdown fences and surrounding prose.
fn parse_judge_response(text: &str) -> Result<(f64, Option<String>), String> {
    let start = text.find('{').ok_or("no JSON object in response")?;
    let end = text.rfind('}').ok_or("no closing brace in response")?;
    if end < start {
        return Err("malformed JSON object in response".to_string());
    }
    let value: serde_json::Value =
        serde_json::from_str(&text[start..=end]).map_err(|e| e.to_string())?;
    let score = value
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or("missing numeric 'score' field")?;
    let comment = value
        .get("comment")
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    Ok((score, comment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixseek::client_wrapper::{ClientWrapper, ToolDefinition};
    use async_trait::async_trait;
    use std::error::Error;
    use tokio::sync::Mutex;

    struct FixedScoreClient {
        replies: Mutex<Vec<String>>,
    }

    impl FixedScoreClient {
        fn new(replies: Vec<String>) -> Self {
            FixedScoreClient {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl ClientWrapper for FixedScoreClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            let mut replies = self.replies.lock().await;
            let content = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            Ok(Message::assistant(content))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct FixedFactory {
        replies: Vec<String>,
    }

    impl ClientFactory for FixedFactory {
        fn create_with_sampling(
            &self,
            _model: &str,
            _sampling: ClientSampling,
        ) -> Result<Arc<dyn ClientWrapper>, MixSeekError> {
            Ok(Arc::new(FixedScoreClient::new(self.replies.clone())))
        }
    }

    struct FailingFactory;

    impl ClientFactory for FailingFactory {
        fn create_with_sampling(
            &self,
            _model: &str,
            _sampling: ClientSampling,
        ) -> Result<Arc<dyn ClientWrapper>, MixSeekError> {
            Ok(Arc::new(ErrClient))
        }
    }

    struct ErrClient;

    #[async_trait]
    impl ClientWrapper for ErrClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            Err("503 service unavailable".into())
        }

        fn model_name(&self) -> &str {
            "err"
        }
    }

    fn settings(toml_text: &str) -> EvaluatorSettings {
        toml::from_str(toml_text).unwrap()
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest::new("explain rust", "Rust is a systems language.", None).unwrap()
    }

    #[test]
    fn empty_inputs_rejected_at_construction() {
        assert!(EvaluationRequest::new("", "submission", None).is_err());
        assert!(EvaluationRequest::new("query", "   ", None).is_err());
    }

    #[tokio::test]
    async fn weighted_overall_score_rounds_to_two_decimals() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "Coverage"
            weight = 0.7

            [[metrics]]
            name = "Relevance"
            weight = 0.3
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default())
            .unwrap()
            .with_client_factory(Arc::new(FixedFactory {
                replies: vec![r#"{"score": 83.33, "comment": "good"}"#.to_string()],
            }));
        let result = evaluator.evaluate(&request()).await.unwrap();
        assert_eq!(result.metrics.len(), 2);
        // 83.33 * 0.7 + 83.33 * 0.3 = 83.33
        assert!((result.overall_score - 83.33).abs() < 0.01);
        let details = result.score_details();
        assert_eq!(details["Coverage"], 83.33);
    }

    #[tokio::test]
    async fn metric_order_matches_declaration() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "Relevance"

            [[metrics]]
            name = "Coverage"
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default())
            .unwrap()
            .with_client_factory(Arc::new(FixedFactory {
                replies: vec![r#"{"score": 50, "comment": null}"#.to_string()],
            }));
        let result = evaluator.evaluate(&request()).await.unwrap();
        assert_eq!(result.metrics[0].metric_name, "Relevance");
        assert_eq!(result.metrics[1].metric_name, "Coverage");
    }

    #[tokio::test]
    async fn unknown_metric_lists_available_ones() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "NotARealMetric"
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default()).unwrap();
        let err = evaluator.evaluate(&request()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NotARealMetric"));
        assert!(message.contains("Coverage"));
        assert!(message.contains("ClarityCoherence"));
    }

    #[tokio::test]
    async fn judge_failure_aborts_with_metric_name() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"
            max_retries = 0

            [[metrics]]
            name = "Coverage"
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default())
            .unwrap()
            .with_client_factory(Arc::new(FailingFactory));
        let err = evaluator.evaluate(&request()).await.unwrap_err();
        match err {
            MixSeekError::Evaluator { metric, .. } => assert_eq!(metric, "Coverage"),
            other => panic!("expected evaluator error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_judge_output_is_terminal() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "LLMPlain"
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default())
            .unwrap()
            .with_client_factory(Arc::new(FixedFactory {
                replies: vec!["I think it deserves a high score!".to_string()],
            }));
        let err = evaluator.evaluate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("malformed judge output"));
    }

    #[tokio::test]
    async fn out_of_range_score_rejected() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "LLMPlain"
            "#,
        );
        let evaluator = Evaluator::new(settings, PromptBuilderSettings::default())
            .unwrap()
            .with_client_factory(Arc::new(FixedFactory {
                replies: vec![r#"{"score": 130, "comment": "too generous"}"#.to_string()],
            }));
        assert!(evaluator.evaluate(&request()).await.is_err());
    }

    /// Deterministic statistical metric used to exercise the custom path.
    struct WordCountMetric;

    #[async_trait]
    impl Metric for WordCountMetric {
        fn name(&self) -> &str {
            "WordCount"
        }

        async fn evaluate(
            &self,
            _user_query: &str,
            submission: &str,
        ) -> Result<MetricScore, MixSeekError> {
            let words = submission.split_whitespace().count() as f64;
            Ok(MetricScore::new("WordCount", (words * 10.0).min(100.0), None))
        }
    }

    #[tokio::test]
    async fn statistical_metric_is_deterministic() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "WordCount"
            "#,
        );
        let mut evaluator = Evaluator::new(settings, PromptBuilderSettings::default()).unwrap();
        evaluator.register_custom_metric("WordCount", Arc::new(WordCountMetric));

        let first = evaluator.evaluate(&request()).await.unwrap();
        let second = evaluator.evaluate(&request()).await.unwrap();
        assert_eq!(first.overall_score, second.overall_score);
        assert_eq!(first.metrics[0].score, 50.0);
    }

    #[test]
    fn custom_metric_plugins_resolve_with_warnings_on_failure() {
        let settings = settings(
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "WordCount"

            [custom_metrics.WordCount]
            module = "acme.metrics"
            class = "WordCountMetric"

            [custom_metrics.Missing]
            module = "not.registered"
            class = "Nope"
            "#,
        );
        let registry = MetricPluginRegistry::new();
        registry.register_module(
            "acme.metrics",
            "WordCountMetric",
            Arc::new(|| Arc::new(WordCountMetric) as Arc<dyn Metric>),
        );
        let mut evaluator = Evaluator::new(settings, PromptBuilderSettings::default()).unwrap();
        evaluator.load_custom_metrics(&registry);
        // The registered one resolves; the missing one is skipped.
        assert!(evaluator.get_metric("WordCount").is_ok());
        assert!(evaluator.get_metric("Missing").is_err());
    }

    #[test]
    fn judge_response_parsing_tolerates_fences() {
        let (score, comment) =
            parse_judge_response("```json\n{\"score\": 88.5, \"comment\": \"solid\"}\n```").unwrap();
        assert_eq!(score, 88.5);
        assert_eq!(comment.as_deref(), Some("solid"));

        assert!(parse_judge_response("no json here").is_err());
        assert!(parse_judge_response("{\"comment\": \"no score\"}").is_err());
    }
}
