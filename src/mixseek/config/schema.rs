//! Configuration schema for the MixSeek runtime.
//!
//! These structs mirror the TOML surfaces the runtime consumes: one
//! orchestrator file, one file per team, and the evaluator / judgment /
//! prompt-builder settings referenced from the orchestrator file. Parsing is
//! plain serde; cross-field rules (weight sums, mutually exclusive domain
//! lists, name charsets) live in explicit `validate()` methods so schema
//! violations surface as [`MixSeekError::Config`] with the offending field
//! name.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

use crate::mixseek::clients::factory::ModelRef;
use crate::mixseek::error::MixSeekError;

/// Default model identifier used when a team member or evaluator metric does
/// not name one.
pub const DEFAULT_MODEL: &str = "google-gla:gemini-2.5-flash-lite";

/// Upper bound accepted for `web_fetch.max_content_tokens`.
pub const MAX_WEB_FETCH_CONTENT_TOKENS: u32 = 50_000;

/// Supported member agent types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Plain,
    WebSearch,
    WebFetch,
    CodeExecution,
    Custom,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Plain => "plain",
            AgentType::WebSearch => "web_search",
            AgentType::WebFetch => "web_fetch",
            AgentType::CodeExecution => "code_execution",
            AgentType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `system_instruction` accepts either a plain string or a `{ text = "…" }`
/// table, leaving room for future per-language or templated variants.
fn deserialize_system_instruction<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Table { text: String },
    }
    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|r| match r {
        Raw::Text(s) => s,
        Raw::Table { text } => text,
    }))
}

/// Configuration for the built-in web search tool.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchToolConfig {
    /// Maximum number of search results surfaced to the model.
    #[serde(default = "default_search_max_results")]
    pub max_results: u32,
    /// Search timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout: u32,
}

fn default_search_max_results() -> u32 {
    10
}

fn default_search_timeout() -> u32 {
    30
}

impl Default for WebSearchToolConfig {
    fn default() -> Self {
        WebSearchToolConfig {
            max_results: default_search_max_results(),
            timeout: default_search_timeout(),
        }
    }
}

impl WebSearchToolConfig {
    fn validate(&self, agent: &str) -> Result<(), MixSeekError> {
        if !(1..=50).contains(&self.max_results) {
            return Err(MixSeekError::config(
                format!("{}.tool_settings.web_search.max_results", agent),
                format!("must be in 1..=50, got {}", self.max_results),
            ));
        }
        if !(1..=120).contains(&self.timeout) {
            return Err(MixSeekError::config(
                format!("{}.tool_settings.web_search.timeout", agent),
                format!("must be in 1..=120, got {}", self.timeout),
            ));
        }
        Ok(())
    }
}

/// Configuration for the provider-native web fetch tool.
///
/// Only providers with a native fetch tool (Anthropic, Google) accept this;
/// others fail at agent construction, not at run time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebFetchToolConfig {
    /// Maximum number of tool invocations.
    pub max_uses: Option<u32>,
    /// Whitelist of allowed domains (mutually exclusive with
    /// `blocked_domains`).
    pub allowed_domains: Option<Vec<String>>,
    /// Blacklist of blocked domains (mutually exclusive with
    /// `allowed_domains`).
    pub blocked_domains: Option<Vec<String>>,
    /// Enable source citation in responses.
    #[serde(default)]
    pub enable_citations: bool,
    /// Maximum content size in tokens (max 50000).
    pub max_content_tokens: Option<u32>,
}

impl WebFetchToolConfig {
    fn validate(&self, agent: &str) -> Result<(), MixSeekError> {
        if self.allowed_domains.is_some() && self.blocked_domains.is_some() {
            return Err(MixSeekError::config(
                format!("{}.tool_settings.web_fetch", agent),
                "allowed_domains and blocked_domains are mutually exclusive; use only one",
            ));
        }
        if let Some(tokens) = self.max_content_tokens {
            if tokens == 0 || tokens > MAX_WEB_FETCH_CONTENT_TOKENS {
                return Err(MixSeekError::config(
                    format!("{}.tool_settings.web_fetch.max_content_tokens", agent),
                    format!("must be in 1..={}, got {}", MAX_WEB_FETCH_CONTENT_TOKENS, tokens),
                ));
            }
        }
        Ok(())
    }
}

/// Code execution tool information. The sandbox (timeout, available modules,
/// no network) is provider-controlled; nothing here is enforced locally.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeExecutionToolConfig {
    /// Expected minimum timeout enforced by the provider (documentation only).
    pub expected_min_timeout_seconds: Option<u64>,
}

/// Tool-specific configuration, conditional on the agent type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolSettings {
    pub web_search: Option<WebSearchToolConfig>,
    pub web_fetch: Option<WebFetchToolConfig>,
    pub code_execution: Option<CodeExecutionToolConfig>,
}

/// Plugin descriptor for custom member agents.
///
/// `agent_module` (a registered module path) is preferred; `path` (a
/// filesystem path) is the fallback for scripted iteration. `agent_class`
/// is always required.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginDescriptor {
    pub agent_module: Option<String>,
    pub path: Option<String>,
    pub agent_class: String,
}

/// Configuration for one member agent, loaded from a `[[team.members]]`
/// table.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberAgentConfig {
    /// Unique agent identifier within the team; `[A-Za-z0-9._-]+`.
    pub agent_name: String,
    /// Agent type/capabilities.
    pub agent_type: AgentType,
    /// Model identifier in `provider:model` form.
    #[serde(default = "default_model")]
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
    /// HTTP request timeout in seconds for model API calls.
    pub timeout_seconds: Option<u64>,
    /// Maximum retries for LLM API calls (0 means no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, deserialize_with = "deserialize_system_instruction")]
    pub system_instruction: Option<String>,
    /// Description surfaced to the leader's LLM when this member is exposed
    /// as a tool. Falls back to `description` when absent.
    pub tool_description: Option<String>,
    #[serde(default)]
    pub description: String,
    pub tool_settings: Option<ToolSettings>,
    /// Plugin configuration; required when `agent_type = "custom"`.
    pub plugin: Option<PluginDescriptor>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn valid_agent_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl MemberAgentConfig {
    /// Validate the member configuration against the schema rules.
    pub fn validate(&self) -> Result<(), MixSeekError> {
        if !valid_agent_name(&self.agent_name) {
            return Err(MixSeekError::config(
                "agent_name",
                format!(
                    "invalid agent name '{}': only alphanumerics, '-', '_' and '.' are allowed",
                    self.agent_name
                ),
            ));
        }

        // Custom agents may use any provider prefix but still need the
        // 'prefix:model' shape; builtin types require a known provider.
        if self.agent_type == AgentType::Custom {
            if !self.model.contains(':') {
                return Err(MixSeekError::config(
                    format!("{}.model", self.agent_name),
                    format!(
                        "invalid model '{}': custom agents require 'prefix:model' form",
                        self.model
                    ),
                ));
            }
            if self.plugin.is_none() {
                return Err(MixSeekError::config(
                    format!("{}.plugin", self.agent_name),
                    "agent_type = \"custom\" requires a [team.members.plugin] table",
                ));
            }
        } else {
            ModelRef::parse(&self.model).map_err(|e| {
                MixSeekError::config(format!("{}.model", self.agent_name), e.to_string())
            })?;
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(MixSeekError::config(
                    format!("{}.temperature", self.agent_name),
                    format!("must be in 0.0..=2.0, got {}", t),
                ));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(MixSeekError::config(
                    format!("{}.top_p", self.agent_name),
                    format!("must be in 0.0..=1.0, got {}", p),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(MixSeekError::config(
                format!("{}.max_tokens", self.agent_name),
                "must be positive",
            ));
        }
        if self.timeout_seconds == Some(0) {
            return Err(MixSeekError::config(
                format!("{}.timeout_seconds", self.agent_name),
                "must be at least 1",
            ));
        }

        if let Some(tools) = &self.tool_settings {
            if let Some(ws) = &tools.web_search {
                ws.validate(&self.agent_name)?;
            }
            if let Some(wf) = &tools.web_fetch {
                wf.validate(&self.agent_name)?;
            }
        }
        Ok(())
    }

    /// The description exposed to the leader's LLM for this member's tool.
    pub fn effective_tool_description(&self) -> String {
        if let Some(desc) = &self.tool_description {
            return desc.clone();
        }
        if !self.description.is_empty() {
            return self.description.clone();
        }
        format!(
            "Delegate a sub-task to the '{}' member agent ({}).",
            self.agent_name, self.agent_type
        )
    }
}

/// Configuration for a team's leader agent.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderConfig {
    /// Model identifier in `provider:model` form.
    pub model: String,
    #[serde(default, deserialize_with = "deserialize_system_instruction")]
    pub system_instruction: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
    pub stop_sequences: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// One team's identity and agent roster, from a team TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    /// Unique per execution; duplicates across teams are a hard error.
    pub team_id: String,
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<MemberAgentConfig>,
    pub leader: LeaderConfig,
}

/// Wrapper matching the `[team]` table of a team TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfigFile {
    pub team: TeamConfig,
}

impl TeamConfig {
    /// Validate team identity, leader model, and every member.
    pub fn validate(&self) -> Result<(), MixSeekError> {
        if self.team_id.trim().is_empty() {
            return Err(MixSeekError::config("team.team_id", "must not be empty"));
        }
        ModelRef::parse(&self.leader.model)
            .map_err(|e| MixSeekError::config("team.leader.model", e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for member in &self.members {
            member.validate()?;
            if !seen.insert(member.agent_name.as_str()) {
                return Err(MixSeekError::config(
                    "team.members.agent_name",
                    format!(
                        "duplicate agent_name '{}' in team '{}'",
                        member.agent_name, self.team_id
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Reference to a team config file, from `[[orchestrator.teams]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamRef {
    /// Path to the team TOML, relative to the workspace.
    pub config: PathBuf,
}

/// Orchestrator-level settings, from the `[orchestrator]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// Workspace directory; resolved by the loader, never from a silent CWD
    /// fallback.
    #[serde(skip)]
    pub workspace_path: PathBuf,
    #[serde(default = "default_timeout_per_team")]
    pub timeout_per_team_seconds: u64,
    #[serde(default = "default_max_concurrent_teams")]
    pub max_concurrent_teams: usize,
    /// Retries for transient network faults per team (0..=10).
    #[serde(default = "default_max_retries_per_team")]
    pub max_retries_per_team: u32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_min_rounds")]
    pub min_rounds: u32,
    #[serde(default = "default_submission_timeout")]
    pub submission_timeout_seconds: u64,
    #[serde(default = "default_judgment_timeout")]
    pub judgment_timeout_seconds: u64,
    /// Path to the evaluator TOML, workspace-relative.
    pub evaluator_config: Option<PathBuf>,
    /// Path to the judgment TOML, workspace-relative.
    pub judgment_config: Option<PathBuf>,
    /// Path to the prompt builder TOML, workspace-relative.
    pub prompt_builder_config: Option<PathBuf>,
    #[serde(default)]
    pub teams: Vec<TeamRef>,
}

fn default_timeout_per_team() -> u64 {
    300
}

fn default_max_concurrent_teams() -> usize {
    4
}

fn default_max_retries_per_team() -> u32 {
    2
}

fn default_max_rounds() -> u32 {
    3
}

fn default_min_rounds() -> u32 {
    1
}

fn default_submission_timeout() -> u64 {
    300
}

fn default_judgment_timeout() -> u64 {
    60
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        OrchestratorSettings {
            workspace_path: PathBuf::new(),
            timeout_per_team_seconds: default_timeout_per_team(),
            max_concurrent_teams: default_max_concurrent_teams(),
            max_retries_per_team: default_max_retries_per_team(),
            max_rounds: default_max_rounds(),
            min_rounds: default_min_rounds(),
            submission_timeout_seconds: default_submission_timeout(),
            judgment_timeout_seconds: default_judgment_timeout(),
            evaluator_config: None,
            judgment_config: None,
            prompt_builder_config: None,
            teams: Vec::new(),
        }
    }
}

impl OrchestratorSettings {
    pub fn validate(&self) -> Result<(), MixSeekError> {
        if self.max_retries_per_team > 10 {
            return Err(MixSeekError::config(
                "orchestrator.max_retries_per_team",
                format!("must be in 0..=10, got {}", self.max_retries_per_team),
            ));
        }
        if self.min_rounds == 0 || self.max_rounds == 0 {
            return Err(MixSeekError::config(
                "orchestrator.min_rounds",
                "min_rounds and max_rounds must be positive",
            ));
        }
        if self.min_rounds > self.max_rounds {
            return Err(MixSeekError::config(
                "orchestrator.min_rounds",
                format!(
                    "min_rounds ({}) must not exceed max_rounds ({})",
                    self.min_rounds, self.max_rounds
                ),
            ));
        }
        if self.timeout_per_team_seconds == 0 {
            return Err(MixSeekError::config(
                "orchestrator.timeout_per_team_seconds",
                "must be positive",
            ));
        }
        if self.max_concurrent_teams == 0 {
            return Err(MixSeekError::config(
                "orchestrator.max_concurrent_teams",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Per-metric configuration inside the evaluator TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricConfig {
    /// Metric class name, e.g. `"ClarityCoherence"`.
    pub name: String,
    /// Weight in the overall score. Either every metric carries a weight
    /// (summing to 1.0 ± 0.001) or none does (equal weights).
    pub weight: Option<f64>,
    /// Per-metric model override.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_retries: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_system_instruction")]
    pub system_instruction: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub stop_sequences: Option<Vec<String>>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
}

/// Plugin descriptor for a custom evaluation metric.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricPluginConfig {
    pub module: String,
    pub class: String,
}

/// Resolved LLM call parameters for one judge metric: the per-metric
/// override chained onto the evaluator defaults.
#[derive(Debug, Clone)]
pub struct LlmParams {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_retries: u32,
    pub system_instruction: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub stop_sequences: Option<Vec<String>>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
}

/// Evaluator settings, from the evaluator TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSettings {
    #[serde(default = "default_model")]
    pub default_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, deserialize_with = "deserialize_system_instruction")]
    pub system_instruction: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub stop_sequences: Option<Vec<String>>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricConfig>,
    /// Custom metric plugins keyed by metric name.
    #[serde(default)]
    pub custom_metrics: HashMap<String, MetricPluginConfig>,
}

fn default_metrics() -> Vec<MetricConfig> {
    ["ClarityCoherence", "Coverage", "Relevance", "LLMPlain"]
        .iter()
        .map(|name| MetricConfig {
            name: (*name).to_string(),
            ..MetricConfig::default()
        })
        .collect()
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        EvaluatorSettings {
            default_model: default_model(),
            temperature: None,
            max_tokens: None,
            max_retries: default_max_retries(),
            system_instruction: None,
            timeout_seconds: None,
            stop_sequences: None,
            top_p: None,
            seed: None,
            metrics: default_metrics(),
            custom_metrics: HashMap::new(),
        }
    }
}

impl EvaluatorSettings {
    /// Validate metric names, weight discipline, and the default model.
    pub fn validate(&self) -> Result<(), MixSeekError> {
        if self.metrics.is_empty() {
            return Err(MixSeekError::config(
                "evaluator.metrics",
                "at least one metric must be configured",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.name.as_str()) {
                return Err(MixSeekError::config(
                    "evaluator.metrics.name",
                    format!("duplicate metric name '{}'", metric.name),
                ));
            }
            if let Some(w) = metric.weight {
                if !(0.0..=1.0).contains(&w) {
                    return Err(MixSeekError::config(
                        format!("evaluator.metrics.{}.weight", metric.name),
                        format!("must be in 0.0..=1.0, got {}", w),
                    ));
                }
            }
        }
        self.effective_weights()?;
        ModelRef::parse(&self.default_model)
            .map_err(|e| MixSeekError::config("evaluator.default_model", e.to_string()))?;
        Ok(())
    }

    /// The weight assigned to every configured metric.
    ///
    /// If no metric declares a weight, equal weights are assigned. Mixing
    /// weighted and unweighted metrics, or weights not summing to
    /// 1.0 ± 0.001, is a configuration error.
    pub fn effective_weights(&self) -> Result<HashMap<String, f64>, MixSeekError> {
        let declared: Vec<_> = self.metrics.iter().filter(|m| m.weight.is_some()).collect();
        if declared.is_empty() {
            let equal = 1.0 / self.metrics.len() as f64;
            return Ok(self
                .metrics
                .iter()
                .map(|m| (m.name.clone(), equal))
                .collect());
        }
        if declared.len() != self.metrics.len() {
            return Err(MixSeekError::config(
                "evaluator.metrics.weight",
                "either every metric declares a weight or none does",
            ));
        }
        let sum: f64 = self.metrics.iter().filter_map(|m| m.weight).sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(MixSeekError::config(
                "evaluator.metrics.weight",
                format!("weights must sum to 1.0 +/- 0.001, got {}", sum),
            ));
        }
        Ok(self
            .metrics
            .iter()
            .map(|m| (m.name.clone(), m.weight.unwrap()))
            .collect())
    }

    /// Resolve the effective LLM parameters for one metric: the per-metric
    /// override wins over the evaluator default for every field.
    pub fn params_for(&self, metric_name: &str) -> LlmParams {
        let metric = self.metrics.iter().find(|m| m.name == metric_name);
        let m = |f: fn(&MetricConfig) -> Option<&str>| -> Option<String> {
            metric.and_then(|mc| f(mc).map(str::to_owned))
        };
        LlmParams {
            model: m(|mc| mc.model.as_deref()).unwrap_or_else(|| self.default_model.clone()),
            temperature: metric.and_then(|mc| mc.temperature).or(self.temperature),
            max_tokens: metric.and_then(|mc| mc.max_tokens).or(self.max_tokens),
            max_retries: metric
                .and_then(|mc| mc.max_retries)
                .unwrap_or(self.max_retries),
            system_instruction: m(|mc| mc.system_instruction.as_deref())
                .or_else(|| self.system_instruction.clone()),
            timeout_seconds: metric
                .and_then(|mc| mc.timeout_seconds)
                .or(self.timeout_seconds),
            stop_sequences: metric
                .and_then(|mc| mc.stop_sequences.clone())
                .or_else(|| self.stop_sequences.clone()),
            top_p: metric.and_then(|mc| mc.top_p).or(self.top_p),
            seed: metric.and_then(|mc| mc.seed).or(self.seed),
        }
    }
}

/// Judgment LLM settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JudgmentSettings {
    #[serde(default = "default_model")]
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for JudgmentSettings {
    fn default() -> Self {
        JudgmentSettings {
            model: default_model(),
            temperature: None,
            max_tokens: None,
            timeout_seconds: None,
            max_retries: default_max_retries(),
        }
    }
}

/// Prompt builder settings: one template per consumer. Users may override
/// any of the three via the prompt builder TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptBuilderSettings {
    #[serde(default = "default_team_template")]
    pub team_user_prompt: String,
    #[serde(default = "default_evaluator_template")]
    pub evaluator_user_prompt: String,
    #[serde(default = "default_judgment_template")]
    pub judgment_user_prompt: String,
}

impl Default for PromptBuilderSettings {
    fn default() -> Self {
        PromptBuilderSettings {
            team_user_prompt: default_team_template(),
            evaluator_user_prompt: default_evaluator_template(),
            judgment_user_prompt: default_judgment_template(),
        }
    }
}

fn default_team_template() -> String {
    r#"# ユーザから指定されたタスク

{{ user_prompt }}

現在日時: {{ current_datetime }}
現在のラウンド: {{ round_number }}

# 過去の提出履歴

{{ submission_history }}

# 現在のリーダーボード

{{ ranking_table }}

{{ team_position_message }}

上記の履歴とランキングを踏まえ、より高い評価を得られるSubmissionを作成してください。
"#
    .to_string()
}

fn default_evaluator_template() -> String {
    r#"# ユーザから指定されたタスク

{{ user_query }}

# 評価対象のSubmission

{{ submission }}
"#
    .to_string()
}

fn default_judgment_template() -> String {
    r#"あなたはチームの改善見込みを判定する審査員です。

# ユーザから指定されたタスク

{{ user_prompt }}

現在日時: {{ current_datetime }}
次のラウンド番号: {{ round_number }}

# 過去の提出履歴

{{ submission_history }}

# リーダーボード

{{ ranking_table }}

{{ team_position_message }}

上記を踏まえて、このチームが次のラウンドでスコアを改善できる見込みがあるかを判定し、
次のJSONだけを出力してください:
{"should_continue": true または false, "reasoning": "判断理由", "confidence_score": 0.0から1.0}
"#
    .to_string()
}
