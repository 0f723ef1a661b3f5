//! Member agents: the leaf workers of a team.
//!
//! Every member agent, regardless of capabilities, exposes the same
//! contract: `execute(task, context) -> MemberAgentResult`. Variants differ
//! only in which provider-native tools they attach to the request (none,
//! web search, web fetch, code execution) and in how they are constructed
//! (custom agents come from the plugin registry).
//!
//! Failure is encoded in the result rather than the return type: an agent
//! that cannot complete its task returns `status = Error` with an error code
//! the leader can propagate verbatim. Two fast paths never reach the
//! provider at all: empty tasks (`EMPTY_TASK`) and, once detected,
//! token-limit exhaustion (`TOKEN_LIMIT_EXCEEDED`, never retried).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mixseek::client_wrapper::{ClientWrapper, Message, ToolDefinition};
use crate::mixseek::clients::common::{is_token_limit_error, is_transient_error, ClientSampling};
use crate::mixseek::clients::factory::{ClientFactory, ModelRef, ProviderClientFactory};
use crate::mixseek::config::schema::{AgentType, MemberAgentConfig, PluginDescriptor};
use crate::mixseek::error::MixSeekError;

/// Error code for empty/whitespace tasks.
pub const ERROR_CODE_EMPTY_TASK: &str = "EMPTY_TASK";
/// Error code for token-limit exhaustion (terminal, never retried).
pub const ERROR_CODE_TOKEN_LIMIT: &str = "TOKEN_LIMIT_EXCEEDED";
/// Error code for provider API failures.
pub const ERROR_CODE_API_ERROR: &str = "API_ERROR";

/// Member agent operation result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Warning,
}

/// Token and request accounting for one agent run.
///
/// Unlike [`crate::client_wrapper::TokenUsage`] (one HTTP round-trip), this
/// accumulates across retries, and it is what gets attributed to the team's
/// round even for failed submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

impl AgentUsage {
    /// Accumulate another usage record into this one.
    pub fn add(&mut self, other: &AgentUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.requests += other.requests;
    }
}

/// Result of one member agent execution.
#[derive(Debug, Clone)]
pub struct MemberAgentResult {
    pub status: ResultStatus,
    /// Main result content; empty on error (fail completely, no partials).
    pub content: String,
    pub agent_name: String,
    pub agent_type: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: Option<u64>,
    pub usage_info: Option<AgentUsage>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub warning_message: Option<String>,
    /// Number of retries attempted before this result.
    pub retry_count: u32,
    pub max_retries_exceeded: bool,
    /// Additional result metadata, including advertised `capabilities`.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Complete message history including tool traffic, for downstream
    /// causality reconstruction.
    pub all_messages: Vec<Message>,
}

impl MemberAgentResult {
    /// Create a successful result.
    pub fn success(
        content: impl Into<String>,
        agent_name: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        MemberAgentResult {
            status: ResultStatus::Success,
            content: content.into(),
            agent_name: agent_name.into(),
            agent_type: agent_type.into(),
            timestamp: Utc::now(),
            execution_time_ms: None,
            usage_info: None,
            error_message: None,
            error_code: None,
            warning_message: None,
            retry_count: 0,
            max_retries_exceeded: false,
            metadata: HashMap::new(),
            all_messages: Vec::new(),
        }
    }

    /// Create an error result. Content stays empty: a failed member
    /// contributes no text, only its error and its consumed usage.
    pub fn error(
        error_message: impl Into<String>,
        agent_name: impl Into<String>,
        agent_type: impl Into<String>,
        error_code: Option<&str>,
    ) -> Self {
        MemberAgentResult {
            status: ResultStatus::Error,
            content: String::new(),
            agent_name: agent_name.into(),
            agent_type: agent_type.into(),
            timestamp: Utc::now(),
            execution_time_ms: None,
            usage_info: None,
            error_message: Some(error_message.into()),
            error_code: error_code.map(str::to_owned),
            warning_message: None,
            retry_count: 0,
            max_retries_exceeded: false,
            metadata: HashMap::new(),
            all_messages: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }
}

/// Uniform execute contract for every member agent variant.
#[async_trait]
pub trait MemberAgent: Send + Sync {
    fn agent_name(&self) -> &str;

    fn agent_type(&self) -> &str;

    /// Description surfaced to the leader's LLM for this member's tool.
    fn tool_description(&self) -> String;

    /// Capabilities advertised in result metadata.
    fn capabilities(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Run one task. Failures are encoded in the result status, never
    /// panics or Err returns; the leader relies on this to propagate
    /// member errors without masking them.
    ///
    /// Implementations must reject empty or whitespace-only tasks with
    /// `error_code = EMPTY_TASK` before any LLM call is made (the built-in
    /// variants do this via their shared core).
    async fn execute(&self, task: &str, context: Option<&serde_json::Value>) -> MemberAgentResult;
}

/// Shared LLM-call machinery for the built-in agent variants.
struct AgentCore {
    config: MemberAgentConfig,
    client: Arc<dyn ClientWrapper>,
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("config", &self.config)
            .finish()
    }
}

impl AgentCore {
    fn build_messages(&self, task: &str, context: Option<&serde_json::Value>) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(instruction) = &self.config.system_instruction {
            messages.push(Message::system(instruction));
        }
        if let Some(ctx) = context {
            messages.push(Message::system(format!(
                "Additional context:\n{}",
                serde_json::to_string_pretty(ctx).unwrap_or_default()
            )));
        }
        messages.push(Message::user(task));
        messages
    }

    async fn run(
        &self,
        task: &str,
        context: Option<&serde_json::Value>,
        agent_type: &str,
        tools: Option<Vec<ToolDefinition>>,
        capabilities: &[&'static str],
    ) -> MemberAgentResult {
        let agent_name = self.config.agent_name.clone();

        if task.trim().is_empty() {
            log::debug!("member agent '{}': rejected empty task", agent_name);
            let mut result = MemberAgentResult::error(
                "Task cannot be empty or whitespace-only",
                agent_name,
                agent_type,
                Some(ERROR_CODE_EMPTY_TASK),
            );
            // requests == 0 makes "no LLM call was made" observable.
            result.usage_info = Some(AgentUsage::default());
            return result;
        }

        let started = Instant::now();
        let messages = self.build_messages(task, context);
        let mut usage = AgentUsage::default();
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let outcome = self.client.send_message(&messages, tools.clone()).await;
            if let Some(call_usage) = self.client.get_last_usage().await {
                usage.add(&AgentUsage {
                    input_tokens: call_usage.input_tokens as u64,
                    output_tokens: call_usage.output_tokens as u64,
                    requests: 1,
                });
            } else {
                usage.requests += 1;
            }

            match outcome {
                Ok(reply) => {
                    let mut all_messages = messages.clone();
                    all_messages.push(reply.clone());
                    let mut result = MemberAgentResult::success(
                        reply.content.to_string(),
                        agent_name,
                        agent_type,
                    );
                    result.execution_time_ms = Some(started.elapsed().as_millis() as u64);
                    result.usage_info = Some(usage);
                    result.retry_count = attempt;
                    result.metadata.insert(
                        "capabilities".to_string(),
                        serde_json::json!(capabilities),
                    );
                    result.all_messages = all_messages;
                    return result;
                }
                Err(err) => {
                    let message = err.to_string();

                    if is_token_limit_error(&message) {
                        log::warn!(
                            "member agent '{}': token limit exceeded, not retrying",
                            agent_name
                        );
                        let mut result = MemberAgentResult::error(
                            message,
                            agent_name,
                            agent_type,
                            Some(ERROR_CODE_TOKEN_LIMIT),
                        );
                        result.execution_time_ms = Some(started.elapsed().as_millis() as u64);
                        result.usage_info = Some(usage);
                        result.retry_count = 0;
                        result.all_messages = messages;
                        return result;
                    }

                    let transient = is_transient_error(err.as_ref());
                    if transient && attempt < max_retries {
                        attempt += 1;
                        log::warn!(
                            "member agent '{}': transient provider error, retry {}/{}: {}",
                            agent_name,
                            attempt,
                            max_retries,
                            message
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(
                            200u64.saturating_mul(1 << attempt.min(6)),
                        ))
                        .await;
                        continue;
                    }

                    let mut result = MemberAgentResult::error(
                        message,
                        agent_name,
                        agent_type,
                        Some(ERROR_CODE_API_ERROR),
                    );
                    result.execution_time_ms = Some(started.elapsed().as_millis() as u64);
                    result.usage_info = Some(usage);
                    result.retry_count = attempt;
                    result.max_retries_exceeded = transient && attempt >= max_retries;
                    result.all_messages = messages;
                    return result;
                }
            }
        }
    }
}

/// Plain text-in/text-out agent. No tools.
pub struct PlainAgent {
    core: AgentCore,
}

impl PlainAgent {
    pub fn new(
        config: MemberAgentConfig,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, MixSeekError> {
        config.validate()?;
        Ok(PlainAgent {
            core: AgentCore { config, client },
        })
    }
}

#[async_trait]
impl MemberAgent for PlainAgent {
    fn agent_name(&self) -> &str {
        &self.core.config.agent_name
    }

    fn agent_type(&self) -> &str {
        AgentType::Plain.as_str()
    }

    fn tool_description(&self) -> String {
        self.core.config.effective_tool_description()
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["text_generation"]
    }

    async fn execute(&self, task: &str, context: Option<&serde_json::Value>) -> MemberAgentResult {
        self.core
            .run(task, context, self.agent_type(), None, &self.capabilities())
            .await
    }
}

/// Agent with the provider's built-in web search tool.
pub struct WebSearchAgent {
    core: AgentCore,
    tool: ToolDefinition,
}

impl WebSearchAgent {
    pub fn new(
        config: MemberAgentConfig,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, MixSeekError> {
        config.validate()?;
        let settings = config
            .tool_settings
            .as_ref()
            .and_then(|t| t.web_search.clone())
            .unwrap_or_default();
        let tool = ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web for up-to-date information.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"},
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "default": settings.max_results,
                    },
                },
                "required": ["query"],
            }),
        };
        Ok(WebSearchAgent {
            core: AgentCore { config, client },
            tool,
        })
    }
}

#[async_trait]
impl MemberAgent for WebSearchAgent {
    fn agent_name(&self) -> &str {
        &self.core.config.agent_name
    }

    fn agent_type(&self) -> &str {
        AgentType::WebSearch.as_str()
    }

    fn tool_description(&self) -> String {
        self.core.config.effective_tool_description()
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["text_generation", "web_search"]
    }

    async fn execute(&self, task: &str, context: Option<&serde_json::Value>) -> MemberAgentResult {
        self.core
            .run(
                task,
                context,
                self.agent_type(),
                Some(vec![self.tool.clone()]),
                &self.capabilities(),
            )
            .await
    }
}

/// Agent with the provider-native URL fetch tool. Only providers that expose
/// a native fetch tool accept this variant; construction fails elsewhere.
#[derive(Debug)]
pub struct WebFetchAgent {
    core: AgentCore,
    tool: ToolDefinition,
}

impl WebFetchAgent {
    pub fn new(
        config: MemberAgentConfig,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, MixSeekError> {
        config.validate()?;
        let model_ref = ModelRef::parse(&config.model)?;
        if !model_ref.provider.supports_web_fetch() {
            return Err(MixSeekError::ToolMisconfiguration {
                agent: config.agent_name.clone(),
                message: format!(
                    "provider of '{}' does not support web-fetch (anthropic/google only)",
                    config.model
                ),
            });
        }
        let settings = config
            .tool_settings
            .as_ref()
            .and_then(|t| t.web_fetch.clone())
            .unwrap_or_default();
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch"},
            },
            "required": ["url"],
        });
        if let Some(obj) = schema.as_object_mut() {
            if let Some(max_uses) = settings.max_uses {
                obj.insert("max_uses".to_string(), serde_json::json!(max_uses));
            }
            if let Some(allowed) = &settings.allowed_domains {
                obj.insert("allowed_domains".to_string(), serde_json::json!(allowed));
            }
            if let Some(blocked) = &settings.blocked_domains {
                obj.insert("blocked_domains".to_string(), serde_json::json!(blocked));
            }
            if settings.enable_citations {
                obj.insert("citations".to_string(), serde_json::json!({"enabled": true}));
            }
            if let Some(tokens) = settings.max_content_tokens {
                obj.insert("max_content_tokens".to_string(), serde_json::json!(tokens));
            }
        }
        let tool = ToolDefinition {
            name: "web_fetch".to_string(),
            description: "Fetch the content of a URL.".to_string(),
            parameters_schema: schema,
        };
        Ok(WebFetchAgent {
            core: AgentCore { config, client },
            tool,
        })
    }
}

#[async_trait]
impl MemberAgent for WebFetchAgent {
    fn agent_name(&self) -> &str {
        &self.core.config.agent_name
    }

    fn agent_type(&self) -> &str {
        AgentType::WebFetch.as_str()
    }

    fn tool_description(&self) -> String {
        self.core.config.effective_tool_description()
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["text_generation", "web_fetch"]
    }

    async fn execute(&self, task: &str, context: Option<&serde_json::Value>) -> MemberAgentResult {
        self.core
            .run(
                task,
                context,
                self.agent_type(),
                Some(vec![self.tool.clone()]),
                &self.capabilities(),
            )
            .await
    }
}

/// Agent with the provider-controlled sandboxed code execution tool.
/// Security constraints (timeout, available modules, no network) are
/// enforced by the provider, not locally.
pub struct CodeExecutionAgent {
    core: AgentCore,
    tool: ToolDefinition,
}

impl CodeExecutionAgent {
    pub fn new(
        config: MemberAgentConfig,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, MixSeekError> {
        config.validate()?;
        let model_ref = ModelRef::parse(&config.model)?;
        if !model_ref.provider.supports_code_execution() {
            return Err(MixSeekError::ToolMisconfiguration {
                agent: config.agent_name.clone(),
                message: format!(
                    "provider of '{}' does not support sandboxed code execution",
                    config.model
                ),
            });
        }
        let tool = ToolDefinition {
            name: "code_execution".to_string(),
            description: "Execute code in the provider's sandboxed environment.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "The code to execute"},
                },
                "required": ["code"],
            }),
        };
        Ok(CodeExecutionAgent {
            core: AgentCore { config, client },
            tool,
        })
    }
}

#[async_trait]
impl MemberAgent for CodeExecutionAgent {
    fn agent_name(&self) -> &str {
        &self.core.config.agent_name
    }

    fn agent_type(&self) -> &str {
        AgentType::CodeExecution.as_str()
    }

    fn tool_description(&self) -> String {
        self.core.config.effective_tool_description()
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["text_generation", "code_execution"]
    }

    async fn execute(&self, task: &str, context: Option<&serde_json::Value>) -> MemberAgentResult {
        self.core
            .run(
                task,
                context,
                self.agent_type(),
                Some(vec![self.tool.clone()]),
                &self.capabilities(),
            )
            .await
    }
}

/// Constructor signature for plugin-provided custom agents.
pub type AgentConstructor =
    Arc<dyn Fn(&MemberAgentConfig) -> Result<Box<dyn MemberAgent>, MixSeekError> + Send + Sync>;

/// Registry of custom-agent constructors.
///
/// Constructors are keyed by module path (preferred) or file path
/// (fallback), each holding the set of class names it provides. Resolution
/// tries `agent_module` first and falls back to `path`; loaded constructors
/// are never added to the built-in agent-type registry, so one custom agent
/// cannot shadow another across teams.
#[derive(Default)]
pub struct PluginRegistry {
    modules: RwLock<HashMap<String, HashMap<String, AgentConstructor>>>,
    paths: RwLock<HashMap<String, HashMap<String, AgentConstructor>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// Register a constructor under a module path and class name.
    pub fn register_module(
        &self,
        module: impl Into<String>,
        class: impl Into<String>,
        constructor: AgentConstructor,
    ) {
        self.modules
            .write()
            .expect("plugin registry poisoned")
            .entry(module.into())
            .or_default()
            .insert(class.into(), constructor);
    }

    /// Register a constructor under a filesystem path and class name.
    pub fn register_path(
        &self,
        path: impl Into<String>,
        class: impl Into<String>,
        constructor: AgentConstructor,
    ) {
        self.paths
            .write()
            .expect("plugin registry poisoned")
            .entry(path.into())
            .or_default()
            .insert(class.into(), constructor);
    }

    fn lookup(
        table: &HashMap<String, HashMap<String, AgentConstructor>>,
        key: &str,
        class: &str,
    ) -> Result<AgentConstructor, String> {
        let classes = table
            .get(key)
            .ok_or_else(|| format!("module not found: '{}'", key))?;
        classes.get(class).cloned().ok_or_else(|| {
            let available: Vec<&str> = classes.keys().map(String::as_str).collect();
            format!(
                "class '{}' not found in '{}'. Available classes: {}",
                class,
                key,
                available.join(", ")
            )
        })
    }

    /// Resolve a plugin descriptor to a constructor. `agent_module` wins;
    /// `path` is the fallback; both failing yields one error identifying the
    /// path-based attempt (the more diagnosable of the two).
    pub fn resolve(&self, descriptor: &PluginDescriptor) -> Result<AgentConstructor, MixSeekError> {
        let mut module_failure = None;
        if let Some(module) = &descriptor.agent_module {
            match Self::lookup(
                &self.modules.read().expect("plugin registry poisoned"),
                module,
                &descriptor.agent_class,
            ) {
                Ok(ctor) => return Ok(ctor),
                Err(reason) => module_failure = Some((module.clone(), reason)),
            }
        }
        if let Some(path) = &descriptor.path {
            match Self::lookup(
                &self.paths.read().expect("plugin registry poisoned"),
                path,
                &descriptor.agent_class,
            ) {
                Ok(ctor) => return Ok(ctor),
                Err(reason) => {
                    return Err(MixSeekError::PluginLoad {
                        reference: path.clone(),
                        message: format!(
                            "failed to load agent class '{}': {}",
                            descriptor.agent_class, reason
                        ),
                    });
                }
            }
        }
        match module_failure {
            Some((module, reason)) => Err(MixSeekError::PluginLoad {
                reference: module,
                message: format!(
                    "failed to load agent class '{}': {}",
                    descriptor.agent_class, reason
                ),
            }),
            None => Err(MixSeekError::PluginLoad {
                reference: "<unspecified>".to_string(),
                message: "plugin descriptor has neither agent_module nor path".to_string(),
            }),
        }
    }
}

/// Builds member agents from configuration.
pub struct MemberAgentFactory {
    clients: Arc<dyn ClientFactory>,
    plugins: Arc<PluginRegistry>,
}

impl Default for MemberAgentFactory {
    fn default() -> Self {
        MemberAgentFactory {
            clients: Arc::new(ProviderClientFactory),
            plugins: Arc::new(PluginRegistry::new()),
        }
    }
}

impl MemberAgentFactory {
    pub fn new(clients: Arc<dyn ClientFactory>, plugins: Arc<PluginRegistry>) -> Self {
        MemberAgentFactory { clients, plugins }
    }

    /// Build the agent a member config describes. Tool misconfiguration and
    /// plugin failures surface here, before the team runs.
    pub fn create(&self, config: &MemberAgentConfig) -> Result<Box<dyn MemberAgent>, MixSeekError> {
        config.validate()?;
        if config.agent_type == AgentType::Custom {
            let descriptor = config.plugin.as_ref().ok_or_else(|| {
                MixSeekError::config(
                    format!("{}.plugin", config.agent_name),
                    "custom agent requires a plugin descriptor",
                )
            })?;
            let constructor = self.plugins.resolve(descriptor)?;
            return constructor(config);
        }

        let sampling = ClientSampling {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            seed: config.seed,
            stop_sequences: config.stop_sequences.clone(),
        };
        let client = self.clients.create_with_sampling(&config.model, sampling)?;
        match config.agent_type {
            AgentType::Plain => Ok(Box::new(PlainAgent::new(config.clone(), client)?)),
            AgentType::WebSearch => Ok(Box::new(WebSearchAgent::new(config.clone(), client)?)),
            AgentType::WebFetch => Ok(Box::new(WebFetchAgent::new(config.clone(), client)?)),
            AgentType::CodeExecution => {
                Ok(Box::new(CodeExecutionAgent::new(config.clone(), client)?))
            }
            AgentType::Custom => unreachable!("custom handled above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixseek::client_wrapper::Role;
    use std::error::Error;
    use tokio::sync::Mutex;

    /// Scripted client: replays canned outcomes in order.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<String, String>>>,
        usage: Mutex<Option<crate::mixseek::client_wrapper::TokenUsage>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            ScriptedClient {
                replies: Mutex::new(replies),
                usage: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ClientWrapper for ScriptedClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            let next = self.replies.lock().await.remove(0);
            match next {
                Ok(content) => {
                    *self.usage.lock().await = Some(crate::mixseek::client_wrapper::TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                        total_tokens: 15,
                    });
                    Ok(Message {
                        role: Role::Assistant,
                        content: Arc::from(content.as_str()),
                        tool_calls: vec![],
                    })
                }
                Err(msg) => {
                    *self.usage.lock().await = None;
                    Err(msg.into())
                }
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<crate::mixseek::client_wrapper::TokenUsage>>> {
            Some(&self.usage)
        }
    }

    fn plain_config(name: &str) -> MemberAgentConfig {
        toml::from_str(&format!(
            r#"
            agent_name = "{name}"
            agent_type = "plain"
            model = "openai:gpt-4.1-mini"
            max_retries = 1
            "#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn empty_task_fails_fast_without_llm_call() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("never used".into())]));
        let agent = PlainAgent::new(plain_config("a"), client).unwrap();
        let result = agent.execute("   ", None).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.error_code.as_deref(), Some(ERROR_CODE_EMPTY_TASK));
        assert_eq!(result.usage_info.unwrap().requests, 0);
    }

    #[tokio::test]
    async fn successful_execution_carries_usage_and_messages() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("the answer".into())]));
        let agent = PlainAgent::new(plain_config("a"), client).unwrap();
        let result = agent.execute("what is 2+2?", None).await;
        assert!(result.is_success());
        assert_eq!(result.content, "the answer");
        let usage = result.usage_info.unwrap();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.input_tokens, 10);
        assert!(!result.all_messages.is_empty());
        assert_eq!(
            result.metadata.get("capabilities").unwrap(),
            &serde_json::json!(["text_generation"])
        );
    }

    #[tokio::test]
    async fn token_limit_is_terminal_with_zero_retry_count() {
        let client = Arc::new(ScriptedClient::new(vec![Err(
            "This model's maximum context length is 8192 tokens".into(),
        )]));
        let agent = PlainAgent::new(plain_config("a"), client).unwrap();
        let result = agent.execute("long task", None).await;
        assert!(result.is_error());
        assert_eq!(result.error_code.as_deref(), Some(ERROR_CODE_TOKEN_LIMIT));
        assert_eq!(result.retry_count, 0);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let client = Arc::new(ScriptedClient::new(vec![Err("invalid api key".into())]));
        let agent = PlainAgent::new(plain_config("a"), client).unwrap();
        let result = agent.execute("task", None).await;
        assert!(result.is_error());
        assert_eq!(result.error_code.as_deref(), Some(ERROR_CODE_API_ERROR));
        assert_eq!(result.retry_count, 0);
        assert_eq!(result.usage_info.unwrap().requests, 1);
    }

    #[tokio::test]
    async fn transient_errors_retry_then_succeed() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err("httpx.ReadError: peer closed".into()),
            Ok("recovered".into()),
        ]));
        let agent = PlainAgent::new(plain_config("a"), client).unwrap();
        let result = agent.execute("task", None).await;
        assert!(result.is_success());
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.usage_info.unwrap().requests, 2);
    }

    #[test]
    fn web_fetch_rejects_unsupported_provider() {
        let config: MemberAgentConfig = toml::from_str(
            r#"
            agent_name = "fetcher"
            agent_type = "web_fetch"
            model = "openai:gpt-4.1-mini"
            "#,
        )
        .unwrap();
        let client = Arc::new(ScriptedClient::new(vec![]));
        let err = WebFetchAgent::new(config, client).unwrap_err();
        assert!(err.to_string().contains("web-fetch"));
    }

    #[test]
    fn code_execution_rejects_grok() {
        let config: MemberAgentConfig = toml::from_str(
            r#"
            agent_name = "coder"
            agent_type = "code_execution"
            model = "grok:grok-4-fast"
            "#,
        )
        .unwrap();
        let client = Arc::new(ScriptedClient::new(vec![]));
        assert!(CodeExecutionAgent::new(config, client).is_err());
    }

    struct NoopAgent {
        name: String,
    }

    #[async_trait]
    impl MemberAgent for NoopAgent {
        fn agent_name(&self) -> &str {
            &self.name
        }
        fn agent_type(&self) -> &str {
            "custom"
        }
        fn tool_description(&self) -> String {
            "noop".into()
        }
        async fn execute(
            &self,
            _task: &str,
            _context: Option<&serde_json::Value>,
        ) -> MemberAgentResult {
            MemberAgentResult::success("noop", self.name.clone(), "custom")
        }
    }

    fn noop_constructor() -> AgentConstructor {
        Arc::new(|config: &MemberAgentConfig| {
            Ok(Box::new(NoopAgent {
                name: config.agent_name.clone(),
            }) as Box<dyn MemberAgent>)
        })
    }

    #[test]
    fn plugin_module_resolution_wins_over_path() {
        let registry = PluginRegistry::new();
        registry.register_module("acme.agents", "SpecialAgent", noop_constructor());
        registry.register_path("/tmp/special.py", "SpecialAgent", noop_constructor());

        let descriptor = PluginDescriptor {
            agent_module: Some("acme.agents".into()),
            path: Some("/tmp/special.py".into()),
            agent_class: "SpecialAgent".into(),
        };
        registry.resolve(&descriptor).unwrap();
    }

    #[test]
    fn plugin_falls_back_to_path_when_module_missing() {
        let registry = PluginRegistry::new();
        registry.register_path("/tmp/special.py", "SpecialAgent", noop_constructor());

        let descriptor = PluginDescriptor {
            agent_module: Some("missing.module".into()),
            path: Some("/tmp/special.py".into()),
            agent_class: "SpecialAgent".into(),
        };
        registry.resolve(&descriptor).unwrap();
    }

    #[test]
    fn plugin_error_names_the_path_attempt() {
        let registry = PluginRegistry::new();
        registry.register_path("/tmp/special.py", "OtherAgent", noop_constructor());

        let descriptor = PluginDescriptor {
            agent_module: Some("missing.module".into()),
            path: Some("/tmp/special.py".into()),
            agent_class: "SpecialAgent".into(),
        };
        let err = match registry.resolve(&descriptor) {
            Err(e) => e,
            Ok(_) => panic!("expected resolve to fail"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/special.py"));
        assert!(msg.contains("SpecialAgent"));
        assert!(msg.contains("OtherAgent"));
    }
}
