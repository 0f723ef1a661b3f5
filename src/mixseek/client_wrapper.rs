//! Shared primitives for provider-agnostic LLM clients.
//!
//! Components interact with upstream providers exclusively through the
//! [`ClientWrapper`] trait and the lightweight data types defined here. The
//! trait abstracts over concrete vendor implementations while the supporting
//! structs describe chat messages, native tool calls, and token accounting.
//!
//! Every leader round-trip, member-agent call, evaluator judge call, and
//! judgment call in the runtime flows through one `send_message` invocation,
//! which keeps the concurrency model simple: one in-flight LLM call per
//! cooperative task at a time.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A single tool call returned by the LLM in a native function-calling
/// response.
///
/// Providers assign an opaque [`id`](NativeToolCall::id) to each call so that
/// the tool result can be correlated back in a follow-up `Role::Tool` message.
#[derive(Debug, Clone)]
pub struct NativeToolCall {
    /// Provider-assigned call ID, e.g. `"call_abc123"`.
    pub id: String,
    /// Tool name matching one of the [`ToolDefinition`]s sent in the request.
    pub name: String,
    /// Parsed JSON arguments supplied by the LLM for this call.
    pub arguments: serde_json::Value,
}

/// Provider-agnostic tool schema passed to the LLM along with a chat request.
///
/// The leader agent derives one of these per member agent
/// (`delegate_to_<agent_name>`), and tool-capable member agents use them for
/// their provider-native tools (web search, web fetch, code execution).
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Tool name as it will appear in the API `tools` array.
    pub name: String,
    /// Human-readable description surfaced to the LLM to aid tool selection.
    pub description: String,
    /// JSON Schema object describing the accepted parameters.
    pub parameters_schema: serde_json::Value,
}

/// Represents the possible roles for a message.
#[derive(Debug, Clone)]
pub enum Role {
    /// A system authored message that primes or constrains assistant behaviour.
    System,
    /// A user authored message.
    User,
    /// An assistant authored message.
    Assistant,
    /// A tool-result message correlating with a prior assistant
    /// [`NativeToolCall`]. Serialises as
    /// `{"role": "tool", "tool_call_id": "<call_id>", "content": "..."}`.
    Tool { call_id: String },
}

/// How many tokens were spent on prompt vs. completion?
#[derive(Clone, Debug, Default)]
pub struct TokenUsage {
    /// Number of prompt/input tokens billed by the provider.
    pub input_tokens: usize,
    /// Number of generated/output tokens billed by the provider.
    pub output_tokens: usize,
    /// Convenience total equal to `input_tokens + output_tokens`.
    pub total_tokens: usize,
}

/// Represents a generic message exchanged with an LLM.
///
/// The `tool_calls` field is populated by [`ClientWrapper::send_message`] when
/// the provider returns native function-calling results. It is empty for all
/// other message kinds.
#[derive(Clone)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The message body. Stored as `Arc<str>` so that histories can be cheaply
    /// cloned into submission records.
    pub content: Arc<str>,
    /// Native tool calls requested by the assistant. Non-empty only on
    /// assistant messages returned when the provider selected tools.
    pub tool_calls: Vec<NativeToolCall>,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::System,
            content: Arc::from(content.as_ref()),
            tool_calls: Vec::new(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::User,
            content: Arc::from(content.as_ref()),
            tool_calls: Vec::new(),
        }
    }

    /// Build an assistant message without tool calls.
    pub fn assistant(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::Assistant,
            content: Arc::from(content.as_ref()),
            tool_calls: Vec::new(),
        }
    }

    /// Build a tool-result message answering the given call id.
    pub fn tool_result(call_id: impl Into<String>, content: impl AsRef<str>) -> Self {
        Message {
            role: Role::Tool {
                call_id: call_id.into(),
            },
            content: Arc::from(content.as_ref()),
            tool_calls: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("role", &self.role)
            .field("content", &self.content)
            .field("tool_calls", &self.tool_calls.len())
            .finish()
    }
}

/// Trait-driven abstraction for a concrete cloud provider.
///
/// A [`ClientWrapper`] instance is responsible for translating runtime
/// requests into the provider-specific wire format and for returning provider
/// responses in a uniform shape. The abstraction deliberately excludes any
/// conversation bookkeeping: leader and member agents manage their own
/// message histories.
///
/// All implementations must be thread-safe (`Send + Sync`) so they can be
/// shared between async tasks. Where a provider exposes token accounting,
/// wrappers should capture it and make it visible via
/// [`ClientWrapper::get_last_usage`].
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send a full request/response style chat completion.
    ///
    /// The `messages` slice must include any system priming messages the
    /// caller wishes to send. The `tools` parameter carries native
    /// [`ToolDefinition`]s forwarded to the provider's function-calling API;
    /// when `None` or empty, implementations fall through to the standard
    /// chat completions path.
    ///
    /// On success the returned [`Message`] may contain non-empty
    /// [`Message::tool_calls`] when the provider selected one or more tools.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Return the identifier used to select the upstream model
    /// (e.g. `"gpt-4.1"` or `"claude-sonnet-4-0"`).
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the most recent
    /// [`ClientWrapper::send_message`] call.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        if let Some(slot) = self.usage_slot() {
            slot.lock().await.clone()
        } else {
            None
        }
    }

    /// Expose a shared mutable slot where the implementation can persist
    /// token usage. Wrappers that do not track billing return `None`.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
