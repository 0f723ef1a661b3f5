//! Leader agent: one round's reasoning for a team.
//!
//! The leader receives the fully-built round prompt and the team's member
//! agents, each exposed to the leader's LLM as a named tool
//! (`delegate_to_<agent_name>`). The LLM may call any subset of its tools,
//! any number of times; every call lands one [`MemberSubmission`] in the
//! shared [`SubmissionsBag`], preserving which leader tool call triggered
//! which member result.
//!
//! Status propagation is load-bearing: a member that returned an error
//! produces a submission with `status = ERROR` and the underlying message.
//! Mapping errors to success content would silently poison the aggregation
//! accounting, so the leader never does it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::mixseek::client_wrapper::{ClientWrapper, Message, Role, ToolDefinition};
use crate::mixseek::clients::common::is_transient_error;
use crate::mixseek::config::schema::LeaderConfig;
use crate::mixseek::error::MixSeekError;
use crate::mixseek::member_agent::{AgentUsage, MemberAgent, MemberAgentResult};

/// Upper bound on leader LLM round-trips within one round. A leader that
/// keeps requesting tools past this is forced to answer without them.
const MAX_TOOL_ROUNDS: usize = 8;

/// Status of one member submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Success,
    Error,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Success => "SUCCESS",
            SubmissionStatus::Error => "ERROR",
        }
    }
}

/// One member's output within one round.
#[derive(Debug, Clone)]
pub struct MemberSubmission {
    pub agent_name: String,
    pub agent_type: String,
    /// Text content; empty on failure.
    pub content: String,
    pub status: SubmissionStatus,
    pub error_message: Option<String>,
    pub usage: AgentUsage,
    /// Full message history of the member call.
    pub all_messages: Vec<Message>,
    pub submitted_at: DateTime<Utc>,
}

impl MemberSubmission {
    /// Build a submission from an agent result, propagating status and error
    /// message verbatim.
    pub fn from_result(result: &MemberAgentResult) -> Self {
        let status = if result.is_error() {
            SubmissionStatus::Error
        } else {
            SubmissionStatus::Success
        };
        MemberSubmission {
            agent_name: result.agent_name.clone(),
            agent_type: result.agent_type.clone(),
            content: result.content.clone(),
            status,
            error_message: result.error_message.clone(),
            usage: result.usage_info.unwrap_or_default(),
            all_messages: result.all_messages.clone(),
            submitted_at: result.timestamp,
        }
    }

    /// JSON rendering for persistence (message histories included).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "agent_name": self.agent_name,
            "agent_type": self.agent_type,
            "content": self.content,
            "status": self.status.as_str(),
            "error_message": self.error_message,
            "usage": self.usage,
            "all_messages": self.all_messages.iter().map(message_to_json).collect::<Vec<_>>(),
            "submitted_at": self.submitted_at.to_rfc3339(),
        })
    }
}

/// JSON rendering of one chat message, used for aggregation persistence.
pub fn message_to_json(message: &Message) -> serde_json::Value {
    let role = match &message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool { .. } => "tool",
    };
    let mut value = serde_json::json!({
        "role": role,
        "content": message.content.as_ref(),
    });
    if let Role::Tool { call_id } = &message.role {
        value["tool_call_id"] = serde_json::json!(call_id);
    }
    if !message.tool_calls.is_empty() {
        value["tool_calls"] = serde_json::json!(message
            .tool_calls
            .iter()
            .map(|tc| serde_json::json!({
                "id": tc.id,
                "name": tc.name,
                "arguments": tc.arguments,
            }))
            .collect::<Vec<_>>());
    }
    value
}

/// All member submissions for one (team, round) pair, plus computed views.
///
/// An empty submissions list is valid: the leader may choose not to delegate
/// at all.
#[derive(Debug, Clone)]
pub struct MemberSubmissionsRecord {
    pub execution_id: String,
    pub team_id: String,
    pub team_name: String,
    pub round_number: u32,
    pub submissions: Vec<MemberSubmission>,
}

impl MemberSubmissionsRecord {
    pub fn new(
        execution_id: impl Into<String>,
        team_id: impl Into<String>,
        team_name: impl Into<String>,
        round_number: u32,
        submissions: Vec<MemberSubmission>,
    ) -> Result<Self, MixSeekError> {
        if round_number == 0 {
            return Err(MixSeekError::config(
                "round_number",
                "round numbers start at 1",
            ));
        }
        Ok(MemberSubmissionsRecord {
            execution_id: execution_id.into(),
            team_id: team_id.into(),
            team_name: team_name.into(),
            round_number,
            submissions,
        })
    }

    pub fn successful_submissions(&self) -> Vec<&MemberSubmission> {
        self.submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Success)
            .collect()
    }

    pub fn failed_submissions(&self) -> Vec<&MemberSubmission> {
        self.submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Error)
            .collect()
    }

    pub fn total_count(&self) -> usize {
        self.submissions.len()
    }

    pub fn success_count(&self) -> usize {
        self.successful_submissions().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed_submissions().len()
    }

    /// Usage summed across *all* submissions, failures included: partial
    /// consumption is still attributed to the round.
    pub fn total_usage(&self) -> AgentUsage {
        let mut total = AgentUsage::default();
        for submission in &self.submissions {
            total.add(&submission.usage);
        }
        total
    }

    /// JSON rendering of the submissions list for persistence.
    pub fn submissions_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.submissions.iter().map(|s| s.to_json()).collect())
    }
}

/// Shared per-run bag collecting member submissions as the leader's tool
/// calls execute.
#[derive(Clone, Default)]
pub struct SubmissionsBag {
    inner: Arc<Mutex<Vec<MemberSubmission>>>,
}

impl SubmissionsBag {
    pub fn new() -> Self {
        SubmissionsBag::default()
    }

    pub async fn push(&self, submission: MemberSubmission) {
        self.inner.lock().await.push(submission);
    }

    /// Take every collected submission, leaving the bag empty for the next
    /// round.
    pub async fn drain(&self) -> Vec<MemberSubmission> {
        std::mem::take(&mut *self.inner.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Output of one leader run.
#[derive(Debug, Clone)]
pub struct LeaderRunOutput {
    /// The leader's final text output, evaluated as the round's submission.
    pub output: String,
    /// Full leader-side message transcript including tool traffic.
    pub all_messages: Vec<Message>,
    /// Leader LLM usage (member usage is accounted on the submissions).
    pub usage: AgentUsage,
}

/// Per-round delegator for one team.
pub struct LeaderAgent {
    config: LeaderConfig,
    client: Arc<dyn ClientWrapper>,
    members: Vec<Arc<dyn MemberAgent>>,
    bag: SubmissionsBag,
}

impl LeaderAgent {
    pub fn new(
        config: LeaderConfig,
        client: Arc<dyn ClientWrapper>,
        members: Vec<Arc<dyn MemberAgent>>,
    ) -> Self {
        LeaderAgent {
            config,
            client,
            members,
            bag: SubmissionsBag::new(),
        }
    }

    /// Handle to the shared submissions bag.
    pub fn submissions_bag(&self) -> SubmissionsBag {
        self.bag.clone()
    }

    /// The tool name a member is exposed under.
    pub fn tool_name_for(member: &dyn MemberAgent) -> String {
        format!("delegate_to_{}", member.agent_name())
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.members
            .iter()
            .map(|member| ToolDefinition {
                name: Self::tool_name_for(member.as_ref()),
                description: member.tool_description(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "task": {
                            "type": "string",
                            "description": "The sub-task to delegate to this member agent",
                        },
                        "context": {
                            "type": "object",
                            "description": "Optional additional context for the member",
                        },
                    },
                    "required": ["task"],
                }),
            })
            .collect()
    }

    fn member_by_tool(&self, tool_name: &str) -> Option<&Arc<dyn MemberAgent>> {
        self.members
            .iter()
            .find(|m| Self::tool_name_for(m.as_ref()) == tool_name)
    }

    async fn track_usage(&self, usage: &mut AgentUsage) {
        if let Some(call_usage) = self.client.get_last_usage().await {
            usage.add(&AgentUsage {
                input_tokens: call_usage.input_tokens as u64,
                output_tokens: call_usage.output_tokens as u64,
                requests: 1,
            });
        } else {
            usage.requests += 1;
        }
    }

    fn provider_error(&self, err: Box<dyn std::error::Error + Send + Sync>) -> MixSeekError {
        MixSeekError::Provider {
            model: self.client.model_name().to_string(),
            message: err.to_string(),
            transient: is_transient_error(err.as_ref()),
        }
    }

    /// Run one round. When this returns, the submissions bag reflects exactly
    /// the member calls that occurred, with correct status and usage even
    /// for failed ones.
    pub async fn run(&self, prompt: &str) -> Result<LeaderRunOutput, MixSeekError> {
        if prompt.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "leader prompt cannot be empty".to_string(),
            ));
        }

        let mut messages = Vec::new();
        if let Some(instruction) = &self.config.system_instruction {
            messages.push(Message::system(instruction));
        }
        messages.push(Message::user(prompt));

        let tools = self.tool_definitions();
        let mut usage = AgentUsage::default();

        for _ in 0..MAX_TOOL_ROUNDS {
            let request_tools = if tools.is_empty() {
                None
            } else {
                Some(tools.clone())
            };
            let reply = self
                .client
                .send_message(&messages, request_tools)
                .await
                .map_err(|e| self.provider_error(e))?;
            self.track_usage(&mut usage).await;

            if reply.tool_calls.is_empty() {
                let output = reply.content.to_string();
                messages.push(reply);
                return Ok(LeaderRunOutput {
                    output,
                    all_messages: messages,
                    usage,
                });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);

            for call in calls {
                match self.member_by_tool(&call.name) {
                    None => {
                        log::warn!("leader requested unknown tool '{}'", call.name);
                        messages.push(Message::tool_result(
                            call.id,
                            format!("Unknown tool: {}", call.name),
                        ));
                    }
                    Some(member) => {
                        let task = call
                            .arguments
                            .get("task")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let context = call.arguments.get("context").cloned();
                        let result = member.execute(&task, context.as_ref()).await;

                        let tool_content = if result.is_error() {
                            format!(
                                "ERROR from {}: {}",
                                result.agent_name,
                                result
                                    .error_message
                                    .as_deref()
                                    .unwrap_or("unknown member error")
                            )
                        } else {
                            result.content.clone()
                        };

                        self.bag.push(MemberSubmission::from_result(&result)).await;
                        messages.push(Message::tool_result(call.id, tool_content));
                    }
                }
            }
        }

        // Tool budget exhausted: force a final answer without tools.
        log::warn!(
            "leader exceeded {} tool rounds; forcing a final answer",
            MAX_TOOL_ROUNDS
        );
        let reply = self
            .client
            .send_message(&messages, None)
            .await
            .map_err(|e| self.provider_error(e))?;
        self.track_usage(&mut usage).await;
        let output = reply.content.to_string();
        messages.push(reply);
        Ok(LeaderRunOutput {
            output,
            all_messages: messages,
            usage,
        })
    }
}
