// src/lib.rs

// Import the top-level `mixseek` module.
pub mod mixseek;

// Re-exporting key items for easier external access.
pub use mixseek::client_wrapper::{
    ClientWrapper, Message, NativeToolCall, Role, TokenUsage, ToolDefinition,
};
pub use mixseek::clients;
pub use mixseek::config;
pub use mixseek::error::MixSeekError;
pub use mixseek::evaluator::{self, EvaluationRequest, EvaluationResult, Evaluator};
pub use mixseek::judgment::{ImprovementJudgment, JudgmentClient};
pub use mixseek::leader::{
    LeaderAgent, MemberSubmission, MemberSubmissionsRecord, SubmissionsBag,
};
pub use mixseek::member_agent::{
    AgentUsage, MemberAgent, MemberAgentFactory, MemberAgentResult, PluginRegistry,
};
pub use mixseek::orchestrator::{
    ExecutionStatus, ExecutionSummary, ExecutionTask, FailedTeamInfo, Orchestrator, TeamRunStatus,
    TeamStatus,
};
pub use mixseek::prompt_builder::{RoundPromptContext, UserPromptBuilder};
pub use mixseek::round_controller::{
    ExitReason, OnRoundComplete, RoundController, RoundState, SharedSettings,
};
pub use mixseek::store::{AggregationRecord, AggregationStore, LeaderBoardEntry, RankingRow, STORE_FILE_NAME};
