//! Error taxonomy for the MixSeek runtime.
//!
//! Every failure surfaced by the crate is a [`MixSeekError`] variant carrying
//! the structured context downstream callers need: the offending field name
//! for configuration errors, the metric name for evaluator errors, the agent
//! name for tool misconfiguration, and so on.
//!
//! Only two classes of error are ever recovered from locally:
//! transient provider faults (retried with backoff by the orchestrator) and
//! best-effort progress-file writes (swallowed with a debug log). Everything
//! else propagates.

use thiserror::Error;

/// Unified error type for the MixSeek core.
#[derive(Debug, Error)]
pub enum MixSeekError {
    /// TOML syntax error, schema violation, missing required field, duplicate
    /// team id, unresolvable workspace. No execution starts after one of these.
    #[error("configuration error in '{field}': {message}")]
    Config { field: String, message: String },

    /// Custom agent or custom metric could not be resolved. `reference`
    /// identifies the attempted module path or file path.
    #[error("plugin load error ({reference}): {message}")]
    PluginLoad { reference: String, message: String },

    /// Empty task or empty prompt handed to a consuming component.
    #[error("task validation error: {0}")]
    TaskValidation(String),

    /// An LLM provider call failed. `transient` marks HTTP read/connect/timeout
    /// faults that are safe to retry; terminal faults (auth, token limit,
    /// malformed output) are not.
    #[error("provider error for model '{model}': {message}")]
    Provider {
        model: String,
        message: String,
        transient: bool,
    },

    /// Invalid tool configuration detected at agent construction time,
    /// e.g. web_fetch on a provider without a native fetch tool.
    #[error("tool misconfiguration for agent '{agent}': {message}")]
    ToolMisconfiguration { agent: String, message: String },

    /// A metric failed during evaluation. Aborts the whole evaluation; the
    /// round controller turns this into `exit_reason = evaluator_error`.
    #[error("evaluator error in metric '{metric}': {message}")]
    Evaluator { metric: String, message: String },

    /// The judgment LLM failed. Non-fatal: the round controller treats this
    /// as "continue" up to max_rounds.
    #[error("judgment error: {0}")]
    Judgment(String),

    /// Per-team wall-clock deadline exceeded.
    #[error("team '{team_id}' timed out after {seconds}s")]
    Timeout { team_id: String, seconds: u64 },

    /// A contract write or query against the aggregation store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Template syntax error or undefined placeholder in strict rendering.
    /// `field` names the template setting (e.g. `team_user_prompt`).
    #[error("template error in '{field}': {message}")]
    Template { field: String, message: String },
}

impl MixSeekError {
    /// Whether the orchestrator's per-team retry loop may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, MixSeekError::Provider { transient: true, .. })
    }

    /// Process exit code the CLI surface maps this error to:
    /// 1 for configuration/validation problems, 2 for "all teams failed".
    pub fn exit_code(&self) -> i32 {
        match self {
            MixSeekError::Config { .. }
            | MixSeekError::PluginLoad { .. }
            | MixSeekError::TaskValidation(_)
            | MixSeekError::ToolMisconfiguration { .. }
            | MixSeekError::Template { .. } => 1,
            _ => 2,
        }
    }

    /// Shorthand for a [`MixSeekError::Config`] with an owned field name.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        MixSeekError::Config {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for MixSeekError {
    fn from(err: rusqlite::Error) -> Self {
        MixSeekError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_flag_only_on_transient_provider_errors() {
        let transient = MixSeekError::Provider {
            model: "openai:gpt-4o".into(),
            message: "read timeout".into(),
            transient: true,
        };
        let terminal = MixSeekError::Provider {
            model: "openai:gpt-4o".into(),
            message: "invalid api key".into(),
            transient: false,
        };
        assert!(transient.is_transient());
        assert!(!terminal.is_transient());
        assert!(!MixSeekError::Judgment("x".into()).is_transient());
    }

    #[test]
    fn exit_codes_follow_cli_contract() {
        assert_eq!(MixSeekError::config("team_id", "duplicate").exit_code(), 1);
        assert_eq!(
            MixSeekError::Timeout {
                team_id: "alpha".into(),
                seconds: 300
            }
            .exit_code(),
            2
        );
    }
}
