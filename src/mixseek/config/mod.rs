// src/mixseek/config/mod.rs

pub mod loader;
pub mod schema;
pub mod trace;

pub use loader::{default_config_path, resolve_workspace, CliOverrides, ConfigurationManager};
pub use schema::{
    AgentType, EvaluatorSettings, JudgmentSettings, LeaderConfig, LlmParams, MemberAgentConfig,
    MetricConfig, OrchestratorSettings, PluginDescriptor, PromptBuilderSettings, TeamConfig,
    ToolSettings, WebFetchToolConfig, WebSearchToolConfig,
};
pub use trace::{ConfigOrigin, SourceTrace};

/// Initialize process logging.
///
/// `MIXSEEK_LOG_LEVEL` takes precedence; otherwise env_logger's standard
/// `RUST_LOG` handling applies. Safe to call more than once.
pub fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    if let Ok(level) = std::env::var("MIXSEEK_LOG_LEVEL") {
        builder.parse_filters(&level.to_lowercase());
    }
    let _ = builder.is_test(cfg!(test)).try_init();
}
