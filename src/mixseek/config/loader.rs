//! Layered configuration loading with source tracing.
//!
//! Effective values are resolved CLI > environment > dotenv > TOML >
//! defaults. Every resolved field records a [`SourceTrace`] naming the layer
//! it came from. There are no implicit fallbacks: an unresolvable workspace
//! is an explicit error naming the CLI flag and the environment variables
//! that could have provided it.
//!
//! Environment overrides use the `MIXSEEK_` prefix with `__` as the nesting
//! delimiter (`MIXSEEK_LEADER__MODEL` overrides `leader.model`). Provider
//! credentials are deliberately *not* handled here; they use provider-native
//! variable names resolved by the client factory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::mixseek::config::schema::{
    EvaluatorSettings, JudgmentSettings, OrchestratorSettings, PromptBuilderSettings, TeamConfig,
    TeamConfigFile, TeamRef,
};
use crate::mixseek::config::trace::{mask_field_value, ConfigOrigin, SourceTrace};
use crate::mixseek::error::MixSeekError;

/// Environment variable prefix for MixSeek-specific settings.
pub const ENV_PREFIX: &str = "MIXSEEK_";

/// Values supplied on the command line, overriding every other layer.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub timeout_per_team_seconds: Option<u64>,
    pub max_concurrent_teams: Option<usize>,
    pub max_retries_per_team: Option<u32>,
    pub max_rounds: Option<u32>,
    pub min_rounds: Option<u32>,
}

/// Resolve the workspace directory. Priority: CLI flag, then
/// `MIXSEEK_WORKSPACE`, then `MIXSEEK_WORKSPACE_PATH`. There is no silent
/// current-working-directory fallback: failing all three is an error that
/// names every expected source.
pub fn resolve_workspace(cli_arg: Option<&Path>) -> Result<PathBuf, MixSeekError> {
    let candidate = if let Some(path) = cli_arg {
        path.to_path_buf()
    } else if let Ok(env_path) = std::env::var("MIXSEEK_WORKSPACE") {
        PathBuf::from(env_path)
    } else if let Ok(env_path) = std::env::var("MIXSEEK_WORKSPACE_PATH") {
        PathBuf::from(env_path)
    } else {
        return Err(MixSeekError::config(
            "workspace",
            "workspace path not specified: pass --workspace or set MIXSEEK_WORKSPACE \
             (or MIXSEEK_WORKSPACE_PATH)",
        ));
    };
    if !candidate.is_dir() {
        return Err(MixSeekError::config(
            "workspace",
            format!("workspace directory does not exist: {}", candidate.display()),
        ));
    }
    Ok(candidate)
}

/// Default orchestrator config path: `MIXSEEK_CONFIG_FILE` when set,
/// otherwise `config.toml` in the workspace.
pub fn default_config_path() -> PathBuf {
    std::env::var("MIXSEEK_CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"))
}

/// Raw orchestrator table: every field optional so the loader can tell
/// "absent from TOML" apart from "present" when recording traces.
#[derive(Debug, Default, serde::Deserialize)]
struct RawOrchestratorSettings {
    timeout_per_team_seconds: Option<u64>,
    max_concurrent_teams: Option<usize>,
    max_retries_per_team: Option<u32>,
    max_rounds: Option<u32>,
    min_rounds: Option<u32>,
    submission_timeout_seconds: Option<u64>,
    judgment_timeout_seconds: Option<u64>,
    evaluator_config: Option<PathBuf>,
    judgment_config: Option<PathBuf>,
    prompt_builder_config: Option<PathBuf>,
    #[serde(default)]
    teams: Vec<TeamRef>,
}

#[derive(Debug, serde::Deserialize)]
struct RawOrchestratorFile {
    orchestrator: RawOrchestratorSettings,
}

/// Loads every configuration surface the core consumes, layering sources and
/// recording provenance for each resolved field.
pub struct ConfigurationManager {
    workspace: PathBuf,
    /// Env var names that were populated from the workspace `.env` file
    /// (as opposed to the process environment proper).
    dotenv_keys: HashSet<String>,
    traces: BTreeMap<String, SourceTrace>,
}

impl ConfigurationManager {
    /// Create a manager rooted at a workspace directory. Loads the
    /// workspace's `.env` file into the process environment if present
    /// (without overriding variables that are already set).
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let mut dotenv_keys = HashSet::new();
        let dotenv_path = workspace.join(".env");
        if dotenv_path.is_file() {
            if let Ok(iter) = dotenvy::from_path_iter(&dotenv_path) {
                for item in iter.flatten() {
                    if std::env::var(&item.0).is_err() {
                        dotenv_keys.insert(item.0.clone());
                    }
                }
            }
            let _ = dotenvy::from_path(&dotenv_path);
        }
        ConfigurationManager {
            workspace,
            dotenv_keys,
            traces: BTreeMap::new(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The provenance recorded for a resolved field, if any.
    pub fn trace(&self, field: &str) -> Option<&SourceTrace> {
        self.traces.get(field)
    }

    /// All recorded traces, for propagation into component construction.
    pub fn traces(&self) -> &BTreeMap<String, SourceTrace> {
        &self.traces
    }

    /// Render every traced field for debug logging, masking sensitive values.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        for (field, trace) in &self.traces {
            out.push_str(&format!(
                "{} = {} (from {}: {})\n",
                field,
                mask_field_value(field, &trace.raw_value),
                trace.origin.as_str(),
                trace.source_name
            ));
        }
        out
    }

    /// Resolve a workspace-relative path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// The `MIXSEEK_` environment variable name for a dotted field path.
    fn env_var_name(field: &str) -> String {
        format!(
            "{}{}",
            ENV_PREFIX,
            field.to_ascii_uppercase().replace('.', "__")
        )
    }

    /// Look a field up in the environment, distinguishing process env from
    /// values sourced out of the workspace `.env` file.
    fn env_lookup(&self, field: &str) -> Option<(String, String, ConfigOrigin)> {
        let var = Self::env_var_name(field);
        let value = std::env::var(&var).ok()?;
        let origin = if self.dotenv_keys.contains(&var) {
            ConfigOrigin::DotEnv
        } else {
            ConfigOrigin::Env
        };
        Some((value, var, origin))
    }

    /// Resolve one field through the CLI > env > dotenv > TOML > default
    /// chain, recording the winning layer.
    fn layered<T>(
        &mut self,
        field: &str,
        cli: Option<T>,
        toml_value: Option<T>,
        toml_source: &str,
        default: T,
    ) -> Result<T, MixSeekError>
    where
        T: FromStr + ToString + Clone,
    {
        if let Some(value) = cli {
            self.record(field, ConfigOrigin::Cli, format!("--{}", field), &value);
            return Ok(value);
        }
        if let Some((raw, var, origin)) = self.env_lookup(field) {
            let parsed = raw.parse::<T>().map_err(|_| {
                MixSeekError::config(field, format!("invalid value '{}' in {}", raw, var))
            })?;
            self.traces
                .insert(field.to_string(), SourceTrace::new(origin, var, raw));
            return Ok(parsed);
        }
        if let Some(value) = toml_value {
            self.record(field, ConfigOrigin::Toml, toml_source, &value);
            return Ok(value);
        }
        self.record(field, ConfigOrigin::Default, "default", &default);
        Ok(default)
    }

    fn record<T: ToString>(&mut self, field: &str, origin: ConfigOrigin, source: impl Into<String>, value: &T) {
        self.traces.insert(
            field.to_string(),
            SourceTrace::new(origin, source, value.to_string()),
        );
    }

    fn read_toml(&self, path: &Path) -> Result<toml::Value, MixSeekError> {
        let resolved = self.resolve_path(path);
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            MixSeekError::config(
                path.display().to_string(),
                format!("cannot read config file {}: {}", resolved.display(), e),
            )
        })?;
        toml::from_str(&text).map_err(|e| {
            MixSeekError::config(
                path.display().to_string(),
                format!("not valid TOML: {}", e),
            )
        })
    }

    /// Load orchestrator settings from a TOML file, applying CLI and
    /// environment overrides field by field.
    pub fn load_orchestrator_settings(
        &mut self,
        path: &Path,
        cli: &CliOverrides,
    ) -> Result<OrchestratorSettings, MixSeekError> {
        let resolved = self.resolve_path(path);
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            MixSeekError::config(
                "orchestrator_config",
                format!("cannot read config file {}: {}", resolved.display(), e),
            )
        })?;
        let raw: RawOrchestratorFile = toml::from_str(&text).map_err(|e| {
            MixSeekError::config(
                "orchestrator_config",
                format!("{}: not valid TOML: {}", resolved.display(), e),
            )
        })?;
        let raw = raw.orchestrator;
        let source = resolved.display().to_string();

        let settings = OrchestratorSettings {
            workspace_path: self.workspace.clone(),
            timeout_per_team_seconds: self.layered(
                "timeout_per_team_seconds",
                cli.timeout_per_team_seconds,
                raw.timeout_per_team_seconds,
                &source,
                300,
            )?,
            max_concurrent_teams: self.layered(
                "max_concurrent_teams",
                cli.max_concurrent_teams,
                raw.max_concurrent_teams,
                &source,
                4,
            )?,
            max_retries_per_team: self.layered(
                "max_retries_per_team",
                cli.max_retries_per_team,
                raw.max_retries_per_team,
                &source,
                2,
            )?,
            max_rounds: self.layered("max_rounds", cli.max_rounds, raw.max_rounds, &source, 3)?,
            min_rounds: self.layered("min_rounds", cli.min_rounds, raw.min_rounds, &source, 1)?,
            submission_timeout_seconds: self.layered(
                "submission_timeout_seconds",
                None,
                raw.submission_timeout_seconds,
                &source,
                300,
            )?,
            judgment_timeout_seconds: self.layered(
                "judgment_timeout_seconds",
                None,
                raw.judgment_timeout_seconds,
                &source,
                60,
            )?,
            evaluator_config: raw.evaluator_config,
            judgment_config: raw.judgment_config,
            prompt_builder_config: raw.prompt_builder_config,
            teams: raw.teams,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load one team's configuration, applying `MIXSEEK_LEADER__MODEL`-style
    /// nested environment overrides and validating the roster.
    pub fn load_team_config(&mut self, path: &Path) -> Result<TeamConfig, MixSeekError> {
        let resolved = self.resolve_path(path);
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            MixSeekError::config(
                "team_config",
                format!("cannot read team config {}: {}", resolved.display(), e),
            )
        })?;
        let file: TeamConfigFile = toml::from_str(&text).map_err(|e| {
            MixSeekError::config(
                "team_config",
                format!("{}: not valid TOML: {}", resolved.display(), e),
            )
        })?;
        let mut team = file.team;

        if let Some((value, var, origin)) = self.env_lookup("leader.model") {
            self.traces.insert(
                format!("{}.leader.model", team.team_id),
                SourceTrace::new(origin, var, value.clone()),
            );
            team.leader.model = value;
        } else {
            self.record(
                &format!("{}.leader.model", team.team_id),
                ConfigOrigin::Toml,
                resolved.display().to_string(),
                &team.leader.model,
            );
        }

        team.validate()?;
        Ok(team)
    }

    /// Load evaluator settings, accepting both a top-level `[evaluator]`
    /// table and a flat file. `None` yields the built-in defaults.
    pub fn get_evaluator_settings(
        &mut self,
        path: Option<&Path>,
    ) -> Result<EvaluatorSettings, MixSeekError> {
        let settings = match path {
            None => EvaluatorSettings::default(),
            Some(path) => {
                let value = self.read_toml(path)?;
                let table = value.get("evaluator").cloned().unwrap_or(value);
                table.try_into().map_err(|e| {
                    MixSeekError::config("evaluator_config", format!("{}: {}", path.display(), e))
                })?
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load judgment settings, accepting both a top-level `[judgment]` table
    /// and a flat file. `None` yields the built-in defaults.
    pub fn get_judgment_settings(
        &mut self,
        path: Option<&Path>,
    ) -> Result<JudgmentSettings, MixSeekError> {
        match path {
            None => Ok(JudgmentSettings::default()),
            Some(path) => {
                let value = self.read_toml(path)?;
                let table = value.get("judgment").cloned().unwrap_or(value);
                table.try_into().map_err(|e| {
                    MixSeekError::config("judgment_config", format!("{}: {}", path.display(), e))
                })
            }
        }
    }

    /// Load prompt builder settings, accepting both a top-level
    /// `[prompt_builder]` table and a flat file. `None` yields the default
    /// templates.
    pub fn get_prompt_builder_settings(
        &mut self,
        path: Option<&Path>,
    ) -> Result<PromptBuilderSettings, MixSeekError> {
        match path {
            None => Ok(PromptBuilderSettings::default()),
            Some(path) => {
                let value = self.read_toml(path)?;
                let table = value.get("prompt_builder").cloned().unwrap_or(value);
                table.try_into().map_err(|e| {
                    MixSeekError::config(
                        "prompt_builder_config",
                        format!("{}: {}", path.display(), e),
                    )
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn toml_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "config.toml",
            r#"
            [orchestrator]
            timeout_per_team_seconds = 600
            max_rounds = 5
            "#,
        );
        let mut manager = ConfigurationManager::new(dir.path());
        let settings = manager
            .load_orchestrator_settings(Path::new("config.toml"), &CliOverrides::default())
            .unwrap();
        assert_eq!(settings.timeout_per_team_seconds, 600);
        assert_eq!(settings.max_rounds, 5);
        // Untouched field resolves from the default layer.
        assert_eq!(settings.max_concurrent_teams, 4);
        assert_eq!(
            manager.trace("timeout_per_team_seconds").unwrap().origin,
            ConfigOrigin::Toml
        );
        assert_eq!(
            manager.trace("max_concurrent_teams").unwrap().origin,
            ConfigOrigin::Default
        );
    }

    #[test]
    fn cli_overrides_toml() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "config.toml",
            r#"
            [orchestrator]
            timeout_per_team_seconds = 600
            "#,
        );
        let mut manager = ConfigurationManager::new(dir.path());
        let cli = CliOverrides {
            timeout_per_team_seconds: Some(120),
            ..CliOverrides::default()
        };
        let settings = manager
            .load_orchestrator_settings(Path::new("config.toml"), &cli)
            .unwrap();
        assert_eq!(settings.timeout_per_team_seconds, 120);
        let trace = manager.trace("timeout_per_team_seconds").unwrap();
        assert_eq!(trace.origin, ConfigOrigin::Cli);
        assert_eq!(trace.raw_value, "120");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "config.toml", "[orchestrator\n");
        let mut manager = ConfigurationManager::new(dir.path());
        let err = manager
            .load_orchestrator_settings(Path::new("config.toml"), &CliOverrides::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("TOML"));
    }

    #[test]
    fn missing_workspace_is_an_explicit_error() {
        // Neither a CLI flag nor the env vars: the error must name the
        // expected sources.
        std::env::remove_var("MIXSEEK_WORKSPACE");
        std::env::remove_var("MIXSEEK_WORKSPACE_PATH");
        let err = resolve_workspace(None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MIXSEEK_WORKSPACE"));
        assert!(msg.contains("--workspace"));
    }

    #[test]
    fn team_config_loads_and_validates() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "teams/alpha.toml",
            r#"
            [team]
            team_id = "alpha"
            team_name = "Team Alpha"

            [team.leader]
            model = "openai:gpt-4.1"
            system_instruction = "You lead the team."

            [[team.members]]
            agent_name = "researcher"
            agent_type = "plain"
            model = "openai:gpt-4.1-mini"
            "#,
        );
        let mut manager = ConfigurationManager::new(dir.path());
        let team = manager
            .load_team_config(Path::new("teams/alpha.toml"))
            .unwrap();
        assert_eq!(team.team_id, "alpha");
        assert_eq!(team.members.len(), 1);
        assert_eq!(
            manager.trace("alpha.leader.model").unwrap().origin,
            ConfigOrigin::Toml
        );
    }

    #[test]
    fn evaluator_settings_accept_nested_and_flat_layouts() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "configs/evaluator.toml",
            r#"
            [evaluator]
            default_model = "openai:gpt-4.1-mini"

            [[evaluator.metrics]]
            name = "Coverage"
            weight = 0.6

            [[evaluator.metrics]]
            name = "Relevance"
            weight = 0.4
            "#,
        );
        let mut manager = ConfigurationManager::new(dir.path());
        let nested = manager
            .get_evaluator_settings(Some(Path::new("configs/evaluator.toml")))
            .unwrap();
        assert_eq!(nested.metrics.len(), 2);

        write(
            &dir,
            "configs/flat.toml",
            r#"
            default_model = "openai:gpt-4.1-mini"

            [[metrics]]
            name = "Coverage"
            "#,
        );
        let flat = manager
            .get_evaluator_settings(Some(Path::new("configs/flat.toml")))
            .unwrap();
        assert_eq!(flat.metrics.len(), 1);
    }

    #[test]
    fn defaults_when_paths_absent() {
        let dir = TempDir::new().unwrap();
        let mut manager = ConfigurationManager::new(dir.path());
        let evaluator = manager.get_evaluator_settings(None).unwrap();
        assert_eq!(evaluator.metrics.len(), 4);
        let prompts = manager.get_prompt_builder_settings(None).unwrap();
        assert!(prompts.team_user_prompt.contains("{{ user_prompt }}"));
        let judgment = manager.get_judgment_settings(None).unwrap();
        assert_eq!(judgment.max_retries, 3);
    }
}
