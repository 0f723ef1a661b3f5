//! Orchestrator: top-level coordinator for one execution.
//!
//! Loads team configurations, enforces team-ID uniqueness, runs all round
//! controllers concurrently with per-team wall-clock deadlines and bounded
//! retries on transient network faults, and assembles the final execution
//! summary. Teams are isolated: one team timing out or failing never
//! disturbs the others, and the orchestrator returns only after every
//! controller has completed or cancelled.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::mixseek::clients::factory::{ClientFactory, ProviderClientFactory};
use crate::mixseek::config::loader::ConfigurationManager;
use crate::mixseek::config::schema::OrchestratorSettings;
use crate::mixseek::config::trace::SourceTrace;
use crate::mixseek::error::MixSeekError;
use crate::mixseek::member_agent::PluginRegistry;
use crate::mixseek::round_controller::{OnRoundComplete, RoundController, SharedSettings};
use crate::mixseek::store::{AggregationStore, LeaderBoardEntry, STORE_FILE_NAME};

/// The top-level work unit: one `Orchestrator::execute` call. Immutable
/// once created.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub execution_id: String,
    pub user_prompt: String,
    pub team_configs: Vec<PathBuf>,
    pub timeout_per_team_seconds: u64,
    pub max_rounds: u32,
    pub min_rounds: u32,
    pub submission_timeout_seconds: u64,
    pub judgment_timeout_seconds: u64,
}

impl ExecutionTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: impl Into<String>,
        user_prompt: impl Into<String>,
        team_configs: Vec<PathBuf>,
        timeout_per_team_seconds: u64,
        max_rounds: u32,
        min_rounds: u32,
        submission_timeout_seconds: u64,
        judgment_timeout_seconds: u64,
    ) -> Result<Self, MixSeekError> {
        let user_prompt = user_prompt.into();
        if user_prompt.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "user_prompt cannot be empty".to_string(),
            ));
        }
        if min_rounds == 0 || max_rounds == 0 || min_rounds > max_rounds {
            return Err(MixSeekError::config(
                "min_rounds",
                format!(
                    "round bounds must be positive with min <= max (got min={}, max={})",
                    min_rounds, max_rounds
                ),
            ));
        }
        Ok(ExecutionTask {
            execution_id: execution_id.into(),
            user_prompt,
            team_configs,
            timeout_per_team_seconds,
            max_rounds,
            min_rounds,
            submission_timeout_seconds,
            judgment_timeout_seconds,
        })
    }
}

/// Lifecycle status of one team within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

/// Per-team status record, queryable while the execution runs.
#[derive(Debug, Clone, Serialize)]
pub struct TeamStatus {
    pub team_id: String,
    pub team_name: String,
    pub status: TeamRunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// One failed team in the summary.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTeamInfo {
    pub team_id: String,
    pub team_name: String,
    pub error_message: String,
}

/// Overall outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every team produced a final submission.
    Completed,
    /// Some teams succeeded, some failed.
    PartialFailure,
    /// No team succeeded.
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::PartialFailure => "partial_failure",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// Final result of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub user_prompt: String,
    pub status: ExecutionStatus,
    /// Final leader-board rows of the successful teams.
    pub team_results: Vec<LeaderBoardEntry>,
    pub failed_teams_info: Vec<FailedTeamInfo>,
    pub total_teams: usize,
    pub best_team_id: Option<String>,
    pub best_score: Option<f64>,
    pub total_execution_time_seconds: f64,
}

/// Pick the winning team: highest score, ties broken by lexicographically
/// smallest `team_id`.
fn select_best_team(results: &[LeaderBoardEntry]) -> Option<&LeaderBoardEntry> {
    results.iter().fold(None, |acc, entry| match acc {
        None => Some(entry),
        Some(best) => {
            if entry.score > best.score
                || (entry.score == best.score && entry.team_id < best.team_id)
            {
                Some(entry)
            } else {
                acc
            }
        }
    })
}

/// Coordinates N round controllers for one execution.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    clients: Arc<dyn ClientFactory>,
    plugins: Arc<PluginRegistry>,
    on_round_complete: Option<OnRoundComplete>,
    team_statuses: Arc<Mutex<HashMap<String, TeamStatus>>>,
    /// Source traces collected while loading configuration for the latest
    /// execution. Carried so provenance is never dropped, even though the
    /// state machine ignores it at run time.
    config_traces: Arc<Mutex<BTreeMap<String, SourceTrace>>>,
}

impl Orchestrator {
    /// Create an orchestrator from validated settings.
    pub fn new(settings: OrchestratorSettings) -> Result<Self, MixSeekError> {
        settings.validate()?;
        Ok(Orchestrator {
            settings,
            clients: Arc::new(ProviderClientFactory),
            plugins: Arc::new(PluginRegistry::new()),
            on_round_complete: None,
            team_statuses: Arc::new(Mutex::new(HashMap::new())),
            config_traces: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Swap the client factory (tests inject scripted clients here).
    pub fn with_client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = clients;
        self
    }

    /// Attach a registry of custom-agent constructors.
    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Attach a hook fired after every completed round of every team.
    pub fn with_on_round_complete(mut self, hook: OnRoundComplete) -> Self {
        self.on_round_complete = Some(hook);
        self
    }

    /// Status of one team.
    pub async fn get_team_status(&self, team_id: &str) -> Option<TeamStatus> {
        self.team_statuses.lock().await.get(team_id).cloned()
    }

    /// Status of every team.
    pub async fn get_all_team_statuses(&self) -> Vec<TeamStatus> {
        self.team_statuses.lock().await.values().cloned().collect()
    }

    /// Provenance of every configuration field resolved for the latest
    /// execution.
    pub async fn config_traces(&self) -> BTreeMap<String, SourceTrace> {
        self.config_traces.lock().await.clone()
    }

    /// Run all configured teams against a user prompt and assemble the
    /// execution summary.
    ///
    /// `timeout_seconds` overrides the configured per-team deadline;
    /// `execution_id` pins the run identifier (a fresh UUID otherwise).
    pub async fn execute(
        &self,
        user_prompt: &str,
        timeout_seconds: Option<u64>,
        execution_id: Option<String>,
    ) -> Result<ExecutionSummary, MixSeekError> {
        if user_prompt.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "user_prompt cannot be empty".to_string(),
            ));
        }
        let workspace = self.settings.workspace_path.clone();
        if !workspace.is_dir() {
            return Err(MixSeekError::config(
                "workspace",
                format!("workspace directory does not exist: {}", workspace.display()),
            ));
        }

        let timeout = timeout_seconds.unwrap_or(self.settings.timeout_per_team_seconds);
        let team_config_paths: Vec<PathBuf> =
            self.settings.teams.iter().map(|t| t.config.clone()).collect();
        if team_config_paths.is_empty() {
            return Err(MixSeekError::config(
                "orchestrator.teams",
                "at least one team must be configured",
            ));
        }

        let task = Arc::new(ExecutionTask::new(
            execution_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_prompt,
            team_config_paths.clone(),
            timeout,
            self.settings.max_rounds,
            self.settings.min_rounds,
            self.settings.submission_timeout_seconds,
            self.settings.judgment_timeout_seconds,
        )?);

        log::info!(
            "starting orchestration of {} teams (execution_id: {}, timeout: {}s)",
            team_config_paths.len(),
            task.execution_id,
            timeout
        );

        // Pre-load every team config, rejecting duplicate ids before any
        // round begins.
        let mut manager = ConfigurationManager::new(&workspace);
        let mut teams = Vec::with_capacity(team_config_paths.len());
        let mut seen_ids: Vec<String> = Vec::new();
        for path in &team_config_paths {
            let team = manager.load_team_config(path)?;
            if seen_ids.contains(&team.team_id) {
                return Err(MixSeekError::config(
                    "team_id",
                    format!(
                        "Duplicate team_id detected: '{}'. Each team configuration must have a \
                         unique team_id.",
                        team.team_id
                    ),
                ));
            }
            seen_ids.push(team.team_id.clone());
            teams.push(team);
        }

        // Evaluator/judgment/prompt-builder settings load once and are
        // shared by reference across controllers.
        let shared = Arc::new(SharedSettings {
            evaluator: manager.get_evaluator_settings(self.settings.evaluator_config.as_deref())?,
            judgment: manager.get_judgment_settings(self.settings.judgment_config.as_deref())?,
            prompt_builder: manager
                .get_prompt_builder_settings(self.settings.prompt_builder_config.as_deref())?,
        });

        *self.config_traces.lock().await = manager.traces().clone();
        log::debug!("resolved configuration:\n{}", manager.debug_dump());

        let store = AggregationStore::new(workspace.join(STORE_FILE_NAME)).await?;

        {
            let mut statuses = self.team_statuses.lock().await;
            statuses.clear();
            for team in &teams {
                statuses.insert(
                    team.team_id.clone(),
                    TeamStatus {
                        team_id: team.team_id.clone(),
                        team_name: team.team_name.clone(),
                        status: TeamRunStatus::Pending,
                        started_at: None,
                        completed_at: None,
                        error_message: None,
                    },
                );
            }
        }

        let total_teams = teams.len();
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_teams));
        let mut join_set: JoinSet<(String, Result<LeaderBoardEntry, MixSeekError>)> =
            JoinSet::new();

        for team in teams {
            let team_id = team.team_id.clone();
            let controller = RoundController::new(
                team,
                workspace.clone(),
                task.clone(),
                store.clone(),
                shared.clone(),
                self.clients.clone(),
                self.plugins.clone(),
                self.on_round_complete.clone(),
            )?;
            let statuses = self.team_statuses.clone();
            let semaphore = semaphore.clone();
            let user_prompt = task.user_prompt.clone();
            let max_retries = self.settings.max_retries_per_team;

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("orchestrator semaphore closed");
                let result = run_team(
                    controller,
                    &user_prompt,
                    timeout,
                    max_retries,
                    statuses,
                )
                .await;
                (team_id, result)
            });
        }

        let mut team_results: Vec<LeaderBoardEntry> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_team_id, Ok(entry))) => team_results.push(entry),
                Ok((team_id, Err(e))) => {
                    log::warn!("team {} did not produce a final submission: {}", team_id, e);
                }
                Err(join_error) => {
                    log::error!("team task panicked or was cancelled: {}", join_error);
                }
            }
        }
        let execution_time = start.elapsed().as_secs_f64();

        // Failures are collected once from the status registry so retried
        // teams are not double-counted.
        let mut failed_teams_info = Vec::new();
        for status in self.team_statuses.lock().await.values() {
            if matches!(status.status, TeamRunStatus::Failed | TeamRunStatus::Timeout) {
                failed_teams_info.push(FailedTeamInfo {
                    team_id: status.team_id.clone(),
                    team_name: status.team_name.clone(),
                    error_message: status
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                });
            }
        }
        failed_teams_info.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        team_results.sort_by(|a, b| a.team_id.cmp(&b.team_id));

        let best = select_best_team(&team_results);
        let best_team_id = best.map(|e| e.team_id.clone());
        let best_score = best.map(|e| e.score);

        let status = if failed_teams_info.is_empty() {
            ExecutionStatus::Completed
        } else if team_results.is_empty() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::PartialFailure
        };

        log::info!(
            "orchestration finished: {} succeeded, {} failed, status {}",
            team_results.len(),
            failed_teams_info.len(),
            status.as_str()
        );
        if let (Some(id), Some(score)) = (&best_team_id, best_score) {
            log::info!("best result: {} with score {:.2}", id, score);
        }

        let summary = ExecutionSummary {
            execution_id: task.execution_id.clone(),
            user_prompt: task.user_prompt.clone(),
            status,
            team_results,
            failed_teams_info,
            total_teams,
            best_team_id,
            best_score,
            total_execution_time_seconds: execution_time,
        };

        store
            .save_execution_summary(
                &summary.execution_id,
                &summary.user_prompt,
                summary.status.as_str(),
                &summary.team_results,
                summary.total_teams,
                summary.best_team_id.as_deref(),
                summary.best_score,
                summary.total_execution_time_seconds,
            )
            .await?;

        Ok(summary)
    }
}

/// Per-team wrapper: wall-clock deadline plus bounded retries on transient
/// network faults (exponential backoff: 1s, 2s, ...). Any other error class
/// is final on first occurrence.
async fn run_team(
    mut controller: RoundController,
    user_prompt: &str,
    timeout_seconds: u64,
    max_retries: u32,
    statuses: Arc<Mutex<HashMap<String, TeamStatus>>>,
) -> Result<LeaderBoardEntry, MixSeekError> {
    let team_id = controller.team_id().to_string();
    let team_name = controller.team_name().to_string();

    {
        let mut map = statuses.lock().await;
        if let Some(status) = map.get_mut(&team_id) {
            status.status = TeamRunStatus::Running;
            status.started_at = Some(Utc::now());
        }
    }
    log::info!("starting team {} ({})...", team_id, team_name);

    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::time::timeout(
            Duration::from_secs(timeout_seconds),
            controller.run(user_prompt),
        )
        .await;

        match outcome {
            Err(_) => {
                let message = format!("Timeout after {}s", timeout_seconds);
                log::error!("team {} ({}) timed out: {}", team_id, team_name, message);
                {
                    let mut map = statuses.lock().await;
                    if let Some(status) = map.get_mut(&team_id) {
                        status.status = TeamRunStatus::Timeout;
                        status.error_message = Some(message.clone());
                        status.completed_at = Some(Utc::now());
                    }
                }
                controller.write_progress(
                    controller.current_round().max(1),
                    "timeout",
                    Some(&message),
                );
                return Err(MixSeekError::Timeout {
                    team_id,
                    seconds: timeout_seconds,
                });
            }
            Ok(Ok(entry)) => {
                log::info!("team {} ({}) completed successfully", team_id, team_name);
                let mut map = statuses.lock().await;
                if let Some(status) = map.get_mut(&team_id) {
                    status.status = TeamRunStatus::Completed;
                    status.completed_at = Some(Utc::now());
                }
                return Ok(entry);
            }
            Ok(Err(e)) => {
                if e.is_transient() && attempt < max_retries {
                    attempt += 1;
                    log::warn!(
                        "team {} ({}) hit a transient network error; retrying \
                         (attempt {}/{}): {}",
                        team_id,
                        team_name,
                        attempt,
                        max_retries,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(1 << (attempt - 1).min(6))).await;
                    continue;
                }
                let message = e.to_string();
                let final_status = if matches!(e, MixSeekError::Timeout { .. }) {
                    TeamRunStatus::Timeout
                } else {
                    TeamRunStatus::Failed
                };
                log::error!("team {} ({}) failed: {}", team_id, team_name, message);
                {
                    let mut map = statuses.lock().await;
                    if let Some(status) = map.get_mut(&team_id) {
                        status.status = final_status;
                        status.error_message = Some(message.clone());
                        status.completed_at = Some(Utc::now());
                    }
                }
                controller.write_progress(
                    controller.current_round().max(1),
                    "failed",
                    Some(&message),
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(team_id: &str, score: f64) -> LeaderBoardEntry {
        LeaderBoardEntry {
            execution_id: "exec".into(),
            team_id: team_id.into(),
            team_name: team_id.to_uppercase(),
            round_number: 1,
            submission_content: "text".into(),
            submission_format: "md".into(),
            score,
            score_details: HashMap::new(),
            final_submission: true,
            exit_reason: Some("max_rounds_reached".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn best_team_is_argmax_of_score() {
        let results = vec![entry("beta", 70.0), entry("alpha", 90.0), entry("gamma", 80.0)];
        assert_eq!(select_best_team(&results).unwrap().team_id, "alpha");
    }

    #[test]
    fn best_team_ties_break_lexicographically() {
        let results = vec![entry("beta", 90.0), entry("alpha", 90.0)];
        assert_eq!(select_best_team(&results).unwrap().team_id, "alpha");
        assert!(select_best_team(&[]).is_none());
    }

    #[test]
    fn task_rejects_empty_prompt_and_bad_bounds() {
        assert!(ExecutionTask::new("e", "  ", vec![], 300, 3, 1, 300, 60).is_err());
        assert!(ExecutionTask::new("e", "task", vec![], 300, 1, 3, 300, 60).is_err());
        assert!(ExecutionTask::new("e", "task", vec![], 300, 0, 0, 300, 60).is_err());
        assert!(ExecutionTask::new("e", "task", vec![], 300, 3, 1, 300, 60).is_ok());
    }
}
