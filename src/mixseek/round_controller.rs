//! Round controller: drives one team through its rounds.
//!
//! Each round chains prompt build → leader-delegated member execution →
//! evaluation → improvement judgment, persisting every step to the
//! aggregation store. Rounds are strictly sequential within a team; the
//! orchestrator runs many controllers concurrently.
//!
//! Exit paths: `max_rounds_reached`, `judgment_stop`, `evaluator_error`
//! (terminal, promotes the best prior round when one exists), and `timeout`
//! (driven externally by the orchestrator's deadline). Whatever the path,
//! exactly one leader-board row per team ends up flagged as the final
//! submission: the highest-scoring round, latest on ties.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::mixseek::clients::common::ClientSampling;
use crate::mixseek::clients::factory::ClientFactory;
use crate::mixseek::config::schema::{
    EvaluatorSettings, JudgmentSettings, PromptBuilderSettings, TeamConfig,
};
use crate::mixseek::error::MixSeekError;
use crate::mixseek::evaluator::{EvaluationRequest, Evaluator};
use crate::mixseek::judgment::JudgmentClient;
use crate::mixseek::leader::{LeaderAgent, MemberSubmission, MemberSubmissionsRecord};
use crate::mixseek::member_agent::{MemberAgent, MemberAgentFactory, PluginRegistry};
use crate::mixseek::orchestrator::ExecutionTask;
use crate::mixseek::prompt_builder::{RoundPromptContext, UserPromptBuilder};
use crate::mixseek::store::{AggregationStore, LeaderBoardEntry};

/// Observable state of one completed round. Immutable once appended to the
/// history.
#[derive(Debug, Clone)]
pub struct RoundState {
    pub round_number: u32,
    /// The leader's final text for the round.
    pub submission_content: String,
    /// 0..=100, weighted.
    pub evaluation_score: f64,
    pub score_details: HashMap<String, f64>,
    pub round_started_at: DateTime<Utc>,
    pub round_ended_at: DateTime<Utc>,
}

/// Why a team stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    MaxRoundsReached,
    JudgmentStop,
    EvaluatorError,
    Timeout,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::MaxRoundsReached => "max_rounds_reached",
            ExitReason::JudgmentStop => "judgment_stop",
            ExitReason::EvaluatorError => "evaluator_error",
            ExitReason::Timeout => "timeout",
        }
    }
}

/// Hook fired after each completed round with the round state and the
/// member submissions it produced. A hook error is logged and ignored; it
/// never interrupts the loop.
pub type OnRoundComplete = Arc<
    dyn Fn(&RoundState, &[MemberSubmission]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Evaluator/judgment/prompt-builder settings, loaded once per execution
/// and shared by reference across all round controllers.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    pub evaluator: EvaluatorSettings,
    pub judgment: JudgmentSettings,
    pub prompt_builder: PromptBuilderSettings,
}

/// Per-team state machine driving the round loop.
pub struct RoundController {
    team: TeamConfig,
    workspace: PathBuf,
    task: Arc<ExecutionTask>,
    store: AggregationStore,
    evaluator: Evaluator,
    judgment: JudgmentClient,
    prompt_builder: UserPromptBuilder,
    leader: LeaderAgent,
    round_history: Vec<RoundState>,
    on_round_complete: Option<OnRoundComplete>,
}

impl RoundController {
    /// Build a controller for one team. Agent construction happens here, so
    /// tool misconfiguration and plugin errors surface before any round
    /// runs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        team: TeamConfig,
        workspace: PathBuf,
        task: Arc<ExecutionTask>,
        store: AggregationStore,
        settings: Arc<SharedSettings>,
        clients: Arc<dyn ClientFactory>,
        plugins: Arc<PluginRegistry>,
        on_round_complete: Option<OnRoundComplete>,
    ) -> Result<Self, MixSeekError> {
        team.validate()?;

        let agent_factory = MemberAgentFactory::new(clients.clone(), plugins);
        let mut members: Vec<Arc<dyn MemberAgent>> = Vec::with_capacity(team.members.len());
        for member_config in &team.members {
            members.push(Arc::from(agent_factory.create(member_config)?));
        }

        let leader_sampling = ClientSampling {
            temperature: team.leader.temperature,
            max_tokens: team.leader.max_tokens,
            top_p: team.leader.top_p,
            seed: team.leader.seed,
            stop_sequences: team.leader.stop_sequences.clone(),
        };
        let leader_client = clients.create_with_sampling(&team.leader.model, leader_sampling)?;
        let leader = LeaderAgent::new(team.leader.clone(), leader_client, members);

        let evaluator = Evaluator::new(
            settings.evaluator.clone(),
            settings.prompt_builder.clone(),
        )?
        .with_client_factory(clients.clone());
        let judgment = JudgmentClient::new(
            settings.judgment.clone(),
            settings.prompt_builder.clone(),
            Some(store.clone()),
        )
        .with_client_factory(clients);
        let prompt_builder =
            UserPromptBuilder::new(settings.prompt_builder.clone(), Some(store.clone()));

        Ok(RoundController {
            team,
            workspace,
            task,
            store,
            evaluator,
            judgment,
            prompt_builder,
            leader,
            round_history: Vec::new(),
            on_round_complete,
        })
    }

    pub fn team_id(&self) -> &str {
        &self.team.team_id
    }

    pub fn team_name(&self) -> &str {
        &self.team.team_name
    }

    /// Rounds completed so far.
    pub fn current_round(&self) -> u32 {
        self.round_history.len() as u32
    }

    pub fn round_history(&self) -> &[RoundState] {
        &self.round_history
    }

    /// Best-effort progress file under `<workspace>/progress/<team_id>.json`.
    /// Write failures are swallowed with a debug log.
    pub fn write_progress(&self, current_round: u32, status: &str, error_message: Option<&str>) {
        let dir = self.workspace.join("progress");
        let path = dir.join(format!("{}.json", self.team.team_id));
        let payload = serde_json::json!({
            "execution_id": self.task.execution_id,
            "team_id": self.team.team_id,
            "team_name": self.team.team_name,
            "current_round": current_round,
            "status": status,
            "error_message": error_message,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let result = std::fs::create_dir_all(&dir).and_then(|_| {
            std::fs::write(
                &path,
                serde_json::to_string_pretty(&payload).unwrap_or_default(),
            )
        });
        if let Err(e) = result {
            log::debug!(
                "progress file write failed for team {} (ignored): {}",
                self.team.team_id,
                e
            );
        }
    }

    fn prompt_context(&self, user_prompt: &str, round_number: u32) -> RoundPromptContext {
        RoundPromptContext {
            user_prompt: user_prompt.to_string(),
            round_number,
            round_history: self.round_history.clone(),
            team_id: self.team.team_id.clone(),
            team_name: self.team.team_name.clone(),
            execution_id: self.task.execution_id.clone(),
        }
    }

    /// Record a failed round in the store without masking the original
    /// error.
    async fn record_round_failure(&self, round_number: u32, started: DateTime<Utc>, message: &str) {
        self.write_progress(round_number, "failed", Some(message));
        if let Err(e) = self
            .store
            .save_round_status(
                &self.task.execution_id,
                &self.team.team_id,
                round_number,
                started,
                Some(Utc::now()),
                "failed",
                Some(message),
            )
            .await
        {
            log::debug!("round_status write failed while reporting an error: {}", e);
        }
    }

    /// Run the team's rounds to completion and return the leader-board row
    /// flagged as final.
    pub async fn run(&mut self, user_prompt: &str) -> Result<LeaderBoardEntry, MixSeekError> {
        if user_prompt.trim().is_empty() {
            return Err(MixSeekError::TaskValidation(
                "user_prompt cannot be empty".to_string(),
            ));
        }
        // A retry after a transient failure restarts the loop from round 1.
        // Discard any submissions left over from an aborted attempt so the
        // bag only ever reflects the current round's member calls.
        self.round_history.clear();
        self.leader.submissions_bag().drain().await;

        let max_rounds = self.task.max_rounds;
        let min_rounds = self.task.min_rounds;
        let mut exit_reason = ExitReason::MaxRoundsReached;

        for round_number in 1..=max_rounds {
            let started = Utc::now();
            self.write_progress(round_number, "running", None);
            log::info!(
                "team {} round {}/{} starting",
                self.team.team_id,
                round_number,
                max_rounds
            );

            // 1. Build the team prompt from history plus the current
            //    leader-board snapshot.
            let context = self.prompt_context(user_prompt, round_number);
            let prompt = self.prompt_builder.build_team_prompt(&context).await?;

            // 2. Leader run, bounded by the submission timeout.
            let leader_run = tokio::time::timeout(
                Duration::from_secs(self.task.submission_timeout_seconds),
                self.leader.run(&prompt),
            )
            .await;
            let leader_out = match leader_run {
                Err(_) => {
                    let err = MixSeekError::Timeout {
                        team_id: self.team.team_id.clone(),
                        seconds: self.task.submission_timeout_seconds,
                    };
                    self.record_round_failure(round_number, started, &err.to_string())
                        .await;
                    return Err(err);
                }
                Ok(Err(e)) => {
                    self.record_round_failure(round_number, started, &e.to_string())
                        .await;
                    return Err(e);
                }
                Ok(Ok(out)) => out,
            };

            // 3. Persist the member submissions (contract write).
            let submissions = self.leader.submissions_bag().drain().await;
            let record = MemberSubmissionsRecord::new(
                self.task.execution_id.clone(),
                self.team.team_id.clone(),
                self.team.team_name.clone(),
                round_number,
                submissions,
            )?;
            self.store
                .save_aggregation(&record, &leader_out.all_messages)
                .await?;

            // 4. Evaluate the leader's output. Evaluator failure is a
            //    terminal round exit.
            let request = EvaluationRequest::new(
                user_prompt,
                &leader_out.output,
                Some(self.team.team_id.clone()),
            )?;
            let evaluation = match self.evaluator.evaluate(&request).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!(
                        "team {} round {}: evaluator failed: {}",
                        self.team.team_id,
                        round_number,
                        e
                    );
                    self.record_round_failure(round_number, started, &e.to_string())
                        .await;
                    return self
                        .finalize_after_evaluator_error(round_number, &leader_out.output)
                        .await;
                }
            };

            // 5. Leader-board row for this round.
            self.store
                .save_to_leader_board(
                    &self.task.execution_id,
                    &self.team.team_id,
                    &self.team.team_name,
                    round_number,
                    &leader_out.output,
                    "md",
                    evaluation.overall_score,
                    &evaluation.score_details(),
                )
                .await?;

            // 6. Append the round state.
            let ended = Utc::now();
            let state = RoundState {
                round_number,
                submission_content: leader_out.output.clone(),
                evaluation_score: evaluation.overall_score,
                score_details: evaluation.score_details(),
                round_started_at: started,
                round_ended_at: ended,
            };
            self.round_history.push(state.clone());
            self.store
                .save_round_status(
                    &self.task.execution_id,
                    &self.team.team_id,
                    round_number,
                    started,
                    Some(ended),
                    "completed",
                    None,
                )
                .await?;
            self.write_progress(round_number, "completed", None);
            log::info!(
                "team {} round {} scored {:.2}",
                self.team.team_id,
                round_number,
                evaluation.overall_score
            );

            // 7. Hook; its failures never interrupt the loop.
            if let Some(hook) = &self.on_round_complete {
                if let Err(e) = hook(&state, &record.submissions) {
                    log::warn!(
                        "on_round_complete hook failed for team {} (ignored): {}",
                        self.team.team_id,
                        e
                    );
                }
            }

            // 8. Exit decision.
            if round_number >= max_rounds {
                exit_reason = ExitReason::MaxRoundsReached;
                break;
            }
            if round_number < min_rounds {
                continue;
            }
            let judgment_context = self.prompt_context(user_prompt, round_number + 1);
            let verdict = tokio::time::timeout(
                Duration::from_secs(self.task.judgment_timeout_seconds),
                self.judgment.judge_improvement_prospects(&judgment_context),
            )
            .await;
            match verdict {
                Ok(Ok(judgment)) if !judgment.should_continue => {
                    log::info!(
                        "team {} stopping after round {} (judgment: {})",
                        self.team.team_id,
                        round_number,
                        judgment.reasoning
                    );
                    exit_reason = ExitReason::JudgmentStop;
                    break;
                }
                Ok(Ok(_)) => {}
                // Judgment failure is non-fatal: keep iterating.
                Ok(Err(e)) => {
                    log::warn!(
                        "team {} judgment failed, continuing: {}",
                        self.team.team_id,
                        e
                    );
                }
                Err(_) => {
                    log::warn!(
                        "team {} judgment timed out after {}s, continuing",
                        self.team.team_id,
                        self.task.judgment_timeout_seconds
                    );
                }
            }
        }

        self.finalize(exit_reason).await
    }

    /// Mark the highest-scoring round (latest on ties) as the team's final
    /// submission and return its leader-board row.
    async fn finalize(&self, exit_reason: ExitReason) -> Result<LeaderBoardEntry, MixSeekError> {
        let best = self
            .round_history
            .iter()
            .fold(None::<&RoundState>, |acc, state| match acc {
                Some(current) if state.evaluation_score < current.evaluation_score => acc,
                _ => Some(state),
            })
            .ok_or_else(|| {
                MixSeekError::Store(format!(
                    "team {} finished without any recorded round",
                    self.team.team_id
                ))
            })?;

        self.store
            .mark_final_submission(
                &self.task.execution_id,
                &self.team.team_id,
                best.round_number,
                exit_reason.as_str(),
            )
            .await?;
        self.write_progress(best.round_number, "finalized", None);

        self.store
            .get_final_submission(&self.task.execution_id, &self.team.team_id)
            .await?
            .ok_or_else(|| {
                MixSeekError::Store(format!(
                    "final submission row missing for team {}",
                    self.team.team_id
                ))
            })
    }

    /// Terminal evaluator-error path: promote the best prior round when one
    /// exists; otherwise record this round with a zero score so the failure
    /// itself is the final submission.
    async fn finalize_after_evaluator_error(
        &self,
        failed_round: u32,
        leader_output: &str,
    ) -> Result<LeaderBoardEntry, MixSeekError> {
        if self.round_history.is_empty() {
            self.store
                .save_to_leader_board(
                    &self.task.execution_id,
                    &self.team.team_id,
                    &self.team.team_name,
                    failed_round,
                    leader_output,
                    "md",
                    0.0,
                    &HashMap::new(),
                )
                .await?;
            self.store
                .mark_final_submission(
                    &self.task.execution_id,
                    &self.team.team_id,
                    failed_round,
                    ExitReason::EvaluatorError.as_str(),
                )
                .await?;
            self.write_progress(failed_round, "finalized", None);
            return self
                .store
                .get_final_submission(&self.task.execution_id, &self.team.team_id)
                .await?
                .ok_or_else(|| {
                    MixSeekError::Store(format!(
                        "final submission row missing for team {}",
                        self.team.team_id
                    ))
                });
        }
        self.finalize(ExitReason::EvaluatorError).await
    }
}
