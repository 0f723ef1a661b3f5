//! End-to-end orchestration scenarios driven through scripted provider
//! clients: happy path, iterative improvement, duplicate team rejection,
//! and partial failure under a per-team timeout.

use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;

use mixseek::clients::common::ClientSampling;
use mixseek::clients::factory::ClientFactory;
use mixseek::config::schema::{OrchestratorSettings, TeamRef};
use mixseek::{
    AggregationStore, ClientWrapper, ExecutionStatus, Message, MixSeekError, Orchestrator,
    TeamRunStatus, ToolDefinition, STORE_FILE_NAME,
};

/// Replays canned outcomes in order, repeating the last one, with an
/// optional per-call delay for timeout scenarios.
struct SequenceClient {
    replies: Mutex<Vec<Result<String, String>>>,
    delay: Option<Duration>,
}

impl SequenceClient {
    fn new(replies: Vec<Result<String, String>>) -> Self {
        SequenceClient {
            replies: Mutex::new(replies),
            delay: None,
        }
    }

    fn slow(replies: Vec<Result<String, String>>, delay: Duration) -> Self {
        SequenceClient {
            replies: Mutex::new(replies),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl ClientWrapper for SequenceClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut replies = self.replies.lock().await;
        let next = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies[0].clone()
        };
        match next {
            Ok(content) => Ok(Message::assistant(content)),
            Err(message) => Err(message.into()),
        }
    }

    fn model_name(&self) -> &str {
        "sequence"
    }
}

/// Maps exact `provider:model` identifiers to scripted clients.
#[derive(Default)]
struct RoutingFactory {
    routes: HashMap<String, Arc<SequenceClient>>,
}

impl RoutingFactory {
    fn route(mut self, model: &str, client: SequenceClient) -> Self {
        self.routes.insert(model.to_string(), Arc::new(client));
        self
    }
}

impl ClientFactory for RoutingFactory {
    fn create_with_sampling(
        &self,
        model: &str,
        _sampling: ClientSampling,
    ) -> Result<Arc<dyn ClientWrapper>, MixSeekError> {
        self.routes
            .get(model)
            .cloned()
            .map(|c| c as Arc<dyn ClientWrapper>)
            .ok_or_else(|| {
                MixSeekError::Provider {
                    model: model.to_string(),
                    message: "no scripted client for this model".to_string(),
                    transient: false,
                }
            })
    }
}

fn score_reply(score: f64) -> Result<String, String> {
    Ok(format!("{{\"score\": {}, \"comment\": \"ok\"}}", score))
}

fn judgment_reply(should_continue: bool) -> Result<String, String> {
    Ok(format!(
        "{{\"should_continue\": {}, \"reasoning\": \"because\", \"confidence_score\": 0.9}}",
        should_continue
    ))
}

fn write_file(workspace: &TempDir, relative: &str, content: &str) {
    let path = workspace.path().join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn write_team(workspace: &TempDir, file: &str, team_id: &str, leader_model: &str) {
    write_file(
        workspace,
        file,
        &format!(
            r#"
            [team]
            team_id = "{team_id}"
            team_name = "Team {team_id}"

            [team.leader]
            model = "{leader_model}"
            system_instruction = "You lead the team."
            "#
        ),
    );
}

/// Single-metric evaluator and dedicated judgment model so each scripted
/// client maps to exactly one component.
fn write_component_configs(workspace: &TempDir) {
    write_file(
        workspace,
        "configs/evaluator.toml",
        r#"
        default_model = "openai:eval"

        [[metrics]]
        name = "LLMPlain"
        "#,
    );
    write_file(workspace, "configs/judgment.toml", "model = \"openai:judge\"\n");
}

fn settings(workspace: &TempDir, teams: &[&str], max_rounds: u32) -> OrchestratorSettings {
    mixseek::config::init_logging();
    OrchestratorSettings {
        workspace_path: workspace.path().to_path_buf(),
        max_rounds,
        min_rounds: 1,
        evaluator_config: Some(PathBuf::from("configs/evaluator.toml")),
        judgment_config: Some(PathBuf::from("configs/judgment.toml")),
        teams: teams
            .iter()
            .map(|t| TeamRef {
                config: PathBuf::from(t),
            })
            .collect(),
        ..OrchestratorSettings::default()
    }
}

#[tokio::test]
async fn single_round_happy_path() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_component_configs(&workspace);

    let factory = RoutingFactory::default()
        .route("openai:leader-alpha", SequenceClient::new(vec![Ok("X".into())]))
        .route("openai:eval", SequenceClient::new(vec![score_reply(88.0)]))
        .route("openai:judge", SequenceClient::new(vec![judgment_reply(false)]));

    let orchestrator = Orchestrator::new(settings(&workspace, &["teams/alpha.toml"], 1))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("Analyze the data", None, Some("exec-s1".into()))
        .await
        .unwrap();

    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert_eq!(summary.best_team_id.as_deref(), Some("alpha"));
    assert_eq!(summary.best_score, Some(88.0));
    assert_eq!(summary.total_teams, 1);
    assert_eq!(summary.team_results.len(), 1);
    let entry = &summary.team_results[0];
    assert!(entry.final_submission);
    assert_eq!(entry.submission_content, "X");
    assert_eq!(entry.exit_reason.as_deref(), Some("max_rounds_reached"));

    // Exactly one leader-board row, flagged final, visible in the store.
    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    let entries = store
        .get_leader_board_entries("exec-s1", "alpha")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].final_submission);
    assert_eq!(entries[0].score, 88.0);

    let status = orchestrator.get_team_status("alpha").await.unwrap();
    assert_eq!(status.status, TeamRunStatus::Completed);
    assert!(status.started_at.is_some());
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn iterative_improvement_until_judgment_stop() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_component_configs(&workspace);

    let factory = RoutingFactory::default()
        .route(
            "openai:leader-alpha",
            SequenceClient::new(vec![
                Ok("draft one".into()),
                Ok("draft two".into()),
                Ok("draft three".into()),
            ]),
        )
        .route(
            "openai:eval",
            SequenceClient::new(vec![score_reply(75.0), score_reply(82.0), score_reply(90.0)]),
        )
        .route(
            "openai:judge",
            SequenceClient::new(vec![
                judgment_reply(true),
                judgment_reply(true),
                judgment_reply(false),
            ]),
        );

    let orchestrator = Orchestrator::new(settings(&workspace, &["teams/alpha.toml"], 5))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("iterate on it", None, Some("exec-s2".into()))
        .await
        .unwrap();

    assert_eq!(summary.best_score, Some(90.0));
    let entry = &summary.team_results[0];
    assert_eq!(entry.round_number, 3);
    assert_eq!(entry.exit_reason.as_deref(), Some("judgment_stop"));

    // Three rounds persisted with contiguous numbering from 1.
    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    let entries = store
        .get_leader_board_entries("exec-s2", "alpha")
        .await
        .unwrap();
    let rounds: Vec<u32> = entries.iter().map(|e| e.round_number).collect();
    assert_eq!(rounds, vec![1, 2, 3]);
    assert_eq!(entries.iter().filter(|e| e.final_submission).count(), 1);
}

#[tokio::test]
async fn duplicate_team_id_is_rejected_before_any_round() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/one.toml", "alpha", "openai:leader-a");
    write_team(&workspace, "teams/two.toml", "alpha", "openai:leader-b");
    write_component_configs(&workspace);

    let orchestrator = Orchestrator::new(settings(
        &workspace,
        &["teams/one.toml", "teams/two.toml"],
        1,
    ))
    .unwrap()
    .with_client_factory(Arc::new(RoutingFactory::default()));

    let err = orchestrator
        .execute("task", None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("alpha"));
    assert!(err.to_string().contains("Duplicate team_id"));
    assert_eq!(err.exit_code(), 1);

    // No store rows were written.
    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    assert!(store
        .get_leader_board_ranking("whatever")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn empty_user_prompt_is_rejected() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_component_configs(&workspace);

    let orchestrator = Orchestrator::new(settings(&workspace, &["teams/alpha.toml"], 1))
        .unwrap()
        .with_client_factory(Arc::new(RoutingFactory::default()));

    let err = orchestrator.execute("   ", None, None).await.unwrap_err();
    assert!(matches!(err, MixSeekError::TaskValidation(_)));
}

#[tokio::test]
async fn partial_failure_when_one_team_times_out() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_team(&workspace, "teams/beta.toml", "beta", "openai:leader-beta");
    write_team(&workspace, "teams/gamma.toml", "gamma", "openai:leader-gamma");
    write_component_configs(&workspace);

    let factory = RoutingFactory::default()
        .route("openai:leader-alpha", SequenceClient::new(vec![Ok("alpha answer".into())]))
        .route(
            "openai:leader-beta",
            SequenceClient::slow(vec![Ok("too late".into())], Duration::from_secs(60)),
        )
        .route("openai:leader-gamma", SequenceClient::new(vec![Ok("gamma answer".into())]))
        .route(
            "openai:eval",
            SequenceClient::new(vec![score_reply(81.0), score_reply(77.0)]),
        )
        .route("openai:judge", SequenceClient::new(vec![judgment_reply(false)]));

    let orchestrator = Orchestrator::new(settings(
        &workspace,
        &["teams/alpha.toml", "teams/beta.toml", "teams/gamma.toml"],
        1,
    ))
    .unwrap()
    .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("race it", Some(2), Some("exec-s5".into()))
        .await
        .unwrap();

    assert_eq!(summary.status, ExecutionStatus::PartialFailure);
    assert_eq!(summary.team_results.len(), 2);
    assert_eq!(summary.failed_teams_info.len(), 1);
    let failed = &summary.failed_teams_info[0];
    assert_eq!(failed.team_id, "beta");
    assert!(failed.error_message.contains("Timeout"));
    // The winner comes from the surviving teams.
    assert!(matches!(
        summary.best_team_id.as_deref(),
        Some("alpha") | Some("gamma")
    ));

    let beta_status = orchestrator.get_team_status("beta").await.unwrap();
    assert_eq!(beta_status.status, TeamRunStatus::Timeout);

    // The timed-out team's progress file reports the failure.
    let progress =
        std::fs::read_to_string(workspace.path().join("progress").join("beta.json")).unwrap();
    assert!(progress.contains("timeout"));
}

#[tokio::test]
async fn all_teams_failing_yields_failed_status() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_component_configs(&workspace);

    // Leader fails terminally (no transient marker), so no retry applies.
    let factory = RoutingFactory::default()
        .route(
            "openai:leader-alpha",
            SequenceClient::new(vec![Err("401 invalid api key".into())]),
        )
        .route("openai:eval", SequenceClient::new(vec![score_reply(50.0)]))
        .route("openai:judge", SequenceClient::new(vec![judgment_reply(false)]));

    let orchestrator = Orchestrator::new(settings(&workspace, &["teams/alpha.toml"], 1))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("doomed", None, Some("exec-fail".into()))
        .await
        .unwrap();

    assert_eq!(summary.status, ExecutionStatus::Failed);
    assert!(summary.team_results.is_empty());
    assert!(summary.best_team_id.is_none());
    assert_eq!(summary.failed_teams_info.len(), 1);
}

#[tokio::test]
async fn transient_team_failures_are_retried_to_success() {
    let workspace = TempDir::new().unwrap();
    write_team(&workspace, "teams/alpha.toml", "alpha", "openai:leader-alpha");
    write_component_configs(&workspace);

    // First leader call dies with a read error; the orchestrator retry runs
    // the round loop again and the second call succeeds. The leader-level
    // transient handling is bypassed because the leader propagates provider
    // errors upward.
    let factory = RoutingFactory::default()
        .route(
            "openai:leader-alpha",
            SequenceClient::new(vec![
                Err("httpx.ReadError: peer closed connection".into()),
                Ok("recovered answer".into()),
            ]),
        )
        .route("openai:eval", SequenceClient::new(vec![score_reply(66.0)]))
        .route("openai:judge", SequenceClient::new(vec![judgment_reply(false)]));

    let orchestrator = Orchestrator::new(settings(&workspace, &["teams/alpha.toml"], 1))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("retry me", None, Some("exec-retry".into()))
        .await
        .unwrap();

    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert_eq!(summary.best_score, Some(66.0));
    assert_eq!(
        summary.team_results[0].submission_content,
        "recovered answer"
    );
}
