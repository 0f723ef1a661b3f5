//! Leader-to-member delegation driven end-to-end: member results land in
//! the aggregation store with correct status and usage, member failures
//! propagate without being masked, and custom plugin agents participate
//! like any other member.

use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;

use mixseek::clients::common::ClientSampling;
use mixseek::clients::factory::ClientFactory;
use mixseek::config::schema::{MemberAgentConfig, OrchestratorSettings, TeamRef};
use mixseek::mixseek::member_agent::AgentConstructor;
use mixseek::{
    AggregationStore, ClientWrapper, ExecutionStatus, MemberAgent, MemberAgentResult, Message,
    MixSeekError, NativeToolCall, Orchestrator, PluginRegistry, TokenUsage, ToolDefinition,
    STORE_FILE_NAME,
};

/// Replays canned message outcomes in order, repeating the last one.
struct ScriptedClient {
    replies: Mutex<Vec<Result<Message, String>>>,
    usage: Mutex<Option<TokenUsage>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<Message, String>>) -> Self {
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
        let mut replies = self.replies.lock().await;
        let next = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies[0].clone()
        };
        match next {
            Ok(message) => {
                *self.usage.lock().await = Some(TokenUsage {
                    input_tokens: 20,
                    output_tokens: 10,
                    total_tokens: 30,
                });
                Ok(message)
            }
            Err(text) => {
                *self.usage.lock().await = None;
                Err(text.into())
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

#[derive(Default)]
struct RoutingFactory {
    routes: HashMap<String, Arc<ScriptedClient>>,
}

impl RoutingFactory {
    fn route(mut self, model: &str, client: ScriptedClient) -> Self {
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
            .ok_or_else(|| MixSeekError::Provider {
                model: model.to_string(),
                message: "no scripted client for this model".to_string(),
                transient: false,
            })
    }
}

fn delegation_reply(calls: &[(&str, &str)]) -> Message {
    Message {
        role: mixseek::Role::Assistant,
        content: Arc::from(""),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(index, (tool, task))| NativeToolCall {
                id: format!("call_{}", index),
                name: tool.to_string(),
                arguments: serde_json::json!({"task": task}),
            })
            .collect(),
    }
}

fn write_file(workspace: &TempDir, relative: &str, content: &str) {
    let path = workspace.path().join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn base_settings(workspace: &TempDir) -> OrchestratorSettings {
    mixseek::config::init_logging();
    OrchestratorSettings {
        workspace_path: workspace.path().to_path_buf(),
        max_rounds: 1,
        min_rounds: 1,
        evaluator_config: Some(PathBuf::from("configs/evaluator.toml")),
        judgment_config: Some(PathBuf::from("configs/judgment.toml")),
        teams: vec![TeamRef {
            config: PathBuf::from("teams/alpha.toml"),
        }],
        ..OrchestratorSettings::default()
    }
}

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

#[tokio::test]
async fn failing_members_keep_status_and_usage_in_the_aggregation() {
    let workspace = TempDir::new().unwrap();
    write_file(
        &workspace,
        "teams/alpha.toml",
        r#"
        [team]
        team_id = "alpha"
        team_name = "Team Alpha"

        [team.leader]
        model = "openai:leader"

        [[team.members]]
        agent_name = "m1"
        agent_type = "plain"
        model = "openai:member-1"
        max_retries = 0

        [[team.members]]
        agent_name = "m2"
        agent_type = "plain"
        model = "openai:member-2"
        max_retries = 0
        "#,
    );
    write_component_configs(&workspace);

    let factory = RoutingFactory::default()
        .route(
            "openai:leader",
            ScriptedClient::new(vec![
                Ok(delegation_reply(&[
                    ("delegate_to_m1", "research the topic"),
                    ("delegate_to_m2", "verify the sources"),
                ])),
                Ok(Message::assistant("synthesis despite member failures")),
            ]),
        )
        .route(
            "openai:member-1",
            ScriptedClient::new(vec![Err("401 invalid api key".into())]),
        )
        .route(
            "openai:member-2",
            ScriptedClient::new(vec![Err("503 service down".into())]),
        )
        .route(
            "openai:eval",
            ScriptedClient::new(vec![Ok(Message::assistant(
                "{\"score\": 42.0, \"comment\": \"thin but present\"}",
            ))]),
        );

    let orchestrator = Orchestrator::new(base_settings(&workspace))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("hard task", None, Some("exec-s3".into()))
        .await
        .unwrap();

    // The leader still produced an output and the evaluator scored it.
    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert_eq!(summary.best_score, Some(42.0));
    assert_eq!(
        summary.team_results[0].submission_content,
        "synthesis despite member failures"
    );

    // Both member submissions are recorded as errors, with messages and
    // consumed usage attributed.
    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    let aggregation = store
        .get_aggregation("exec-s3", "alpha", 1)
        .await
        .unwrap()
        .expect("aggregation row must exist");
    let submissions = aggregation.submissions.as_array().unwrap();
    assert_eq!(submissions.len(), 2);
    for submission in submissions {
        assert_eq!(submission["status"], "ERROR");
        assert_eq!(submission["content"], "");
        assert!(submission["error_message"].as_str().unwrap().len() > 3);
        assert!(submission["usage"]["requests"].as_u64().unwrap() >= 1);
    }
    let names: Vec<&str> = submissions
        .iter()
        .map(|s| s["agent_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["m1", "m2"]);

    // The leader transcript preserves the causal tool traffic.
    let messages = aggregation.leader_messages.as_array().unwrap();
    assert!(messages.iter().any(|m| m["role"] == "tool"));
    assert!(messages
        .iter()
        .any(|m| m.get("tool_calls").map(|c| !c.is_null()).unwrap_or(false)));
}

#[tokio::test]
async fn successful_members_feed_content_back_to_the_leader() {
    let workspace = TempDir::new().unwrap();
    write_file(
        &workspace,
        "teams/alpha.toml",
        r#"
        [team]
        team_id = "alpha"
        team_name = "Team Alpha"

        [team.leader]
        model = "openai:leader"

        [[team.members]]
        agent_name = "researcher"
        agent_type = "plain"
        model = "openai:member-ok"
        tool_description = "Finds background facts."
        "#,
    );
    write_component_configs(&workspace);

    let factory = RoutingFactory::default()
        .route(
            "openai:leader",
            ScriptedClient::new(vec![
                Ok(delegation_reply(&[("delegate_to_researcher", "dig in")])),
                Ok(Message::assistant("informed answer")),
            ]),
        )
        .route(
            "openai:member-ok",
            ScriptedClient::new(vec![Ok(Message::assistant("useful research notes"))]),
        )
        .route(
            "openai:eval",
            ScriptedClient::new(vec![Ok(Message::assistant(
                "{\"score\": 91.0, \"comment\": \"well grounded\"}",
            ))]),
        );

    let orchestrator = Orchestrator::new(base_settings(&workspace))
        .unwrap()
        .with_client_factory(Arc::new(factory));

    let summary = orchestrator
        .execute("use your team", None, Some("exec-ok".into()))
        .await
        .unwrap();
    assert_eq!(summary.best_score, Some(91.0));

    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    let aggregation = store
        .get_aggregation("exec-ok", "alpha", 1)
        .await
        .unwrap()
        .unwrap();
    let submissions = aggregation.submissions.as_array().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["status"], "SUCCESS");
    assert_eq!(submissions[0]["content"], "useful research notes");
    assert_eq!(submissions[0]["usage"]["input_tokens"].as_u64().unwrap(), 20);
}

/// Custom plugin agent wired through the registry and delegated to by the
/// leader.
struct EchoAgent {
    name: String,
}

#[async_trait]
impl MemberAgent for EchoAgent {
    fn agent_name(&self) -> &str {
        &self.name
    }
    fn agent_type(&self) -> &str {
        "custom"
    }
    fn tool_description(&self) -> String {
        "Echoes the task back.".to_string()
    }
    async fn execute(&self, task: &str, _context: Option<&serde_json::Value>) -> MemberAgentResult {
        let mut result =
            MemberAgentResult::success(format!("echo: {}", task), self.name.clone(), "custom");
        result.usage_info = Some(mixseek::AgentUsage {
            input_tokens: 1,
            output_tokens: 1,
            requests: 0,
        });
        result
    }
}

#[tokio::test]
async fn custom_plugin_agent_participates_like_any_member() {
    let workspace = TempDir::new().unwrap();
    write_file(
        &workspace,
        "teams/alpha.toml",
        r#"
        [team]
        team_id = "alpha"
        team_name = "Team Alpha"

        [team.leader]
        model = "openai:leader"

        [[team.members]]
        agent_name = "echo"
        agent_type = "custom"
        model = "local:echo-model"

        [team.members.plugin]
        agent_module = "acme.agents"
        agent_class = "EchoAgent"
        "#,
    );
    write_component_configs(&workspace);

    let constructor: AgentConstructor = Arc::new(|config: &MemberAgentConfig| {
        Ok(Box::new(EchoAgent {
            name: config.agent_name.clone(),
        }) as Box<dyn MemberAgent>)
    });
    let plugins = Arc::new(PluginRegistry::new());
    plugins.register_module("acme.agents", "EchoAgent", constructor);

    let factory = RoutingFactory::default()
        .route(
            "openai:leader",
            ScriptedClient::new(vec![
                Ok(delegation_reply(&[("delegate_to_echo", "say hi")])),
                Ok(Message::assistant("done")),
            ]),
        )
        .route(
            "openai:eval",
            ScriptedClient::new(vec![Ok(Message::assistant(
                "{\"score\": 60.0, \"comment\": \"fine\"}",
            ))]),
        );

    let orchestrator = Orchestrator::new(base_settings(&workspace))
        .unwrap()
        .with_client_factory(Arc::new(factory))
        .with_plugins(plugins);

    let summary = orchestrator
        .execute("plugin run", None, Some("exec-plugin".into()))
        .await
        .unwrap();
    assert_eq!(summary.status, ExecutionStatus::Completed);

    let store = AggregationStore::new(workspace.path().join(STORE_FILE_NAME))
        .await
        .unwrap();
    let aggregation = store
        .get_aggregation("exec-plugin", "alpha", 1)
        .await
        .unwrap()
        .unwrap();
    let submissions = aggregation.submissions.as_array().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["agent_name"], "echo");
    assert_eq!(submissions[0]["agent_type"], "custom");
    assert_eq!(submissions[0]["content"], "echo: say hi");
}
