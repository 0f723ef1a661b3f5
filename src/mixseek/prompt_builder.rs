//! Prompt construction for the three LLM consumers: the team leader (per
//! round), the evaluator (per submission), and the judgment LLM (per round).
//!
//! Templates are minijinja with strict undefined behavior: an unknown
//! placeholder or a syntax error surfaces as a template error naming the
//! template field, never a silent fallback. The default templates are
//! Japanese, matching the runtime's original prompt set; users may override
//! any of the three via the prompt builder TOML.
//!
//! Rendering never truncates: for round N the history section carries every
//! prior round, earliest first.

use minijinja::{context, Environment, UndefinedBehavior};

use crate::mixseek::config::schema::PromptBuilderSettings;
use crate::mixseek::error::MixSeekError;
use crate::mixseek::round_controller::RoundState;
use crate::mixseek::store::{AggregationStore, RankingRow};

/// Rendered when a team has no prior submissions (round 1).
pub const NO_HISTORY_MESSAGE: &str = "まだ過去のSubmissionはありません。";
/// Rendered when the ranking query yields nothing (or no store is attached).
pub const NO_RANKING_MESSAGE: &str = "まだランキング情報がありません。";
/// Rendered when the team has no rank yet.
pub const NO_POSITION_MESSAGE: &str = "まだあなたのチームの順位はありません。";

/// Context for building one round's team or judgment prompt.
#[derive(Debug, Clone)]
pub struct RoundPromptContext {
    pub user_prompt: String,
    /// The round about to run; >= 1.
    pub round_number: u32,
    /// Every completed round so far, earliest first. Possibly empty.
    pub round_history: Vec<RoundState>,
    pub team_id: String,
    pub team_name: String,
    pub execution_id: String,
}

/// Render the submission history section. All prior rounds are included,
/// earliest first; nothing is truncated.
pub fn format_submission_history(history: &[RoundState]) -> String {
    if history.is_empty() {
        return NO_HISTORY_MESSAGE.to_string();
    }
    let mut out = String::new();
    for state in history {
        out.push_str(&format!(
            "## ラウンド {}\n\nスコア: {:.2}/100\n\n{}\n\n",
            state.round_number, state.evaluation_score, state.submission_content
        ));
    }
    out.trim_end().to_string()
}

/// Render the cross-team ranking list, marking the current team.
pub fn format_ranking_table(ranking: &[RankingRow], team_id: &str) -> String {
    if ranking.is_empty() {
        return NO_RANKING_MESSAGE.to_string();
    }
    let mut out = String::new();
    for (index, row) in ranking.iter().enumerate() {
        let marker = if row.team_id == team_id {
            " (あなたのチーム)"
        } else {
            ""
        };
        out.push_str(&format!(
            "**#{} {}{}** - {:.2}/100 ({}ラウンド)\n",
            index + 1,
            row.team_name,
            marker,
            row.max_score,
            row.total_rounds
        ));
    }
    out.trim_end().to_string()
}

/// Rank-specific encouragement message for the current team.
pub fn generate_position_message(position: Option<usize>, total_teams: Option<usize>) -> String {
    let (rank, total) = match (position, total_teams) {
        (Some(rank), Some(total)) if rank >= 1 && total >= 1 => (rank, total),
        _ => return NO_POSITION_MESSAGE.to_string(),
    };
    if rank == 1 {
        "🏆 現在、あなたのチームは1位です！この調子で頑張ってください！".to_string()
    } else if rank == 2 {
        format!("現在、あなたのチームは{}チーム中2位です。素晴らしい成績です！", total)
    } else if rank == total {
        format!(
            "現在、あなたのチームは{}チーム中最下位です。巻き返しを図りましょう！",
            total
        )
    } else {
        format!("現在、あなたのチームは{}チーム中{}位です。", total, rank)
    }
}

/// Current wall-clock time as ISO 8601 with offset.
pub fn current_datetime_with_timezone() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// Renders user prompts for the team leader, the evaluator, and the
/// judgment LLM.
pub struct UserPromptBuilder {
    settings: PromptBuilderSettings,
    store: Option<AggregationStore>,
}

impl UserPromptBuilder {
    pub fn new(settings: PromptBuilderSettings, store: Option<AggregationStore>) -> Self {
        UserPromptBuilder { settings, store }
    }

    fn render(
        &self,
        field: &'static str,
        template: &str,
        ctx: minijinja::Value,
    ) -> Result<String, MixSeekError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.render_str(template, ctx).map_err(|e| MixSeekError::Template {
            field: field.to_string(),
            message: e.to_string(),
        })
    }

    async fn ranking_for(
        &self,
        context: &RoundPromptContext,
    ) -> Result<Vec<RankingRow>, MixSeekError> {
        match &self.store {
            None => Ok(Vec::new()),
            Some(store) => store.get_leader_board_ranking(&context.execution_id).await,
        }
    }

    fn round_variables(
        &self,
        context: &RoundPromptContext,
        ranking: &[RankingRow],
    ) -> minijinja::Value {
        let submission_history = format_submission_history(&context.round_history);
        let ranking_table = format_ranking_table(ranking, &context.team_id);
        let position = ranking
            .iter()
            .position(|row| row.team_id == context.team_id)
            .map(|idx| idx + 1);
        let total_teams = if ranking.is_empty() {
            None
        } else {
            Some(ranking.len())
        };
        let team_position_message = generate_position_message(position, total_teams);

        context! {
            user_prompt => context.user_prompt,
            round_number => context.round_number,
            submission_history => submission_history,
            ranking_table => ranking_table,
            team_position_message => team_position_message,
            current_datetime => current_datetime_with_timezone(),
        }
    }

    /// Build the per-round prompt for the team leader.
    pub async fn build_team_prompt(
        &self,
        context: &RoundPromptContext,
    ) -> Result<String, MixSeekError> {
        let ranking = self.ranking_for(context).await?;
        let vars = self.round_variables(context, &ranking);
        self.render("team_user_prompt", &self.settings.team_user_prompt, vars)
    }

    /// Build the evaluator prompt for one submission.
    pub fn build_evaluator_prompt(
        &self,
        user_query: &str,
        submission: &str,
    ) -> Result<String, MixSeekError> {
        self.render(
            "evaluator_user_prompt",
            &self.settings.evaluator_user_prompt,
            context! {
                user_query => user_query,
                submission => submission,
            },
        )
    }

    /// Build the per-round prompt for the judgment LLM. Consumes the same
    /// context as the team prompt.
    pub async fn build_judgment_prompt(
        &self,
        context: &RoundPromptContext,
    ) -> Result<String, MixSeekError> {
        let ranking = self.ranking_for(context).await?;
        let vars = self.round_variables(context, &ranking);
        self.render("judgment_user_prompt", &self.settings.judgment_user_prompt, vars)
    }
}
