//! Evaluation metrics: scoring axes that contribute, weighted, to a
//! submission's overall score.
//!
//! A metric is either *LLM-judge* (it exposes a judging instruction and the
//! evaluator drives the LLM call) or *statistical* (it computes a score
//! directly from the text via [`Metric::evaluate`]). The four built-ins are
//! all LLM judges; statistical metrics arrive through the custom registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mixseek::error::MixSeekError;

/// One metric's score for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricScore {
    pub metric_name: String,
    /// 0..=100.
    pub score: f64,
    pub evaluator_comment: Option<String>,
}

impl MetricScore {
    pub fn new(metric_name: impl Into<String>, score: f64, comment: Option<String>) -> Self {
        MetricScore {
            metric_name: metric_name.into(),
            score,
            evaluator_comment: comment,
        }
    }
}

/// A single scoring axis.
#[async_trait]
pub trait Metric: Send + Sync {
    /// The metric's class name, as referenced from configuration.
    fn name(&self) -> &str;

    /// `Some(instruction)` marks this metric as LLM-judge: the evaluator
    /// builds the judge prompt around this instruction and performs the LLM
    /// call itself. `None` marks it statistical.
    fn judge_instruction(&self) -> Option<&str> {
        None
    }

    /// Statistical scoring path. LLM-judge metrics never reach this; the
    /// default implementation reports the misuse.
    async fn evaluate(&self, _user_query: &str, _submission: &str) -> Result<MetricScore, MixSeekError> {
        Err(MixSeekError::Evaluator {
            metric: self.name().to_string(),
            message: "LLM-judge metric invoked on the statistical path".to_string(),
        })
    }
}

macro_rules! llm_judge_metric {
    ($(#[$doc:meta])* $name:ident, $instruction:expr) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name;

        #[async_trait]
        impl Metric for $name {
            fn name(&self) -> &str {
                stringify!($name)
            }

            fn judge_instruction(&self) -> Option<&str> {
                Some($instruction)
            }
        }
    };
}

llm_judge_metric!(
    /// Scores how clear and internally consistent the submission is.
    ClarityCoherence,
    "あなたはSubmissionの明瞭性と一貫性を評価する審査員です。\
     文章構成の分かりやすさ、論理の一貫性、表現の明確さを観点として、\
     Submissionを0から100の数値で採点してください。"
);

llm_judge_metric!(
    /// Scores how completely the submission covers the user's task.
    Coverage,
    "あなたはSubmissionの包括性を評価する審査員です。\
     ユーザのタスクが要求する論点をどれだけ漏れなく扱えているかを観点として、\
     Submissionを0から100の数値で採点してください。"
);

llm_judge_metric!(
    /// Scores how relevant the submission is to the user's task.
    Relevance,
    "あなたはSubmissionの関連性を評価する審査員です。\
     ユーザのタスクに対してどれだけ的確に応答しているか、余計な内容が\
     含まれていないかを観点として、Submissionを0から100の数値で採点してください。"
);

llm_judge_metric!(
    /// General-purpose LLM quality judgment without a fixed rubric.
    LLMPlain,
    "あなたはSubmissionの総合的な品質を評価する審査員です。\
     正確さ、有用さ、完成度を総合して、Submissionを0から100の数値で\
     採点してください。"
);

/// The built-in metric registry.
pub fn builtin_metrics() -> Vec<std::sync::Arc<dyn Metric>> {
    vec![
        std::sync::Arc::new(ClarityCoherence),
        std::sync::Arc::new(Coverage),
        std::sync::Arc::new(Relevance),
        std::sync::Arc::new(LLMPlain),
    ]
}
