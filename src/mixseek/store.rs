//! Aggregation store: the embedded analytical state for one workspace.
//!
//! One SQLite file (`mixseek.db` in the workspace) holds per-round records,
//! leader-board rows, aggregated message histories, and execution summaries.
//! Every public method is async sugar over `spawn_blocking` with a fresh
//! connection per call; SQLite's writer lock serializes concurrent team
//! writes, and `mark_final_submission` runs clear-then-set inside one
//! transaction so "last call wins" holds under races.
//!
//! The store's lifetime may outlive one execution: every row carries the
//! `execution_id` so a single query isolates one run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::mixseek::client_wrapper::Message;
use crate::mixseek::error::MixSeekError;
use crate::mixseek::leader::{message_to_json, MemberSubmissionsRecord};

/// Default store file name inside the workspace.
pub const STORE_FILE_NAME: &str = "mixseek.db";

/// One row of the cross-team ranking query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    pub team_id: String,
    pub team_name: String,
    pub max_score: f64,
    pub total_rounds: u32,
}

/// One leader-board row: a (team, round) pair with its score. Exactly one
/// row per (execution, team) carries `final_submission = true`.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderBoardEntry {
    pub execution_id: String,
    pub team_id: String,
    pub team_name: String,
    pub round_number: u32,
    pub submission_content: String,
    pub submission_format: String,
    pub score: f64,
    pub score_details: HashMap<String, f64>,
    pub final_submission: bool,
    pub exit_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// JSON views of one persisted aggregation row.
#[derive(Debug, Clone)]
pub struct AggregationRecord {
    pub submissions: serde_json::Value,
    pub leader_messages: serde_json::Value,
}

/// Process-lifetime store of round records, leader-board rows, and
/// execution summaries.
#[derive(Clone)]
pub struct AggregationStore {
    db_path: PathBuf,
}

impl AggregationStore {
    /// Open (creating if needed) the store at the given path and ensure the
    /// schema exists.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, MixSeekError> {
        let path = db_path.as_ref().to_path_buf();
        let store = AggregationStore { db_path: path };
        store
            .with_conn(|conn| {
                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS round_status (
                        execution_id TEXT NOT NULL,
                        team_id TEXT NOT NULL,
                        round_number INTEGER NOT NULL,
                        started_at TEXT NOT NULL,
                        ended_at TEXT,
                        status TEXT NOT NULL,
                        error_message TEXT,
                        PRIMARY KEY (execution_id, team_id, round_number)
                    );
                    CREATE TABLE IF NOT EXISTS leader_board (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        execution_id TEXT NOT NULL,
                        team_id TEXT NOT NULL,
                        team_name TEXT NOT NULL,
                        round_number INTEGER NOT NULL,
                        submission_content TEXT NOT NULL,
                        submission_format TEXT NOT NULL,
                        score REAL NOT NULL,
                        score_details TEXT NOT NULL,
                        final_submission INTEGER NOT NULL DEFAULT 0,
                        exit_reason TEXT,
                        created_at TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_leader_board_execution
                        ON leader_board(execution_id, team_id);
                    CREATE TABLE IF NOT EXISTS aggregations (
                        execution_id TEXT NOT NULL,
                        team_id TEXT NOT NULL,
                        round_number INTEGER NOT NULL,
                        submissions_json TEXT NOT NULL,
                        leader_messages_json TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        PRIMARY KEY (execution_id, team_id, round_number)
                    );
                    CREATE TABLE IF NOT EXISTS execution_summaries (
                        execution_id TEXT PRIMARY KEY,
                        user_prompt TEXT NOT NULL,
                        status TEXT NOT NULL,
                        team_results_json TEXT NOT NULL,
                        total_teams INTEGER NOT NULL,
                        best_team_id TEXT,
                        best_score REAL,
                        total_execution_time_seconds REAL NOT NULL,
                        created_at TEXT NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MixSeekError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MixSeekError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| MixSeekError::Store(format!("store task join error: {}", e)))?
    }

    /// Persist the member submissions and leader message history for one
    /// round. Idempotent per (execution_id, team_id, round_number): saving
    /// the same key twice leaves one logical record.
    pub async fn save_aggregation(
        &self,
        record: &MemberSubmissionsRecord,
        leader_messages: &[Message],
    ) -> Result<(), MixSeekError> {
        let execution_id = record.execution_id.clone();
        let team_id = record.team_id.clone();
        let round_number = record.round_number;
        let submissions_json = record.submissions_json().to_string();
        let leader_messages_json = serde_json::Value::Array(
            leader_messages.iter().map(message_to_json).collect(),
        )
        .to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO aggregations \
                 (execution_id, team_id, round_number, submissions_json, leader_messages_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    execution_id,
                    team_id,
                    round_number,
                    submissions_json,
                    leader_messages_json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Record one round's observable status.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_round_status(
        &self,
        execution_id: &str,
        team_id: &str,
        round_number: u32,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<(), MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        let status = status.to_string();
        let error_message = error_message.map(str::to_owned);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO round_status \
                 (execution_id, team_id, round_number, started_at, ended_at, status, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    execution_id,
                    team_id,
                    round_number,
                    started_at.to_rfc3339(),
                    ended_at.map(|t| t.to_rfc3339()),
                    status,
                    error_message,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Append one leader-board row for a completed round.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_to_leader_board(
        &self,
        execution_id: &str,
        team_id: &str,
        team_name: &str,
        round_number: u32,
        submission_content: &str,
        submission_format: &str,
        score: f64,
        score_details: &HashMap<String, f64>,
    ) -> Result<(), MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        let team_name = team_name.to_string();
        let submission_content = submission_content.to_string();
        let submission_format = submission_format.to_string();
        let score_details = serde_json::to_string(score_details)
            .map_err(|e| MixSeekError::Store(format!("score_details not serializable: {}", e)))?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO leader_board \
                 (execution_id, team_id, team_name, round_number, submission_content, \
                  submission_format, score, score_details, final_submission, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
                params![
                    execution_id,
                    team_id,
                    team_name,
                    round_number,
                    submission_content,
                    submission_format,
                    score,
                    score_details,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Flip `final_submission` to the given round for a (execution, team)
    /// pair. Clears any prior final flag for the pair in the same
    /// transaction; the latest call wins.
    pub async fn mark_final_submission(
        &self,
        execution_id: &str,
        team_id: &str,
        round_number: u32,
        exit_reason: &str,
    ) -> Result<(), MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        let exit_reason = exit_reason.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE leader_board SET final_submission = 0 \
                 WHERE execution_id = ?1 AND team_id = ?2",
                params![execution_id, team_id],
            )?;
            let updated = tx.execute(
                "UPDATE leader_board SET final_submission = 1, exit_reason = ?4 \
                 WHERE execution_id = ?1 AND team_id = ?2 AND round_number = ?3",
                params![execution_id, team_id, round_number, exit_reason],
            )?;
            if updated == 0 {
                return Err(MixSeekError::Store(format!(
                    "no leader_board row for execution '{}' team '{}' round {}",
                    execution_id, team_id, round_number
                )));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Cross-team ranking for one execution: best score per team, sorted by
    /// score descending with `team_id` ascending as the deterministic
    /// tie-break. An empty result is a normal outcome, not an error.
    pub async fn get_leader_board_ranking(
        &self,
        execution_id: &str,
    ) -> Result<Vec<RankingRow>, MixSeekError> {
        let execution_id = execution_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT team_id, team_name, MAX(score) AS max_score, COUNT(*) AS total_rounds \
                 FROM leader_board WHERE execution_id = ?1 \
                 GROUP BY team_id, team_name \
                 ORDER BY max_score DESC, team_id ASC",
            )?;
            let rows = stmt
                .query_map(params![execution_id], |row| {
                    Ok(RankingRow {
                        team_id: row.get(0)?,
                        team_name: row.get(1)?,
                        max_score: row.get(2)?,
                        total_rounds: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Every leader-board row for one team, in round order.
    pub async fn get_leader_board_entries(
        &self,
        execution_id: &str,
        team_id: &str,
    ) -> Result<Vec<LeaderBoardEntry>, MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id, team_id, team_name, round_number, submission_content, \
                        submission_format, score, score_details, final_submission, exit_reason, \
                        created_at \
                 FROM leader_board \
                 WHERE execution_id = ?1 AND team_id = ?2 \
                 ORDER BY round_number ASC",
            )?;
            let rows = stmt
                .query_map(params![execution_id, team_id], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Read back one round's aggregation record, if present.
    pub async fn get_aggregation(
        &self,
        execution_id: &str,
        team_id: &str,
        round_number: u32,
    ) -> Result<Option<AggregationRecord>, MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT submissions_json, leader_messages_json FROM aggregations \
                     WHERE execution_id = ?1 AND team_id = ?2 AND round_number = ?3",
                    params![execution_id, team_id, round_number],
                    |row| {
                        let submissions_raw: String = row.get(0)?;
                        let messages_raw: String = row.get(1)?;
                        Ok((submissions_raw, messages_raw))
                    },
                )
                .optional()?;
            Ok(record.map(|(submissions_raw, messages_raw)| AggregationRecord {
                submissions: serde_json::from_str(&submissions_raw)
                    .unwrap_or(serde_json::Value::Null),
                leader_messages: serde_json::from_str(&messages_raw)
                    .unwrap_or(serde_json::Value::Null),
            }))
        })
        .await
    }

    /// The row marked final for one team, if any.
    pub async fn get_final_submission(
        &self,
        execution_id: &str,
        team_id: &str,
    ) -> Result<Option<LeaderBoardEntry>, MixSeekError> {
        let execution_id = execution_id.to_string();
        let team_id = team_id.to_string();
        self.with_conn(move |conn| {
            let entry = conn
                .query_row(
                    "SELECT execution_id, team_id, team_name, round_number, submission_content, \
                            submission_format, score, score_details, final_submission, exit_reason, \
                            created_at \
                     FROM leader_board \
                     WHERE execution_id = ?1 AND team_id = ?2 AND final_submission = 1",
                    params![execution_id, team_id],
                    row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    /// Persist the final execution summary.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_execution_summary(
        &self,
        execution_id: &str,
        user_prompt: &str,
        status: &str,
        team_results: &[LeaderBoardEntry],
        total_teams: usize,
        best_team_id: Option<&str>,
        best_score: Option<f64>,
        total_execution_time_seconds: f64,
    ) -> Result<(), MixSeekError> {
        let execution_id = execution_id.to_string();
        let user_prompt = user_prompt.to_string();
        let status = status.to_string();
        let team_results_json = serde_json::to_string(team_results)
            .map_err(|e| MixSeekError::Store(format!("team_results not serializable: {}", e)))?;
        let best_team_id = best_team_id.map(str::to_owned);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO execution_summaries \
                 (execution_id, user_prompt, status, team_results_json, total_teams, \
                  best_team_id, best_score, total_execution_time_seconds, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    execution_id,
                    user_prompt,
                    status,
                    team_results_json,
                    total_teams as i64,
                    best_team_id,
                    best_score,
                    total_execution_time_seconds,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LeaderBoardEntry> {
    let score_details_raw: String = row.get(7)?;
    let created_at_raw: String = row.get(10)?;
    Ok(LeaderBoardEntry {
        execution_id: row.get(0)?,
        team_id: row.get(1)?,
        team_name: row.get(2)?,
        round_number: row.get(3)?,
        submission_content: row.get(4)?,
        submission_format: row.get(5)?,
        score: row.get(6)?,
        score_details: serde_json::from_str(&score_details_raw).unwrap_or_default(),
        final_submission: row.get::<_, i64>(8)? != 0,
        exit_reason: row.get(9)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
