use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::parse_datetime;
use crate::domain::models::SearchSession;

pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the audit record for a run. Returns the session ID.
    pub async fn create(
        &self,
        role_id: i64,
        score_threshold: i64,
        log_file_path: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO search_sessions (id, job_role_id, started_at, score_threshold, log_file_path) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(role_id)
        .bind(Utc::now().to_rfc3339())
        .bind(score_threshold)
        .bind(log_file_path)
        .execute(&self.pool)
        .await
        .context("Failed to create search session")?;

        log::info!("Created search session {} for role {}", id, role_id);
        Ok(id)
    }

    /// Mark the run as finished. A session without an end time either is
    /// still running or crashed.
    pub async fn finish(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE search_sessions SET ended_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to finish search session")?;

        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SearchSession>> {
        let row = sqlx::query(
            "SELECT id, job_role_id, started_at, ended_at, score_threshold, log_file_path \
             FROM search_sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch search session")?;

        Ok(row.map(|row| SearchSession {
            id: row.get("id"),
            job_role_id: row.get("job_role_id"),
            started_at: parse_datetime(row.get::<String, _>("started_at").as_str()),
            ended_at: row
                .get::<Option<String>, _>("ended_at")
                .as_deref()
                .map(parse_datetime),
            score_threshold: row.get("score_threshold"),
            log_file_path: row.get("log_file_path"),
        }))
    }
}
