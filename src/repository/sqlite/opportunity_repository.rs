use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{map_opportunity_status, parse_datetime};
use crate::domain::models::{JobOpportunity, OpportunityStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Refreshed,
}

pub struct OpportunityRepository {
    pool: SqlitePool,
}

impl OpportunityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert on first discovery; on rediscovery advance last_update only.
    /// The stored score and status are never overwritten by the crawler.
    /// Check-then-act is safe here: a run is the sole writer for its role.
    pub async fn upsert(
        &self,
        url: &str,
        role_id: i64,
        score: i64,
        status: OpportunityStatus,
        when: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let existing =
            sqlx::query("SELECT 1 FROM job_opportunities WHERE url = ? AND job_role_id = ?")
                .bind(url)
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to check for existing opportunity")?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE job_opportunities SET last_update = ? WHERE url = ? AND job_role_id = ?",
            )
            .bind(when.to_rfc3339())
            .bind(url)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .context("Failed to refresh opportunity")?;

            return Ok(UpsertOutcome::Refreshed);
        }

        sqlx::query(
            "INSERT INTO job_opportunities (url, job_role_id, score, status, last_update, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(url)
        .bind(role_id)
        .bind(score)
        .bind(status.as_str())
        .bind(when.to_rfc3339())
        .bind(when.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert opportunity")?;

        Ok(UpsertOutcome::Inserted)
    }

    pub async fn get(&self, url: &str, role_id: i64) -> Result<Option<JobOpportunity>> {
        let row = sqlx::query(
            "SELECT url, job_role_id, score, status, last_update, created_at \
             FROM job_opportunities WHERE url = ? AND job_role_id = ?",
        )
        .bind(url)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch opportunity")?;

        Ok(row.map(map_row))
    }

    pub async fn list_for_role(&self, role_id: i64) -> Result<Vec<JobOpportunity>> {
        let rows = sqlx::query(
            "SELECT url, job_role_id, score, status, last_update, created_at \
             FROM job_opportunities WHERE job_role_id = ? ORDER BY created_at ASC, url ASC",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch opportunities")?;

        Ok(rows.into_iter().map(map_row).collect())
    }
}

fn map_row(row: sqlx::sqlite::SqliteRow) -> JobOpportunity {
    JobOpportunity {
        url: row.get("url"),
        job_role_id: row.get("job_role_id"),
        score: row.get("score"),
        status: map_opportunity_status(row.get::<String, _>("status").as_str()),
        last_update: parse_datetime(row.get::<String, _>("last_update").as_str()),
        created_at: parse_datetime(row.get::<String, _>("created_at").as_str()),
    }
}
