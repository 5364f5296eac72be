use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::parse_datetime;
use crate::domain::models::WatchlistEntry;

pub struct WatchlistRepository {
    pool: SqlitePool,
}

impl WatchlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, url: &str, role_id: i64, page_type: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO watchlist (url, job_role_id, page_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(url)
        .bind(role_id)
        .bind(page_type)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to add watchlist entry")?;

        Ok(())
    }

    /// Entries in store order: insertion order, with URL as a tiebreaker so
    /// a run visits them deterministically.
    pub async fn list_for_role(&self, role_id: i64) -> Result<Vec<WatchlistEntry>> {
        let rows = sqlx::query(
            "SELECT url, job_role_id, page_type, last_visit, created_at \
             FROM watchlist WHERE job_role_id = ? ORDER BY created_at ASC, url ASC",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch watchlist")?;

        Ok(rows
            .into_iter()
            .map(|row| WatchlistEntry {
                url: row.get("url"),
                job_role_id: row.get("job_role_id"),
                page_type: row.get("page_type"),
                last_visit: row
                    .get::<Option<String>, _>("last_visit")
                    .as_deref()
                    .map(parse_datetime),
                created_at: parse_datetime(row.get::<String, _>("created_at").as_str()),
            })
            .collect())
    }

    /// Record a successfully completed extraction pass. Entries whose fetch
    /// failed keep their previous last_visit and are retried next run.
    pub async fn touch_visit(&self, url: &str, role_id: i64, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE watchlist SET last_visit = ? WHERE url = ? AND job_role_id = ?")
            .bind(when.to_rfc3339())
            .bind(url)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .context("Failed to update watchlist visit time")?;

        Ok(())
    }
}
