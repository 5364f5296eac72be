use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::domain::models::TargetRole;

pub struct RoleRepository {
    pool: SqlitePool,
}

impl RoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The pipeline reads exactly one active role per run.
    pub async fn get_active(&self) -> Result<Option<TargetRole>> {
        let row = sqlx::query(
            "SELECT id, name, is_active FROM job_roles WHERE is_active = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch active role")?;

        Ok(row.map(|row| TargetRole {
            id: row.get("id"),
            name: row.get("name"),
            is_active: row.get::<i64, _>("is_active") != 0,
        }))
    }
}
