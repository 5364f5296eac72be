//! Domain entities for the job search pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};

// ====== Enums ======

/// Workflow status of a stored opportunity. The crawler only ever writes
/// `New`; `Ignore` is set by the user and must survive rediscovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OpportunityStatus {
    New,
    Ignore,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::New => "New",
            OpportunityStatus::Ignore => "Ignore",
        }
    }
}

// ====== Persistent entities ======

/// The role the search runs against. Read-only to the pipeline.
#[derive(Debug, Clone)]
pub struct TargetRole {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

/// One monitored career-page URL, scoped to a role. `last_visit` advances
/// only after a successfully completed extraction pass.
#[derive(Debug, Clone)]
pub struct WatchlistEntry {
    pub url: String,
    pub job_role_id: i64,
    pub page_type: String,
    pub last_visit: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A discovered posting, unique per (url, role) for all time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobOpportunity {
    pub url: String,
    pub job_role_id: i64,
    pub score: i64,
    pub status: OpportunityStatus,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Audit record for one pipeline run. `ended_at` stays NULL while the run
/// is in flight or if it crashed.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub id: String,
    pub job_role_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub score_threshold: i64,
    pub log_file_path: Option<String>,
}

// ====== Transient value object ======

/// A candidate posting as extracted from a career page: a short description
/// (typically the anchor text) plus its URL. The full page content is only
/// fetched for candidates whose title score clears the threshold.
#[derive(Debug, Clone)]
pub struct JobDescription {
    pub description: String,
    pub url: String,
    pub content: Option<String>,
}

impl JobDescription {
    pub fn new(description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            url: url.into(),
            content: None,
        }
    }
}

// ====== Configuration ======

/// Run configuration, supplied by the caller (the CLI runner builds it from
/// flags and environment). The pipeline never reads the environment itself.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub inference_url: String,
    pub inference_timeout: Duration,
    pub model_name: String,
    /// Character budget for full-text analysis (context-window safety).
    pub max_context_chars: usize,
    pub score_threshold: i64,
    /// Run-scoped ceiling on descriptions examined; None = unlimited.
    pub max_descriptions: Option<i64>,
    /// Run-scoped ceiling on opportunities accepted; None = unlimited.
    pub max_opportunities: Option<i64>,
    pub fetch_timeout: Duration,
}
