//! Shared fixtures and stubs for unit and integration tests.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory database with the full schema applied. Single connection so
/// every query in a test sees the same memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("failed to apply migrations");

    pool
}

pub mod fixtures {
    use super::*;
    use crate::domain::models::SearchSettings;

    pub async fn seed_role(pool: &SqlitePool, name: &str, is_active: bool) -> i64 {
        sqlx::query("INSERT INTO job_roles (name, description, is_active) VALUES (?, ?, ?)")
            .bind(name)
            .bind(format!("Looking for a {name} position"))
            .bind(is_active)
            .execute(pool)
            .await
            .expect("failed to seed role")
            .last_insert_rowid()
    }

    pub async fn seed_watchlist(pool: &SqlitePool, role_id: i64, url: &str, page_type: &str) {
        sqlx::query("INSERT INTO watchlist (url, job_role_id, page_type) VALUES (?, ?, ?)")
            .bind(url)
            .bind(role_id)
            .bind(page_type)
            .execute(pool)
            .await
            .expect("failed to seed watchlist entry");
    }

    /// Settings pointed at nothing in particular; tests that talk to a mock
    /// backend override `inference_url`.
    pub fn settings_with_threshold(score_threshold: i64) -> SearchSettings {
        SearchSettings {
            inference_url: "http://127.0.0.1:1/v1/chat/completions".to_string(),
            inference_timeout: Duration::from_secs(5),
            model_name: "test-model".to_string(),
            max_context_chars: 24_000,
            score_threshold,
            max_descriptions: None,
            max_opportunities: None,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

pub mod stubs {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::domain::models::{JobDescription, TargetRole};
    use crate::error::{AppError, Result};
    use crate::extractor::PageFetcher;
    use crate::service::RelevanceScorer;

    /// Canned page fetcher: serves registered HTML by URL and records every
    /// fetch. Unregistered URLs fail like an unreachable site would.
    pub struct StubFetcher {
        pages: HashMap<String, String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Handle to the call record that stays usable after the fetcher is
        /// moved into a `Searcher`.
        pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.calls)
        }
    }

    impl Default for StubFetcher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(format!("no route to {url}")))
        }
    }

    /// Scripted scorer keyed by description URL. Unscripted descriptions
    /// score 0, which always falls below any useful threshold; URLs scripted
    /// to fail behave like an unreachable inference backend.
    pub struct StubScorer {
        title_scores: HashMap<String, i64>,
        full_scores: HashMap<String, i64>,
        title_errors: HashSet<String>,
        full_errors: HashSet<String>,
        title_calls: Arc<Mutex<Vec<String>>>,
        full_calls: Arc<Mutex<Vec<String>>>,
    }

    impl StubScorer {
        pub fn new() -> Self {
            Self {
                title_scores: HashMap::new(),
                full_scores: HashMap::new(),
                title_errors: HashSet::new(),
                full_errors: HashSet::new(),
                title_calls: Arc::new(Mutex::new(Vec::new())),
                full_calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_title_score(mut self, url: &str, score: i64) -> Self {
            self.title_scores.insert(url.to_string(), score);
            self
        }

        pub fn with_full_score(mut self, url: &str, score: i64) -> Self {
            self.full_scores.insert(url.to_string(), score);
            self
        }

        pub fn with_title_error(mut self, url: &str) -> Self {
            self.title_errors.insert(url.to_string());
            self
        }

        pub fn with_full_error(mut self, url: &str) -> Self {
            self.full_errors.insert(url.to_string());
            self
        }

        pub fn title_call_log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.title_calls)
        }

        pub fn full_call_log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.full_calls)
        }
    }

    impl Default for StubScorer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RelevanceScorer for StubScorer {
        async fn score_by_title(
            &self,
            description: &JobDescription,
            _role: &TargetRole,
        ) -> Result<i64> {
            self.title_calls.lock().unwrap().push(description.url.clone());
            if self.title_errors.contains(&description.url) {
                return Err(AppError::inference(format!(
                    "backend unavailable for {}",
                    description.url
                )));
            }
            Ok(self.title_scores.get(&description.url).copied().unwrap_or(0))
        }

        async fn score_by_full_text(
            &self,
            description: &JobDescription,
            _role: &TargetRole,
        ) -> Result<i64> {
            self.full_calls.lock().unwrap().push(description.url.clone());
            if self.full_errors.contains(&description.url) {
                return Err(AppError::inference(format!(
                    "backend unavailable for {}",
                    description.url
                )));
            }
            Ok(self.full_scores.get(&description.url).copied().unwrap_or(0))
        }
    }
}
