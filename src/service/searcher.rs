//! Run orchestration: one crawl of the watchlist for the active role.
//!
//! Failure isolation is layered: a fetch error skips the watchlist entry, an
//! inference error or a failed full-content fetch skips the single
//! description, and only the run-scoped budgets stop the whole run. Every
//! decision is narrated in the audit log.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::models::{
    OpportunityStatus, SearchSettings, TargetRole, WatchlistEntry,
};
use crate::error::Result;
use crate::extractor::{CareerPage, PageFetcher};
use crate::logger::SearchLog;
use crate::repository::sqlite::{
    OpportunityRepository, RoleRepository, SessionRepository, UpsertOutcome, WatchlistRepository,
};
use crate::service::RelevanceScorer;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All watchlist entries processed.
    Completed,
    /// No active role configured; the run was a no-op.
    NoActiveRole,
    /// The max-examined budget was reached.
    MaxDescriptions,
    /// The max-accepted budget was reached.
    MaxOpportunities,
}

/// Totals for one run, returned to the caller and logged as the session
/// summary.
#[derive(Debug)]
pub struct RunReport {
    pub examined: i64,
    pub accepted: i64,
    pub saved: i64,
    pub refreshed: i64,
    pub skipped: i64,
    pub entries_visited: i64,
    pub stop: StopReason,
}

impl RunReport {
    fn new() -> Self {
        Self {
            examined: 0,
            accepted: 0,
            saved: 0,
            refreshed: 0,
            skipped: 0,
            entries_visited: 0,
            stop: StopReason::Completed,
        }
    }
}

enum EntryOutcome {
    Completed,
    BudgetReached(StopReason),
}

/// Drives one crawl. An instance owns its counters, persistence session and
/// log handle for the duration of a run; counters reset when `run` starts,
/// so the same instance can serve sequential runs but never concurrent ones.
pub struct Searcher {
    roles: RoleRepository,
    watchlist: WatchlistRepository,
    opportunities: OpportunityRepository,
    sessions: SessionRepository,
    fetcher: Box<dyn PageFetcher>,
    scorer: Box<dyn RelevanceScorer>,
    settings: SearchSettings,
    log: Arc<SearchLog>,
    examined: i64,
    accepted: i64,
}

impl Searcher {
    pub fn new(
        pool: SqlitePool,
        fetcher: Box<dyn PageFetcher>,
        scorer: Box<dyn RelevanceScorer>,
        settings: SearchSettings,
        log: Arc<SearchLog>,
    ) -> Self {
        Self {
            roles: RoleRepository::new(pool.clone()),
            watchlist: WatchlistRepository::new(pool.clone()),
            opportunities: OpportunityRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool),
            fetcher,
            scorer,
            settings,
            log,
            examined: 0,
            accepted: 0,
        }
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let started = Instant::now();
        self.examined = 0;
        self.accepted = 0;
        let mut report = RunReport::new();

        self.log.write(&"=".repeat(80));
        self.log.write("JOB SEARCH SESSION STARTED");
        self.log.write(&"=".repeat(80));
        self.log.write(&format!(
            "Score threshold: {}",
            self.settings.score_threshold
        ));
        self.log.write(&format!(
            "Max job descriptions: {}",
            limit_label(self.settings.max_descriptions)
        ));
        self.log.write(&format!(
            "Max opportunities: {}",
            limit_label(self.settings.max_opportunities)
        ));

        let Some(role) = self.roles.get_active().await? else {
            self.log.write("No active job role found, nothing to search");
            report.stop = StopReason::NoActiveRole;
            return Ok(report);
        };
        self.log.write(&format!("Active role: {}", role.name));

        let log_path = self
            .log
            .path()
            .map(|p| p.display().to_string());
        let session_id = self
            .sessions
            .create(role.id, self.settings.score_threshold, log_path.as_deref())
            .await?;
        self.log.write(&format!("Search session: {session_id}"));

        let entries = self.watchlist.list_for_role(role.id).await?;
        if entries.is_empty() {
            self.log.write("WARNING: watchlist is empty for this role");
        } else {
            self.log
                .write(&format!("Found {} URLs in the watchlist", entries.len()));
        }

        for entry in &entries {
            self.log.write(&"-".repeat(80));
            self.log.write(&format!("Checking: {}", entry.url));

            match self.process_entry(entry, &role, &mut report).await {
                Ok(EntryOutcome::Completed) => {
                    report.entries_visited += 1;
                    self.watchlist
                        .touch_visit(&entry.url, role.id, Utc::now())
                        .await?;
                }
                Ok(EntryOutcome::BudgetReached(reason)) => {
                    report.stop = reason;
                    break;
                }
                Err(e) => {
                    // Per-entry isolation: one bad target never aborts the run.
                    self.log
                        .write(&format!("  Error processing {}: {e}", entry.url));
                }
            }
        }

        report.examined = self.examined;
        report.accepted = self.accepted;
        self.sessions.finish(&session_id).await?;

        self.log.write(&"-".repeat(80));
        match report.stop {
            StopReason::Completed => self.log.write("SEARCH SESSION COMPLETED"),
            StopReason::MaxDescriptions => self
                .log
                .write("SEARCH SESSION STOPPED EARLY (max job descriptions reached)"),
            StopReason::MaxOpportunities => self
                .log
                .write("SEARCH SESSION STOPPED EARLY (max opportunities reached)"),
            StopReason::NoActiveRole => {}
        }
        self.log.write(&format!(
            "Duration: {:.2} seconds",
            started.elapsed().as_secs_f64()
        ));
        self.log.write(&format!(
            "Job descriptions examined: {}",
            report.examined
        ));
        self.log.write(&format!(
            "Opportunities: {} new, {} refreshed, {} skipped",
            report.saved, report.refreshed, report.skipped
        ));
        self.log.write(&"=".repeat(80));

        Ok(report)
    }

    async fn process_entry(
        &mut self,
        entry: &WatchlistEntry,
        role: &TargetRole,
        report: &mut RunReport,
    ) -> Result<EntryOutcome> {
        let page = CareerPage::new(&entry.url, &entry.page_type);
        let mut descriptions = page
            .job_descriptions(self.fetcher.as_ref(), &self.log)
            .await?;
        self.log.write(&format!(
            "  Found {} job descriptions on the page",
            descriptions.len()
        ));

        for description in &mut descriptions {
            // "Examined" counts at inspection start, independent of what
            // happens downstream.
            self.examined += 1;
            if let Some(max) = self.settings.max_descriptions {
                if self.examined >= max {
                    self.log.write(&format!(
                        "Max job descriptions reached ({max}), stopping search"
                    ));
                    return Ok(EntryOutcome::BudgetReached(StopReason::MaxDescriptions));
                }
            }

            // Stage one: cheap title-only score gates the expensive path.
            let title_score = match self.scorer.score_by_title(description, role).await {
                Ok(score) => score,
                Err(e) => {
                    self.log.write(&format!(
                        "  Skipped (inference failure on title): {} ({e})",
                        description.url
                    ));
                    report.skipped += 1;
                    continue;
                }
            };
            self.log.debug(&format!(
                "  Title score {title_score} for {}",
                description.url
            ));

            if title_score < self.settings.score_threshold {
                self.log.write(&format!(
                    "  Skipped (below threshold, title score {title_score}): {}",
                    description.url
                ));
                report.skipped += 1;
                continue;
            }

            // Stage two: render the posting itself and score the full text.
            if let Err(e) =
                CareerPage::populate_content(description, self.fetcher.as_ref()).await
            {
                self.log.write(&format!(
                    "  Skipped (fetch failure): {} ({e})",
                    description.url
                ));
                report.skipped += 1;
                continue;
            }

            let full_score = match self.scorer.score_by_full_text(description, role).await {
                Ok(score) => score,
                Err(e) => {
                    self.log.write(&format!(
                        "  Skipped (inference failure on full text): {} ({e})",
                        description.url
                    ));
                    report.skipped += 1;
                    continue;
                }
            };

            // The full-text score supersedes the title score from here on.
            if full_score < self.settings.score_threshold {
                self.log.write(&format!(
                    "  Skipped (below threshold after full analysis, score {full_score}): {}",
                    description.url
                ));
                report.skipped += 1;
                continue;
            }

            self.accepted += 1;
            if let Some(max) = self.settings.max_opportunities {
                if self.accepted >= max {
                    self.log.write(&format!(
                        "Max opportunities reached ({max}), stopping search"
                    ));
                    return Ok(EntryOutcome::BudgetReached(StopReason::MaxOpportunities));
                }
            }

            match self
                .opportunities
                .upsert(
                    &description.url,
                    role.id,
                    full_score,
                    OpportunityStatus::New,
                    Utc::now(),
                )
                .await?
            {
                UpsertOutcome::Inserted => {
                    report.saved += 1;
                    self.log.write(&format!(
                        "  Saved opportunity: {} (score: {full_score})",
                        description.url
                    ));
                }
                UpsertOutcome::Refreshed => {
                    report.refreshed += 1;
                    self.log.write(&format!(
                        "  Opportunity already exists, refreshed: {} (stored score kept)",
                        description.url
                    ));
                }
            }
        }

        Ok(EntryOutcome::Completed)
    }
}

fn limit_label(limit: Option<i64>) -> String {
    match limit {
        Some(n) => n.to_string(),
        None => "unlimited".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::sqlite::{OpportunityRepository, WatchlistRepository};
    use crate::test_utils::stubs::{StubFetcher, StubScorer};
    use crate::test_utils::{fixtures, setup_test_db};

    const BOARD_A: &str = concat!(
        r#"<html><body>"#,
        r#"<a href="/jobs/1">Senior Rust Engineer</a>"#,
        r#"<a href="/jobs/2">Office Manager</a>"#,
        r#"</body></html>"#
    );

    fn searcher_with(
        pool: SqlitePool,
        fetcher: StubFetcher,
        scorer: StubScorer,
        settings: SearchSettings,
    ) -> Searcher {
        Searcher::new(
            pool,
            Box::new(fetcher),
            Box::new(scorer),
            settings,
            Arc::new(SearchLog::to_console(false)),
        )
    }

    #[tokio::test]
    async fn test_two_stage_scoring_scenario() {
        // Threshold 85; titles score 90 and 40. Only the first description
        // goes to full-text scoring (88) and is stored; the second gets no
        // full-page fetch at all.
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;

        let fetcher = StubFetcher::new()
            .with_page("https://a.test/careers", BOARD_A)
            .with_page("https://a.test/jobs/1", "<html>full posting</html>");
        let scorer = StubScorer::new()
            .with_title_score("https://a.test/jobs/1", 90)
            .with_title_score("https://a.test/jobs/2", 40)
            .with_full_score("https://a.test/jobs/1", 88);

        let mut searcher =
            searcher_with(pool.clone(), fetcher, scorer, fixtures::settings_with_threshold(85));
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.examined, 2);
        assert_eq!(report.saved, 1);
        assert_eq!(report.skipped, 1);

        let stored = OpportunityRepository::new(pool.clone())
            .get("https://a.test/jobs/1", role_id)
            .await
            .unwrap()
            .expect("qualifying opportunity stored");
        assert_eq!(stored.score, 88, "full-text score supersedes the title score");
        assert_eq!(stored.status, OpportunityStatus::New);

        assert!(
            OpportunityRepository::new(pool)
                .get("https://a.test/jobs/2", role_id)
                .await
                .unwrap()
                .is_none(),
            "below-threshold description is not stored"
        );
    }

    #[tokio::test]
    async fn test_below_threshold_title_never_triggers_full_fetch() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;

        let fetcher = StubFetcher::new().with_page("https://a.test/careers", BOARD_A);
        let scorer = StubScorer::new()
            .with_title_score("https://a.test/jobs/1", 10)
            .with_title_score("https://a.test/jobs/2", 20);

        let fetch_log = fetcher.call_log();
        let full_calls = scorer.full_call_log();

        let mut searcher =
            searcher_with(pool, fetcher, scorer, fixtures::settings_with_threshold(85));
        searcher.run().await.unwrap();

        assert_eq!(
            fetch_log.lock().unwrap().len(),
            1,
            "only the board itself is fetched"
        );
        assert!(full_calls.lock().unwrap().is_empty(), "no full-text scoring");
    }

    #[tokio::test]
    async fn test_examined_budget_stops_whole_run() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;
        fixtures::seed_watchlist(&pool, role_id, "https://b.test/careers", "ashbyhq").await;

        let fetcher = StubFetcher::new()
            .with_page("https://a.test/careers", BOARD_A)
            .with_page("https://b.test/careers", BOARD_A);
        let scorer = StubScorer::new();
        let fetch_log = fetcher.call_log();

        let mut settings = fixtures::settings_with_threshold(85);
        settings.max_descriptions = Some(2);

        let mut searcher = searcher_with(pool.clone(), fetcher, scorer, settings);
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::MaxDescriptions);
        assert_eq!(report.examined, 2);
        let calls = fetch_log.lock().unwrap();
        assert!(
            !calls.iter().any(|u| u.contains("b.test")),
            "remaining entries are skipped entirely, got {calls:?}"
        );

        // The interrupted entry is not marked visited.
        let entries = WatchlistRepository::new(pool)
            .list_for_role(role_id)
            .await
            .unwrap();
        assert!(entries.iter().all(|e| e.last_visit.is_none()));
    }

    #[tokio::test]
    async fn test_accepted_budget_stops_whole_run() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;
        fixtures::seed_watchlist(&pool, role_id, "https://b.test/careers", "ashbyhq").await;

        let fetcher = StubFetcher::new()
            .with_page("https://a.test/careers", BOARD_A)
            .with_page("https://a.test/jobs/1", "<html>one</html>")
            .with_page("https://a.test/jobs/2", "<html>two</html>");
        let scorer = StubScorer::new()
            .with_title_score("https://a.test/jobs/1", 95)
            .with_title_score("https://a.test/jobs/2", 95)
            .with_full_score("https://a.test/jobs/1", 95)
            .with_full_score("https://a.test/jobs/2", 95);
        let fetch_log = fetcher.call_log();

        let mut settings = fixtures::settings_with_threshold(85);
        settings.max_opportunities = Some(1);

        let mut searcher = searcher_with(pool, fetcher, scorer, settings);
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::MaxOpportunities);
        assert_eq!(report.accepted, 1);
        assert!(
            !fetch_log.lock().unwrap().iter().any(|u| u.contains("b.test")),
            "later candidates stay unevaluated"
        );
    }

    #[tokio::test]
    async fn test_failed_entry_is_isolated_and_not_marked_visited() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        // First entry's fetch fails (no page registered for it).
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;
        fixtures::seed_watchlist(&pool, role_id, "https://b.test/careers", "ashbyhq").await;

        let fetcher = StubFetcher::new().with_page(
            "https://b.test/careers",
            r#"<html><body><a href="/jobs/9">Rust Dev</a></body></html>"#,
        );
        let scorer = StubScorer::new().with_title_score("https://b.test/jobs/9", 10);

        let mut searcher =
            searcher_with(pool.clone(), fetcher, scorer, fixtures::settings_with_threshold(85));
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.entries_visited, 1, "only the healthy entry completes");

        let entries = WatchlistRepository::new(pool)
            .list_for_role(role_id)
            .await
            .unwrap();
        let failed = entries.iter().find(|e| e.url == "https://a.test/careers").unwrap();
        assert!(failed.last_visit.is_none(), "failed entry retried next run");
        let healthy = entries.iter().find(|e| e.url == "https://b.test/careers").unwrap();
        assert!(healthy.last_visit.is_some());
    }

    #[tokio::test]
    async fn test_full_content_fetch_failure_skips_description_only() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;

        // Board is served, but /jobs/1's own page is not, so its promising
        // title dead-ends at the content fetch; /jobs/2 still gets examined.
        let fetcher = StubFetcher::new().with_page("https://a.test/careers", BOARD_A);
        let scorer = StubScorer::new()
            .with_title_score("https://a.test/jobs/1", 95)
            .with_title_score("https://a.test/jobs/2", 10);

        let mut searcher =
            searcher_with(pool.clone(), fetcher, scorer, fixtures::settings_with_threshold(85));
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.examined, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.entries_visited, 1, "entry itself still completes");
    }

    #[tokio::test]
    async fn test_inference_failure_skips_only_that_description() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;

        let board = concat!(
            r#"<html><body>"#,
            r#"<a href="/jobs/1">Rust Engineer I</a>"#,
            r#"<a href="/jobs/2">Rust Engineer II</a>"#,
            r#"<a href="/jobs/3">Rust Engineer III</a>"#,
            r#"</body></html>"#
        );
        let fetcher = StubFetcher::new()
            .with_page("https://a.test/careers", board)
            .with_page("https://a.test/jobs/2", "<html>two</html>")
            .with_page("https://a.test/jobs/3", "<html>three</html>");
        // Title scoring fails for the first posting, full-text scoring for
        // the second; only the third makes it through.
        let scorer = StubScorer::new()
            .with_title_error("https://a.test/jobs/1")
            .with_title_score("https://a.test/jobs/2", 95)
            .with_full_error("https://a.test/jobs/2")
            .with_title_score("https://a.test/jobs/3", 95)
            .with_full_score("https://a.test/jobs/3", 90);
        let title_calls = scorer.title_call_log();

        let mut searcher =
            searcher_with(pool.clone(), fetcher, scorer, fixtures::settings_with_threshold(85));
        let report = searcher.run().await.unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.examined, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.saved, 1);
        assert_eq!(report.entries_visited, 1, "entry still completes");

        assert_eq!(
            title_calls.lock().unwrap().len(),
            3,
            "siblings of a failing description are still scored"
        );

        let opportunities = OpportunityRepository::new(pool.clone());
        assert!(opportunities
            .get("https://a.test/jobs/3", role_id)
            .await
            .unwrap()
            .is_some());
        assert!(opportunities
            .get("https://a.test/jobs/2", role_id)
            .await
            .unwrap()
            .is_none());

        let entries = WatchlistRepository::new(pool)
            .list_for_role(role_id)
            .await
            .unwrap();
        assert!(
            entries[0].last_visit.is_some(),
            "inference failures do not block the visit mark"
        );
    }

    #[tokio::test]
    async fn test_rediscovery_keeps_stored_score() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "ashbyhq").await;

        let opportunities = OpportunityRepository::new(pool.clone());
        let first_seen = Utc::now() - chrono::Duration::hours(3);
        opportunities
            .upsert("https://a.test/jobs/1", role_id, 70, OpportunityStatus::New, first_seen)
            .await
            .unwrap();

        let fetcher = StubFetcher::new()
            .with_page("https://a.test/careers", BOARD_A)
            .with_page("https://a.test/jobs/1", "<html>full</html>");
        let scorer = StubScorer::new()
            .with_title_score("https://a.test/jobs/1", 92)
            .with_title_score("https://a.test/jobs/2", 10)
            .with_full_score("https://a.test/jobs/1", 92);

        let mut searcher =
            searcher_with(pool, fetcher, scorer, fixtures::settings_with_threshold(85));
        let report = searcher.run().await.unwrap();

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.saved, 0);

        let stored = opportunities
            .get("https://a.test/jobs/1", role_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.score, 70, "rediscovery never overwrites the score");
        assert!(stored.last_update > first_seen);
    }

    #[tokio::test]
    async fn test_no_active_role_is_a_noop() {
        let pool = setup_test_db().await;
        fixtures::seed_role(&pool, "Inactive Role", false).await;

        let fetcher = StubFetcher::new();
        let fetch_log = fetcher.call_log();
        let mut searcher = searcher_with(
            pool,
            fetcher,
            StubScorer::new(),
            fixtures::settings_with_threshold(85),
        );

        let report = searcher.run().await.unwrap();
        assert_eq!(report.stop, StopReason::NoActiveRole);
        assert_eq!(report.examined, 0);
        assert!(fetch_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_watchlist_completes_normally() {
        let pool = setup_test_db().await;
        fixtures::seed_role(&pool, "Rust Engineer", true).await;

        let mut searcher = searcher_with(
            pool,
            StubFetcher::new(),
            StubScorer::new(),
            fixtures::settings_with_threshold(85),
        );

        let report = searcher.run().await.unwrap();
        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.entries_visited, 0);
    }

    #[tokio::test]
    async fn test_unknown_page_type_entry_is_tolerated_and_visited() {
        let pool = setup_test_db().await;
        let role_id = fixtures::seed_role(&pool, "Rust Engineer", true).await;
        fixtures::seed_watchlist(&pool, role_id, "https://a.test/careers", "workday").await;

        let mut searcher = searcher_with(
            pool.clone(),
            StubFetcher::new(),
            StubScorer::new(),
            fixtures::settings_with_threshold(85),
        );

        let report = searcher.run().await.unwrap();
        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.entries_visited, 1);

        let entries = WatchlistRepository::new(pool)
            .list_for_role(role_id)
            .await
            .unwrap();
        assert!(entries[0].last_visit.is_some(), "empty pass still counts as visited");
    }
}
