use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use jobbinsikt::db::init_db;
use jobbinsikt::domain::models::SearchSettings;
use jobbinsikt::extractor::BrowserFetcher;
use jobbinsikt::logger::SearchLog;
use jobbinsikt::service::{ContentAnalyser, Searcher};

/// Crawl the watchlisted career pages for the active job role and store
/// every posting that scores at or above the threshold.
#[derive(Parser, Debug)]
#[command(name = "jobbinsikt", version, about)]
struct Args {
    /// Path to the SQLite database file.
    #[arg(long, default_value = "jobsearch.db")]
    database: PathBuf,

    /// Minimum relevance score (0-100) for a posting to be stored.
    #[arg(short = 's', long, default_value_t = 80)]
    score_threshold: i64,

    /// Stop the run after this many postings have qualified.
    #[arg(short = 'o', long)]
    max_opportunities: Option<i64>,

    /// Stop the run after this many postings have been examined.
    #[arg(short = 'd', long)]
    max_job_descriptions: Option<i64>,

    /// Directory for the per-session audit log files.
    #[arg(short = 'l', long, default_value = "logs")]
    log_dir: PathBuf,

    /// Echo debug detail to the console as well.
    #[arg(long)]
    verbose: bool,

    /// Chat-completions endpoint of the inference backend.
    #[arg(
        long,
        env = "INFERENCE_URL",
        default_value = "http://localhost:8080/v1/chat/completions"
    )]
    inference_url: String,

    /// Inference request timeout in seconds.
    #[arg(long, env = "INFERENCE_TIMEOUT", default_value_t = 120)]
    inference_timeout: u64,

    /// Model name passed to the inference backend.
    #[arg(long, env = "MODEL_NAME_FOR_CAREER_PAGE", default_value = "default")]
    model: String,

    /// Character budget for full-text prompts.
    #[arg(long, env = "MAX_CHARS_FOR_CONTEXT", default_value_t = 24_000)]
    max_context_chars: usize,

    /// Page render timeout in seconds.
    #[arg(long, default_value_t = 60)]
    fetch_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = SearchSettings {
        inference_url: args.inference_url,
        inference_timeout: Duration::from_secs(args.inference_timeout),
        model_name: args.model,
        max_context_chars: args.max_context_chars,
        score_threshold: args.score_threshold,
        max_descriptions: args.max_job_descriptions,
        max_opportunities: args.max_opportunities,
        fetch_timeout: Duration::from_secs(args.fetch_timeout),
    };

    let log_path = args.log_dir.join(format!(
        "search_session_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let log = Arc::new(
        SearchLog::create(&log_path, args.verbose)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?,
    );
    log::info!("[SEARCH] Audit log: {}", log_path.display());

    let pool = init_db(&args.database).await?;

    let fetcher = BrowserFetcher::launch(settings.fetch_timeout).await?;
    let analyser = ContentAnalyser::new(&settings, Arc::clone(&log))?;

    let mut searcher = Searcher::new(
        pool,
        Box::new(fetcher),
        Box::new(analyser),
        settings,
        Arc::clone(&log),
    );

    let report = searcher.run().await?;
    log::info!(
        "[SEARCH] Done: {} examined, {} saved, {} refreshed, {} skipped ({:?})",
        report.examined,
        report.saved,
        report.refreshed,
        report.skipped,
        report.stop
    );

    Ok(())
}
