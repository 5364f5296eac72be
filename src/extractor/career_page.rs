//! Career page rendering and extraction.
//!
//! Target boards are mostly client-rendered, so plain HTTP bodies are
//! useless: pages go through a headless Chromium instance and the DOM is
//! captured only after load plus a network settle delay.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::domain::models::JobDescription;
use crate::error::{AppError, Result};
use crate::extractor::rules;
use crate::logger::SearchLog;

/// Fixed identifying user-agent, sent on every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Grace period after the load event for late XHR/render activity.
const NETWORK_SETTLE: Duration = Duration::from_millis(750);

/// Seam over the rendering engine so orchestration can be tested without a
/// browser process.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Render `url` and return the captured DOM as HTML.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Production fetcher: one headless Chromium per process, a fresh tab per
/// fetch.
pub struct BrowserFetcher {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    timeout: Duration,
}

impl BrowserFetcher {
    pub async fn launch(fetch_timeout: Duration) -> Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| AppError::fetch(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::fetch(format!("failed to launch browser: {e}")))?;

        // The handler drives the CDP websocket; it must be polled for the
        // browser to make progress.
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        log::info!("[BROWSER] Headless browser launched");
        Ok(Self {
            browser,
            handler_task,
            timeout: fetch_timeout,
        })
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String> {
        page.set_user_agent(SetUserAgentOverrideParams::new(USER_AGENT))
            .await
            .map_err(|e| AppError::fetch(format!("failed to set user agent: {e}")))?;

        timeout(self.timeout, page.goto(url))
            .await
            .map_err(|_| {
                AppError::fetch(format!(
                    "navigation timed out after {}s for {url}",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::fetch(format!("navigation failed for {url}: {e}")))?;

        timeout(self.timeout, page.wait_for_navigation())
            .await
            .map_err(|_| {
                AppError::fetch(format!(
                    "page load timed out after {}s for {url}",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::fetch(format!("page load failed for {url}: {e}")))?;

        sleep(NETWORK_SETTLE).await;

        page.content()
            .await
            .map_err(|e| AppError::fetch(format!("failed to capture DOM for {url}: {e}")))
    }
}

/// Dropping the fetcher kills the Chromium child via the `Browser` drop;
/// the handler task is stopped here so it does not outlive the websocket.
impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler_task.abort();
        log::info!("[BROWSER] Headless browser closed");
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("[BROWSER] Fetching: {}", url);
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::fetch(format!("failed to open tab for {url}: {e}")))?;

        let result = self.render(&page, url).await;
        let _ = page.close().await;

        if let Ok(html) = &result {
            log::debug!("[BROWSER] Captured {} bytes from {}", html.len(), url);
        }
        result
    }
}

/// One watchlist entry's page: a URL plus the extraction-strategy tag.
pub struct CareerPage {
    pub url: String,
    pub page_type: String,
}

impl CareerPage {
    pub fn new(url: impl Into<String>, page_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_type: page_type.into(),
        }
    }

    /// Fetch and extract the job description stubs for this page.
    ///
    /// An unconfigured page_type is tolerated: no fetch happens, an empty
    /// list comes back, and a diagnostic line lands in the audit log.
    pub async fn job_descriptions(
        &self,
        fetcher: &dyn PageFetcher,
        log: &SearchLog,
    ) -> Result<Vec<JobDescription>> {
        let Some(rule) = rules::rule_for(&self.page_type) else {
            log.write(&format!(
                "  No extraction rule for page type '{}', skipping the career page analysis",
                self.page_type
            ));
            return Ok(Vec::new());
        };

        let html = fetcher.fetch(&self.url).await?;
        log.debug(&format!(
            "  Fetched HTML content of length {} characters",
            html.len()
        ));

        let base = Url::parse(&self.url)
            .map_err(|e| AppError::InvalidUrl(format!("{}: {e}", self.url)))?;
        let descriptions = rule(&html, &base);
        log.debug(&format!(
            "  Extracted {} job descriptions from the page",
            descriptions.len()
        ));

        Ok(descriptions)
    }

    /// Re-render one description's own URL and fill in its full content.
    pub async fn populate_content(
        description: &mut JobDescription,
        fetcher: &dyn PageFetcher,
    ) -> Result<()> {
        let html = fetcher.fetch(&description.url).await?;
        description.content = Some(html);
        Ok(())
    }
}
