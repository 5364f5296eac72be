//! Per-site extraction rules, keyed by the watchlist entry's page_type tag.
//!
//! Supporting a new site type means adding a registry entry here; the
//! orchestrator never changes.

use std::sync::OnceLock;

use scraper::{Html, Selector};
use url::Url;

use crate::domain::models::JobDescription;

pub type ExtractFn = fn(html: &str, base: &Url) -> Vec<JobDescription>;

const RULES: &[(&str, ExtractFn)] = &[("ashbyhq", extract_ashbyhq)];

pub fn rule_for(page_type: &str) -> Option<ExtractFn> {
    RULES
        .iter()
        .find(|(tag, _)| *tag == page_type)
        .map(|(_, rule)| *rule)
}

/// AshbyHQ boards render job links as root-relative anchors. Collect each
/// one in document order, resolve it against the page origin, and use the
/// anchor's visible text as the description.
fn extract_ashbyhq(html: &str, base: &Url) -> Vec<JobDescription> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

    let document = Html::parse_document(html);
    let mut descriptions = Vec::new();

    for anchor in document.select(selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        // Root-relative only; protocol-relative (//host) points off-origin.
        if !href.starts_with('/') || href.starts_with("//") {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        descriptions.push(JobDescription::new(title, resolved.to_string()));
    }

    descriptions
}
