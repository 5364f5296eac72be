//! Relevance scoring against the inference backend.
//!
//! Two prompt profiles, both returning an integer in [0, 100]:
//! - title-only: cheap, run for every extracted description;
//! - full-text: expensive, reserved for candidates whose title score
//!   already cleared the threshold.
//!
//! The backend is generative and its instruction compliance is imperfect,
//! so score extraction stays tolerant and fully behind this module: an
//! optional SCORE: marker, else the first digit run anywhere in the reply,
//! else 0 with a logged warning. That heuristic can be hardened here
//! without touching orchestration.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use crate::domain::models::{JobDescription, SearchSettings, TargetRole};
use crate::error::{AppError, Result};
use crate::logger::SearchLog;

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score_by_title(&self, description: &JobDescription, role: &TargetRole)
        -> Result<i64>;
    async fn score_by_full_text(
        &self,
        description: &JobDescription,
        role: &TargetRole,
    ) -> Result<i64>;
}

struct SamplingProfile {
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stop: &'static [&'static str],
}

/// Near-deterministic with a little variability; cheap titles tolerate it.
const TITLE_PROFILE: SamplingProfile = SamplingProfile {
    temperature: 0.1,
    top_p: 0.95,
    max_tokens: 16,
    stop: &["\n"],
};

/// Strictly deterministic for the expensive full-text pass.
const FULL_TEXT_PROFILE: SamplingProfile = SamplingProfile {
    temperature: 0.0,
    top_p: 1.0,
    max_tokens: 16,
    stop: &["\n"],
};

pub struct ContentAnalyser {
    client: reqwest::Client,
    inference_url: String,
    model_name: String,
    max_context_chars: usize,
    log: Arc<SearchLog>,
}

impl ContentAnalyser {
    pub fn new(settings: &SearchSettings, log: Arc<SearchLog>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.inference_timeout)
            .build()?;

        Ok(Self {
            client,
            inference_url: settings.inference_url.clone(),
            model_name: settings.model_name.clone(),
            max_context_chars: settings.max_context_chars,
            log,
        })
    }

    async fn call_inference(&self, prompt: &str, profile: &SamplingProfile) -> Result<String> {
        let body = json!({
            "model": self.model_name,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": profile.temperature,
            "top_p": profile.top_p,
            "max_tokens": profile.max_tokens,
            "cache_prompt": true,
            "stop": profile.stop,
        });

        let response = self
            .client
            .post(&self.inference_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::inference(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::inference(format!(
                "backend returned {status}: {text}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::inference(format!("unreadable reply: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AppError::inference("reply missing choices[0].message.content".to_string())
            })?;

        Ok(content.to_string())
    }

    /// Tolerant score extraction. Never fails: unparseable replies become 0.
    fn parse_score(&self, reply: &str) -> i64 {
        static MARKED: OnceLock<Regex> = OnceLock::new();
        static BARE: OnceLock<Regex> = OnceLock::new();
        let marked = MARKED.get_or_init(|| Regex::new(r"(?i)score\s*:\s*(\d+)").unwrap());
        let bare = BARE.get_or_init(|| Regex::new(r"\d+").unwrap());

        let digits = marked
            .captures(reply)
            .map(|c| c[1].to_string())
            .or_else(|| bare.find(reply).map(|m| m.as_str().to_string()));

        match digits {
            Some(digits) => digits.parse::<i64>().unwrap_or(i64::MAX).clamp(0, 100),
            None => {
                self.log.write(&format!(
                    "  WARNING: no score found in model reply {reply:?}, defaulting to 0"
                ));
                0
            }
        }
    }

    /// Strip markup (script and style subtrees included) and collapse
    /// whitespace, then cut to the configured character budget so the prompt
    /// stays inside the context window.
    fn plain_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut raw = String::new();
        visible_text(document.root_element(), &mut raw);
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().take(self.max_context_chars).collect()
    }

    fn title_prompt(role: &str, title: &str) -> String {
        format!(
            "You are screening job postings for a candidate targeting the role \"{role}\".\n\
             Rate how relevant the following posting title is to that role, from 0 (unrelated) \
             to 100 (a direct match).\n\
             Posting title: {title}\n\
             Answer with a single line of the form SCORE: <number> and nothing else."
        )
    }

    fn full_text_prompt(role: &str, text: &str) -> String {
        format!(
            "You are screening job postings for a candidate targeting the role \"{role}\".\n\
             Rate how relevant the following posting is to that role, from 0 (unrelated) \
             to 100 (a direct match).\n\
             Answer with a single line of the form SCORE: <number> and nothing else.\n\
             Posting:\n{text}"
        )
    }
}

/// Collect the text the page actually renders: script and style subtrees
/// carry code, not content, and must never reach the prompt.
fn visible_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(el) = ElementRef::wrap(child) {
            if matches!(el.value().name(), "script" | "style") {
                continue;
            }
            visible_text(el, out);
        }
    }
}

#[async_trait]
impl RelevanceScorer for ContentAnalyser {
    async fn score_by_title(
        &self,
        description: &JobDescription,
        role: &TargetRole,
    ) -> Result<i64> {
        let prompt = Self::title_prompt(&role.name, &description.description);
        let reply = self.call_inference(&prompt, &TITLE_PROFILE).await?;
        Ok(self.parse_score(&reply))
    }

    async fn score_by_full_text(
        &self,
        description: &JobDescription,
        role: &TargetRole,
    ) -> Result<i64> {
        let source = description
            .content
            .as_deref()
            .unwrap_or(&description.description);
        let text = self.plain_text(source);
        let prompt = Self::full_text_prompt(&role.name, &text);
        let reply = self.call_inference(&prompt, &FULL_TEXT_PROFILE).await?;
        Ok(self.parse_score(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;

    fn analyser_for(url: &str) -> ContentAnalyser {
        let mut settings = fixtures::settings_with_threshold(80);
        settings.inference_url = url.to_string();
        settings.max_context_chars = 50;
        ContentAnalyser::new(&settings, Arc::new(SearchLog::to_console(false))).unwrap()
    }

    fn role() -> TargetRole {
        TargetRole {
            id: 1,
            name: "Rust Engineer".into(),
            is_active: true,
        }
    }

    fn chat_reply(content: &str) -> String {
        serde_json::to_string(&json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_score_variants() {
        let analyser = analyser_for("http://unused.test");

        assert_eq!(analyser.parse_score("SCORE: 87"), 87);
        assert_eq!(analyser.parse_score("score : 42, happy to help"), 42);
        assert_eq!(analyser.parse_score("I'd say about 63 out of 100"), 63);
        assert_eq!(analyser.parse_score("SCORE: 250"), 100, "clamped to range");
        assert_eq!(analyser.parse_score("99999999999999999999"), 100);
        assert_eq!(analyser.parse_score("no idea, sorry"), 0);
        assert_eq!(analyser.parse_score(""), 0);
    }

    #[test]
    fn test_plain_text_strips_markup_and_truncates() {
        let analyser = analyser_for("http://unused.test");
        let html = "<html><head><style>.x{color:red}</style></head>\
                    <body><h1>Senior   Rust</h1><p>Engineer wanted</p>\
                    <script>ignored()</script></body></html>";

        let text = analyser.plain_text(html);
        assert!(text.starts_with("Senior Rust Engineer wanted"));
        assert!(!text.contains("ignored"), "script bodies must not leak: {text:?}");
        assert!(!text.contains("color"), "style bodies must not leak: {text:?}");
        assert!(text.chars().count() <= 50);
    }

    #[tokio::test]
    async fn test_score_by_title_parses_backend_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "test-model",
                "temperature": 0.1,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_reply("SCORE: 91"))
            .create_async()
            .await;

        let analyser = analyser_for(&format!("{}/v1/chat/completions", server.url()));
        let desc = JobDescription::new("Senior Rust Engineer", "https://x.test/1");

        let score = analyser.score_by_title(&desc, &role()).await.unwrap();
        assert_eq!(score, 91);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_full_text_uses_zero_temperature_profile() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "temperature": 0.0,
                "top_p": 1.0,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_reply("SCORE: 77"))
            .create_async()
            .await;

        let analyser = analyser_for(&format!("{}/v1/chat/completions", server.url()));
        let mut desc = JobDescription::new("Engineer", "https://x.test/1");
        desc.content = Some("<html><body>Rust, tokio, sqlx</body></html>".into());

        let score = analyser.score_by_full_text(&desc, &role()).await.unwrap();
        assert_eq!(score, 77);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_inference_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let analyser = analyser_for(&format!("{}/v1/chat/completions", server.url()));
        let desc = JobDescription::new("Engineer", "https://x.test/1");

        let result = analyser.score_by_title(&desc, &role()).await;
        assert!(matches!(result, Err(AppError::InferenceError(_))));
    }

    #[tokio::test]
    async fn test_unparseable_reply_scores_zero_not_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_reply("I cannot evaluate this posting."))
            .create_async()
            .await;

        let analyser = analyser_for(&format!("{}/v1/chat/completions", server.url()));
        let desc = JobDescription::new("Engineer", "https://x.test/1");

        let score = analyser.score_by_title(&desc, &role()).await.unwrap();
        assert_eq!(score, 0);
    }
}
