//! Stack Exchange API 2.3 adapter for [`KnowledgeBase`].
//!
//! Text search uses `/search/advanced`, tag search uses `/questions`, and
//! responses come from `/questions/{id}/answers` with the `withbody`
//! filter. Every response is wrapped in the API's common envelope, which
//! may carry a `backoff` field (seconds before the same method may be
//! called again); that hint is forwarded to the shared [`Pacer`].
//!
//! Throttling is reported by the API as `error_id` 502
//! (`throttle_violation`), usually with HTTP 400, and is mapped to
//! [`ExternalError::RateLimited`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use triage_harness_core::error::ExternalError;
use triage_harness_core::external::KnowledgeBase;
use triage_harness_core::models::{Response, SearchCandidate};
use triage_harness_core::signals::truncate_chars;

use crate::config::{env_secret, KnowledgeConfig};
use crate::http;
use crate::pacing::Pacer;

const EXCERPT_CHARS: usize = 500;
const THROTTLE_VIOLATION: u32 = 502;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    backoff: Option<u64>,
    #[serde(default)]
    quota_remaining: Option<i64>,
    #[serde(default)]
    error_id: Option<u32>,
    #[serde(default)]
    error_name: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeQuestion {
    question_id: u64,
    title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    view_count: u64,
    #[serde(default)]
    answer_count: u32,
    #[serde(default)]
    is_answered: bool,
    link: String,
}

#[derive(Debug, Deserialize)]
struct SeAnswer {
    answer_id: u64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    is_accepted: bool,
    #[serde(default)]
    body: String,
}

impl From<SeQuestion> for SearchCandidate {
    fn from(q: SeQuestion) -> Self {
        SearchCandidate {
            id: q.question_id.to_string(),
            title: http::decode_entities(&q.title),
            tags: q.tags,
            score: q.score,
            view_count: q.view_count,
            answer_count: q.answer_count,
            is_answered: q.is_answered,
            link: q.link,
            best_response: None,
            relevance_score: 0,
            match_reason: String::new(),
            strategy: None,
        }
    }
}

impl From<SeAnswer> for Response {
    fn from(a: SeAnswer) -> Self {
        Response {
            id: a.answer_id.to_string(),
            score: a.score,
            is_accepted: a.is_accepted,
            excerpt: truncate_chars(&http::strip_html(&a.body), EXCERPT_CHARS),
        }
    }
}

fn seconds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+seconds?").expect("static backoff pattern"))
}

/// Map an envelope-level error to [`ExternalError`].
fn envelope_error(status: u16, envelope: &Envelope) -> Option<ExternalError> {
    let error_id = envelope.error_id?;
    let message = format!(
        "{}: {}",
        envelope.error_name.as_deref().unwrap_or("error"),
        envelope.error_message.as_deref().unwrap_or("")
    );
    Some(match error_id {
        THROTTLE_VIOLATION => {
            let retry_after = envelope
                .error_message
                .as_deref()
                .and_then(|m| seconds_re().captures(m))
                .and_then(|c| c[1].parse::<u64>().ok())
                .map(Duration::from_secs);
            ExternalError::RateLimited { retry_after }
        }
        500 | 503 => ExternalError::Transient(message),
        _ => ExternalError::Rejected {
            status: if status >= 400 { status } else { 400 },
            message,
        },
    })
}

/// Decode envelope items, dropping the ones that do not fit `T`.
fn decode_items<T: DeserializeOwned>(items: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(what, error = %e, "skipping undecodable item");
                None
            }
        })
        .collect()
}

pub struct StackExchangeClient {
    client: reqwest::Client,
    api_base: String,
    site: String,
    key: Option<String>,
    page_size: u32,
    pacer: Arc<Pacer>,
}

impl StackExchangeClient {
    /// `pacer` must be the same one the search orchestrator waits on, so
    /// `backoff` hints delay the next call.
    pub fn new(config: &KnowledgeConfig, pacer: Arc<Pacer>) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            site: config.site.clone(),
            key: env_secret(config.key_env.as_deref()),
            page_size: config.page_size,
            pacer,
        })
    }

    async fn get(&self, path: &str, mut query: Vec<(&str, String)>) -> Result<Vec<serde_json::Value>, ExternalError> {
        query.push(("site", self.site.clone()));
        if let Some(key) = &self.key {
            query.push(("key", key.clone()));
        }
        let url = format!("{}{}", self.api_base, path);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(http::transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(http::transport_error)?;

        let envelope: Envelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(ExternalError::Malformed(format!("{}: {}", path, e)));
            }
            Err(_) => return Err(http::classify_status(status, &headers, &body)),
        };

        if let Some(backoff) = envelope.backoff {
            debug!(path, backoff, "service requested backoff");
            self.pacer.defer(Duration::from_secs(backoff)).await;
        }
        if let Some(err) = envelope_error(status.as_u16(), &envelope) {
            return Err(err);
        }
        if !status.is_success() {
            return Err(http::classify_status(status, &headers, &body));
        }
        if let Some(quota) = envelope.quota_remaining {
            if quota < 10 {
                warn!(quota, "knowledge base quota nearly exhausted");
            }
        }
        Ok(envelope.items)
    }
}

#[async_trait]
impl KnowledgeBase for StackExchangeClient {
    async fn search_by_text(
        &self,
        query: &str,
        tags: &[String],
    ) -> Result<Vec<SearchCandidate>, ExternalError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("order", "desc".to_string()),
            ("sort", "relevance".to_string()),
            ("pagesize", self.page_size.to_string()),
        ];
        if !tags.is_empty() {
            params.push(("tagged", tags.join(";")));
        }
        let items = self.get("/search/advanced", params).await?;
        let questions: Vec<SeQuestion> = decode_items(items, "questions");
        Ok(questions.into_iter().map(SearchCandidate::from).collect())
    }

    async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<SearchCandidate>, ExternalError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let params = vec![
            ("tagged", tags.join(";")),
            ("order", "desc".to_string()),
            ("sort", "votes".to_string()),
            ("pagesize", self.page_size.to_string()),
        ];
        let items = self.get("/questions", params).await?;
        let questions: Vec<SeQuestion> = decode_items(items, "questions");
        Ok(questions.into_iter().map(SearchCandidate::from).collect())
    }

    async fn fetch_top_responses(
        &self,
        candidate_id: &str,
        limit: usize,
    ) -> Result<Vec<Response>, ExternalError> {
        if candidate_id.is_empty() || !candidate_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ExternalError::Rejected {
                status: 400,
                message: format!("invalid question id '{}'", candidate_id),
            });
        }
        let params = vec![
            ("order", "desc".to_string()),
            ("sort", "votes".to_string()),
            ("filter", "withbody".to_string()),
            ("pagesize", limit.clamp(1, 100).to_string()),
        ];
        let items = self
            .get(&format!("/questions/{}/answers", candidate_id), params)
            .await?;
        let answers: Vec<SeAnswer> = decode_items(items, "answers");
        Ok(answers.into_iter().map(Response::from).take(limit).collect())
    }
}
