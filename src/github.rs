//! GitHub REST adapter for [`IssueSource`].
//!
//! Lists `/repos/{owner}/{repo}/issues` page by page and reads
//! `/repos/{owner}/{repo}/issues/{n}/comments`. The issues endpoint also
//! returns pull requests; those are reported as
//! [`SourceRecord::PullRequest`] so the pipeline can count and drop them.
//!
//! Responses are decoded item by item: an item that does not fit the
//! schema is logged and skipped, while a body that is not a JSON array at
//! all is [`ExternalError::Malformed`]. Skipped items still count toward
//! the page length, so a bad item never ends pagination early.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use triage_harness_core::error::ExternalError;
use triage_harness_core::external::{IssueSource, SourcePage, SourceRecord};
use triage_harness_core::models::{
    Comment, Issue, IssueState, Reactions, RepoRef, StateFilter,
};

use crate::config::{env_secret, SourceConfig};
use crate::http;

/// Comment pages fetched per issue before giving up on the rest.
const MAX_COMMENT_PAGES: u32 = 10;

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhReactions {
    #[serde(default)]
    total_count: u32,
    #[serde(rename = "+1", default)]
    plus_one: u32,
    #[serde(rename = "-1", default)]
    minus_one: u32,
    #[serde(default)]
    heart: u32,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    comments: u32,
    #[serde(default)]
    reactions: Option<GhReactions>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    html_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhComment {
    #[serde(default)]
    user: Option<GhUser>,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<GhIssue> for SourceRecord {
    fn from(gh: GhIssue) -> Self {
        if gh.pull_request.is_some() {
            return SourceRecord::PullRequest { number: gh.number };
        }
        let state = if gh.state.eq_ignore_ascii_case("closed") {
            IssueState::Closed
        } else {
            IssueState::Open
        };
        let reactions = gh
            .reactions
            .map(|r| Reactions {
                total: r.total_count,
                plus_one: r.plus_one,
                minus_one: r.minus_one,
                heart: r.heart,
            })
            .unwrap_or_default();
        SourceRecord::Issue(Issue {
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            state,
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            comments: Vec::new(),
            comment_count: gh.comments,
            reactions,
            created_at: gh.created_at,
            closed_at: gh.closed_at,
            url: gh.html_url,
        })
    }
}

impl From<GhComment> for Comment {
    fn from(gh: GhComment) -> Self {
        Comment {
            author: gh.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
            body: gh.body.unwrap_or_default(),
            created_at: gh.created_at,
        }
    }
}

/// Items of one JSON array page that fit `T`, plus the array's length.
#[derive(Debug)]
struct Decoded<T> {
    items: Vec<T>,
    raw_len: usize,
}

impl<T> Decoded<T> {
    fn is_last(&self, per_page: u32) -> bool {
        self.raw_len < per_page as usize
    }
}

/// Decode a JSON array item by item, dropping items that do not fit `T`.
fn decode_items<T: DeserializeOwned>(body: &str, what: &str) -> Result<Decoded<T>, ExternalError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| ExternalError::Malformed(format!("{}: {}", what, e)))?;
    let raw_len = values.len();
    let items: Vec<T> = values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(what, error = %e, "skipping undecodable item");
                None
            }
        })
        .collect();
    if items.len() < raw_len {
        debug!(what, kept = items.len(), total = raw_len, "partial decode");
    }
    Ok(Decoded { items, raw_len })
}

fn issue_page(body: &str) -> Result<SourcePage, ExternalError> {
    let decoded: Decoded<GhIssue> = decode_items(body, "issues")?;
    Ok(SourcePage {
        records: decoded.items.into_iter().map(SourceRecord::from).collect(),
        raw_len: decoded.raw_len,
    })
}

/// GitHub's primary rate limit shows up as 403 with no remaining quota.
fn github_rate_limit(status: u16, headers: &HeaderMap) -> Option<ExternalError> {
    if status != 403 && status != 429 {
        return None;
    }
    if let Some(wait) = http::retry_after(headers) {
        return Some(ExternalError::RateLimited {
            retry_after: Some(wait),
        });
    }
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if remaining != Some(0) {
        return None;
    }
    let retry_after = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|reset| Duration::from_secs((reset - Utc::now().timestamp()).max(1) as u64));
    Some(ExternalError::RateLimited { retry_after })
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: env_secret(config.token_env.as_deref()),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ExternalError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(http::transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(http::transport_error)?;

        if status.is_success() {
            return Ok(body);
        }
        if let Some(limited) = github_rate_limit(status.as_u16(), &headers) {
            return Err(limited);
        }
        Err(http::classify_status(status, &headers, &body))
    }
}

#[async_trait]
impl IssueSource for GitHubClient {
    async fn list_issues(
        &self,
        repo: &RepoRef,
        state: StateFilter,
        page: u32,
        page_size: u32,
    ) -> Result<SourcePage, ExternalError> {
        let url = format!("{}/repos/{}/{}/issues", self.api_base, repo.owner, repo.name);
        let body = self
            .get_text(
                &url,
                &[
                    ("state", state.as_str().to_string()),
                    ("per_page", page_size.to_string()),
                    ("page", page.to_string()),
                    ("sort", "created".to_string()),
                    ("direction", "asc".to_string()),
                ],
            )
            .await?;
        issue_page(&body)
    }

    async fn get_comments(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<Comment>, ExternalError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, repo.owner, repo.name, number
        );
        let per_page = 100u32;
        let mut comments = Vec::new();
        for page in 1..=MAX_COMMENT_PAGES {
            let body = self
                .get_text(
                    &url,
                    &[("per_page", per_page.to_string()), ("page", page.to_string())],
                )
                .await?;
            let batch: Decoded<GhComment> = decode_items(&body, "comments")?;
            let last = batch.is_last(per_page);
            comments.extend(batch.items.into_iter().map(Comment::from));
            if last {
                break;
            }
        }
        Ok(comments)
    }
}
