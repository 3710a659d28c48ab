//! Collaborator abstractions for the correlation pipeline.
//!
//! The pipeline talks to two external services: an [`IssueSource`] that
//! lists a repository's issues and their discussions, and a
//! [`KnowledgeBase`] that indexes community questions and answers. Both are
//! async traits so the application crate can plug in HTTP adapters while
//! tests use the in-memory implementations in [`memory`].
//!
//! Every method returns [`ExternalError`] rather than `anyhow::Error` so the
//! caller can tell rate limits and transient failures apart from
//! malformed or rejected responses.

pub mod memory;

use async_trait::async_trait;

use crate::error::ExternalError;
use crate::models::{Comment, Issue, RepoRef, Response, SearchCandidate, StateFilter};

/// One record from an issue listing.
///
/// Trackers that list pull requests alongside issues report them as
/// [`SourceRecord::PullRequest`] so the pipeline can filter them out
/// without losing count of them.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    Issue(Issue),
    PullRequest { number: u64 },
}

impl SourceRecord {
    pub fn number(&self) -> u64 {
        match self {
            SourceRecord::Issue(issue) => issue.number,
            SourceRecord::PullRequest { number } => *number,
        }
    }
}

/// One page of an issue listing.
///
/// `raw_len` counts every item the tracker returned, including items the
/// adapter could not decode. Pagination ends on `raw_len`, never on
/// `records.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub records: Vec<SourceRecord>,
    pub raw_len: usize,
}

impl SourcePage {
    /// A page where every returned item decoded.
    pub fn complete(records: Vec<SourceRecord>) -> Self {
        let raw_len = records.len();
        Self { records, raw_len }
    }

    pub fn is_last(&self, page_size: u32) -> bool {
        self.raw_len < page_size as usize
    }
}

/// Paged read access to a project's issue tracker.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// List one page of records. Pages are 1-based; a page whose raw
    /// length is shorter than `page_size` is the last one.
    async fn list_issues(
        &self,
        repo: &RepoRef,
        state: StateFilter,
        page: u32,
        page_size: u32,
    ) -> Result<SourcePage, ExternalError>;

    /// All comments of one issue, oldest first.
    async fn get_comments(&self, repo: &RepoRef, number: u64)
        -> Result<Vec<Comment>, ExternalError>;
}

/// Search access to an external question-and-answer index.
///
/// Returned candidates carry `relevance_score = 0` and no strategy; the
/// search orchestrator assigns both.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search_by_text(
        &self,
        query: &str,
        tags: &[String],
    ) -> Result<Vec<SearchCandidate>, ExternalError>;

    async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<SearchCandidate>, ExternalError>;

    /// Highest-ranked responses for one candidate, best first.
    async fn fetch_top_responses(
        &self,
        candidate_id: &str,
        limit: usize,
    ) -> Result<Vec<Response>, ExternalError>;
}
