//! In-memory [`IssueSource`] and [`KnowledgeBase`] implementations.
//!
//! Used by the pipeline tests. Both record every call they receive and can
//! be scripted to fail: queued errors for a given key are returned one per
//! call, in order, before the normal response is served.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{IssueSource, KnowledgeBase, SourcePage, SourceRecord};
use crate::error::ExternalError;
use crate::models::{Comment, Issue, RepoRef, Response, SearchCandidate, StateFilter};

type FailureQueue<K> = Mutex<HashMap<K, VecDeque<ExternalError>>>;

fn pop_failure<K: std::hash::Hash + Eq>(queue: &FailureQueue<K>, key: &K) -> Option<ExternalError> {
    let mut guard = queue.lock().unwrap_or_else(|e| e.into_inner());
    guard.get_mut(key).and_then(|q| q.pop_front())
}

fn push_failure<K: std::hash::Hash + Eq>(queue: &FailureQueue<K>, key: K, error: ExternalError) {
    let mut guard = queue.lock().unwrap_or_else(|e| e.into_inner());
    guard.entry(key).or_default().push_back(error);
}

/// A call received by [`InMemoryIssueSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    ListIssues { page: u32, page_size: u32 },
    GetComments { number: u64 },
}

/// Issue tracker backed by a fixed list of records.
#[derive(Default)]
pub struct InMemoryIssueSource {
    records: Vec<SourceRecord>,
    comments: HashMap<u64, Vec<Comment>>,
    page_failures: FailureQueue<u32>,
    comment_failures: FailureQueue<u64>,
    calls: Mutex<Vec<SourceCall>>,
}

impl InMemoryIssueSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Build from plain issues (no pull requests).
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self::new(issues.into_iter().map(SourceRecord::Issue).collect())
    }

    pub fn with_comments(mut self, number: u64, comments: Vec<Comment>) -> Self {
        self.comments.insert(number, comments);
        self
    }

    /// Queue an error for the next request of `page`.
    pub fn fail_page(&self, page: u32, error: ExternalError) {
        push_failure(&self.page_failures, page, error);
    }

    /// Queue an error for the next comments request of issue `number`.
    pub fn fail_comments(&self, number: u64, error: ExternalError) {
        push_failure(&self.comment_failures, number, error);
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: SourceCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl IssueSource for InMemoryIssueSource {
    async fn list_issues(
        &self,
        _repo: &RepoRef,
        state: StateFilter,
        page: u32,
        page_size: u32,
    ) -> Result<SourcePage, ExternalError> {
        self.record(SourceCall::ListIssues { page, page_size });
        if let Some(err) = pop_failure(&self.page_failures, &page) {
            return Err(err);
        }

        let matching = self.records.iter().filter(|r| match r {
            SourceRecord::Issue(issue) => state.matches(issue.state),
            SourceRecord::PullRequest { .. } => true,
        });
        let start = (page.saturating_sub(1) as usize) * page_size as usize;
        Ok(SourcePage::complete(
            matching.skip(start).take(page_size as usize).cloned().collect(),
        ))
    }

    async fn get_comments(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<Comment>, ExternalError> {
        self.record(SourceCall::GetComments { number });
        if let Some(err) = pop_failure(&self.comment_failures, &number) {
            return Err(err);
        }
        Ok(self.comments.get(&number).cloned().unwrap_or_default())
    }
}

/// A call received by [`InMemoryKnowledgeBase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeCall {
    Text { query: String, tags: Vec<String> },
    Tags { tags: Vec<String> },
    Responses { candidate_id: String, limit: usize },
}

/// Key used to script failures against a specific query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Text(String),
    Tags(Vec<String>),
    Responses(String),
}

/// Knowledge base serving canned search results.
#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    text_results: HashMap<String, Vec<SearchCandidate>>,
    tag_results: HashMap<Vec<String>, Vec<SearchCandidate>>,
    fallback: Vec<SearchCandidate>,
    responses: HashMap<String, Vec<Response>>,
    failures: FailureQueue<QueryKey>,
    calls: Mutex<Vec<KnowledgeCall>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results for an exact text query.
    pub fn with_text(mut self, query: &str, candidates: Vec<SearchCandidate>) -> Self {
        self.text_results.insert(query.to_string(), candidates);
        self
    }

    /// Results for an exact tag set (order-sensitive).
    pub fn with_tags(mut self, tags: &[&str], candidates: Vec<SearchCandidate>) -> Self {
        self.tag_results
            .insert(tags.iter().map(|t| t.to_string()).collect(), candidates);
        self
    }

    /// Results for any text query without an exact entry.
    pub fn with_fallback(mut self, candidates: Vec<SearchCandidate>) -> Self {
        self.fallback = candidates;
        self
    }

    pub fn with_responses(mut self, candidate_id: &str, responses: Vec<Response>) -> Self {
        self.responses.insert(candidate_id.to_string(), responses);
        self
    }

    /// Queue an error for the next call matching `key`.
    pub fn fail(&self, key: QueryKey, error: ExternalError) {
        push_failure(&self.failures, key, error);
    }

    pub fn calls(&self) -> Vec<KnowledgeCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of search calls (text and tag), excluding response fetches.
    pub fn search_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, KnowledgeCall::Responses { .. }))
            .count()
    }

    fn record(&self, call: KnowledgeCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn search_by_text(
        &self,
        query: &str,
        tags: &[String],
    ) -> Result<Vec<SearchCandidate>, ExternalError> {
        self.record(KnowledgeCall::Text {
            query: query.to_string(),
            tags: tags.to_vec(),
        });
        if let Some(err) = pop_failure(&self.failures, &QueryKey::Text(query.to_string())) {
            return Err(err);
        }
        Ok(self
            .text_results
            .get(query)
            .unwrap_or(&self.fallback)
            .clone())
    }

    async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<SearchCandidate>, ExternalError> {
        self.record(KnowledgeCall::Tags {
            tags: tags.to_vec(),
        });
        if let Some(err) = pop_failure(&self.failures, &QueryKey::Tags(tags.to_vec())) {
            return Err(err);
        }
        Ok(self.tag_results.get(tags).cloned().unwrap_or_default())
    }

    async fn fetch_top_responses(
        &self,
        candidate_id: &str,
        limit: usize,
    ) -> Result<Vec<Response>, ExternalError> {
        self.record(KnowledgeCall::Responses {
            candidate_id: candidate_id.to_string(),
            limit,
        });
        if let Some(err) = pop_failure(
            &self.failures,
            &QueryKey::Responses(candidate_id.to_string()),
        ) {
            return Err(err);
        }
        let mut responses = self.responses.get(candidate_id).cloned().unwrap_or_default();
        responses.truncate(limit);
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueState, Reactions};
    use chrono::Utc;

    fn make_issue(number: u64, state: IssueState) -> Issue {
        Issue {
            number,
            title: format!("Issue {}", number),
            body: String::new(),
            state,
            labels: vec![],
            comments: vec![],
            comment_count: 0,
            reactions: Reactions::default(),
            created_at: Utc::now(),
            closed_at: None,
            url: String::new(),
        }
    }

    fn repo() -> RepoRef {
        RepoRef::parse("acme/widgets").unwrap()
    }

    #[tokio::test]
    async fn test_paging_and_state_filter() {
        let mut records: Vec<SourceRecord> = (1..=5)
            .map(|n| {
                let state = if n % 2 == 0 {
                    IssueState::Closed
                } else {
                    IssueState::Open
                };
                SourceRecord::Issue(make_issue(n, state))
            })
            .collect();
        records.push(SourceRecord::PullRequest { number: 6 });
        let source = InMemoryIssueSource::new(records);

        let page1 = source.list_issues(&repo(), StateFilter::All, 1, 4).await.unwrap();
        let page2 = source.list_issues(&repo(), StateFilter::All, 2, 4).await.unwrap();
        assert_eq!(page1.records.iter().map(|r| r.number()).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(page2.records.iter().map(|r| r.number()).collect::<Vec<_>>(), vec![5, 6]);
        assert!(!page1.is_last(4));
        assert!(page2.is_last(4));

        let open = source.list_issues(&repo(), StateFilter::Open, 1, 10).await.unwrap();
        assert_eq!(open.records.iter().map(|r| r.number()).collect::<Vec<_>>(), vec![1, 3, 5, 6]);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let source = InMemoryIssueSource::from_issues(vec![make_issue(1, IssueState::Open)]);
        source.fail_comments(1, ExternalError::Transient("boom".into()));
        source.fail_comments(1, ExternalError::RateLimited { retry_after: None });

        assert!(source.get_comments(&repo(), 1).await.unwrap_err().is_transient());
        assert!(source.get_comments(&repo(), 1).await.unwrap_err().is_rate_limited());
        assert!(source.get_comments(&repo(), 1).await.unwrap().is_empty());
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_knowledge_base_fallback_and_failures() {
        let kb = InMemoryKnowledgeBase::new()
            .with_text("exact", vec![])
            .with_fallback(vec![SearchCandidate {
                id: "Q1".into(),
                title: "t".into(),
                tags: vec![],
                score: 1,
                view_count: 0,
                answer_count: 0,
                is_answered: false,
                link: String::new(),
                best_response: None,
                relevance_score: 0,
                match_reason: String::new(),
                strategy: None,
            }]);
        kb.fail(
            QueryKey::Tags(vec!["rust".into()]),
            ExternalError::Malformed("bad json".into()),
        );

        assert!(kb.search_by_text("exact", &[]).await.unwrap().is_empty());
        assert_eq!(kb.search_by_text("anything", &[]).await.unwrap().len(), 1);
        assert!(kb.search_by_tags(&["rust".into()]).await.is_err());
        assert!(kb.search_by_tags(&["rust".into()]).await.unwrap().is_empty());
        assert_eq!(kb.search_count(), 4);
    }
}
