//! Multi-strategy knowledge-base search.
//!
//! Executes the queries planned by
//! [`plan_queries`](triage_harness_core::strategy::plan_queries) one at a
//! time through the knowledge-base [`Pacer`], merges and ranks the results,
//! then attaches the best community response to the answered candidates.
//!
//! Every query is fault tolerant on its own. A failed, malformed, or empty
//! call contributes zero candidates and the remaining queries still run. A
//! rate-limit response triggers exactly one cool-down followed by one retry
//! of the same call; if that fails too, the call contributes nothing.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};
use triage_harness_core::error::ExternalError;
use triage_harness_core::external::KnowledgeBase;
use triage_harness_core::models::{DiagnosticSignals, Response, SearchCandidate};
use triage_harness_core::run::QueryCounters;
use triage_harness_core::strategy::{
    plan_queries, strategy_score, CandidateAccumulator, QueryKind, StrategyQuery,
};
use triage_harness_core::tuning::StrategyTuning;

use crate::pacing::Pacer;

/// Responses requested per answered candidate.
const RESPONSES_PER_CANDIDATE: usize = 3;

/// Ranked candidates for one issue plus the call counters that produced them.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<SearchCandidate>,
    pub counters: QueryCounters,
}

pub struct SearchOrchestrator {
    knowledge: Arc<dyn KnowledgeBase>,
    pacer: Arc<Pacer>,
    tuning: StrategyTuning,
    fetch_responses: bool,
}

impl SearchOrchestrator {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        pacer: Arc<Pacer>,
        tuning: StrategyTuning,
        fetch_responses: bool,
    ) -> Self {
        Self {
            knowledge,
            pacer,
            tuning,
            fetch_responses,
        }
    }

    pub async fn search(&self, signals: &DiagnosticSignals) -> SearchOutcome {
        let queries = plan_queries(signals, &self.tuning);
        let mut counters = QueryCounters::default();
        let mut acc = CandidateAccumulator::new();

        for query in &queries {
            let score = strategy_score(query.strategy, &self.tuning);
            let results = self.execute(query, &mut counters).await;
            debug!(query = %query.describe(), score, results = results.len(), "strategy query");
            acc.add(query, score, results);
        }

        let mut candidates = acc.into_ranked(self.tuning.max_candidates);
        if self.fetch_responses {
            self.attach_responses(&mut candidates, &mut counters).await;
        }

        SearchOutcome {
            candidates,
            counters,
        }
    }

    async fn execute(
        &self,
        query: &StrategyQuery,
        counters: &mut QueryCounters,
    ) -> Vec<SearchCandidate> {
        let kb = &self.knowledge;
        let kind = &query.kind;
        let result = self
            .call(counters, || async move {
                match kind {
                    QueryKind::Text { query, tags } => kb.search_by_text(query, tags).await,
                    QueryKind::Tags { tags } => kb.search_by_tags(tags).await,
                }
            })
            .await;
        match result {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(query = %query.describe(), error = %err, "strategy query failed");
                Vec::new()
            }
        }
    }

    /// Fill `best_response` for candidates that have answers. Never removes
    /// or reorders candidates.
    async fn attach_responses(
        &self,
        candidates: &mut [SearchCandidate],
        counters: &mut QueryCounters,
    ) {
        let limit = self.tuning.response_fetch_limit;
        for candidate in candidates.iter_mut().filter(|c| c.has_answers()).take(limit) {
            let kb = &self.knowledge;
            let id = candidate.id.clone();
            let id = id.as_str();
            let result = self
                .call(counters, || async move {
                    kb.fetch_top_responses(id, RESPONSES_PER_CANDIDATE).await
                })
                .await;
            match result {
                Ok(responses) => candidate.best_response = best_response(&responses),
                Err(err) => {
                    debug!(candidate = %candidate.id, error = %err, "response fetch failed");
                }
            }
        }
    }

    /// One paced call, with a single cool-down and retry on rate limiting.
    async fn call<T, F, Fut>(
        &self,
        counters: &mut QueryCounters,
        mut op: F,
    ) -> Result<T, ExternalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
    {
        let mut cooled_down = false;
        loop {
            self.pacer.wait().await;
            counters.issued += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(ExternalError::RateLimited { retry_after }) if !cooled_down => {
                    cooled_down = true;
                    counters.cooldowns += 1;
                    self.pacer.cool_down(retry_after).await;
                }
                Err(err) => {
                    counters.failed += 1;
                    return Err(err);
                }
            }
        }
    }
}

/// The accepted response if there is one, otherwise the top-voted one.
fn best_response(responses: &[Response]) -> Option<String> {
    responses
        .iter()
        .find(|r| r.is_accepted)
        .or_else(|| responses.iter().max_by_key(|r| r.score))
        .map(|r| r.excerpt.clone())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_harness_core::external::memory::{InMemoryKnowledgeBase, KnowledgeCall, QueryKey};
    use triage_harness_core::models::{Keyword, Strategy};

    fn make_candidate(id: &str, answered: bool) -> SearchCandidate {
        SearchCandidate {
            id: id.to_string(),
            title: format!("Question {}", id),
            tags: vec![],
            score: 12,
            view_count: 100,
            answer_count: if answered { 2 } else { 0 },
            is_answered: answered,
            link: format!("https://stackoverflow.com/q/{}", id),
            best_response: None,
            relevance_score: 0,
            match_reason: String::new(),
            strategy: None,
        }
    }

    fn make_response(id: &str, score: i64, accepted: bool) -> Response {
        Response {
            id: id.to_string(),
            score,
            is_accepted: accepted,
            excerpt: format!("answer {}", id),
        }
    }

    fn orchestrator(kb: InMemoryKnowledgeBase) -> (SearchOrchestrator, Arc<InMemoryKnowledgeBase>) {
        let kb = Arc::new(kb);
        let pacer = Arc::new(Pacer::new("knowledge", Duration::ZERO, Duration::from_secs(30)));
        (
            SearchOrchestrator::new(kb.clone(), pacer, StrategyTuning::default(), true),
            kb,
        )
    }

    #[tokio::test]
    async fn test_exact_error_candidate_scores_95() {
        let signals = DiagnosticSignals {
            errors: vec!["TypeError: cannot read property 'x' of undefined".to_string()],
            exception_types: vec!["TypeError".to_string()],
            technologies: vec!["react".to_string()],
            ..DiagnosticSignals::default()
        };
        let (search, _) = orchestrator(
            InMemoryKnowledgeBase::new().with_text(
                "TypeError: cannot read property 'x' of undefined",
                vec![make_candidate("777", false)],
            ),
        );

        let outcome = search.search(&signals).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].id, "777");
        assert_eq!(outcome.candidates[0].relevance_score, 95);
        assert_eq!(outcome.candidates[0].strategy, Some(Strategy::ExactError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_in_one_strategy_spares_the_others() {
        let signals = DiagnosticSignals {
            errors: vec!["TypeError: x is not a function".to_string()],
            exception_types: vec!["TypeError".to_string()],
            technologies: vec!["react".to_string()],
            keywords: vec![Keyword {
                term: "render".to_string(),
                count: 2,
            }],
            stack_traces: vec![],
        };
        let kb = InMemoryKnowledgeBase::new()
            .with_text("TypeError: x is not a function", vec![make_candidate("1", false)])
            .with_text("render react", vec![make_candidate("3", false)])
            .with_tags(&["react"], vec![make_candidate("4", false)]);
        kb.fail(
            QueryKey::Text("TypeError".into()),
            ExternalError::RateLimited { retry_after: None },
        );
        kb.fail(
            QueryKey::Text("TypeError".into()),
            ExternalError::RateLimited { retry_after: None },
        );
        let (search, kb) = orchestrator(kb);

        let start = tokio::time::Instant::now();
        let outcome = search.search(&signals).await;

        let ids: Vec<&str> = outcome.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
        assert_eq!(outcome.counters.cooldowns, 1);
        assert_eq!(outcome.counters.failed, 1);
        // 1 exact + 2 exception attempts + 1 keyword + 1 tag
        assert_eq!(outcome.counters.issued, 5);
        assert_eq!(kb.search_count(), 5);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_malformed_query_yields_nothing() {
        let signals = DiagnosticSignals {
            technologies: vec!["rust".to_string()],
            ..DiagnosticSignals::default()
        };
        let kb = InMemoryKnowledgeBase::new().with_tags(&["rust"], vec![make_candidate("1", false)]);
        kb.fail(
            QueryKey::Tags(vec!["rust".into()]),
            ExternalError::Malformed("bad json".into()),
        );
        let (search, _) = orchestrator(kb);
        let outcome = search.search(&signals).await;
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.counters.failed, 1);
        assert_eq!(outcome.counters.cooldowns, 0);
    }

    #[tokio::test]
    async fn test_responses_attached_and_failures_tolerated() {
        let signals = DiagnosticSignals {
            technologies: vec!["rust".to_string()],
            ..DiagnosticSignals::default()
        };
        let kb = InMemoryKnowledgeBase::new()
            .with_tags(
                &["rust"],
                vec![
                    make_candidate("10", true),
                    make_candidate("11", true),
                    make_candidate("12", false),
                ],
            )
            .with_responses(
                "10",
                vec![make_response("a", 50, false), make_response("b", 3, true)],
            )
            .with_responses("11", vec![make_response("c", 8, false)]);
        kb.fail(
            QueryKey::Responses("11".into()),
            ExternalError::Transient("timeout".into()),
        );
        let (search, kb) = orchestrator(kb);

        let outcome = search.search(&signals).await;
        let ids: Vec<&str> = outcome.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "11", "12"]);
        assert_eq!(outcome.candidates[0].best_response.as_deref(), Some("answer b"));
        assert_eq!(outcome.candidates[1].best_response, None);
        assert_eq!(outcome.candidates[2].best_response, None);

        let response_calls = kb
            .calls()
            .into_iter()
            .filter(|c| matches!(c, KnowledgeCall::Responses { .. }))
            .count();
        assert_eq!(response_calls, 2);
    }

    #[test]
    fn test_best_response_prefers_accepted() {
        let responses = vec![make_response("a", 50, false), make_response("b", 3, true)];
        assert_eq!(best_response(&responses), Some("answer b".to_string()));
        let responses = vec![make_response("a", 5, false), make_response("c", 9, false)];
        assert_eq!(best_response(&responses), Some("answer c".to_string()));
        assert_eq!(best_response(&[]), None);
    }
}
