//! Multi-strategy query planning, merging, and ranking.
//!
//! The search orchestrator queries the knowledge base with several
//! independent strategies. This module holds the pure half of that process:
//!
//! 1. [`plan_queries`] turns [`DiagnosticSignals`] into an ordered list of
//!    [`StrategyQuery`]s, one or more per strategy.
//! 2. Each query's results are stamped with the strategy's fixed ceiling
//!    score via [`CandidateAccumulator::add`].
//! 3. The accumulator merges by candidate id, keeping the higher score
//!    (never summing or averaging).
//! 4. [`CandidateAccumulator::into_ranked`] sorts by score (desc), id (asc)
//!    and truncates.
//!
//! The async execution of the planned queries lives in the application
//! crate, which owns pacing and rate-limit handling.

use std::collections::HashMap;

use crate::models::{DiagnosticSignals, SearchCandidate, Strategy};
use crate::signals::truncate_chars;
use crate::tuning::StrategyTuning;

/// Shape of a knowledge-base call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Free-text search, optionally narrowed by tags.
    Text { query: String, tags: Vec<String> },
    /// Tag-index search with no free text.
    Tags { tags: Vec<String> },
}

/// One planned call against the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyQuery {
    pub strategy: Strategy,
    pub kind: QueryKind,
    /// Match reason stamped on every candidate this query produces.
    pub reason: String,
}

impl StrategyQuery {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.kind {
            QueryKind::Text { query, tags } if tags.is_empty() => {
                format!("{} q=\"{}\"", self.strategy, truncate_chars(query, 60))
            }
            QueryKind::Text { query, tags } => format!(
                "{} q=\"{}\" tags=[{}]",
                self.strategy,
                truncate_chars(query, 60),
                tags.join(",")
            ),
            QueryKind::Tags { tags } => format!("{} tags=[{}]", self.strategy, tags.join(",")),
        }
    }
}

/// Fixed ceiling score for a strategy.
pub fn strategy_score(strategy: Strategy, tuning: &StrategyTuning) -> u8 {
    let score = match strategy {
        Strategy::ExactError => tuning.exact_error_score,
        Strategy::ExceptionType => tuning.exception_type_score,
        Strategy::KeywordTech => tuning.keyword_tech_score,
        Strategy::TagOnly => tuning.tag_only_score,
    };
    score.min(100)
}

/// Normalize a technology name into a knowledge-base tag (`"area: build"` → `"area-build"`).
pub fn to_tag(technology: &str) -> String {
    let mut tag = String::with_capacity(technology.len());
    let mut last_dash = false;
    for c in technology.trim().to_lowercase().chars() {
        if c.is_alphanumeric() || matches!(c, '.' | '#' | '+') {
            tag.push(c);
            last_dash = false;
        } else if !last_dash && !tag.is_empty() {
            tag.push('-');
            last_dash = true;
        }
    }
    tag.trim_end_matches('-').to_string()
}

fn top_tags(signals: &DiagnosticSignals, n: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tech in &signals.technologies {
        let tag = to_tag(tech);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() >= n {
            break;
        }
    }
    tags
}

/// Plan every query for one issue, in strategy order.
///
/// Strategies with no usable signals contribute no queries.
pub fn plan_queries(signals: &DiagnosticSignals, tuning: &StrategyTuning) -> Vec<StrategyQuery> {
    let mut queries = Vec::new();

    for error in signals.errors.iter().take(tuning.max_error_queries) {
        queries.push(StrategyQuery {
            strategy: Strategy::ExactError,
            kind: QueryKind::Text {
                query: error.clone(),
                tags: Vec::new(),
            },
            reason: format!("exact error match: {}", truncate_chars(error, 80)),
        });
    }

    let tech_tags = top_tags(signals, tuning.query_technologies);

    for exception in signals
        .exception_types
        .iter()
        .take(tuning.max_exception_queries)
    {
        let reason = if tech_tags.is_empty() {
            format!("exception type {}", exception)
        } else {
            format!("exception type {} in {}", exception, tech_tags.join(", "))
        };
        queries.push(StrategyQuery {
            strategy: Strategy::ExceptionType,
            kind: QueryKind::Text {
                query: exception.clone(),
                tags: tech_tags.clone(),
            },
            reason,
        });
    }

    let keywords: Vec<&str> = signals
        .keywords
        .iter()
        .take(tuning.query_keywords)
        .map(|k| k.term.as_str())
        .collect();
    if !keywords.is_empty() {
        let technologies: Vec<&str> = signals
            .technologies
            .iter()
            .take(tuning.query_technologies)
            .map(|t| t.as_str())
            .filter(|t| !keywords.contains(t))
            .collect();
        let mut terms = keywords.clone();
        terms.extend(technologies);
        queries.push(StrategyQuery {
            strategy: Strategy::KeywordTech,
            kind: QueryKind::Text {
                query: terms.join(" "),
                tags: Vec::new(),
            },
            reason: format!("keywords: {}", terms.join(" ")),
        });
    }

    let tag_set = top_tags(signals, tuning.tag_query_tags);
    if !tag_set.is_empty() {
        queries.push(StrategyQuery {
            strategy: Strategy::TagOnly,
            reason: format!("tagged {}", tag_set.join(" + ")),
            kind: QueryKind::Tags { tags: tag_set },
        });
    }

    queries
}

/// Merge-by-id accumulator for candidates produced by different strategies.
#[derive(Debug, Default)]
pub struct CandidateAccumulator {
    entries: HashMap<String, SearchCandidate>,
}

impl CandidateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `candidates` with a query's strategy score and reason, then merge them.
    pub fn add(&mut self, query: &StrategyQuery, score: u8, candidates: Vec<SearchCandidate>) {
        for mut candidate in candidates {
            candidate.relevance_score = score.min(100);
            candidate.match_reason = query.reason.clone();
            candidate.strategy = Some(query.strategy);
            self.merge(candidate);
        }
    }

    /// Merge one already-scored candidate. The higher score wins; ties keep the existing entry.
    pub fn merge(&mut self, candidate: SearchCandidate) {
        match self.entries.get_mut(&candidate.id) {
            Some(existing) => {
                if candidate.relevance_score > existing.relevance_score {
                    *existing = candidate;
                }
            }
            None => {
                self.entries.insert(candidate.id.clone(), candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted by relevance (desc), id (asc), truncated to `limit`.
    pub fn into_ranked(self, limit: usize) -> Vec<SearchCandidate> {
        let mut ranked: Vec<SearchCandidate> = self.entries.into_values().collect();
        sort_candidates(&mut ranked);
        ranked.truncate(limit);
        ranked
    }
}

/// Deterministic candidate order: relevance desc, then id asc.
pub fn sort_candidates(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Merge several strategy outputs and rank them.
pub fn merge_and_rank(
    batches: impl IntoIterator<Item = Vec<SearchCandidate>>,
    limit: usize,
) -> Vec<SearchCandidate> {
    let mut acc = CandidateAccumulator::new();
    for batch in batches {
        for candidate in batch {
            acc.merge(candidate);
        }
    }
    acc.into_ranked(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Keyword;
    use std::collections::HashSet;

    fn make_candidate(id: &str, score: u8) -> SearchCandidate {
        SearchCandidate {
            id: id.to_string(),
            title: format!("question {}", id),
            tags: vec![],
            score: 0,
            view_count: 0,
            answer_count: 0,
            is_answered: false,
            link: format!("https://example.com/q/{}", id),
            best_response: None,
            relevance_score: score,
            match_reason: String::new(),
            strategy: None,
        }
    }

    fn make_signals() -> DiagnosticSignals {
        DiagnosticSignals {
            errors: vec![
                "TypeError: cannot read property 'x' of undefined".to_string(),
                "error: second failure line".to_string(),
                "error: third failure line".to_string(),
                "error: fourth failure line".to_string(),
            ],
            exception_types: vec!["TypeError".to_string()],
            technologies: vec!["react".to_string(), "area: build".to_string(), "webpack".to_string()],
            keywords: vec![
                Keyword {
                    term: "render".to_string(),
                    count: 3,
                },
                Keyword {
                    term: "react".to_string(),
                    count: 2,
                },
            ],
            stack_traces: vec![],
        }
    }

    #[test]
    fn test_plan_queries_follows_strategy_order_and_bounds() {
        let queries = plan_queries(&make_signals(), &StrategyTuning::default());
        let strategies: Vec<Strategy> = queries.iter().map(|q| q.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                Strategy::ExactError,
                Strategy::ExactError,
                Strategy::ExactError,
                Strategy::ExceptionType,
                Strategy::KeywordTech,
                Strategy::TagOnly,
            ]
        );

        assert_eq!(
            queries[3].kind,
            QueryKind::Text {
                query: "TypeError".to_string(),
                tags: vec!["react".to_string(), "area-build".to_string()],
            }
        );
        assert_eq!(
            queries[4].kind,
            QueryKind::Text {
                query: "render react area: build".to_string(),
                tags: vec![],
            }
        );
        assert_eq!(
            queries[5].kind,
            QueryKind::Tags {
                tags: vec!["react".to_string(), "area-build".to_string()],
            }
        );
    }

    #[test]
    fn test_plan_queries_empty_signals() {
        let queries = plan_queries(&DiagnosticSignals::default(), &StrategyTuning::default());
        assert!(queries.is_empty());
    }

    #[test]
    fn test_to_tag() {
        assert_eq!(to_tag("React"), "react");
        assert_eq!(to_tag("area: build"), "area-build");
        assert_eq!(to_tag("node.js"), "node.js");
        assert_eq!(to_tag("c++"), "c++");
        assert_eq!(to_tag("  "), "");
    }

    #[test]
    fn test_merge_keeps_max_score() {
        // Two strategies both return Q123: the 95 entry must win regardless of order.
        let low = vec![make_candidate("Q123", 70), make_candidate("Q7", 70)];
        let high = vec![make_candidate("Q123", 95)];

        let ranked = merge_and_rank(vec![low.clone(), high.clone()], 10);
        let q123: Vec<&SearchCandidate> = ranked.iter().filter(|c| c.id == "Q123").collect();
        assert_eq!(q123.len(), 1);
        assert_eq!(q123[0].relevance_score, 95);

        let ranked = merge_and_rank(vec![high, low], 10);
        let q123: Vec<&SearchCandidate> = ranked.iter().filter(|c| c.id == "Q123").collect();
        assert_eq!(q123.len(), 1);
        assert_eq!(q123[0].relevance_score, 95);
    }

    #[test]
    fn test_accumulator_records_winning_strategy() {
        let signals = make_signals();
        let queries = plan_queries(&signals, &StrategyTuning::default());
        let exact = &queries[0];
        let keyword = &queries[4];

        let mut acc = CandidateAccumulator::new();
        acc.add(keyword, 70, vec![make_candidate("Q123", 0)]);
        acc.add(exact, 95, vec![make_candidate("Q123", 0)]);
        acc.add(keyword, 70, vec![make_candidate("Q123", 0)]);

        let ranked = acc.into_ranked(10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].relevance_score, 95);
        assert_eq!(ranked[0].strategy, Some(Strategy::ExactError));
        assert_eq!(ranked[0].match_reason, exact.reason);
    }

    #[test]
    fn test_ranked_order_and_truncation() {
        let input = vec![
            make_candidate("b", 60),
            make_candidate("a", 60),
            make_candidate("z", 95),
            make_candidate("c", 85),
        ];
        let ranked = merge_and_rank(vec![input.clone()], 3);
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "c", "a"]);

        // Idempotent under reruns and input permutation.
        let mut reversed = input;
        reversed.reverse();
        let again = merge_and_rank(vec![reversed], 3);
        assert_eq!(ranked, again);
    }

    #[test]
    fn test_merge_never_duplicates_ids() {
        let strategies: Vec<Vec<SearchCandidate>> = (0..4)
            .map(|s| {
                (0..20)
                    .map(|i| make_candidate(&format!("Q{}", i % 7), (s * 10 + i) as u8))
                    .collect()
            })
            .collect();

        let mut expected_max: HashMap<String, u8> = HashMap::new();
        for batch in &strategies {
            for c in batch {
                let e = expected_max.entry(c.id.clone()).or_insert(0);
                *e = (*e).max(c.relevance_score);
            }
        }

        let ranked = merge_and_rank(strategies, 100);
        let ids: HashSet<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), ranked.len());
        for c in &ranked {
            assert_eq!(c.relevance_score, expected_max[&c.id]);
        }
        for pair in ranked.windows(2) {
            assert!(
                pair[0].relevance_score > pair[1].relevance_score
                    || (pair[0].relevance_score == pair[1].relevance_score
                        && pair[0].id < pair[1].id)
            );
        }
    }

    #[test]
    fn test_strategy_score_is_clamped() {
        let tuning = StrategyTuning {
            exact_error_score: 120,
            ..StrategyTuning::default()
        };
        assert_eq!(strategy_score(Strategy::ExactError, &tuning), 100);
        assert_eq!(strategy_score(Strategy::TagOnly, &tuning), 60);
    }
}
