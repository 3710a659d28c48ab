//! Tunable scoring constants.
//!
//! The strategy ceilings, precedent weights, and synthesis increments are
//! heuristics, not derived quantities. Every one of them is exposed here
//! with its default so deployments can retune through the `[scoring.*]`
//! config tables without touching the algorithms.

use serde::{Deserialize, Serialize};

/// Limits applied by the signal extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTuning {
    pub min_error_len: usize,
    pub max_error_len: usize,
    pub max_errors: usize,
    pub max_stack_traces: usize,
    pub max_trace_len: usize,
    pub max_keywords: usize,
    /// Lower-case labels kept out of the technology list. Empty by default.
    pub ignored_labels: Vec<String>,
}

impl Default for SignalTuning {
    fn default() -> Self {
        Self {
            min_error_len: 10,
            max_error_len: 300,
            max_errors: 10,
            max_stack_traces: 3,
            max_trace_len: 1000,
            max_keywords: 20,
            ignored_labels: Vec::new(),
        }
    }
}

/// Per-strategy ceilings and query fan-out for the search orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTuning {
    pub exact_error_score: u8,
    pub exception_type_score: u8,
    pub keyword_tech_score: u8,
    pub tag_only_score: u8,
    pub max_error_queries: usize,
    pub max_exception_queries: usize,
    pub query_keywords: usize,
    pub query_technologies: usize,
    pub tag_query_tags: usize,
    pub max_candidates: usize,
    /// How many of the ranked candidates get their best response fetched.
    pub response_fetch_limit: usize,
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            exact_error_score: 95,
            exception_type_score: 85,
            keyword_tech_score: 70,
            tag_only_score: 60,
            max_error_queries: 3,
            max_exception_queries: 2,
            query_keywords: 5,
            query_technologies: 2,
            tag_query_tags: 2,
            max_candidates: 10,
            response_fetch_limit: 10,
        }
    }
}

/// Weights for same-corpus precedent matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecedentTuning {
    pub shared_word_weight: u32,
    pub shared_label_weight: u32,
    pub discussed_bonus: u32,
    /// A precedent with more comments than this earns the discussed bonus.
    pub discussed_min_comments: u32,
    /// Title words must be longer than this to count.
    pub min_word_len: usize,
    /// Scores must be strictly greater than this to be kept.
    pub min_score: u32,
    pub max_precedents: usize,
}

impl Default for PrecedentTuning {
    fn default() -> Self {
        Self {
            shared_word_weight: 10,
            shared_label_weight: 20,
            discussed_bonus: 15,
            discussed_min_comments: 2,
            min_word_len: 3,
            min_score: 20,
            max_precedents: 3,
        }
    }
}

/// Increments and thresholds for verdict synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisTuning {
    pub complexity_base: u32,
    pub no_candidates_penalty: u32,
    pub no_answered_penalty: u32,
    pub busy_discussion_penalty: u32,
    pub no_precedents_penalty: u32,
    /// Accumulated complexity at or below this is `Low`.
    pub low_complexity_max: u32,
    /// Accumulated complexity at or below this (and above low) is `Medium`.
    pub medium_complexity_max: u32,
    /// More comments than this counts as a busy discussion.
    pub busy_comment_threshold: u32,

    /// Popularity at or above this makes an answered candidate "strong".
    pub strong_answer_popularity: i64,
    /// Popularity at or above this earns the popularity bonus.
    pub popular_threshold: i64,

    pub confidence_base: i32,
    pub answered_bonus: i32,
    pub answered_cap: i32,
    pub popular_bonus: i32,
    pub popular_cap: i32,
    pub precedent_bonus: i32,
    pub precedent_cap: i32,
    pub candidate_bonus: i32,
    pub candidate_cap: i32,

    pub effort_base_hours: i32,
    pub strong_answer_hours: i32,
    pub precedent_hours: i32,
    pub uncertainty_hours: i32,
    pub min_hours: i32,
    pub max_hours: i32,
}

impl Default for SynthesisTuning {
    fn default() -> Self {
        Self {
            complexity_base: 1,
            no_candidates_penalty: 2,
            no_answered_penalty: 1,
            busy_discussion_penalty: 2,
            no_precedents_penalty: 1,
            low_complexity_max: 1,
            medium_complexity_max: 3,
            busy_comment_threshold: 10,

            strong_answer_popularity: 5,
            popular_threshold: 10,

            confidence_base: 50,
            answered_bonus: 10,
            answered_cap: 30,
            popular_bonus: 5,
            popular_cap: 15,
            precedent_bonus: 5,
            precedent_cap: 15,
            candidate_bonus: 2,
            candidate_cap: 10,

            effort_base_hours: 8,
            strong_answer_hours: 4,
            precedent_hours: 2,
            uncertainty_hours: 4,
            min_hours: 1,
            max_hours: 40,
        }
    }
}

/// All scoring constants, grouped as they appear under `[scoring]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTuning {
    pub signals: SignalTuning,
    pub strategies: StrategyTuning,
    pub precedents: PrecedentTuning,
    pub synthesis: SynthesisTuning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let tuning: ScoringTuning = serde_json::from_str(
            r#"{ "strategies": { "exact_error_score": 90 }, "precedents": { "max_precedents": 5 } }"#,
        )
        .unwrap();
        assert_eq!(tuning.strategies.exact_error_score, 90);
        assert_eq!(tuning.strategies.exception_type_score, 85);
        assert_eq!(tuning.precedents.max_precedents, 5);
        assert_eq!(tuning.precedents.min_score, 20);
        assert_eq!(tuning.synthesis, SynthesisTuning::default());
    }
}
