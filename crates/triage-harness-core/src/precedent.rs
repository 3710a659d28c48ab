//! Same-corpus precedent matching.
//!
//! Finds closed issues in the fetched corpus that resemble the issue under
//! analysis, using title word overlap, shared labels, and a bonus for
//! precedents that were actually discussed. Pure and synchronous.

use std::collections::BTreeSet;

use crate::models::{Issue, PrecedentIssue};
use crate::signals::is_stopword;
use crate::tuning::PrecedentTuning;

/// Ranks closed issues by similarity to a target issue.
#[derive(Debug, Clone, Default)]
pub struct PrecedentFinder {
    tuning: PrecedentTuning,
}

impl PrecedentFinder {
    pub fn new(tuning: PrecedentTuning) -> Self {
        Self { tuning }
    }

    /// Closed issues from `corpus` similar to `issue`, best first.
    ///
    /// The target itself is never returned, and every entry scores strictly
    /// above `min_score`.
    pub fn find<'a>(
        &self,
        issue: &Issue,
        corpus: impl IntoIterator<Item = &'a Issue>,
    ) -> Vec<PrecedentIssue> {
        let target_words = self.significant_words(&issue.title);
        let target_labels = normalized_labels(&issue.labels);

        let mut precedents: Vec<PrecedentIssue> = corpus
            .into_iter()
            .filter(|other| other.number != issue.number && other.is_closed())
            .filter_map(|other| self.score(other, &target_words, &target_labels))
            .filter(|p| p.similarity_score > self.tuning.min_score)
            .collect();

        precedents.sort_by(|a, b| {
            b.similarity_score
                .cmp(&a.similarity_score)
                .then(a.number.cmp(&b.number))
        });
        precedents.truncate(self.tuning.max_precedents);
        precedents
    }

    fn score(
        &self,
        other: &Issue,
        target_words: &BTreeSet<String>,
        target_labels: &BTreeSet<String>,
    ) -> Option<PrecedentIssue> {
        let other_words = self.significant_words(&other.title);
        let other_labels = normalized_labels(&other.labels);

        let shared_words: Vec<String> = target_words.intersection(&other_words).cloned().collect();
        let shared_labels: Vec<String> =
            target_labels.intersection(&other_labels).cloned().collect();

        if shared_words.is_empty() && shared_labels.is_empty() {
            return None;
        }

        let mut score = self.tuning.shared_word_weight * shared_words.len() as u32
            + self.tuning.shared_label_weight * shared_labels.len() as u32;
        if other.comment_count > self.tuning.discussed_min_comments {
            score += self.tuning.discussed_bonus;
        }

        Some(PrecedentIssue {
            number: other.number,
            title: other.title.clone(),
            url: other.url.clone(),
            labels: other.labels.clone(),
            comment_count: other.comment_count,
            closed_at: other.closed_at,
            similarity_score: score,
            shared_words,
            shared_labels,
        })
    }

    fn significant_words(&self, title: &str) -> BTreeSet<String> {
        title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > self.tuning.min_word_len && !is_stopword(w))
            .map(|w| w.to_string())
            .collect()
    }
}

fn normalized_labels(labels: &[String]) -> BTreeSet<String> {
    labels
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueState, Reactions};
    use chrono::Utc;

    fn make_issue(number: u64, title: &str, labels: &[&str], state: IssueState, comments: u32) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            body: String::new(),
            state,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            comments: vec![],
            comment_count: comments,
            reactions: Reactions::default(),
            created_at: Utc::now(),
            closed_at: None,
            url: format!("https://example.com/issues/{}", number),
        }
    }

    #[test]
    fn test_scoring_formula() {
        let target = make_issue(1, "Webpack build crashes on startup", &["build", "bug"], IssueState::Open, 0);
        let corpus = vec![
            // 2 words (webpack, build) + 2 labels + discussed bonus = 20 + 40 + 15
            make_issue(2, "Webpack build broken", &["Build", "bug"], IssueState::Closed, 5),
            // 1 word (crashes) only = 10, dropped by threshold
            make_issue(3, "Editor crashes", &[], IssueState::Closed, 0),
            // 1 label = 20, not > 20, dropped
            make_issue(4, "Unrelated", &["bug"], IssueState::Closed, 0),
            // 1 label + discussed = 35
            make_issue(5, "Something else", &["bug"], IssueState::Closed, 3),
        ];

        let found = PrecedentFinder::default().find(&target, &corpus);
        let numbers: Vec<u64> = found.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![2, 5]);
        assert_eq!(found[0].similarity_score, 75);
        assert_eq!(found[0].shared_words, vec!["build".to_string(), "webpack".to_string()]);
        assert_eq!(found[0].shared_labels, vec!["bug".to_string(), "build".to_string()]);
        assert_eq!(found[1].similarity_score, 35);
    }

    #[test]
    fn test_never_returns_self_or_open_issues() {
        let target = make_issue(1, "Webpack build crashes", &["build"], IssueState::Closed, 9);
        let corpus = vec![
            target.clone(),
            make_issue(2, "Webpack build crashes", &["build"], IssueState::Open, 9),
        ];
        let found = PrecedentFinder::default().find(&target, &corpus);
        assert!(found.is_empty());
    }

    #[test]
    fn test_short_and_stop_words_ignored() {
        let target = make_issue(1, "The app is slow with this", &[], IssueState::Open, 0);
        let corpus = vec![make_issue(2, "The app is slow with this", &[], IssueState::Closed, 0)];
        // "slow" is the only significant word: 10 points, below the threshold.
        let found = PrecedentFinder::default().find(&target, &corpus);
        assert!(found.is_empty());
    }

    #[test]
    fn test_capped_and_tie_broken_by_number() {
        let target = make_issue(1, "Parser panics", &["parser", "crash"], IssueState::Open, 0);
        let corpus: Vec<Issue> = (2..10)
            .rev()
            .map(|n| make_issue(n, "Parser panics", &["parser", "crash"], IssueState::Closed, 0))
            .collect();
        let found = PrecedentFinder::default().find(&target, &corpus);
        let numbers: Vec<u64> = found.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[test]
    fn test_all_results_above_threshold() {
        let tuning = PrecedentTuning {
            min_score: 30,
            max_precedents: 10,
            ..PrecedentTuning::default()
        };
        let target = make_issue(1, "Cache invalidation fails", &["cache"], IssueState::Open, 0);
        let corpus = vec![
            make_issue(2, "Cache invalidation", &[], IssueState::Closed, 0),
            make_issue(3, "Cache fails", &["cache"], IssueState::Closed, 0),
            make_issue(4, "Cache", &["cache"], IssueState::Closed, 4),
        ];
        let found = PrecedentFinder::new(tuning.clone()).find(&target, &corpus);
        assert!(!found.is_empty());
        for p in &found {
            assert!(p.similarity_score > tuning.min_score);
            assert_ne!(p.number, target.number);
        }
    }
}
