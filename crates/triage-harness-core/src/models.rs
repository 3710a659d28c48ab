//! Core data models used throughout Triage Harness.
//!
//! These types represent the issues, signals, candidates, precedents, and
//! verdicts that flow through the correlation pipeline. Every type is
//! serializable with stable snake_case field names so downstream renderers
//! can consume a stored run without depending on this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `owner/name` reference to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `"owner/name"`. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// State filter used when listing or targeting issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    #[default]
    All,
    Open,
    Closed,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::All => "all",
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
        }
    }

    pub fn matches(&self, state: IssueState) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Open => state == IssueState::Open,
            StateFilter::Closed => state == IssueState::Closed,
        }
    }
}

/// A single comment in an issue's discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Reaction counters as reported by the issue tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    pub total: u32,
    pub plus_one: u32,
    pub minus_one: u32,
    pub heart: u32,
}

/// An issue fetched from the project's tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    /// Discussion bodies, filled in by the batch pipeline before analysis.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Comment count as reported by the listing; available before comments are fetched.
    pub comment_count: u32,
    #[serde(default)]
    pub reactions: Reactions,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl Issue {
    /// Title, body, and comment bodies joined with blank-line separators.
    pub fn full_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len()
                + self.body.len()
                + self.comments.iter().map(|c| c.body.len() + 2).sum::<usize>()
                + 2,
        );
        text.push_str(&self.title);
        text.push_str("\n\n");
        text.push_str(&self.body);
        for comment in &self.comments {
            text.push_str("\n\n");
            text.push_str(&comment.body);
        }
        text
    }

    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }

    /// Engagement metrics used by the synthesizer.
    pub fn engagement(&self) -> Engagement {
        Engagement {
            comment_count: self.comment_count.max(self.comments.len() as u32),
            reactions: self.reactions.total,
        }
    }
}

/// Raw engagement metrics for one issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub comment_count: u32,
    pub reactions: u32,
}

/// A keyword with its frequency in the issue text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub count: u32,
}

/// Diagnostic signals extracted from one issue's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSignals {
    pub errors: Vec<String>,
    pub exception_types: Vec<String>,
    pub technologies: Vec<String>,
    pub keywords: Vec<Keyword>,
    pub stack_traces: Vec<String>,
}

impl DiagnosticSignals {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
            && self.exception_types.is_empty()
            && self.technologies.is_empty()
            && self.keywords.is_empty()
            && self.stack_traces.is_empty()
    }
}

/// One independent way of querying the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ExactError,
    ExceptionType,
    KeywordTech,
    TagOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExactError => "exact_error",
            Strategy::ExceptionType => "exception_type",
            Strategy::KeywordTech => "keyword_tech",
            Strategy::TagOnly => "tag_only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record from the external knowledge base.
///
/// Knowledge-base adapters return candidates with `relevance_score = 0` and
/// no strategy; the search orchestrator stamps both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    /// Popularity/quality signal (community vote score).
    pub score: i64,
    pub view_count: u64,
    pub answer_count: u32,
    pub is_answered: bool,
    pub link: String,
    pub best_response: Option<String>,
    /// Strategy confidence in `[0, 100]`.
    pub relevance_score: u8,
    pub match_reason: String,
    pub strategy: Option<Strategy>,
}

impl SearchCandidate {
    pub fn has_answers(&self) -> bool {
        self.is_answered || self.answer_count > 0
    }
}

/// A community response (answer) to a knowledge-base record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub score: i64,
    pub is_accepted: bool,
    pub excerpt: String,
}

/// A closed issue from the same corpus judged similar to the analyzed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentIssue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub labels: Vec<String>,
    pub comment_count: u32,
    pub closed_at: Option<DateTime<Utc>>,
    pub similarity_score: u32,
    pub shared_words: Vec<String>,
    pub shared_labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solvability {
    Low,
    Medium,
    High,
}

/// Human label for an effort estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortBand {
    Quick,
    Standard,
    Moderate,
    Complex,
}

impl EffortBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortBand::Quick => "quick",
            EffortBand::Standard => "standard",
            EffortBand::Moderate => "moderate",
            EffortBand::Complex => "complex",
        }
    }
}

/// The synthesized decision for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub complexity: Complexity,
    pub solvability: Solvability,
    /// In `[0, 100]`.
    pub confidence: u8,
    /// In `[1, 40]`.
    pub estimated_effort_hours: u8,
    pub effort: EffortBand,
    pub steps: Vec<String>,
}

/// Per-issue result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueAnalysis {
    pub issue: Issue,
    pub signals: DiagnosticSignals,
    pub candidates: Vec<SearchCandidate>,
    pub precedents: Vec<PrecedentIssue>,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_ref_parse() {
        let repo = RepoRef::parse("rust-lang/cargo").unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.name, "cargo");
        assert_eq!(repo.to_string(), "rust-lang/cargo");

        assert!(RepoRef::parse("cargo").is_none());
        assert!(RepoRef::parse("/cargo").is_none());
        assert!(RepoRef::parse("a/b/c").is_none());
        assert!(RepoRef::parse("").is_none());
    }

    #[test]
    fn test_state_filter_matches() {
        assert!(StateFilter::All.matches(IssueState::Open));
        assert!(StateFilter::All.matches(IssueState::Closed));
        assert!(StateFilter::Open.matches(IssueState::Open));
        assert!(!StateFilter::Open.matches(IssueState::Closed));
        assert!(!StateFilter::Closed.matches(IssueState::Open));
    }

    #[test]
    fn test_full_text_includes_comments_in_order() {
        let issue = Issue {
            number: 1,
            title: "Crash".to_string(),
            body: "It crashes".to_string(),
            state: IssueState::Open,
            labels: vec![],
            comments: vec![
                Comment {
                    author: "a".to_string(),
                    body: "first".to_string(),
                    created_at: Utc::now(),
                },
                Comment {
                    author: "b".to_string(),
                    body: "second".to_string(),
                    created_at: Utc::now(),
                },
            ],
            comment_count: 2,
            reactions: Reactions::default(),
            created_at: Utc::now(),
            closed_at: None,
            url: String::new(),
        };
        assert_eq!(issue.full_text(), "Crash\n\nIt crashes\n\nfirst\n\nsecond");
        assert_eq!(issue.engagement().comment_count, 2);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&Strategy::ExactError).unwrap(),
            "\"exact_error\""
        );
        assert_eq!(
            serde_json::to_string(&Complexity::High).unwrap(),
            "\"high\""
        );
        assert_eq!(
            serde_json::to_string(&EffortBand::Moderate).unwrap(),
            "\"moderate\""
        );
    }
}
