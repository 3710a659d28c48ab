//! Batch run state and aggregated statistics.
//!
//! A [`BatchRun`] is the single mutable accumulator of one pipeline
//! execution. The batch orchestrator owns it, appends one [`BatchResult`]
//! per completed batch, and persists it after every batch so an interrupted
//! run can resume from `next_offset` with its completed batches untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{IssueAnalysis, RepoRef};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Fetching,
    Analyzing { batch: usize },
    Checkpointing { batch: usize },
    Done,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Analyzing { .. } => "analyzing",
            RunPhase::Checkpointing { .. } => "checkpointing",
            RunPhase::Done => "done",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Failed => "failed",
        }
    }
}

/// An issue the run could not analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedIssue {
    pub number: u64,
    pub reason: String,
    pub attempts: u32,
}

/// Output of one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub index: usize,
    pub analyses: Vec<IssueAnalysis>,
    pub gaps: Vec<SkippedIssue>,
}

/// Knowledge-base call counters for one issue or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCounters {
    pub issued: u32,
    pub failed: u32,
    pub cooldowns: u32,
}

impl QueryCounters {
    pub fn add(&mut self, other: &QueryCounters) {
        self.issued += other.issued;
        self.failed += other.failed;
        self.cooldowns += other.cooldowns;
    }
}

/// Corpus and call counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub fetched_issues: usize,
    pub filtered_pull_requests: usize,
    pub targeted: usize,
    pub fetch_truncated: bool,
    pub queries: QueryCounters,
}

/// The accumulator of one end-to-end execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: String,
    /// Fingerprint of the run parameters; a checkpoint is only resumed
    /// when the key matches.
    pub run_key: String,
    pub repo: RepoRef,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: RunPhase,
    /// Fetched, filtered target issue numbers in processing order.
    pub issue_order: Vec<u64>,
    pub batch_size: usize,
    /// Index into `issue_order` of the first unprocessed target.
    pub next_offset: usize,
    pub batches: Vec<BatchResult>,
    pub counters: RunCounters,
    /// Wall time spent across all sessions of this run.
    pub elapsed_ms: u64,
    #[serde(default)]
    pub stats: Option<RunStats>,
}

impl BatchRun {
    pub fn new(
        run_id: String,
        run_key: String,
        repo: RepoRef,
        batch_size: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            run_key,
            repo,
            started_at,
            finished_at: None,
            phase: RunPhase::Idle,
            issue_order: Vec::new(),
            batch_size: batch_size.max(1),
            next_offset: 0,
            batches: Vec::new(),
            counters: RunCounters::default(),
            elapsed_ms: 0,
            stats: None,
        }
    }

    /// Slice of `issue_order` making up batch `index`.
    pub fn batch_targets(&self, index: usize) -> &[u64] {
        let start = (index * self.batch_size).min(self.issue_order.len());
        let end = (start + self.batch_size).min(self.issue_order.len());
        &self.issue_order[start..end]
    }

    pub fn total_batches(&self) -> usize {
        self.issue_order.len().div_ceil(self.batch_size.max(1))
    }

    pub fn is_complete(&self) -> bool {
        self.next_offset >= self.issue_order.len()
    }

    pub fn analyses(&self) -> impl Iterator<Item = &IssueAnalysis> {
        self.batches.iter().flat_map(|b| b.analyses.iter())
    }

    pub fn gaps(&self) -> impl Iterator<Item = &SkippedIssue> {
        self.batches.iter().flat_map(|b| b.gaps.iter())
    }

    /// Record a completed batch and advance the cursor past its targets.
    pub fn push_batch(&mut self, batch: BatchResult) {
        let covered = batch.analyses.len() + batch.gaps.len();
        self.next_offset = (self.next_offset + covered).min(self.issue_order.len());
        self.batches.push(batch);
    }

    /// Serialized size of the accumulator, used as a coarse memory footprint.
    pub fn footprint_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Recompute [`RunStats`] from the current contents.
    pub fn refresh_stats(&mut self) {
        self.stats = Some(RunStats::from_run(self));
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub fetched_issues: usize,
    pub filtered_pull_requests: usize,
    pub targeted: usize,
    pub analyzed: usize,
    pub skipped: usize,
    pub with_candidates: usize,
    pub with_answered_candidates: usize,
    pub with_precedents: usize,
    /// Share of analyzed issues with at least one candidate, in percent.
    pub candidate_coverage_pct: f64,
    pub answered_coverage_pct: f64,
    pub precedent_coverage_pct: f64,
    pub average_confidence: f64,
    pub complexity: BTreeMap<String, usize>,
    pub solvability: BTreeMap<String, usize>,
    pub effort: BTreeMap<String, usize>,
    pub queries: QueryCounters,
    pub fetch_truncated: bool,
    pub batches_completed: usize,
    pub duration_ms: u64,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / whole as f64).round() / 10.0
    }
}

fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

impl RunStats {
    pub fn from_run(run: &BatchRun) -> Self {
        let mut stats = RunStats {
            fetched_issues: run.counters.fetched_issues,
            filtered_pull_requests: run.counters.filtered_pull_requests,
            targeted: run.counters.targeted,
            queries: run.counters.queries,
            fetch_truncated: run.counters.fetch_truncated,
            batches_completed: run.batches.len(),
            duration_ms: run.elapsed_ms,
            skipped: run.gaps().count(),
            ..RunStats::default()
        };

        let mut confidence_sum = 0u64;
        for analysis in run.analyses() {
            stats.analyzed += 1;
            if !analysis.candidates.is_empty() {
                stats.with_candidates += 1;
            }
            if analysis.candidates.iter().any(|c| c.is_answered) {
                stats.with_answered_candidates += 1;
            }
            if !analysis.precedents.is_empty() {
                stats.with_precedents += 1;
            }
            confidence_sum += analysis.verdict.confidence as u64;

            *stats
                .complexity
                .entry(label(&analysis.verdict.complexity))
                .or_insert(0) += 1;
            *stats
                .solvability
                .entry(label(&analysis.verdict.solvability))
                .or_insert(0) += 1;
            *stats
                .effort
                .entry(analysis.verdict.effort.as_str().to_string())
                .or_insert(0) += 1;
        }

        stats.candidate_coverage_pct = pct(stats.with_candidates, stats.analyzed);
        stats.answered_coverage_pct = pct(stats.with_answered_candidates, stats.analyzed);
        stats.precedent_coverage_pct = pct(stats.with_precedents, stats.analyzed);
        if stats.analyzed > 0 {
            stats.average_confidence =
                (confidence_sum as f64 * 10.0 / stats.analyzed as f64).round() / 10.0;
        }
        stats
    }
}
