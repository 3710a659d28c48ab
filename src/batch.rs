//! Batch pipeline orchestration.
//!
//! Drives one run end to end: fetch the issue corpus page by page, choose
//! the targets, analyze them in fixed-size batches, and checkpoint the
//! [`BatchRun`] after the fetch and after every batch. A later run with the
//! same parameters picks the checkpoint up and continues at `next_offset`.
//!
//! ```text
//! Idle → Fetching → Analyzing{0} → Checkpointing{0} → Analyzing{1} → … → Done
//!                        └──────────── cancel ────────────┘→ Cancelled
//! ```
//!
//! Items are processed one at a time. Per-item failures become gaps
//! ([`SkippedIssue`]) and never stop the run; only a failed first page or a
//! checkpoint write error does.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use triage_harness_core::error::ExternalError;
use triage_harness_core::external::{IssueSource, KnowledgeBase, SourceRecord};
use triage_harness_core::models::{Issue, IssueAnalysis, RepoRef, StateFilter};
use triage_harness_core::run::{BatchResult, BatchRun, QueryCounters, RunPhase, SkippedIssue};

use crate::analyze::IssueAnalyzer;
use crate::checkpoint::{open_store, CheckpointStore};
use crate::config::Config;
use crate::error::RunError;
use crate::github::GitHubClient;
use crate::pacing::Pacer;
use crate::progress::{NoProgress, RunProgressEvent, RunProgressReporter};
use crate::retry::RetryPolicy;
use crate::stackexchange::StackExchangeClient;

const MISSING_FROM_CORPUS: &str = "not found in fetched corpus";

/// Parameters that shape a run. Two runs with equal settings share a run key.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub repo: RepoRef,
    pub state: StateFilter,
    pub analyze_state: StateFilter,
    pub page_size: u32,
    pub max_issues: usize,
    pub batch_size: usize,
    /// Cap on the number of targeted issues (`--limit`).
    pub target_limit: Option<usize>,
    pub memory_warn_bytes: u64,
}

impl BatchSettings {
    pub fn from_config(config: &Config, target_limit: Option<usize>) -> Result<Self, RunError> {
        let repo = config
            .repo()
            .map_err(|e| RunError::Configuration(e.to_string()))?;
        Ok(Self {
            repo,
            state: config.source.state,
            analyze_state: config.batch.analyze_state,
            page_size: config.source.page_size.max(1),
            max_issues: config.source.max_issues,
            batch_size: config.batch.batch_size.max(1),
            target_limit,
            memory_warn_bytes: config.batch.memory_warn_mb * 1024 * 1024,
        })
    }

    /// Whether an accumulator of `footprint_bytes` should be warned about.
    pub fn over_memory_warning(&self, footprint_bytes: u64) -> bool {
        footprint_bytes > self.memory_warn_bytes
    }

    /// Fingerprint of everything that determines the target order and batching.
    pub fn run_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repo.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.state.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.analyze_state.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.page_size.to_le_bytes());
        hasher.update((self.max_issues as u64).to_le_bytes());
        hasher.update((self.batch_size as u64).to_le_bytes());
        match self.target_limit {
            Some(limit) => hasher.update((limit as u64).to_le_bytes()),
            None => hasher.update(b"unlimited"),
        }
        let hash = format!("{:x}", hasher.finalize());
        hash[..16].to_string()
    }
}

/// The fetched, PR-filtered issue corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub issues: Vec<Issue>,
    pub pull_requests: usize,
    /// A page after the first failed and pagination stopped early.
    pub truncated: bool,
}

impl Corpus {
    /// Target issue numbers in processing order.
    pub fn targets(&self, settings: &BatchSettings) -> Vec<u64> {
        let mut order: Vec<u64> = self
            .issues
            .iter()
            .filter(|i| settings.analyze_state.matches(i.state))
            .map(|i| i.number)
            .collect();
        if let Some(limit) = settings.target_limit {
            order.truncate(limit);
        }
        order
    }
}

/// What a run would do, without any knowledge-base calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub run_key: String,
    pub fetched: usize,
    pub pull_requests: usize,
    pub targeted: usize,
    pub batches: usize,
    pub truncated: bool,
    /// Completed batches already in the checkpoint.
    pub checkpointed_batches: usize,
}

pub struct BatchOrchestrator {
    settings: BatchSettings,
    source: Arc<dyn IssueSource>,
    source_pacer: Arc<Pacer>,
    retry: RetryPolicy,
    analyzer: IssueAnalyzer,
    store: Arc<dyn CheckpointStore>,
    progress: Arc<dyn RunProgressReporter>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        settings: BatchSettings,
        source: Arc<dyn IssueSource>,
        source_pacer: Arc<Pacer>,
        retry: RetryPolicy,
        analyzer: IssueAnalyzer,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            settings,
            source,
            source_pacer,
            retry,
            analyzer,
            store,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn RunProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wire the GitHub and Stack Exchange adapters, pacers, and checkpoint
    /// store described by `config`.
    pub async fn from_config(config: &Config, target_limit: Option<usize>) -> anyhow::Result<Self> {
        let settings = BatchSettings::from_config(config, target_limit)?;

        let source_pacer = Arc::new(Pacer::new(
            "source",
            config.min_source_delay(),
            config.rate_limit_cooldown(),
        ));
        let knowledge_pacer = Arc::new(Pacer::new(
            "knowledge",
            config.min_knowledge_delay(),
            config.rate_limit_cooldown(),
        ));
        let source: Arc<dyn IssueSource> = Arc::new(GitHubClient::new(&config.source)?);
        let knowledge: Arc<dyn KnowledgeBase> = Arc::new(StackExchangeClient::new(
            &config.knowledge,
            knowledge_pacer.clone(),
        )?);
        let analyzer = IssueAnalyzer::new(
            &config.scoring,
            knowledge,
            knowledge_pacer,
            config.knowledge.fetch_responses,
        );
        let store: Arc<dyn CheckpointStore> = Arc::from(open_store(&config.checkpoint).await?);

        Ok(Self::new(
            settings,
            source,
            source_pacer,
            RetryPolicy::from_config(&config.batch),
            analyzer,
            store,
        ))
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Run, or resume the checkpointed run with the same key.
    ///
    /// `fresh` discards any checkpoint first. A checkpoint that is already
    /// `Done` is returned as is.
    pub async fn run(&self, fresh: bool) -> Result<BatchRun, RunError> {
        let run_key = self.settings.run_key();
        if fresh {
            self.store.clear(&run_key).await?;
        }

        let session = Instant::now();
        let stored = self.store.load(&run_key).await?;
        if let Some(run) = &stored {
            if run.phase == RunPhase::Done {
                info!(run_id = %run.run_id, "run already complete");
                return Ok(run.clone());
            }
        }

        let (mut run, corpus) = match stored {
            Some(mut run) => {
                info!(
                    run_id = %run.run_id,
                    next_offset = run.next_offset,
                    targets = run.issue_order.len(),
                    store = %self.store.describe(),
                    "resuming run"
                );
                let corpus = match self.fetch_corpus().await {
                    Ok(corpus) => corpus,
                    Err(err) => {
                        run.phase = RunPhase::Failed;
                        if let Err(save_err) = self.store.save(&run).await {
                            warn!(error = %save_err, "could not record failed run");
                        }
                        return Err(err);
                    }
                };
                (run, corpus)
            }
            None => {
                let mut run = BatchRun::new(
                    Uuid::new_v4().to_string(),
                    run_key.clone(),
                    self.settings.repo.clone(),
                    self.settings.batch_size,
                    chrono::Utc::now(),
                );
                run.phase = RunPhase::Fetching;
                info!(run_id = %run.run_id, repo = %run.repo, "starting run");
                let corpus = self.fetch_corpus().await?;
                run.issue_order = corpus.targets(&self.settings);
                run.counters.fetched_issues = corpus.issues.len();
                run.counters.filtered_pull_requests = corpus.pull_requests;
                run.counters.targeted = run.issue_order.len();
                run.counters.fetch_truncated = corpus.truncated;
                self.store.save(&run).await?;
                (run, corpus)
            }
        };

        let prior_elapsed = run.elapsed_ms;
        self.process(&mut run, &corpus, session, prior_elapsed).await?;

        if run.phase != RunPhase::Cancelled && run.is_complete() {
            run.phase = RunPhase::Done;
            run.finished_at = Some(chrono::Utc::now());
            run.elapsed_ms = prior_elapsed + session.elapsed().as_millis() as u64;
            run.refresh_stats();
            self.store.save(&run).await?;
            info!(
                run_id = %run.run_id,
                batches = run.batches.len(),
                elapsed_ms = run.elapsed_ms,
                "run complete"
            );
        }

        self.progress.report(RunProgressEvent::Finished {
            phase: run.phase.as_str().to_string(),
            analyzed: run.analyses().count() as u64,
            skipped: run.gaps().count() as u64,
        });
        Ok(run)
    }

    /// Analyze the remaining batches of `run`, checkpointing after each.
    async fn process(
        &self,
        run: &mut BatchRun,
        corpus: &Corpus,
        session: Instant,
        prior_elapsed: u64,
    ) -> Result<(), RunError> {
        let by_number: HashMap<u64, &Issue> = corpus.issues.iter().map(|i| (i.number, i)).collect();
        let total = run.issue_order.len() as u64;
        let total_batches = run.total_batches();

        while !run.is_complete() {
            if self.cancel.is_cancelled() {
                info!(run_id = %run.run_id, next_offset = run.next_offset, "run cancelled between batches");
                run.phase = RunPhase::Cancelled;
                return Ok(());
            }

            let index = run.batches.len();
            run.phase = RunPhase::Analyzing { batch: index };
            let targets = run.batch_targets(index).to_vec();
            info!(batch = index, of = total_batches, items = targets.len(), "analyzing batch");

            let mut batch = BatchResult {
                index,
                analyses: Vec::new(),
                gaps: Vec::new(),
            };
            let mut queries = QueryCounters::default();

            for number in targets {
                if self.cancel.is_cancelled() {
                    info!(
                        run_id = %run.run_id,
                        batch = index,
                        "run cancelled mid-batch, partial batch discarded"
                    );
                    run.phase = RunPhase::Cancelled;
                    return Ok(());
                }

                let n = (run.next_offset + batch.analyses.len() + batch.gaps.len() + 1) as u64;
                self.progress.report(RunProgressEvent::Analyzing {
                    batch: index,
                    number,
                    n,
                    total,
                });

                let Some(issue) = by_number.get(&number) else {
                    self.record_gap(&mut batch, number, MISSING_FROM_CORPUS.to_string(), 0);
                    continue;
                };

                match self.analyze_item(issue, &corpus.issues).await {
                    Ok((analysis, counters)) => {
                        queries.add(&counters);
                        batch.analyses.push(analysis);
                    }
                    Err(err) => {
                        warn!(issue = number, code = err.error_code(), error = %err, "issue skipped");
                        let attempts = err.attempts();
                        self.record_gap(&mut batch, number, err.to_string(), attempts);
                    }
                }
            }

            run.phase = RunPhase::Checkpointing { batch: index };
            run.counters.queries.add(&queries);
            run.push_batch(batch);
            run.elapsed_ms = prior_elapsed + session.elapsed().as_millis() as u64;
            self.store.save(run).await?;
            self.progress.report(RunProgressEvent::Checkpoint {
                batch: index,
                completed: run.next_offset as u64,
                total,
            });

            let footprint = run.footprint_bytes() as u64;
            if self.settings.over_memory_warning(footprint) {
                warn!(
                    footprint_bytes = footprint,
                    limit_bytes = self.settings.memory_warn_bytes,
                    "run accumulator above memory warning threshold"
                );
            }
        }
        Ok(())
    }

    fn record_gap(&self, batch: &mut BatchResult, number: u64, reason: String, attempts: u32) {
        self.progress.report(RunProgressEvent::Skipped {
            number,
            reason: reason.clone(),
        });
        batch.gaps.push(SkippedIssue {
            number,
            reason,
            attempts,
        });
    }

    /// Fetch comments when the listing reports any, then analyze.
    async fn analyze_item(
        &self,
        issue: &Issue,
        corpus: &[Issue],
    ) -> Result<(IssueAnalysis, QueryCounters), RunError> {
        if issue.comment_count == 0 {
            return Ok(self.analyzer.analyze(issue, corpus).await);
        }

        let source = &self.source;
        let repo = &self.settings.repo;
        let number = issue.number;
        let mut issue = issue.clone();
        match self
            .retry
            .run(&self.source_pacer, "comments", || async move {
                source.get_comments(repo, number).await
            })
            .await
        {
            Ok(comments) => issue.comments = comments,
            Err(RunError::External(ExternalError::Malformed(msg))) => {
                warn!(issue = number, error = %msg, "malformed comments, analyzing without them");
            }
            Err(err) => return Err(err),
        }
        Ok(self.analyzer.analyze(&issue, corpus).await)
    }

    /// List the corpus page by page, dropping pull requests.
    pub async fn fetch_corpus(&self) -> Result<Corpus, RunError> {
        let source = &self.source;
        let repo = &self.settings.repo;
        let state = self.settings.state;
        let page_size = self.settings.page_size;

        let mut corpus = Corpus::default();
        let mut page = 1u32;
        loop {
            let result = self
                .retry
                .run(&self.source_pacer, "issues", || async move {
                    source.list_issues(repo, state, page, page_size).await
                })
                .await;
            let listing = match result {
                Ok(listing) => listing,
                Err(err) if page == 1 => return Err(err),
                Err(err) => {
                    warn!(page, fetched = corpus.issues.len(), error = %err, "page failed, continuing with partial corpus");
                    corpus.truncated = true;
                    break;
                }
            };

            let last = listing.is_last(page_size);
            for record in listing.records {
                match record {
                    SourceRecord::Issue(issue) if corpus.issues.len() < self.settings.max_issues => {
                        corpus.issues.push(issue);
                    }
                    SourceRecord::Issue(_) => {}
                    SourceRecord::PullRequest { .. } => corpus.pull_requests += 1,
                }
            }
            self.progress.report(RunProgressEvent::Fetching {
                page,
                fetched: corpus.issues.len() as u64,
            });

            if last || corpus.issues.len() >= self.settings.max_issues {
                break;
            }
            page += 1;
        }

        info!(
            issues = corpus.issues.len(),
            pull_requests = corpus.pull_requests,
            truncated = corpus.truncated,
            "corpus fetched"
        );
        Ok(corpus)
    }

    /// Fetch and filter the corpus without analyzing anything.
    pub async fn plan(&self) -> Result<RunPlan, RunError> {
        let run_key = self.settings.run_key();
        let checkpointed_batches = self
            .store
            .load(&run_key)
            .await?
            .map(|run| run.batches.len())
            .unwrap_or(0);
        let corpus = self.fetch_corpus().await?;
        let targeted = corpus.targets(&self.settings).len();
        Ok(RunPlan {
            run_key,
            fetched: corpus.issues.len(),
            pull_requests: corpus.pull_requests,
            targeted,
            batches: targeted.div_ceil(self.settings.batch_size.max(1)),
            truncated: corpus.truncated,
            checkpointed_batches,
        })
    }

    /// Analyze one issue against the fetched corpus. Nothing is checkpointed.
    pub async fn analyze_single(&self, number: u64) -> Result<IssueAnalysis, RunError> {
        let corpus = self.fetch_corpus().await?;
        let issue = corpus
            .issues
            .iter()
            .find(|i| i.number == number)
            .ok_or(RunError::IssueNotFound(number))?;
        let (analysis, _) = self.analyze_item(issue, &corpus.issues).await?;
        Ok(analysis)
    }
}
