//! # Triage Harness
//!
//! An issue-solution correlation engine for software project triage.
//!
//! Triage Harness fetches a repository's issues, extracts diagnostic
//! signals from each one, searches a public Q&A knowledge base with several
//! query strategies, finds resolved precedents in the same tracker, and
//! synthesizes a verdict: complexity, solvability, confidence, effort, and
//! a suggested fix plan.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────┐   ┌────────────┐
//! │ IssueSource │──▶│ BatchOrchestrator            │──▶│ Checkpoint │
//! │  (GitHub)   │   │  signals → search → verdict  │   │ file/SQLite│
//! └─────────────┘   └──────────────┬───────────────┘   └────────────┘
//!                                  │
//!                      ┌───────────┴───────────┐
//!                      ▼                       ▼
//!               ┌──────────────┐        ┌─────────────┐
//!               │KnowledgeBase │        │  run.json   │
//!               │(StackExchange)│       │analyses.json│
//!               └──────────────┘        └─────────────┘
//! ```
//!
//! The pure analysis stages live in `triage-harness-core`; this crate adds
//! the HTTP adapters, pacing and retry, checkpointing, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                   # create the checkpoint store
//! triage run --dry-run          # fetch and plan
//! triage run                    # analyze, resumable
//! triage stats ./data/output/run.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Run-level error taxonomy |
//! | [`http`] | Shared HTTP status and text helpers |
//! | [`github`] | GitHub issue source |
//! | [`stackexchange`] | Stack Exchange knowledge base |
//! | [`pacing`] | Per-service call pacing and cool-downs |
//! | [`retry`] | Exponential backoff policy |
//! | [`correlate`] | Multi-strategy knowledge-base search |
//! | [`analyze`] | Per-issue analysis |
//! | [`batch`] | Batch pipeline orchestration |
//! | [`checkpoint`] | Run checkpoint stores |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`export`] | Run artifacts |
//! | [`stats`] | Run summary |
//! | [`progress`] | Progress reporting |

pub mod analyze;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod export;
pub mod github;
pub mod http;
pub mod migrate;
pub mod pacing;
pub mod progress;
pub mod retry;
pub mod stackexchange;
pub mod stats;
