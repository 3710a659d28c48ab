//! # Triage Harness Core
//!
//! Shared logic for Triage Harness: data models, diagnostic signal
//! extraction, multi-strategy query planning and ranking, precedent
//! matching, verdict synthesis, run state, and the collaborator traits.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Everything
//! here is either pure or an async trait that the application crate
//! implements.
//!
//! | Module | Role |
//! |--------|------|
//! | [`signals`] | errors, exception types, technologies, keywords, traces |
//! | [`strategy`] | query planning, max-score merge, deterministic ranking |
//! | [`precedent`] | same-corpus closed-issue similarity |
//! | [`synthesize`] | complexity, solvability, confidence, effort, steps |
//! | [`run`] | batch run accumulator and statistics |
//! | [`external`] | `IssueSource` / `KnowledgeBase` traits and in-memory impls |

pub mod error;
pub mod external;
pub mod models;
pub mod precedent;
pub mod run;
pub mod signals;
pub mod strategy;
pub mod synthesize;
pub mod tuning;
