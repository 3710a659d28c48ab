//! Run-level error taxonomy.

use thiserror::Error;
use triage_harness_core::error::ExternalError;

#[derive(Debug, Error)]
pub enum RunError {
    /// Invalid settings; fatal before any batch starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A retried call never succeeded.
    #[error("gave up after {attempts} attempts: {source}")]
    ExhaustedRetry {
        attempts: u32,
        #[source]
        source: ExternalError,
    },

    /// A call failed in a way retrying cannot fix.
    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// The requested issue is not in the fetched corpus.
    #[error("issue #{0} is not in the fetched corpus")]
    IssueNotFound(u64),
}

impl RunError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RunError::Configuration(_) => "configuration",
            RunError::ExhaustedRetry { .. } => "exhausted_retry",
            RunError::External(_) => "external",
            RunError::Checkpoint(_) => "checkpoint",
            RunError::IssueNotFound(_) => "issue_not_found",
        }
    }

    /// Attempts made before giving up (1 for non-retried failures).
    pub fn attempts(&self) -> u32 {
        match self {
            RunError::ExhaustedRetry { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    pub fn checkpoint(err: impl std::fmt::Display) -> Self {
        RunError::Checkpoint(err.to_string())
    }
}
