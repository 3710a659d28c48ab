//! Errors raised at the external-collaborator boundary.

use std::time::Duration;
use thiserror::Error;

/// Failure of a call to an [`IssueSource`](crate::external::IssueSource) or
/// [`KnowledgeBase`](crate::external::KnowledgeBase).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// The service asked us to slow down. `retry_after` is the service's hint, if any.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Network error, timeout, or 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The response could not be decoded into the expected schema.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service refused the request (4xx other than rate limiting).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl ExternalError {
    /// Whether the standard backoff ladder applies.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExternalError::Transient(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExternalError::RateLimited { .. })
    }

    /// Short machine-readable kind, used in logs and gap records.
    pub fn kind(&self) -> &'static str {
        match self {
            ExternalError::RateLimited { .. } => "rate_limited",
            ExternalError::Transient(_) => "transient",
            ExternalError::Malformed(_) => "malformed",
            ExternalError::Rejected { .. } => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_retry_hint() {
        let err = ExternalError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 30s)");
        let err = ExternalError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_classification() {
        assert!(ExternalError::Transient("timeout".into()).is_transient());
        assert!(!ExternalError::Malformed("x".into()).is_transient());
        assert!(ExternalError::RateLimited { retry_after: None }.is_rate_limited());
        assert_eq!(
            ExternalError::Rejected {
                status: 404,
                message: "Not Found".into()
            }
            .kind(),
            "rejected"
        );
    }
}
