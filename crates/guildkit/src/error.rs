//! Error types for guild service operations.
//!
//! Errors are categorized so the rate limiter can decide how long to wait
//! and whether to give up.

use std::time::Duration;
use thiserror::Error;

/// Categories of service errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The service asked us to slow down; always retried
    RateLimited,
    /// Service-side failure (5xx, overload, refused request); retried up to a cap
    Transient,
    /// Local or unknown failure; retried up to a cap with a shorter ceiling
    Other,
}

impl ErrorCategory {
    /// Whether the rate limiter retries this category without an attempt cap.
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limited by the service",
            Self::Transient => "Service error",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::RateLimited => "Wait a moment; the request is retried automatically",
            Self::Transient => "Check the service status and re-run; completed steps are skipped",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to a guild service.
#[derive(Debug, Error)]
pub enum Error {
    /// Too many requests; the service may suggest how long to wait
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {:.2}s)", d.as_secs_f64())).unwrap_or_default())]
    RateLimited {
        /// Suggested wait before the next request
        retry_after: Option<Duration>,
    },

    /// Non-success HTTP-style response
    #[error("service error {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response message
        message: String,
    },

    /// A referenced resource does not exist
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// The service refused the operation
    #[error("forbidden: {message}")]
    Forbidden {
        /// Details about what was refused
        message: String,
    },

    /// Permission flag name that is not recognized
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Plan persistence error
    #[error(transparent)]
    Plan(#[from] buildplan::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::RateLimited { .. } => ErrorCategory::RateLimited,
            Error::Http { status: 429, .. } => ErrorCategory::RateLimited,
            Error::Http { .. } | Error::NotFound { .. } | Error::Forbidden { .. } => {
                ErrorCategory::Transient
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Suggested wait carried by a rate-limit signal
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Create an error from a status code and message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 => Error::Forbidden { message },
            404 => Error::NotFound { what: message },
            429 => Error::RateLimited { retry_after: None },
            _ => Error::Http { status, message },
        }
    }
}

/// Result type for guild service operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::RateLimited { retry_after: None }.category(),
            ErrorCategory::RateLimited
        );
        assert_eq!(Error::from_status(503, "busy").category(), ErrorCategory::Transient);
        assert_eq!(Error::from_status(403, "no").category(), ErrorCategory::Transient);
        assert_eq!(Error::Other("disk".into()).category(), ErrorCategory::Other);
        assert!(ErrorCategory::RateLimited.is_unbounded());
        assert!(!ErrorCategory::Transient.is_unbounded());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(Error::from_status(404, "role"), Error::NotFound { .. }));
        assert!(matches!(
            Error::from_status(429, "slow down"),
            Error::RateLimited { retry_after: None }
        ));
        assert!(matches!(Error::from_status(500, "oops"), Error::Http { status: 500, .. }));
    }

    #[test]
    fn test_retry_after_display() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_millis(1500)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(err.to_string(), "rate limited (retry after 1.50s)");
        assert_eq!(
            Error::RateLimited { retry_after: None }.to_string(),
            "rate limited"
        );
    }
}
