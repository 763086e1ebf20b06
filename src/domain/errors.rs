use std::time::Duration;

use thiserror::Error;

use super::models::Violation;

/// Domain-level errors shared across application components.
///
/// Every terminal failure of a request ends up as exactly one of these and is
/// handed to the response builder, which decides what the caller sees.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming payload violated one or more field rules. Carries every
    /// violation found, never just the first.
    #[error("validation failed: {}", describe_violations(.0))]
    Validation(Vec<Violation>),

    /// Transient upstream failures outlasted the retry policy.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream refused a request we built; retrying cannot help.
    #[error("upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// The caller went away before a value was produced.
    #[error("request cancelled")]
    Cancelled,

    /// Any other unexpected failure (model missing, feature shape mismatch, ...).
    #[error("internal fault: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(violations: Vec<Violation>) -> Self {
        Self::Validation(violations)
    }

    pub fn upstream_unavailable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    pub fn upstream_rejected(msg: impl Into<String>) -> Self {
        Self::UpstreamRejected(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.field, v.reason.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single outbound attempt, classified by whether retrying it
/// can plausibly succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    /// 5xx-equivalent.
    #[error("upstream server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// 408 / 429: the upstream asked us to come back later.
    #[error("upstream throttled request (HTTP {status})")]
    Throttled { status: u16 },

    /// Any other 4xx-equivalent.
    #[error("upstream rejected request (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// The upstream answered 2xx but the body could not be understood.
    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    /// The attempt itself panicked or was torn down before answering.
    #[error("upstream call aborted: {0}")]
    Aborted(String),
}

impl UpstreamError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            408 | 429 => Self::Throttled { status },
            500..=599 => Self::Server {
                status,
                message: message.into(),
            },
            _ => Self::Client {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether another attempt may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::Server { .. } | Self::Throttled { .. }
        )
    }
}
