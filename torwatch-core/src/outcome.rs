//! Probe outcomes and the scan error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by probes and scans
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ScanError {
    /// Target matched neither the IPv4 nor the onion shape; nothing was sent
    #[error("validation error: {0}")]
    Validation(String),

    /// SOCKS, TLS, DNS or timeout failure. Says nothing about the target itself.
    #[error("transport error: {0}")]
    Transport(String),

    /// A source answered with a payload we could not interpret
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Primary extraction matched nothing
    #[error("parse degraded: {0}")]
    ParseDegraded(String),

    /// The caller's deadline elapsed
    #[error("cancelled")]
    Cancelled,
}

impl ScanError {
    /// Transport failures may succeed on a later attempt over a fresh circuit
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::Transport(_) | ScanError::Cancelled)
    }
}

/// Result of a single probe against one source
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    /// Full data
    Success(T),
    /// Partial data plus the reason it is partial
    Degraded(T, ScanError),
    /// No data
    Failed(ScanError),
}

impl<T> ProbeOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProbeOutcome::Failed(_))
    }

    /// Borrow the payload of a successful or degraded outcome
    pub fn value(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Success(v) | ProbeOutcome::Degraded(v, _) => Some(v),
            ProbeOutcome::Failed(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProbeOutcome<U> {
        match self {
            ProbeOutcome::Success(v) => ProbeOutcome::Success(f(v)),
            ProbeOutcome::Degraded(v, reason) => ProbeOutcome::Degraded(f(v), reason),
            ProbeOutcome::Failed(e) => ProbeOutcome::Failed(e),
        }
    }

    /// Collapse into a `Result`, discarding any degradation reason
    pub fn into_result(self) -> Result<T, ScanError> {
        match self {
            ProbeOutcome::Success(v) | ProbeOutcome::Degraded(v, _) => Ok(v),
            ProbeOutcome::Failed(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, ScanError>> for ProbeOutcome<T> {
    fn from(result: Result<T, ScanError>) -> Self {
        match result {
            Ok(v) => ProbeOutcome::Success(v),
            Err(e) => ProbeOutcome::Failed(e),
        }
    }
}
