//! Error taxonomy shared by every coordinator component (spec §7).

use thiserror::Error;

/// Result type used for identifier parsing and other small domain checks.
pub type DomainResult<T> = Result<T, DomainError>;

/// Narrow domain-level error, used where only identifier/value validation
/// is at stake (kept separate from `ErrorKind` so that a bad UUID string
/// doesn't have to be force-fit into the dispatch-loop taxonomy below).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

/// The coordinator-wide error taxonomy (spec §7).
///
/// Every component that can fail maps its failures onto this enum so the
/// dispatch loop (spec §4.7) can make a single Ack/Nack/DeadLetter decision
/// without knowing which component produced the error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Envelope cannot be decoded: DeadLetter, no state change, log Error.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Event references a saga this coordinator does not own: Ack and drop, log Debug.
    #[error("unknown saga: {0}")]
    UnknownSaga(String),

    /// `(saga_id, event_id)` already processed: Ack, no log.
    #[error("duplicate event")]
    DuplicateEvent,

    /// Event is valid but does not match the current step: log Warn, Ack, no state change.
    #[error("unexpected transition: {0}")]
    UnexpectedTransition(String),

    /// Optimistic CAS failed: bounded retry, then Nack.
    #[error("stale version: expected {expected}, found {found}")]
    StaleVersion { expected: u64, found: u64 },

    /// Publish exhausted retries: Critical, raise alert, saga stays in step.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Deadline reached: treated as business failure, initiate compensation.
    #[error("step timed out: {0}")]
    StepTimeout(String),

    /// Compensation emit or ack timeout after retries: saga terminal state = Failed.
    #[error("compensation failed for step {step}: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// Invariant violation or configuration bug: abort process after flushing logs/audit.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ErrorKind {
    pub fn is_retryable_locally(&self) -> bool {
        matches!(self, ErrorKind::StaleVersion { .. })
    }

    pub fn is_terminal_for_process(&self) -> bool {
        matches!(self, ErrorKind::Fatal(_))
    }
}
