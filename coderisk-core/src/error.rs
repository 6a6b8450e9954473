//! Error taxonomy shared by every stage of the pipeline (spec §7).

use thiserror::Error;

/// The full error taxonomy. Stage crates wrap their own lower-level errors
/// (e.g. an HTTP client error, an LLM parse error) and convert them into one
/// of these variants at their public boundary, so the orchestrator's
/// retry/drop/quarantine/escalate policy only ever has to match on this
/// enum.
#[derive(Error, Debug)]
pub enum CoderiskError {
    /// External ingress: the platform API was unreachable or returned a
    /// transport-level failure (timeout, connection reset, DNS).
    #[error("transport error: {0}")]
    TransportError(String),

    /// External ingress: the configured credential was rejected.
    #[error("authentication invalid")]
    AuthInvalid,

    /// External ingress: the platform's rate limit was exhausted after the
    /// retry budget.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// External ingress: the requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// External ingress: a response did not match the expected shape.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// An LLM emitted malformed or internally inconsistent output.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Post-hoc check failed: a claimed reference (`#N`) was not actually
    /// present in the source text.
    #[error("reference mismatch: {0}")]
    ReferenceMismatch(String),

    /// A graph edge's endpoint does not exist during projection.
    #[error("entity not found during projection: {0}")]
    EntityNotFound(String),

    /// Graph projection matched 90-95% of staging-store counts.
    #[error("consistency warning: {0}")]
    ConsistencyWarning(String),

    /// Graph projection matched less than 90% of staging-store counts.
    #[error("consistency failure: {0}")]
    ConsistencyFailure(String),

    /// The operation was cancelled via its deadline/cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// A transaction timeout elapsed (see §5 per-workload budgets).
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, CoderiskError>;

/// The policy action the orchestrator should take for a given error,
/// per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Retry with exponential backoff, up to the caller's attempt budget.
    RetryWithBackoff,
    /// Log the failing item and continue the batch.
    DropWithLog,
    /// Mark the owning commit/entity `skipped` and move on.
    QuarantineAndContinue,
    /// Stop the current stage and surface the error to the operator.
    Escalate,
}

impl CoderiskError {
    pub fn policy(&self) -> Policy {
        match self {
            CoderiskError::TransportError(_)
            | CoderiskError::RateLimited(_)
            | CoderiskError::Timeout(_) => Policy::RetryWithBackoff,
            CoderiskError::ValidationFailed(_) | CoderiskError::ReferenceMismatch(_) => {
                Policy::DropWithLog
            }
            CoderiskError::NotFound(_) | CoderiskError::EntityNotFound(_) => {
                Policy::QuarantineAndContinue
            }
            CoderiskError::AuthInvalid
            | CoderiskError::SchemaMismatch(_)
            | CoderiskError::ConsistencyFailure(_) => Policy::Escalate,
            CoderiskError::ConsistencyWarning(_) => Policy::DropWithLog,
            CoderiskError::Cancelled => Policy::Escalate,
            CoderiskError::Database(_)
            | CoderiskError::Serialization(_)
            | CoderiskError::Io(_)
            | CoderiskError::InternalError(_) => Policy::Escalate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_retry() {
        assert_eq!(
            CoderiskError::TransportError("boom".into()).policy(),
            Policy::RetryWithBackoff
        );
        assert_eq!(
            CoderiskError::RateLimited("secondary".into()).policy(),
            Policy::RetryWithBackoff
        );
    }

    #[test]
    fn auth_and_schema_escalate() {
        assert_eq!(CoderiskError::AuthInvalid.policy(), Policy::Escalate);
        assert_eq!(
            CoderiskError::SchemaMismatch("files[].patch missing".into()).policy(),
            Policy::Escalate
        );
        assert_eq!(
            CoderiskError::ConsistencyFailure("62% match".into()).policy(),
            Policy::Escalate
        );
    }

    #[test]
    fn validation_failures_drop_with_log() {
        assert_eq!(
            CoderiskError::ValidationFailed("empty block_name".into()).policy(),
            Policy::DropWithLog
        );
    }
}
