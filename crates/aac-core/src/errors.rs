//! Top-level error kinds the pipeline and worker deal in.
//!
//! Stage/provider/persistence errors all convert into `EngineError` at the
//! point they cross into `aac-pipeline`; nothing downstream needs to know
//! whether a failure came from the network, the database, or a malformed
//! assistant response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A network/provider call failed and its retry budget is exhausted.
    #[error("retry exceeded: {0}")]
    RetryExceeded(String),

    /// A provider call returned a non-succeeded terminal status or a
    /// response missing a required field.
    #[error("provider failure: {0}")]
    ProviderFailure(String),

    /// Required structure absent from an otherwise well-formed response
    ///, e.g. missing `"first prompt"`.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A stage's retry budget (`stage_retry_limit`) was consumed.
    #[error("stage '{stage}' exhausted its retry budget: {message}")]
    StageExhausted { stage: String, message: String },

    /// An infrastructure invariant was violated, e.g. a missing winner
    /// asset.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the *call* that raised this (not the stage, not the
    /// optimization attempt) is expected to help. Contract violations are
    /// non-retryable at the call layer but the surrounding stage retry may
    /// still succeed on a fresh assistant run.
    pub fn is_call_retryable(&self) -> bool {
        matches!(self, Self::RetryExceeded(_))
    }
}
