//! Error kinds (spec §7) as a single typed enum instead of a bag of
//! stringly-typed `anyhow` contexts. Every fallible engine entry point
//! returns `Result<T, BridgeError>` so callers (the CLI, tests) can match
//! on kind rather than grep a message.

use thiserror::Error;

/// Error kinds, not type names — the spec names five contract kinds and
/// what each one does to propagation and exit status.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid threshold, bad path, protected branch. No state mutation
    /// has happened yet when this is returned.
    #[error("configuration error: {0}")]
    Config(String),

    /// Lock timeout, subprocess timeout, storage hiccup. Retryable within
    /// a bounded budget; this variant is only ever returned once that
    /// budget is exhausted.
    #[error("transient infrastructure error after {attempts} attempt(s): {source}")]
    TransientInfra {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Adapter failure, oversized response, invalid JSON from a model.
    /// Callers that catch this are expected to have already attempted the
    /// fallback path (single-pass, truncation, skipped verification) and
    /// recorded it in `pass_metadata.mode` before this ever surfaces.
    #[error("model error: {0}")]
    Model(String),

    /// Redaction structure diff, malformed state schema, path traversal,
    /// duplicate-content detection surfaced as fatal. Always fatal for the
    /// write in question; the write is refused rather than partially
    /// applied.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The operator interrupted the run. The caller must have already
    /// transitioned the workflow state to INTERRUPTED/HALTED before
    /// constructing this.
    #[error("interrupted")]
    UserInterrupt,
}

impl BridgeError {
    /// Process exit code this error kind maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => 2,
            BridgeError::TransientInfra { .. } => 1,
            BridgeError::Model(_) => 1,
            BridgeError::InvariantViolation(_) => 1,
            BridgeError::UserInterrupt => 1,
        }
    }
}
