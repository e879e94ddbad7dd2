//! Error type for the data layer

use thiserror::Error;

/// Unified error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Write or read did not complete in time; retryable by the caller
    #[error("Store timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Store could not be reached or refused the request; retryable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Malformed statement, unknown table, or bind arity mismatch
    #[error("Statement error: {0}")]
    Statement(String),

    /// Stored bytes could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// A value violated a row invariant (e.g. null in a non-null column)
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl StoreError {
    /// Whether retrying the same operation can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }

    pub(crate) fn decode(context: impl Into<String>) -> Self {
        Self::Decode(context.into())
    }

    pub(crate) fn invariant(context: impl Into<String>) -> Self {
        Self::Invariant(context.into())
    }
}

impl From<prost::DecodeError> for StoreError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}
