//! Transport and batch-envelope error types.

use thiserror::Error;

use crate::request::RpcId;

/// Errors raised while moving a batch over the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, reset, TLS, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if re-sending the same batch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Other(_) => false,
        }
    }
}

/// A batch request could not be built, or its response envelope could not
/// be matched back to the requests that produced it.
///
/// Per-item RPC errors are *not* represented here; they surface as
/// [`BatchItem::Error`](crate::decoder::BatchItem::Error).
#[derive(Debug, Error)]
pub enum BatchError {
    /// The builder was handed nothing to request.
    #[error("cannot build an empty batch request")]
    EmptyBatch,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("expected a JSON array response, got: {0}")]
    NotAnArray(String),

    #[error("response item {index} is not a JSON-RPC response object: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("response id {0} does not match any request in the batch")]
    UnknownId(RpcId),

    #[error("response id {0} appears more than once")]
    DuplicateId(RpcId),

    #[error("expected {expected} responses, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("response {index} has id {actual}, expected {expected}")]
    OutOfOrder {
        index: usize,
        expected: RpcId,
        actual: RpcId,
    },
}
