//! Error types for the enrichment pipeline.

use thiserror::Error;

use chainetl_rpc::{BatchError, TransportError};

/// Errors that can occur while enriching and exporting blocks.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The transport failed to carry a batch (connection, status, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The batch response envelope could not be matched to its requests.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] BatchError),

    /// An item the pipeline cannot do without came back null, errored, or
    /// was absent.
    #[error("missing result for {method} item {index}: {reason}")]
    MissingItemResult {
        method: &'static str,
        index: usize,
        reason: String,
    },

    /// RPC JSON could not be mapped onto a typed entity.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Invalid range, flags, or settings: raised before any work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("worker {worker} panicked: {reason}")]
    WorkerPanicked { worker: usize, reason: String },
}

impl EtlError {
    /// Returns `true` if re-running the whole batch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` for errors raised at construction time.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
