//! The `RpcTransport` trait: the seam between the enrichment pipeline and
//! whatever carries batches to the node.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::JsonRpcRequest;

/// Carries one JSON-RPC batch to a node and returns the raw response body.
///
/// The body is handed back undecoded so that envelope problems (not JSON,
/// not an array, unknown ids) are reported by the decoder, against the
/// requests that produced them.
///
/// # Concurrency
/// An instance may multiplex calls over a single session and must not be
/// shared between concurrent workers. Build one per worker through a
/// [`TransportFactory`].
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send all `reqs` as a single JSON array and return the response body.
    async fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<String, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}

/// Builds a fresh transport. Invoked once per worker, on the worker's first
/// batch.
pub type TransportFactory =
    Arc<dyn Fn() -> Result<Arc<dyn RpcTransport>, TransportError> + Send + Sync>;
