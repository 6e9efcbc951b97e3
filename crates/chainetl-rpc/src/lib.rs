//! chainetl-rpc: the JSON-RPC round-trip layer for ChainETL.
//!
//! # Overview
//!
//! Every enrichment round is one wire-level batch call:
//!
//! ```text
//! builder (block numbers / tx hashes → Vec<JsonRpcRequest>)
//!     → RpcTransport::send_batch (one HTTP POST, raw JSON array back)
//!     → decoder (raw array → Vec<BatchItem>, in request order)
//! ```
//!
//! - [`builder`]: pure request construction with batch-local sequential ids
//! - [`decoder`]: per-item results, tolerant of single-item RPC errors
//! - [`RpcTransport`]: the async transport seam, [`HttpRpcClient`] for HTTP
//! - [`request`]: JSON-RPC 2.0 wire types

pub mod builder;
pub mod decoder;
pub mod error;
pub mod http;
pub mod request;
pub mod transport;

pub use decoder::{decode_batch, Alignment, BatchItem};
pub use error::{BatchError, TransportError};
pub use http::{HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::{RpcTransport, TransportFactory};
