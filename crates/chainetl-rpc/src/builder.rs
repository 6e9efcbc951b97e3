//! Pure construction of batched JSON-RPC requests.
//!
//! Each builder returns one request per input, in input order, with ids
//! `0..n` so responses can be re-associated by id or by position.

use serde_json::{json, Value};

use crate::error::BatchError;
use crate::request::JsonRpcRequest;

pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const GET_UNCLE_COUNT_BY_BLOCK_NUMBER: &str = "eth_getUncleCountByBlockNumber";

/// Encode a block number as an RPC hex quantity (`0x0`, `0x3e8`, …).
pub fn to_rpc_hex(n: u64) -> String {
    format!("{n:#x}")
}

/// `eth_getBlockByNumber` for every number in `numbers`.
pub fn get_block_by_number_batch(
    numbers: &[u64],
    include_transactions: bool,
) -> Result<Vec<JsonRpcRequest>, BatchError> {
    build(numbers, |n| {
        (
            GET_BLOCK_BY_NUMBER,
            vec![json!(to_rpc_hex(*n)), json!(include_transactions)],
        )
    })
}

/// `eth_getTransactionReceipt` for every hash in `hashes`.
pub fn get_receipt_batch<S: AsRef<str>>(hashes: &[S]) -> Result<Vec<JsonRpcRequest>, BatchError> {
    build(hashes, |h| (GET_TRANSACTION_RECEIPT, vec![json!(h.as_ref())]))
}

/// `eth_getUncleCountByBlockNumber` for every number in `numbers`.
pub fn get_uncle_count_batch(numbers: &[u64]) -> Result<Vec<JsonRpcRequest>, BatchError> {
    build(numbers, |n| {
        (GET_UNCLE_COUNT_BY_BLOCK_NUMBER, vec![json!(to_rpc_hex(*n))])
    })
}

fn build<T>(
    items: &[T],
    f: impl Fn(&T) -> (&'static str, Vec<Value>),
) -> Result<Vec<JsonRpcRequest>, BatchError> {
    if items.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    Ok(items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let (method, params) = f(item);
            JsonRpcRequest::new(idx as u64, method, params)
        })
        .collect())
}
