//! Scripted in-memory chain node shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainetl_rpc::{JsonRpcRequest, RpcTransport, TransportError, TransportFactory};
use serde_json::{json, Value};

pub const BLOCKS: &str = "eth_getBlockByNumber";
pub const RECEIPTS: &str = "eth_getTransactionReceipt";
pub const UNCLES: &str = "eth_getUncleCountByBlockNumber";

/// `(hash, gas_price, gas_used)`
pub type TxFixture = (&'static str, u128, u64);

/// Answers block, receipt and uncle-count batches from fixed data and
/// records every batch it receives.
#[derive(Default)]
pub struct MockNode {
    blocks: HashMap<u64, Vec<TxFixture>>,
    receipts: HashMap<String, Value>,
    uncles: HashMap<u64, u64>,
    raw: HashMap<&'static str, String>,
    reverse: bool,
    calls: Mutex<Vec<Vec<JsonRpcRequest>>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A block with the given transactions and a receipt for each of them.
    pub fn block(mut self, number: u64, txs: &[TxFixture]) -> Self {
        for (hash, _, gas_used) in txs {
            self.receipts.insert(
                hash.to_string(),
                json!({
                    "transactionHash": hash,
                    "gasUsed": format!("{gas_used:#x}"),
                    "status": "0x1",
                }),
            );
        }
        self.blocks.insert(number, txs.to_vec());
        self.uncles.entry(number).or_insert(0);
        self
    }

    pub fn uncles(mut self, number: u64, count: u64) -> Self {
        self.uncles.insert(number, count);
        self
    }

    /// Answer the receipt for `hash` with `value` (e.g. `null`).
    pub fn receipt(mut self, hash: &str, value: Value) -> Self {
        self.receipts.insert(hash.to_string(), value);
        self
    }

    /// Answer every batch for `method` with `body` verbatim.
    pub fn raw(mut self, method: &'static str, body: &str) -> Self {
        self.raw.insert(method, body.to_string());
        self
    }

    /// Reverse the order of block and receipt responses.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<JsonRpcRequest>> {
        self.calls.lock().unwrap().clone()
    }

    /// Method of each batch received, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.calls().iter().map(|b| b[0].method.clone()).collect()
    }

    pub fn calls_for(&self, method: &str) -> Vec<Vec<JsonRpcRequest>> {
        self.calls().into_iter().filter(|b| b[0].method == method).collect()
    }

    fn answer(&self, req: &JsonRpcRequest) -> Value {
        let result = match req.method.as_str() {
            BLOCKS => {
                let number = parse_hex(&req.params[0]);
                let full = req.params[1].as_bool().unwrap();
                match self.blocks.get(&number) {
                    Some(txs) => block_json(number, txs, full),
                    None => Value::Null,
                }
            }
            RECEIPTS => {
                let hash = req.params[0].as_str().unwrap();
                self.receipts.get(hash).cloned().unwrap_or(Value::Null)
            }
            UNCLES => {
                let number = parse_hex(&req.params[0]);
                match self.uncles.get(&number) {
                    Some(count) => json!(format!("{count:#x}")),
                    None => Value::Null,
                }
            }
            other => panic!("unexpected method {other}"),
        };
        json!({"jsonrpc": "2.0", "id": req.id, "result": result})
    }
}

#[async_trait]
impl RpcTransport for MockNode {
    async fn send_batch(&self, reqs: &[JsonRpcRequest]) -> Result<String, TransportError> {
        self.calls.lock().unwrap().push(reqs.to_vec());
        let method = reqs[0].method.as_str();

        if let Some(body) = self.raw.get(method) {
            return Ok(body.clone());
        }

        let mut out: Vec<Value> = reqs.iter().map(|r| self.answer(r)).collect();
        if self.reverse && method != UNCLES {
            out.reverse();
        }
        Ok(serde_json::to_string(&out).unwrap())
    }

    fn url(&self) -> &str {
        "mock://node"
    }
}

/// A factory handing the same node to every worker.
pub fn factory(node: Arc<MockNode>) -> TransportFactory {
    Arc::new(move || -> Result<Arc<dyn RpcTransport>, TransportError> {
        Ok(node.clone() as Arc<dyn RpcTransport>)
    })
}

pub fn block_json(number: u64, txs: &[TxFixture], full: bool) -> Value {
    let transactions: Vec<Value> = txs
        .iter()
        .enumerate()
        .map(|(idx, (hash, gas_price, _))| {
            if full {
                json!({
                    "hash": hash,
                    "transactionIndex": format!("{idx:#x}"),
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "0x0",
                    "gas": "0x5208",
                    "gasPrice": format!("{gas_price:#x}"),
                })
            } else {
                json!(hash)
            }
        })
        .collect();

    json!({
        "number": format!("{number:#x}"),
        "hash": format!("0x{number:064x}"),
        "parentHash": format!("0x{:064x}", number.saturating_sub(1)),
        "miner": "0x3333333333333333333333333333333333333333",
        "timestamp": format!("{:#x}", 1_438_269_988 + number),
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x5208",
        "baseFeePerGas": "0x7",
        "size": "0x220",
        "transactions": transactions,
    })
}

fn parse_hex(v: &Value) -> u64 {
    u64::from_str_radix(v.as_str().unwrap().trim_start_matches("0x"), 16).unwrap()
}
