//! Conversion of decoded RPC JSON into typed entities.
//!
//! Quantities arrive as hex strings (`"0x5208"`) and are parsed exactly;
//! a malformed quantity is an error, never a silent zero.

use serde::Deserialize;
use serde_json::Value;

use crate::error::EtlError;
use crate::types::{Block, Transaction};

/// Parse an RPC hex quantity (with or without `0x`) into a `u64`.
/// `"0x"` is zero.
pub fn parse_hex_u64(s: &str) -> Result<u64, EtlError> {
    let digits = strip_hex(s)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| EtlError::Mapping(format!("invalid hex quantity '{s}': {e}")))
}

/// Parse an RPC hex quantity (with or without `0x`) into a `u128`.
pub fn parse_hex_u128(s: &str) -> Result<u128, EtlError> {
    let digits = strip_hex(s)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| EtlError::Mapping(format!("invalid hex quantity '{s}': {e}")))
}

fn strip_hex(s: &str) -> Result<&str, EtlError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(EtlError::Mapping(format!("invalid hex quantity '{s}'")));
    }
    Ok(digits)
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: Option<String>,
    hash: Option<String>,
    parent_hash: String,
    miner: String,
    timestamp: String,
    gas_limit: String,
    gas_used: String,
    #[serde(default)]
    base_fee_per_gas: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    transactions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    #[serde(default)]
    transaction_index: Option<String>,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
    gas: String,
    gas_price: String,
}

/// Map one `eth_getBlockByNumber` result onto a [`Block`].
///
/// Full transaction objects become [`Transaction`]s. When the node returned
/// hashes only, `transaction_count` is still filled in but no transactions
/// are built, so the block gets no receipt work.
pub fn block_from_json(value: Value) -> Result<Block, EtlError> {
    let raw: RawBlock = serde_json::from_value(value)
        .map_err(|e| EtlError::Mapping(format!("block: {e}")))?;

    let number = parse_hex_u64(required(raw.number.as_deref(), "block.number")?)?;
    let hash = required(raw.hash.as_deref(), "block.hash")?.to_ascii_lowercase();
    let transaction_count = raw.transactions.len() as u64;

    let hashes_only = raw.transactions.first().is_some_and(Value::is_string);
    let transactions = if hashes_only {
        Vec::new()
    } else {
        raw.transactions
            .into_iter()
            .enumerate()
            .map(|(idx, tx)| transaction_from_json(tx, idx as u64, number))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut block = Block::new(
        number,
        hash,
        raw.parent_hash.to_ascii_lowercase(),
        raw.miner.to_ascii_lowercase(),
        parse_hex_u64(&raw.timestamp)?,
        parse_hex_u64(&raw.gas_limit)?,
        parse_hex_u64(&raw.gas_used)?,
        transaction_count,
        transactions,
    );
    block.base_fee_per_gas = raw.base_fee_per_gas.as_deref().map(parse_hex_u128).transpose()?;
    block.size = raw.size.as_deref().map(parse_hex_u64).transpose()?;
    Ok(block)
}

fn transaction_from_json(value: Value, position: u64, block: u64) -> Result<Transaction, EtlError> {
    let raw: RawTransaction = serde_json::from_value(value)
        .map_err(|e| EtlError::Mapping(format!("block {block} transaction {position}: {e}")))?;

    Ok(Transaction {
        hash: raw.hash.to_ascii_lowercase(),
        transaction_index: match raw.transaction_index.as_deref() {
            Some(idx) => parse_hex_u64(idx)?,
            None => position,
        },
        from: raw.from.to_ascii_lowercase(),
        to: raw.to.map(|t| t.to_ascii_lowercase()),
        value: parse_hex_u128(&raw.value)?,
        gas: parse_hex_u64(&raw.gas)?,
        gas_price: parse_hex_u128(&raw.gas_price)?,
        gas_used: 0,
    })
}

fn required<'a>(field: Option<&'a str>, name: &str) -> Result<&'a str, EtlError> {
    field.ok_or_else(|| EtlError::Mapping(format!("{name} is missing (pending block?)")))
}

// ─── Receipts ─────────────────────────────────────────────────────────────────

/// The part of a transaction receipt the pipeline merges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: Option<String>,
    /// Zero when the node left `gasUsed` out or null.
    pub gas_used: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
}

/// Map one `eth_getTransactionReceipt` result onto a [`Receipt`].
pub fn receipt_from_json(value: Value) -> Result<Receipt, EtlError> {
    let raw: RawReceipt = serde_json::from_value(value)
        .map_err(|e| EtlError::Mapping(format!("receipt: {e}")))?;
    Ok(Receipt {
        transaction_hash: raw.transaction_hash.map(|h| h.to_ascii_lowercase()),
        gas_used: raw.gas_used.as_deref().map(parse_hex_u64).transpose()?.unwrap_or(0),
    })
}

// ─── Uncle counts ─────────────────────────────────────────────────────────────

/// Map one `eth_getUncleCountByBlockNumber` result (a hex quantity).
pub fn uncle_count_from_json(value: &Value) -> Result<u64, EtlError> {
    match value {
        Value::String(s) => parse_hex_u64(s),
        other => Err(EtlError::Mapping(format!(
            "uncle count must be a hex string, got {other}"
        ))),
    }
}
