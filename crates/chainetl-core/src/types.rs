//! Entities and value types shared by the pipeline, scheduler and exporters.

use std::collections::HashSet;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction as returned inside a full block, owned by its [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (`0x…`, lowercase).
    pub hash: String,
    /// Position inside the block.
    pub transaction_index: u64,
    pub from: String,
    /// `None` for contract creations.
    pub to: Option<String>,
    /// Value transferred, in wei.
    pub value: u128,
    /// Gas limit supplied by the sender.
    pub gas: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas actually consumed. Zero until the receipt round fills it in.
    pub gas_used: u64,
}

impl Transaction {
    /// `gas_price × gas_used` in wei.
    pub fn fee(&self) -> u128 {
        self.gas_price.saturating_mul(u128::from(self.gas_used))
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block being enriched. Lives for one batch, is exported once, then
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub miner: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Absent before London.
    pub base_fee_per_gas: Option<u128>,
    pub size: Option<u64>,
    /// Number of transactions the node reported, even when only hashes were
    /// requested.
    pub transaction_count: u64,
    pub transactions: Vec<Transaction>,
    /// Sum of `gas_price × gas_used` over `transactions`.
    pub tx_fees: u128,
    /// Set by the uncle-count round.
    pub uncle_count: Option<u64>,
    #[serde(skip)]
    receipts_merged: bool,
}

impl Block {
    /// A freshly mapped block with no enrichment applied.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u64,
        hash: String,
        parent_hash: String,
        miner: String,
        timestamp: u64,
        gas_limit: u64,
        gas_used: u64,
        transaction_count: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            miner,
            timestamp,
            gas_limit,
            gas_used,
            base_fee_per_gas: None,
            size: None,
            transaction_count,
            transactions,
            tx_fees: 0,
            uncle_count: None,
            receipts_merged: false,
        }
    }

    /// Recompute `tx_fees` from the transactions and mark the receipt round
    /// as done for this block.
    pub fn finish_receipts(&mut self) {
        self.tx_fees = self
            .transactions
            .iter()
            .fold(0u128, |acc, tx| acc.saturating_add(tx.fee()));
        self.receipts_merged = true;
    }

    /// Assign the uncle count. Fails if it was already set.
    pub fn set_uncle_count(&mut self, count: u64) -> Result<(), EtlError> {
        if self.uncle_count.is_some() {
            return Err(EtlError::Mapping(format!(
                "uncle count for block {} assigned twice",
                self.number
            )));
        }
        self.uncle_count = Some(count);
        Ok(())
    }

    /// Returns `true` once every enrichment round has run against the block.
    pub fn is_complete(&self) -> bool {
        self.receipts_merged && self.uncle_count.is_some()
    }

    /// The block-level record handed to exporters.
    pub fn to_record(&self) -> Result<BlockRecord, EtlError> {
        let uncle_count = match self.uncle_count {
            Some(n) if self.receipts_merged => n,
            _ => {
                return Err(EtlError::Export(format!(
                    "block {} is not fully enriched",
                    self.number
                )))
            }
        };
        Ok(BlockRecord {
            number: self.number,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
            miner: self.miner.clone(),
            timestamp: self.timestamp,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            base_fee_per_gas: self.base_fee_per_gas,
            size: self.size,
            transaction_count: self.transaction_count,
            tx_fees: self.tx_fees,
            uncle_count,
        })
    }
}

// ─── BlockRecord ──────────────────────────────────────────────────────────────

/// Flat, exportable view of a completed [`Block`]. Transactions are not
/// exported individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub miner: String,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: Option<u128>,
    pub size: Option<u64>,
    pub transaction_count: u64,
    pub tx_fees: u128,
    pub uncle_count: u64,
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive, validated `[start, end]` block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, EtlError> {
        if start > end {
            return Err(EtlError::Configuration(format!(
                "start block {start} is greater than end block {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range. `[0, u64::MAX]` holds 2^64 blocks,
    /// hence `u128`.
    pub fn len(&self) -> u128 {
        u128::from(self.end - self.start) + 1
    }

    /// Always `false`; a valid range holds at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of batches [`batches`](Self::batches) yields for `batch_size`.
    pub fn batch_count(&self, batch_size: usize) -> u128 {
        self.len().div_ceil(batch_size.max(1) as u128)
    }

    /// Consecutive batches of at most `batch_size` numbers, in increasing
    /// order. Batches are built one at a time as the iterator advances.
    pub fn batches(&self, batch_size: usize) -> Result<RangeBatches, EtlError> {
        if batch_size == 0 {
            return Err(EtlError::Configuration("batch_size must be greater than 0".into()));
        }
        Ok(RangeBatches {
            next: Some(self.start),
            end: self.end,
            size: u64::try_from(batch_size).unwrap_or(u64::MAX),
        })
    }
}

/// Lazy iterator over the batches of a [`BlockRange`].
#[derive(Debug, Clone)]
pub struct RangeBatches {
    next: Option<u64>,
    end: u64,
    size: u64,
}

impl Iterator for RangeBatches {
    type Item = BlockNumberBatch;

    fn next(&mut self) -> Option<BlockNumberBatch> {
        let start = self.next?;
        let batch_end = start.saturating_add(self.size - 1).min(self.end);
        self.next = (batch_end < self.end).then(|| batch_end + 1);
        Some(BlockNumberBatch((start..=batch_end).collect()))
    }
}

// ─── BlockNumberBatch ─────────────────────────────────────────────────────────

/// A non-empty, ordered set of distinct block numbers processed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct BlockNumberBatch(Vec<u64>);

impl BlockNumberBatch {
    pub fn new(numbers: Vec<u64>) -> Result<Self, EtlError> {
        if numbers.is_empty() {
            return Err(EtlError::Configuration("block number batch is empty".into()));
        }
        let mut seen = HashSet::with_capacity(numbers.len());
        if let Some(dup) = numbers.iter().find(|n| !seen.insert(**n)) {
            return Err(EtlError::Configuration(format!(
                "block {dup} appears twice in batch"
            )));
        }
        Ok(Self(numbers))
    }

    pub fn first(&self) -> u64 {
        self.0[0]
    }

    pub fn last(&self) -> u64 {
        self.0[self.0.len() - 1]
    }

    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }
}

impl TryFrom<Vec<u64>> for BlockNumberBatch {
    type Error = EtlError;

    fn try_from(numbers: Vec<u64>) -> Result<Self, EtlError> {
        Self::new(numbers)
    }
}

impl From<BlockNumberBatch> for Vec<u64> {
    fn from(batch: BlockNumberBatch) -> Self {
        batch.0
    }
}

impl Deref for BlockNumberBatch {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        &self.0
    }
}

// ─── BrokenTransactionSet ─────────────────────────────────────────────────────

/// Transaction hashes excluded from receipt lookups. Built once from
/// configuration and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokenTransactionSet {
    hashes: HashSet<String>,
}

impl BrokenTransactionSet {
    pub fn new<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hashes: hashes
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, hash: &str) -> bool {
        if hash.bytes().any(|b| b.is_ascii_uppercase()) {
            self.hashes.contains(&hash.to_ascii_lowercase())
        } else {
            self.hashes.contains(hash)
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
