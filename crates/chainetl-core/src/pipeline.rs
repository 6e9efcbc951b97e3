//! The enrichment pipeline: three RPC rounds and a merge per batch.
//!
//! # Round 1: BLOCKS
//! One `eth_getBlockByNumber` batch for every number in the batch, decoded by
//! id and mapped onto [`Block`]s. A missing block fails the batch.
//!
//! # Round 2: RECEIPTS
//! Per block, one `eth_getTransactionReceipt` batch over the transaction
//! hashes that are not in the [`BrokenTransactionSet`]. Blocks with no
//! eligible hashes skip the call and keep `tx_fees = 0`. A null, errored,
//! absent or mismatched receipt leaves that transaction's `gas_used` at 0
//! and the block still completes.
//!
//! # Round 3: UNCLES
//! One `eth_getUncleCountByBlockNumber` batch for the whole batch, zipped
//! positionally with the blocks.
//!
//! # Export
//! Completed blocks go to the exporter in batch order. Nothing is exported
//! if any round fails.

use std::sync::Arc;

use chainetl_rpc::builder::{
    self, GET_BLOCK_BY_NUMBER, GET_UNCLE_COUNT_BY_BLOCK_NUMBER,
};
use async_trait::async_trait;
use chainetl_rpc::{
    decode_batch, Alignment, BatchItem, JsonRpcRequest, RpcTransport, TransportFactory,
};

use crate::error::EtlError;
use crate::exporter::ItemExporter;
use crate::mapper;
use crate::scheduler::BatchWorker;
use crate::types::{Block, BlockNumberBatch, BrokenTransactionSet};

/// Enriches batches of blocks against one transport.
pub struct EnrichmentPipeline {
    transport: Arc<dyn RpcTransport>,
    exporter: Arc<dyn ItemExporter>,
    broken: Arc<BrokenTransactionSet>,
    include_transactions: bool,
    export_blocks: bool,
}

impl EnrichmentPipeline {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        exporter: Arc<dyn ItemExporter>,
        broken: Arc<BrokenTransactionSet>,
    ) -> Self {
        Self {
            transport,
            exporter,
            broken,
            include_transactions: true,
            export_blocks: true,
        }
    }

    /// Request full transaction objects in round 1 (default `true`).
    /// Without them no receipts are fetched and every `tx_fees` is 0.
    pub fn include_transactions(mut self, include: bool) -> Self {
        self.include_transactions = include;
        self
    }

    /// Hand block records to the exporter (default `true`).
    pub fn export_blocks(mut self, export: bool) -> Self {
        self.export_blocks = export;
        self
    }

    /// Run all rounds for `numbers` and export the results. Returns the
    /// number of blocks processed. An empty slice is a no-op.
    pub async fn export_batch(&self, numbers: &[u64]) -> Result<usize, EtlError> {
        let blocks = self.enrich(numbers).await?;

        if self.export_blocks {
            for block in &blocks {
                self.exporter.export_item(&block.to_record()?).await?;
            }
        }

        Ok(blocks.len())
    }

    /// Run all rounds for `numbers` and return completed blocks in input
    /// order, without exporting.
    pub async fn enrich(&self, numbers: &[u64]) -> Result<Vec<Block>, EtlError> {
        let (first, last) = match (numbers.first(), numbers.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Vec::new()),
        };
        tracing::debug!(batch_start = first, batch_end = last, blocks = numbers.len(), "enriching batch");

        let mut blocks = self.fetch_blocks(numbers).await?;

        for block in blocks.iter_mut() {
            self.merge_receipts(block).await?;
        }

        self.merge_uncle_counts(numbers, &mut blocks).await?;

        tracing::debug!(batch_start = first, batch_end = last, "batch enriched");
        Ok(blocks)
    }

    async fn round_trip(
        &self,
        reqs: &[JsonRpcRequest],
        alignment: Alignment,
    ) -> Result<Vec<BatchItem>, EtlError> {
        let raw = self.transport.send_batch(reqs).await?;
        Ok(decode_batch(&raw, reqs, alignment)?)
    }

    async fn fetch_blocks(&self, numbers: &[u64]) -> Result<Vec<Block>, EtlError> {
        let reqs = builder::get_block_by_number_batch(numbers, self.include_transactions)?;
        let items = self.round_trip(&reqs, Alignment::ById).await?;

        items
            .into_iter()
            .zip(numbers)
            .enumerate()
            .map(|(index, (item, &number))| {
                let value = match item {
                    BatchItem::Value(v) => v,
                    other => {
                        return Err(EtlError::MissingItemResult {
                            method: GET_BLOCK_BY_NUMBER,
                            index,
                            reason: format!("block {number}: {}", other.describe()),
                        })
                    }
                };
                let block = mapper::block_from_json(value)?;
                if block.number != number {
                    return Err(EtlError::Mapping(format!(
                        "requested block {number}, node returned block {}",
                        block.number
                    )));
                }
                Ok(block)
            })
            .collect()
    }

    async fn merge_receipts(&self, block: &mut Block) -> Result<(), EtlError> {
        let eligible: Vec<usize> = block
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| !self.broken.contains(&tx.hash))
            .map(|(idx, _)| idx)
            .collect();

        if eligible.is_empty() {
            block.finish_receipts();
            return Ok(());
        }

        let reqs = {
            let hashes: Vec<&str> = eligible
                .iter()
                .map(|&idx| block.transactions[idx].hash.as_str())
                .collect();
            builder::get_receipt_batch(&hashes)?
        };
        let items = self.round_trip(&reqs, Alignment::ById).await?;

        let mut degraded = 0usize;
        for (item, &tx_idx) in items.into_iter().zip(&eligible) {
            let tx = &mut block.transactions[tx_idx];
            let value = match item {
                BatchItem::Value(v) => v,
                other => {
                    degraded += 1;
                    tracing::warn!(
                        block = block.number,
                        tx = %tx.hash,
                        reason = %other.describe(),
                        "receipt unavailable, gas_used left at 0"
                    );
                    continue;
                }
            };

            match mapper::receipt_from_json(value) {
                Ok(receipt) if receipt.transaction_hash.as_deref().is_some_and(|h| h != tx.hash) => {
                    degraded += 1;
                    tracing::warn!(
                        block = block.number,
                        tx = %tx.hash,
                        receipt_tx = receipt.transaction_hash.as_deref().unwrap_or_default(),
                        "receipt belongs to another transaction, ignored"
                    );
                }
                Ok(receipt) => tx.gas_used = receipt.gas_used,
                Err(e) => {
                    degraded += 1;
                    tracing::warn!(block = block.number, tx = %tx.hash, error = %e, "unreadable receipt ignored");
                }
            }
        }

        block.finish_receipts();
        tracing::trace!(
            block = block.number,
            receipts = eligible.len(),
            degraded,
            tx_fees = %block.tx_fees,
            "receipts merged"
        );
        Ok(())
    }

    async fn merge_uncle_counts(&self, numbers: &[u64], blocks: &mut [Block]) -> Result<(), EtlError> {
        let reqs = builder::get_uncle_count_batch(numbers)?;
        let items = self.round_trip(&reqs, Alignment::Positional).await?;

        for (index, (block, item)) in blocks.iter_mut().zip(items).enumerate() {
            let value = match item {
                BatchItem::Value(v) => v,
                other => {
                    return Err(EtlError::MissingItemResult {
                        method: GET_UNCLE_COUNT_BY_BLOCK_NUMBER,
                        index,
                        reason: format!("block {}: {}", block.number, other.describe()),
                    })
                }
            };
            block.set_uncle_count(mapper::uncle_count_from_json(&value)?)?;
        }
        Ok(())
    }
}

// ─── PipelineWorker ───────────────────────────────────────────────────────────

/// A scheduler worker owning one [`EnrichmentPipeline`]. The transport is
/// created from the factory on the first batch and reused for the rest of
/// the worker's life.
pub struct PipelineWorker {
    id: usize,
    factory: TransportFactory,
    exporter: Arc<dyn ItemExporter>,
    broken: Arc<BrokenTransactionSet>,
    include_transactions: bool,
    export_blocks: bool,
    pipeline: Option<EnrichmentPipeline>,
}

impl PipelineWorker {
    pub fn new(
        id: usize,
        factory: TransportFactory,
        exporter: Arc<dyn ItemExporter>,
        broken: Arc<BrokenTransactionSet>,
    ) -> Self {
        Self {
            id,
            factory,
            exporter,
            broken,
            include_transactions: true,
            export_blocks: true,
            pipeline: None,
        }
    }

    pub fn include_transactions(mut self, include: bool) -> Self {
        self.include_transactions = include;
        self
    }

    pub fn export_blocks(mut self, export: bool) -> Self {
        self.export_blocks = export;
        self
    }

    fn pipeline(&mut self) -> Result<&EnrichmentPipeline, EtlError> {
        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => self.build_pipeline()?,
        };
        Ok(self.pipeline.insert(pipeline))
    }

    fn build_pipeline(&self) -> Result<EnrichmentPipeline, EtlError> {
        let transport = (self.factory)()?;
        tracing::debug!(worker = self.id, url = transport.url(), "transport created");
        Ok(EnrichmentPipeline::new(
            transport,
            Arc::clone(&self.exporter),
            Arc::clone(&self.broken),
        )
        .include_transactions(self.include_transactions)
        .export_blocks(self.export_blocks))
    }
}

#[async_trait]
impl BatchWorker for PipelineWorker {
    async fn process(&mut self, batch: &BlockNumberBatch) -> Result<usize, EtlError> {
        self.pipeline()?.export_batch(batch).await
    }
}
