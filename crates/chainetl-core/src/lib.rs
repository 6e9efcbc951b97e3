//! chainetl-core: batched block enrichment for Ethereum-style chains.
//!
//! # Architecture
//!
//! ```text
//! ExportBlocksJob → BatchScheduler (bounded worker pool)
//!                        └── per worker: EnrichmentPipeline
//!                               ├── round 1: eth_getBlockByNumber   → mapper → Block
//!                               ├── round 2: eth_getTransactionReceipt (per block) → gas_used, tx_fees
//!                               ├── round 3: eth_getUncleCountByBlockNumber → uncle_count
//!                               └── export: ItemExporter (memory / JSON lines / CSV)
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod job;
pub mod mapper;
pub mod pipeline;
pub mod scheduler;
pub mod types;
pub mod uncle_patch;

pub use config::{EtlConfig, EtlConfigBuilder};
pub use error::EtlError;
pub use exporter::{CsvExporter, InMemoryExporter, ItemExporter, JsonLinesExporter};
pub use job::ExportBlocksJob;
pub use pipeline::{EnrichmentPipeline, PipelineWorker};
pub use scheduler::{BatchScheduler, BatchWorker, SchedulerConfig};
pub use types::{
    Block, BlockNumberBatch, BlockRange, BlockRecord, BrokenTransactionSet, RangeBatches, Transaction,
};
pub use uncle_patch::{patch_file, patch_files, PatchOutcome};
