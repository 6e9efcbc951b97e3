//! `ExportBlocksJob`: open the exporter, run the scheduler over a block
//! range, close the exporter.

use std::sync::Arc;

use chainetl_rpc::TransportFactory;

use crate::config::EtlConfig;
use crate::error::EtlError;
use crate::exporter::ItemExporter;
use crate::pipeline::PipelineWorker;
use crate::scheduler::BatchScheduler;
use crate::types::{BlockRange, BrokenTransactionSet};

/// Exports enriched blocks for `[start_block, end_block]`.
pub struct ExportBlocksJob {
    range: BlockRange,
    scheduler: BatchScheduler,
    factory: TransportFactory,
    exporter: Arc<dyn ItemExporter>,
    broken: Arc<BrokenTransactionSet>,
    export_blocks: bool,
    export_transactions: bool,
}

impl std::fmt::Debug for ExportBlocksJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportBlocksJob")
            .field("range", &self.range)
            .field("scheduler", &self.scheduler)
            .field("broken", &self.broken.len())
            .field("export_blocks", &self.export_blocks)
            .field("export_transactions", &self.export_transactions)
            .finish()
    }
}

impl ExportBlocksJob {
    /// Validates the range and the config. No I/O happens here.
    pub fn new(
        start_block: u64,
        end_block: u64,
        config: &EtlConfig,
        factory: TransportFactory,
        exporter: Arc<dyn ItemExporter>,
    ) -> Result<Self, EtlError> {
        config.validate()?;
        let range = BlockRange::new(start_block, end_block)?;
        let scheduler = BatchScheduler::new(config.scheduler_config())?;

        Ok(Self {
            range,
            scheduler,
            factory,
            exporter,
            broken: Arc::new(config.broken_set()),
            export_blocks: config.export_blocks,
            export_transactions: config.export_transactions,
        })
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    /// Run the job to completion. Returns the number of blocks processed.
    ///
    /// The exporter is closed exactly once after a successful `open`, also
    /// when a batch fails. The first error encountered is returned.
    pub async fn run(&self) -> Result<u64, EtlError> {
        tracing::info!(
            start = self.range.start(),
            end = self.range.end(),
            export_blocks = self.export_blocks,
            export_transactions = self.export_transactions,
            "export job starting"
        );

        self.exporter.open().await?;

        let result = self
            .scheduler
            .execute(self.range, |id| {
                PipelineWorker::new(
                    id,
                    Arc::clone(&self.factory),
                    Arc::clone(&self.exporter),
                    Arc::clone(&self.broken),
                )
                .include_transactions(self.export_transactions)
                .export_blocks(self.export_blocks)
            })
            .await;

        let closed = self.exporter.close().await;

        match (result, closed) {
            (Ok(blocks), Ok(())) => {
                tracing::info!(blocks, "export job finished");
                Ok(blocks)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "exporter close failed after job error");
                }
                tracing::error!(error = %e, "export job failed");
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::InMemoryExporter;
    use chainetl_rpc::{RpcTransport, TransportError};

    fn failing_factory() -> TransportFactory {
        Arc::new(|| -> Result<Arc<dyn RpcTransport>, TransportError> {
            Err(TransportError::Other("no transport in this test".into()))
        })
    }

    #[test]
    fn rejects_inverted_range() {
        let err = ExportBlocksJob::new(
            10,
            9,
            &EtlConfig::default(),
            failing_factory(),
            Arc::new(InMemoryExporter::new()),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EtlConfig {
            export_blocks: false,
            export_transactions: false,
            ..EtlConfig::default()
        };
        let err = ExportBlocksJob::new(0, 1, &config, failing_factory(), Arc::new(InMemoryExporter::new()))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn closes_exporter_when_transport_cannot_be_built() {
        let exporter = Arc::new(InMemoryExporter::new());
        let job = ExportBlocksJob::new(0, 4, &EtlConfig::default(), failing_factory(), exporter.clone())
            .unwrap();
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, EtlError::Transport(_)), "{err}");
        assert_eq!(exporter.open_count(), 1);
        assert_eq!(exporter.close_count(), 1);
        assert!(exporter.records().is_empty());
    }
}
