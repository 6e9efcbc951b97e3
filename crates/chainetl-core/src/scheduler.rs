//! Bounded worker pool that drives a block range through batch workers.
//!
//! The range is cut into consecutive batches handed out in increasing
//! order. Batches are produced on demand behind the queue lock, so the
//! range is never materialised up front. `max_workers` tokio tasks pull
//! batches until the range is exhausted. The first failure, including a
//! panicking worker, stops the pool from handing out further batches;
//! in-flight batches finish, all workers are joined, and that first error
//! is returned.

use std::any::Any;
use std::iter::Enumerate;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::error::EtlError;
use crate::types::{BlockNumberBatch, BlockRange, RangeBatches};

/// Processes one batch end-to-end. Each pool task owns exactly one worker
/// for its whole lifetime.
#[async_trait]
pub trait BatchWorker: Send + 'static {
    /// Returns the number of items processed.
    async fn process(&mut self, batch: &BlockNumberBatch) -> Result<usize, EtlError>;
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Block numbers per batch.
    pub batch_size: usize,
    /// Upper bound on concurrently running workers.
    pub max_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_workers: 5,
        }
    }
}

/// Fans batches of a block range out over a bounded set of workers.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    config: SchedulerConfig,
}

type Queue = Mutex<Enumerate<RangeBatches>>;

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, EtlError> {
        if config.batch_size == 0 {
            return Err(EtlError::Configuration("batch_size must be greater than 0".into()));
        }
        if config.max_workers == 0 {
            return Err(EtlError::Configuration("max_workers must be greater than 0".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every batch of `range` through workers built by `make_worker`
    /// (called with the worker index). Returns the total number of items
    /// processed.
    pub async fn execute<W, F>(&self, range: BlockRange, make_worker: F) -> Result<u64, EtlError>
    where
        W: BatchWorker,
        F: Fn(usize) -> W,
    {
        let batches = range.batches(self.config.batch_size)?;
        let total_batches = range.batch_count(self.config.batch_size);
        let total_items = range.len();
        let num_workers = usize::try_from(total_batches)
            .map_or(self.config.max_workers, |n| self.config.max_workers.min(n));

        tracing::info!(
            start = range.start(),
            end = range.end(),
            total_items = %total_items,
            total_batches = %total_batches,
            workers = num_workers,
            "starting batch execution"
        );

        let queue: Arc<Queue> = Arc::new(Mutex::new(batches.enumerate()));
        let aborted = Arc::new(AtomicBool::new(false));
        let first_error: Arc<Mutex<Option<EtlError>>> = Arc::new(Mutex::new(None));
        let processed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let mut worker = make_worker(worker_id);
            let queue = Arc::clone(&queue);
            let aborted = Arc::clone(&aborted);
            let first_error = Arc::clone(&first_error);
            let processed = Arc::clone(&processed);

            handles.push(tokio::spawn(async move {
                while !aborted.load(Ordering::SeqCst) {
                    let next = match queue.lock() {
                        Ok(mut q) => q.next(),
                        Err(_) => None,
                    };
                    let Some((batch_idx, batch)) = next else {
                        break;
                    };

                    let outcome = AssertUnwindSafe(worker.process(&batch))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(EtlError::WorkerPanicked {
                                worker: worker_id,
                                reason: panic_reason(panic.as_ref()),
                            })
                        });

                    match outcome {
                        Ok(items) => {
                            let done = processed.fetch_add(items as u64, Ordering::SeqCst) + items as u64;
                            tracing::info!(
                                worker = worker_id,
                                batch = batch_idx + 1,
                                total_batches = %total_batches,
                                batch_start = batch.first(),
                                batch_end = batch.last(),
                                "{done}/{total_items} items processed ({:.1}%)",
                                done as f64 / total_items as f64 * 100.0
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                worker = worker_id,
                                batch_start = batch.first(),
                                batch_end = batch.last(),
                                error = %e,
                                "batch failed, stopping pool"
                            );
                            aborted.store(true, Ordering::SeqCst);
                            if let Ok(mut slot) = first_error.lock() {
                                slot.get_or_insert(e);
                            }
                            break;
                        }
                    }
                }
                tracing::debug!(worker = worker_id, "worker finished");
            }));
        }

        let joined = futures::future::join_all(handles).await;

        let mut panicked = None;
        for (worker, res) in joined.into_iter().enumerate() {
            if let Err(e) = res {
                panicked.get_or_insert(EtlError::WorkerPanicked {
                    worker,
                    reason: e.to_string(),
                });
            }
        }

        let first = first_error.lock().ok().and_then(|mut slot| slot.take());
        if let Some(e) = first.or(panicked) {
            return Err(e);
        }

        let done = processed.load(Ordering::SeqCst);
        tracing::info!(items = done, batches = %total_batches, "batch execution complete");
        Ok(done)
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
