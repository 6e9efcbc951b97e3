//! Sinks for finished block records.
//!
//! Lifecycle: `open` once before any export, `export_item` once per
//! completed block (any order across batches), `close` exactly once at the
//! end of a run whether it succeeded or not.
//!
//! - [`InMemoryExporter`]: keeps records in RAM (testing, embedding)
//! - [`JsonLinesExporter`]: one JSON object per line
//! - [`CsvExporter`]: header row plus one row per block
//!
//! File sinks write to `<path>.tmp` and rename over `<path>` on close. The
//! final path only ever holds a fully flushed file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::EtlError;
use crate::types::BlockRecord;

/// Column order for tabular block output.
pub const BLOCK_FIELDS: [&str; 12] = [
    "number",
    "hash",
    "parent_hash",
    "miner",
    "timestamp",
    "gas_limit",
    "gas_used",
    "base_fee_per_gas",
    "size",
    "transaction_count",
    "tx_fees",
    "uncle_count",
];

/// Durable sink for finished records.
#[async_trait]
pub trait ItemExporter: Send + Sync {
    async fn open(&self) -> Result<(), EtlError>;

    /// Must be safe to call concurrently from several workers.
    async fn export_item(&self, record: &BlockRecord) -> Result<(), EtlError>;

    async fn close(&self) -> Result<(), EtlError>;
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, EtlError> {
    m.lock()
        .map_err(|_| EtlError::Export("exporter lock poisoned".into()))
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ─── InMemoryExporter ─────────────────────────────────────────────────────────

/// Keeps exported records in memory. All data is lost when dropped.
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    records: Mutex<Vec<BlockRecord>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything exported so far, in export order.
    pub fn records(&self) -> Vec<BlockRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Block numbers in export order.
    pub fn numbers(&self) -> Vec<u64> {
        self.records().iter().map(|r| r.number).collect()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemExporter for InMemoryExporter {
    async fn open(&self) -> Result<(), EtlError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn export_item(&self, record: &BlockRecord) -> Result<(), EtlError> {
        lock(&self.records)?.push(record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), EtlError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── JsonLinesExporter ────────────────────────────────────────────────────────

/// Writes one JSON object per block, newline separated.
pub struct JsonLinesExporter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ItemExporter for JsonLinesExporter {
    async fn open(&self) -> Result<(), EtlError> {
        let file = File::create(tmp_path(&self.path))?;
        *lock(&self.writer)? = Some(BufWriter::new(file));
        tracing::debug!(path = %self.path.display(), "opened JSON lines exporter");
        Ok(())
    }

    async fn export_item(&self, record: &BlockRecord) -> Result<(), EtlError> {
        let mut guard = lock(&self.writer)?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| EtlError::Export("JSON lines exporter is not open".into()))?;
        serde_json::to_writer(&mut *writer, record)
            .map_err(|e| EtlError::Export(e.to_string()))?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    async fn close(&self) -> Result<(), EtlError> {
        let writer = lock(&self.writer)?
            .take()
            .ok_or_else(|| EtlError::Export("JSON lines exporter is not open".into()))?;
        writer
            .into_inner()
            .map_err(|e| EtlError::Io(e.into_error()))?
            .sync_all()?;
        std::fs::rename(tmp_path(&self.path), &self.path)?;
        tracing::debug!(path = %self.path.display(), "closed JSON lines exporter");
        Ok(())
    }
}

// ─── CsvExporter ──────────────────────────────────────────────────────────────

/// Writes a header row on open and one row per block.
pub struct CsvExporter {
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ItemExporter for CsvExporter {
    async fn open(&self) -> Result<(), EtlError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(tmp_path(&self.path))?;
        writer.write_record(BLOCK_FIELDS)?;
        *lock(&self.writer)? = Some(writer);
        tracing::debug!(path = %self.path.display(), "opened CSV exporter");
        Ok(())
    }

    async fn export_item(&self, record: &BlockRecord) -> Result<(), EtlError> {
        let mut guard = lock(&self.writer)?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| EtlError::Export("CSV exporter is not open".into()))?;
        writer.serialize(record)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), EtlError> {
        let mut writer = lock(&self.writer)?
            .take()
            .ok_or_else(|| EtlError::Export("CSV exporter is not open".into()))?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(tmp_path(&self.path), &self.path)?;
        tracing::debug!(path = %self.path.display(), "closed CSV exporter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: u64) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("0x{number:x}"),
            parent_hash: "0x0".into(),
            miner: "0xminer".into(),
            timestamp: 1_438_269_988,
            gas_limit: 5000,
            gas_used: 0,
            base_fee_per_gas: None,
            size: Some(544),
            transaction_count: 0,
            tx_fees: 0,
            uncle_count: 1,
        }
    }

    #[tokio::test]
    async fn memory_exporter_tracks_lifecycle() {
        let exp = InMemoryExporter::new();
        exp.open().await.unwrap();
        exp.export_item(&record(1)).await.unwrap();
        exp.export_item(&record(2)).await.unwrap();
        exp.close().await.unwrap();
        assert_eq!(exp.numbers(), vec![1, 2]);
        assert_eq!((exp.open_count(), exp.close_count()), (1, 1));
    }

    #[tokio::test]
    async fn jsonl_exporter_writes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.jsonl");
        let exp = JsonLinesExporter::new(&path);
        exp.open().await.unwrap();
        exp.export_item(&record(7)).await.unwrap();
        assert!(!path.exists());
        exp.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["number"], 7);
        assert_eq!(v["uncle_count"], 1);
        assert!(v["base_fee_per_gas"].is_null());
    }

    #[tokio::test]
    async fn csv_exporter_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.csv");
        let exp = CsvExporter::new(&path);
        exp.open().await.unwrap();
        exp.export_item(&record(1)).await.unwrap();
        exp.export_item(&record(2)).await.unwrap();
        exp.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), BLOCK_FIELDS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "1,0x1,0x0,0xminer,1438269988,5000,0,,544,0,0,1"
        );
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn export_before_open_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exp = CsvExporter::new(dir.path().join("x.csv"));
        assert!(matches!(
            exp.export_item(&record(1)).await,
            Err(EtlError::Export(_))
        ));
        assert!(exp.close().await.is_err());
    }
}
