//! Back-fill an `uncle_count` column into block CSV files exported before
//! the column existed.
//!
//! Only the uncle-count round runs; everything else in the file is copied
//! through unchanged. The patched file is written to `<file>.tmp` and
//! renamed over the original.

use std::path::{Path, PathBuf};

use chainetl_rpc::builder::{self, GET_UNCLE_COUNT_BY_BLOCK_NUMBER};
use chainetl_rpc::{decode_batch, Alignment, BatchItem, RpcTransport};

use crate::error::EtlError;
use crate::exporter::tmp_path;
use crate::mapper;

const NUMBER_COLUMN: &str = "number";
const UNCLE_COUNT_COLUMN: &str = "uncle_count";

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The column was appended to `rows` data rows.
    Patched { rows: usize },
    /// The file already had an `uncle_count` column.
    Skipped,
}

/// Patch every file in order. Stops at the first failing file; files
/// patched before it stay patched.
pub async fn patch_files(
    files: &[PathBuf],
    transport: &dyn RpcTransport,
    batch_size: usize,
) -> Result<Vec<PatchOutcome>, EtlError> {
    if files.is_empty() {
        tracing::info!("no files given, nothing to do");
        return Ok(Vec::new());
    }
    tracing::info!(files = files.len(), "adding uncle_count column");

    let mut outcomes = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        tracing::info!(file = %file.display(), "[{}/{}] processing", idx + 1, files.len());
        outcomes.push(patch_file(file, transport, batch_size).await?);
    }

    tracing::info!("all files patched");
    Ok(outcomes)
}

/// Append an `uncle_count` column to one CSV file.
pub async fn patch_file(
    path: &Path,
    transport: &dyn RpcTransport,
    batch_size: usize,
) -> Result<PatchOutcome, EtlError> {
    if batch_size == 0 {
        return Err(EtlError::Configuration("batch_size must be greater than 0".into()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut headers = reader.headers()?.clone();

    if headers.iter().any(|h| h == UNCLE_COUNT_COLUMN) {
        tracing::info!(file = %path.display(), "already has an uncle_count column, skipping");
        return Ok(PatchOutcome::Skipped);
    }

    let number_col = headers.iter().position(|h| h == NUMBER_COLUMN).ok_or_else(|| {
        EtlError::Configuration(format!("{} has no `number` column", path.display()))
    })?;

    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    let numbers = rows
        .iter()
        .enumerate()
        .map(|(line, row)| {
            let raw = row.get(number_col).unwrap_or_default();
            raw.trim().parse::<u64>().map_err(|e| {
                EtlError::Mapping(format!(
                    "{} row {}: invalid block number {raw:?}: {e}",
                    path.display(),
                    line + 1
                ))
            })
        })
        .collect::<Result<Vec<u64>, _>>()?;

    if let (Some(min), Some(max)) = (numbers.iter().min(), numbers.iter().max()) {
        tracing::info!(file = %path.display(), min, max, rows = rows.len(), "fetching uncle counts");
    }

    let chunks: Vec<&[u64]> = numbers.chunks(batch_size).collect();
    let mut counts = Vec::with_capacity(numbers.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        counts.extend(fetch_uncle_counts(transport, chunk).await?);
        tracing::debug!(file = %path.display(), "uncle batches done: {}/{}", idx + 1, chunks.len());
    }

    headers.push_field(UNCLE_COUNT_COLUMN);
    let tmp = tmp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(&headers)?;
        for (mut row, count) in rows.into_iter().zip(counts) {
            row.push_field(&count.to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;

    tracing::info!(file = %path.display(), rows = numbers.len(), "uncle_count column added");
    Ok(PatchOutcome::Patched { rows: numbers.len() })
}

async fn fetch_uncle_counts(transport: &dyn RpcTransport, numbers: &[u64]) -> Result<Vec<u64>, EtlError> {
    let reqs = builder::get_uncle_count_batch(numbers)?;
    let raw = transport.send_batch(&reqs).await?;
    let items = decode_batch(&raw, &reqs, Alignment::Positional)?;

    items
        .into_iter()
        .zip(numbers)
        .enumerate()
        .map(|(index, (item, number))| match item {
            BatchItem::Value(v) => mapper::uncle_count_from_json(&v),
            other => Err(EtlError::MissingItemResult {
                method: GET_UNCLE_COUNT_BY_BLOCK_NUMBER,
                index,
                reason: format!("block {number}: {}", other.describe()),
            }),
        })
        .collect()
}
