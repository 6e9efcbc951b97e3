//! `chainetl add-uncle-count`: patch uncle counts into existing CSV exports.

use anyhow::{Context, Result};
use chainetl_core::{patch_files, PatchOutcome};
use chainetl_rpc::HttpRpcClient;

use crate::UncleArgs;

pub async fn run(args: UncleArgs) -> Result<()> {
    let transport = HttpRpcClient::default_for(&args.provider_uri)
        .with_context(|| format!("connecting to {}", args.provider_uri))?;

    let outcomes = patch_files(&args.files, &transport, args.batch_size)
        .await
        .context("adding uncle_count column failed")?;

    let patched = outcomes
        .iter()
        .filter(|o| matches!(o, PatchOutcome::Patched { .. }))
        .count();
    println!(
        "Patched {patched} file(s), skipped {}",
        outcomes.len() - patched
    );
    Ok(())
}
