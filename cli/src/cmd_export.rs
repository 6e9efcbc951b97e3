//! `chainetl export-blocks-extra`: run an [`ExportBlocksJob`] over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use chainetl_core::{
    CsvExporter, EtlConfig, EtlConfigBuilder, ExportBlocksJob, ItemExporter, JsonLinesExporter,
};
use chainetl_rpc::{HttpClientConfig, HttpRpcClient, RpcTransport, TransportError, TransportFactory};

use crate::{ExportArgs, OutputFormat};

pub async fn run(args: ExportArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let output = args.output.clone().unwrap_or_else(|| args.format.default_path());

    let exporter: Arc<dyn ItemExporter> = match args.format {
        OutputFormat::Csv => Arc::new(CsvExporter::new(&output)),
        OutputFormat::Jsonl => Arc::new(JsonLinesExporter::new(&output)),
    };

    let job = ExportBlocksJob::new(
        args.start_block,
        args.end_block,
        &config,
        http_factory(&config),
        exporter,
    )
    .context("invalid export settings")?;

    tracing::info!(
        provider = %config.provider_uri,
        output = %output.display(),
        batch_size = config.batch_size,
        max_workers = config.max_workers,
        "exporting blocks {}..={}",
        args.start_block,
        args.end_block
    );

    let blocks = job
        .run()
        .await
        .with_context(|| format!("export of blocks {}..={} failed", args.start_block, args.end_block))?;

    println!("Exported {blocks} blocks to {}", output.display());
    Ok(())
}

/// Config file (if any) first, then flags on top.
fn resolve_config(args: &ExportArgs) -> Result<EtlConfig> {
    let base = match &args.config {
        Some(path) => EtlConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EtlConfig::default(),
    };

    let mut builder = EtlConfigBuilder::from_config(base);
    if let Some(uri) = &args.provider_uri {
        builder = builder.provider_uri(uri);
    }
    if let Some(size) = args.batch_size {
        builder = builder.batch_size(size);
    }
    if let Some(workers) = args.max_workers {
        builder = builder.max_workers(workers);
    }
    if args.no_transactions {
        builder = builder.export_transactions(false);
    }
    Ok(builder.build()?)
}

/// One HTTP client per worker, each with its own connection pool.
pub fn http_factory(config: &EtlConfig) -> TransportFactory {
    let url = config.provider_uri.clone();
    let http = HttpClientConfig {
        request_timeout: config.request_timeout(),
    };
    Arc::new(move || -> Result<Arc<dyn RpcTransport>, TransportError> {
        Ok(Arc::new(HttpRpcClient::new(url.clone(), http.clone())?))
    })
}
