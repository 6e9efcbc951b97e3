//! ChainETL CLI.
//!
//! # Commands
//! ```text
//! chainetl export-blocks-extra --start-block <N> --end-block <M> [--output <path>] [--format csv|jsonl]
//! chainetl add-uncle-count <FILES>... [--provider-uri <url>] [--batch-size <n>]
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod cmd_export;
mod cmd_uncles;
mod logging;

use logging::{init_tracing, parse_component, LogConfig};

#[derive(Parser, Debug)]
#[command(
    name = "chainetl",
    about = "Export Ethereum blocks enriched with transaction fees and uncle counts",
    version
)]
struct Cli {
    /// Log level: trace | debug | info | warn | error (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Per-component level override, e.g. `chainetl_rpc=trace` (repeatable)
    #[arg(long = "log-component", global = true, value_name = "COMPONENT=LEVEL", value_parser = parse_component)]
    log_components: Vec<(String, String)>,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export blocks with tx_fees and uncle_count for an inclusive range
    #[command(name = "export-blocks-extra")]
    ExportBlocksExtra(ExportArgs),

    /// Append an uncle_count column to existing block CSV files
    #[command(name = "add-uncle-count")]
    AddUncleCount(UncleArgs),
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    /// First block to export
    #[arg(short, long)]
    start_block: u64,
    /// Last block to export (inclusive)
    #[arg(short, long)]
    end_block: u64,
    /// JSON-RPC endpoint (default: http://localhost:8545)
    #[arg(short, long)]
    provider_uri: Option<String>,
    /// Block numbers per RPC batch (default: 1000)
    #[arg(short, long)]
    batch_size: Option<usize>,
    /// Concurrent workers (default: 5)
    #[arg(short = 'w', long)]
    max_workers: Option<usize>,
    /// Output file (default: blocks.csv or blocks.jsonl)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,
    /// Request transaction hashes only; skips receipts so tx_fees stay 0
    #[arg(long)]
    no_transactions: bool,
    /// TOML config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct UncleArgs {
    /// CSV files to patch in place
    files: Vec<PathBuf>,
    /// JSON-RPC endpoint
    #[arg(short, long, default_value = "http://localhost:8545")]
    provider_uri: String,
    /// Block numbers per RPC batch
    #[arg(short, long, default_value_t = 1000)]
    batch_size: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Jsonl,
}

impl OutputFormat {
    fn default_path(self) -> PathBuf {
        match self {
            Self::Csv => PathBuf::from("blocks.csv"),
            Self::Jsonl => PathBuf::from("blocks.jsonl"),
        }
    }
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            components: self.log_components.iter().cloned().collect(),
            json: self.json_logs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_config());

    match cli.command {
        Commands::ExportBlocksExtra(args) => cmd_export::run(args).await,
        Commands::AddUncleCount(args) => cmd_uncles::run(args).await,
    }
}
