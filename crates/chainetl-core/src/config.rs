//! Job configuration, loadable from TOML and overridable field by field.
//!
//! # Example
//!
//! ```rust
//! use chainetl_core::EtlConfigBuilder;
//!
//! let config = EtlConfigBuilder::new()
//!     .provider_uri("https://rpc.example.org")
//!     .batch_size(100)
//!     .max_workers(8)
//!     .broken_transaction("0xABC")
//!     .build()
//!     .unwrap();
//! assert!(config.broken_set().contains("0xabc"));
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;
use crate::scheduler::SchedulerConfig;
use crate::types::BrokenTransactionSet;

/// Settings for an export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// JSON-RPC endpoint, e.g. `http://localhost:8545`.
    pub provider_uri: String,
    /// Block numbers per batch.
    pub batch_size: usize,
    /// Concurrently running workers.
    pub max_workers: usize,
    /// Hand block records to the exporter.
    pub export_blocks: bool,
    /// Request full transaction objects so receipts and fees are computed.
    pub export_transactions: bool,
    /// Transaction hashes whose receipts must never be requested.
    pub broken_transactions: Vec<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_ms: u64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            provider_uri: "http://localhost:8545".into(),
            batch_size: 1000,
            max_workers: 5,
            export_blocks: true,
            export_transactions: true,
            broken_transactions: Vec::new(),
            request_timeout_ms: 30_000,
        }
    }
}

impl EtlConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, EtlError> {
        toml::from_str(s).map_err(|e| EtlError::Configuration(format!("invalid config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EtlError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), EtlError> {
        if self.provider_uri.trim().is_empty() {
            return Err(EtlError::Configuration("provider_uri is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(EtlError::Configuration("batch_size must be greater than 0".into()));
        }
        if self.max_workers == 0 {
            return Err(EtlError::Configuration("max_workers must be greater than 0".into()));
        }
        if !self.export_blocks && !self.export_transactions {
            return Err(EtlError::Configuration(
                "at least one of export_blocks or export_transactions must be enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.batch_size,
            max_workers: self.max_workers,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The normalised broken-transaction set.
    pub fn broken_set(&self) -> BrokenTransactionSet {
        BrokenTransactionSet::new(&self.broken_transactions)
    }
}

/// Fluent builder for [`EtlConfig`].
#[derive(Debug, Default)]
pub struct EtlConfigBuilder {
    config: EtlConfig,
}

impl EtlConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config, e.g. one loaded from a file.
    pub fn from_config(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn provider_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.provider_uri = uri.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    pub fn export_blocks(mut self, enabled: bool) -> Self {
        self.config.export_blocks = enabled;
        self
    }

    pub fn export_transactions(mut self, enabled: bool) -> Self {
        self.config.export_transactions = enabled;
        self
    }

    /// Add one hash to the broken-transaction list.
    pub fn broken_transaction(mut self, hash: impl Into<String>) -> Self {
        self.config.broken_transactions.push(hash.into());
        self
    }

    pub fn broken_transactions<I, S>(mut self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .broken_transactions
            .extend(hashes.into_iter().map(Into::into));
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<EtlConfig, EtlError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = EtlConfig::default();
        assert_eq!(cfg.provider_uri, "http://localhost:8545");
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.max_workers, 5);
        assert!(cfg.export_blocks && cfg.export_transactions);
        assert!(cfg.broken_transactions.is_empty());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EtlConfig::from_toml_str(
            r#"
            provider_uri = "https://node.example:8545"
            batch_size = 50
            broken_transactions = ["0xDEAD"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.provider_uri, "https://node.example:8545");
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.max_workers, 5);
        assert!(cfg.broken_set().contains("0xdead"));
    }

    #[test]
    fn bad_toml_is_configuration_error() {
        let err = EtlConfig::from_toml_str("batch_size = \"many\"").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_workers = 2\nexport_blocks = false").unwrap();
        let cfg = EtlConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.max_workers, 2);
        assert!(!cfg.export_blocks);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = EtlConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(EtlConfigBuilder::new().batch_size(0).build().is_err());
        assert!(EtlConfigBuilder::new().max_workers(0).build().is_err());
        assert!(EtlConfigBuilder::new()
            .export_blocks(false)
            .export_transactions(false)
            .build()
            .is_err());
        assert!(EtlConfigBuilder::new().provider_uri(" ").build().is_err());
    }

    #[test]
    fn builder_custom() {
        let cfg = EtlConfigBuilder::new()
            .provider_uri("http://10.0.0.1:8545")
            .batch_size(10)
            .max_workers(3)
            .export_transactions(false)
            .broken_transactions(["0xA1", "0xb2"])
            .request_timeout_ms(500)
            .build()
            .unwrap();
        assert_eq!(cfg.scheduler_config(), SchedulerConfig { batch_size: 10, max_workers: 3 });
        assert!(!cfg.export_transactions);
        let set = cfg.broken_set();
        assert_eq!(set.len(), 2);
        assert!(set.contains("0xa1") && set.contains("0xB2"));
        assert_eq!(cfg.request_timeout(), Duration::from_millis(500));
    }
}
