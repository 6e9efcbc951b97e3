//! Tracing / logging initialisation.

use std::collections::HashMap;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Override per component: crate name → level
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `info,chainetl_core=debug`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();

        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Parse a `component=level` override, e.g. `chainetl_rpc=trace`.
pub fn parse_component(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((component, level)) if !component.is_empty() && !level.is_empty() => {
            Ok((component.to_string(), level.to_string()))
        }
        _ => Err(format!("expected COMPONENT=LEVEL, got '{s}'")),
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `config`.
/// Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // logs go to stderr so stdout stays clean for summaries
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives() {
        assert_eq!(LogConfig::default().directives(), "info");
    }

    #[test]
    fn parses_component_overrides() {
        assert_eq!(
            parse_component("chainetl-core=debug").unwrap(),
            ("chainetl-core".to_string(), "debug".to_string())
        );
        assert!(parse_component("chainetl-core").is_err());
        assert!(parse_component("=debug").is_err());
        assert!(parse_component("chainetl-core=").is_err());
    }

    #[test]
    fn component_overrides_are_sorted_and_snake_cased() {
        let mut config = LogConfig {
            level: "warn".into(),
            ..LogConfig::default()
        };
        config.components.insert("chainetl-rpc".into(), "trace".into());
        config.components.insert("chainetl-core".into(), "debug".into());
        assert_eq!(
            config.directives(),
            "warn,chainetl_core=debug,chainetl_rpc=trace"
        );
    }
}
