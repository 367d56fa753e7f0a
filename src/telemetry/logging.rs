//! Structured logging set-up.
//!
//! `RUST_LOG` wins over the `[logging]` section of the config file, which
//! wins over `info`. Thread names are always printed so lines from the ARP
//! sweeper stand apart from the receive tasks.

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// `[logging]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(config: Option<&LogConfig>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .and_then(|c| parse_level(&c.level))
            .unwrap_or(Level::INFO);
        EnvFilter::new(level.as_str())
    });

    let output = tracing_subscriber::fmt::layer().with_thread_names(true);
    let output: Box<dyn Layer<Registry> + Send + Sync> =
        match config.map(|c| c.format.as_str()) {
            Some("json") => output.json().boxed(),
            Some("compact") => output.compact().boxed(),
            _ => output.boxed(),
        };

    let _ = tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init();
}

fn parse_level(level: &str) -> Option<Level> {
    let level = level.to_ascii_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        return None;
    }
    level.parse().ok()
}

/// Whether `level` names a level [`init_logging`] understands
pub fn is_known_level(level: &str) -> bool {
    parse_level(level).is_some()
}
