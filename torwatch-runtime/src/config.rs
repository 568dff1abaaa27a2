//! Configuration loading
//!
//! Everything the engine needs is passed in explicitly through
//! [`TorWatchConfig`]; an optional TOML file overrides the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use torwatch_core::{default_engines, SearchEngine};
use torwatch_probes::ProbeConfig;
use torwatch_tor::{ClearwebConfig, TorConfig};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(String, String),

    #[error("Invalid config {0}: {1}")]
    Parse(String, String),
}

/// Orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Run the RDAP lookup automatically when a concrete IPv4 is resolved
    pub auto_registry: bool,
    /// Whole-operation deadline in seconds (0 = none)
    pub scan_deadline_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            auto_registry: true,
            scan_deadline_secs: 0,
        }
    }
}

impl AggregatorConfig {
    pub fn deadline(&self) -> Option<Duration> {
        (self.scan_deadline_secs > 0).then(|| Duration::from_secs(self.scan_deadline_secs))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorWatchConfig {
    pub tor: TorConfig,
    pub clearweb: ClearwebConfig,
    pub probes: ProbeConfig,
    pub engines: Vec<SearchEngine>,
    pub scan: AggregatorConfig,
}

impl Default for TorWatchConfig {
    fn default() -> Self {
        Self {
            tor: TorConfig::default(),
            clearweb: ClearwebConfig::default(),
            probes: ProbeConfig::default(),
            engines: default_engines(),
            scan: AggregatorConfig::default(),
        }
    }
}

/// Load configuration from `path`; no path or a missing file yields defaults
pub fn load_config(path: Option<&Path>) -> Result<TorWatchConfig, ConfigError> {
    let path = match path {
        Some(p) if p.exists() => p,
        Some(p) => {
            debug!("Config file {} not found, using defaults", p.display());
            return Ok(TorWatchConfig::default());
        }
        None => return Ok(TorWatchConfig::default()),
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;
    parse_config(&content).map_err(|e| match e {
        ConfigError::Parse(_, msg) => ConfigError::Parse(path.display().to_string(), msg),
        other => other,
    })
}

/// Parse a TOML document; absent sections keep their defaults
pub fn parse_config(content: &str) -> Result<TorWatchConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse("<inline>".to_string(), e.to_string()))
}
