//! Server configuration.
//!
//! Settings come from the first `tannoy.toml` found on the search path;
//! `TANNOY_*` environment variables fill in whatever the file leaves unset
//! (or everything, when no file exists).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

const SEARCH_PATHS: [&str; 3] = [
    "tannoy.toml",
    "/etc/tannoy/tannoy.toml",
    "~/.config/tannoy/tannoy.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface the API listener binds.
    #[serde(default = "default_host")]
    pub host: String,

    /// API listener port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Channel engine knobs.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Connector routing table.
    #[serde(default)]
    pub connectors: ConnectorsConfig,

    /// Metrics export.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Channel engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Retained persistent messages per channel.
    #[serde(default = "default_max_msg_count")]
    pub max_msg_count: usize,
}

/// Connector routing table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorsConfig {
    /// Connector id to push endpoint base URL, e.g.
    /// `connector-1 = "http://10.0.0.5:3011"`.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

/// Metrics export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus endpoint is started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Scrape endpoint port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Serde default helpers; each consults the environment first.
fn default_host() -> String {
    std::env::var("TANNOY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("TANNOY_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(3010)
}

fn default_max_msg_count() -> usize {
    std::env::var("TANNOY_MAX_MSG_COUNT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(tannoy_core::DEFAULT_MAX_MSG_COUNT)
}

fn default_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            channels: ChannelsConfig::default(),
            connectors: ConnectorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            max_msg_count: default_max_msg_count(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load from the search path, falling back to env-backed defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a found file cannot be read or parsed, or if a
    /// setting is out of range.
    pub fn load() -> Result<Self> {
        let found = SEARCH_PATHS
            .iter()
            .map(|raw| shellexpand::tilde(raw))
            .find(|path| Path::new(path.as_ref()).exists());

        match found {
            Some(path) => Self::from_file(path.as_ref()),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load from one specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// setting is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channels.max_msg_count == 0 {
            bail!("channels.max_msg_count must be positive");
        }
        Ok(())
    }

    /// Socket address of the API listener.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}
