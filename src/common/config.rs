//! Configuration for hubkv

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hub configuration
    #[serde(default)]
    pub hub: HubConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Bind address for HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Reconciliation interval in milliseconds
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,

    /// Per-subscriber event buffer; lagging subscribers are dropped
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:7400".parse().unwrap()
}
fn default_sync_interval() -> u64 {
    5000
}
fn default_event_buffer() -> usize {
    100
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            sync_interval_ms: default_sync_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `hubkv.toml` and `HUBKV_*` environment
    /// variables, falling back to defaults. CLI flags are merged on top
    /// by the binaries.
    pub fn load() -> Self {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("hubkv").required(false))
            .add_source(config::Environment::with_prefix("HUBKV").separator("__"));

        match builder.build().and_then(|c| c.try_deserialize()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Config::default()
            }
        }
    }
}
