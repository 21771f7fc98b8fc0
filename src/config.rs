//! Configuration options.
//!
//! The binary assembles a [`RuntimeConfig`] from its command line; library users can build one in
//! code or load it from a TOML file with [`load_config`]:
//!
//! ```toml
//! pcap = "./traces/smallFlows.pcap"
//! csv = "./flows.csv"
//!
//! [flowtrack]
//!     tcp_flow_timeout = 600
//!     udp_flow_timeout = 600
//! ```
//!
//! Timeouts are expressed in seconds here and converted to microseconds at the flow-tracking
//! boundary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Error reading config file {}", path.as_ref().display()))?;
    let config: RuntimeConfig = toml::from_str(&config_str).context("Invalid config file")?;
    Ok(config)
}

/// Runtime configuration options.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Path of the capture file to process.
    #[serde(default)]
    pub pcap: String,

    /// Path of the CSV file to write.
    #[serde(default)]
    pub csv: String,

    /// Optional benign-label file.
    #[serde(default)]
    pub labels: Option<String>,

    /// Frames longer than this many bytes are skipped. Defaults to `9702`.
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// Parse IPv6 frames. Defaults to `false`; when unset, IPv6 packets are dropped.
    #[serde(default = "default_parse_ipv6")]
    pub parse_ipv6: bool,

    /// Flow tracking settings.
    #[serde(default)]
    pub flowtrack: FlowTrackConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            pcap: String::new(),
            csv: String::new(),
            labels: None,
            mtu: default_mtu(),
            parse_ipv6: default_parse_ipv6(),
            flowtrack: FlowTrackConfig::default(),
        }
    }
}

/// Flow tracking options. All times are in seconds.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct FlowTrackConfig {
    /// Time before an open TCP flow is split at the next packet arrival. Defaults to `60`.
    #[serde(default = "default_flow_timeout")]
    pub tcp_flow_timeout: u64,

    /// Same for UDP flows. Defaults to `60`.
    #[serde(default = "default_flow_timeout")]
    pub udp_flow_timeout: u64,

    /// Gap separating active periods from idle periods. Defaults to `10`.
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout: u64,
}

impl Default for FlowTrackConfig {
    fn default() -> Self {
        FlowTrackConfig {
            tcp_flow_timeout: default_flow_timeout(),
            udp_flow_timeout: default_flow_timeout(),
            activity_timeout: default_activity_timeout(),
        }
    }
}

fn default_mtu() -> usize {
    9702
}

fn default_parse_ipv6() -> bool {
    false
}

fn default_flow_timeout() -> u64 {
    60
}

fn default_activity_timeout() -> u64 {
    10
}
