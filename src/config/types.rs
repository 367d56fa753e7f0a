//! Configuration types

use crate::dataplane::{ArpCacheConfig, RouterOptions};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Router configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: Option<LogConfig>,
    #[serde(default)]
    pub arp: ArpConfig,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// Classic whitespace-separated routing table, relative to the config file
    #[serde(default)]
    pub routing_table_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub address: Ipv4Addr,
    /// Read from the system when omitted
    #[serde(default)]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub gateway: Ipv4Addr,
    pub interface: String,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// `[arp]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArpConfig {
    pub cache_size: usize,
    pub entry_timeout_secs: u64,
    pub retry_interval_ms: u64,
    pub max_requests: u32,
    pub sweep_interval_ms: u64,
    pub reply_to_foreign_requests: bool,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            entry_timeout_secs: 15,
            retry_interval_ms: 1000,
            max_requests: 5,
            sweep_interval_ms: 1000,
            reply_to_foreign_requests: false,
        }
    }
}

impl ArpConfig {
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            arp: ArpCacheConfig {
                capacity: self.cache_size,
                entry_timeout: Duration::from_secs(self.entry_timeout_secs),
                retry_interval: Duration::from_millis(self.retry_interval_ms),
                max_requests: self.max_requests,
            },
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            reply_to_foreign_requests: self.reply_to_foreign_requests,
        }
    }
}
