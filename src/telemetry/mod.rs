//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters and gauges for the forwarding path and the ARP cache

mod logging;
mod metrics;

pub use logging::{init_logging, is_known_level, LogConfig};
pub use metrics::{
    Counter, Gauge, InterfaceSnapshot, InterfaceStats, MetricsRegistry, MetricsSnapshot,
};
