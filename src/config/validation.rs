//! Configuration validation

use super::Config;
use crate::dataplane::IFACE_NAME_MAX;
use crate::protocol::MacAddr;
use crate::telemetry::is_known_level;
use std::collections::HashSet;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_interfaces(config, &mut result);
    validate_routes(config, &mut result);
    validate_arp(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(logging) = &config.logging else {
        return;
    };

    if !is_known_level(&logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            logging.level
        ));
    }
    if !matches!(logging.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            logging.format
        ));
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.is_empty() {
        result.error("interfaces: at least one interface is required");
        return;
    }

    let mut names = HashSet::new();
    let mut addresses = HashSet::new();

    for (i, iface) in config.interfaces.iter().enumerate() {
        if iface.name.is_empty() || iface.name.len() > IFACE_NAME_MAX {
            result.error(format!(
                "interfaces[{}]: name '{}' must be 1 to {} bytes",
                i, iface.name, IFACE_NAME_MAX
            ));
        }

        if !names.insert(iface.name.as_str()) {
            result.error(format!(
                "interfaces[{}]: duplicate interface name '{}'",
                i, iface.name
            ));
        }

        if !addresses.insert(iface.address) {
            result.error(format!(
                "interfaces.{}: address {} already used by another interface",
                iface.name, iface.address
            ));
        }

        if iface.address.is_unspecified() || iface.address.is_broadcast() {
            result.error(format!(
                "interfaces.{}: {} is not a usable interface address",
                iface.name, iface.address
            ));
        }

        match &iface.mac {
            Some(mac) => {
                if let Err(e) = mac.parse::<MacAddr>() {
                    result.error(format!("interfaces.{}: {}", iface.name, e));
                }
            }
            None => result.warn(format!(
                "interfaces.{}: mac not specified, reading it from the system",
                iface.name
            )),
        }
    }
}

fn validate_routes(config: &Config, result: &mut ValidationResult) {
    for (i, route) in config.routes.iter().enumerate() {
        if !config.interfaces.iter().any(|iface| iface.name == route.interface) {
            result.error(format!(
                "routes[{}]: interface '{}' not defined",
                i, route.interface
            ));
        }

        if !is_contiguous_mask(route.mask) {
            result.warn(format!(
                "routes[{}]: mask {} is not contiguous",
                i, route.mask
            ));
        }

        let mask = u32::from(route.mask);
        if u32::from(route.destination) & !mask != 0 {
            result.warn(format!(
                "routes[{}]: destination {} has host bits set for mask {}",
                i, route.destination, route.mask
            ));
        }
    }

    if config.routes.is_empty() && config.routing_table_file.is_none() {
        result.warn("routes: no routes configured, only local traffic will be answered");
    }
}

fn validate_arp(config: &Config, result: &mut ValidationResult) {
    let arp = &config.arp;
    let checks = [
        ("cache_size", arp.cache_size as u64),
        ("entry_timeout_secs", arp.entry_timeout_secs),
        ("retry_interval_ms", arp.retry_interval_ms),
        ("max_requests", arp.max_requests as u64),
        ("sweep_interval_ms", arp.sweep_interval_ms),
    ];

    for (name, value) in checks {
        if value == 0 {
            result.error(format!("arp.{}: must be greater than zero", name));
        }
    }

    if arp.sweep_interval_ms > arp.retry_interval_ms {
        result.warn(format!(
            "arp.sweep_interval_ms ({}) exceeds retry_interval_ms ({}); retries will be slower than configured",
            arp.sweep_interval_ms, arp.retry_interval_ms
        ));
    }
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits.leading_ones() + bits.trailing_zeros() == 32
}
