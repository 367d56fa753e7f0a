//! Configuration management
//!
//! Handles the TOML config file and the classic `rtable` routing table format.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::dataplane::{Interface, Route};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

/// Parses a routing table in the classic format.
///
/// One route per line: `<destination> <gateway> <mask> <interface>`.
/// Blank lines and `#` comments are ignored.
pub fn parse_rtable(text: &str) -> Result<Vec<Route>> {
    let mut routes = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [destination, gateway, mask, interface] = fields.as_slice() else {
            return Err(Error::Parse(format!(
                "rtable line {}: expected 4 fields, found {}",
                lineno + 1,
                fields.len()
            )));
        };

        let addr = |field: &str, what: &str| -> Result<Ipv4Addr> {
            field.parse().map_err(|_| {
                Error::Parse(format!(
                    "rtable line {}: invalid {} {:?}",
                    lineno + 1,
                    what,
                    field
                ))
            })
        };

        routes.push(Route::new(
            addr(*destination, "destination")?,
            addr(*mask, "mask")?,
            addr(*gateway, "gateway")?,
            *interface,
        ));
    }

    Ok(routes)
}

/// Collects `[[routes]]` followed by the routes in `routing_table_file`.
///
/// A relative table path is resolved against `base_dir`.
pub fn build_routes(config: &Config, base_dir: Option<&Path>) -> Result<Vec<Route>> {
    let mut routes: Vec<Route> = config
        .routes
        .iter()
        .map(|r| Route::new(r.destination, r.mask, r.gateway, r.interface.as_str()))
        .collect();

    if let Some(file) = &config.routing_table_file {
        let path = match base_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        };
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("routing table {}: {}", path.display(), e))
        })?;
        routes.extend(parse_rtable(&text)?);
    }

    for route in &routes {
        if !config.interfaces.iter().any(|i| i.name == route.interface) {
            return Err(Error::InterfaceNotFound {
                name: route.interface.clone(),
            });
        }
    }

    Ok(routes)
}

/// Builds the interface table, asking `system_mac` for any MAC the config
/// leaves out.
pub fn build_interfaces<F>(config: &Config, mut system_mac: F) -> Result<Vec<Interface>>
where
    F: FnMut(&str) -> Result<MacAddr>,
{
    config
        .interfaces
        .iter()
        .map(|iface| {
            let mac = match &iface.mac {
                Some(mac) => mac
                    .parse::<MacAddr>()
                    .map_err(|e| Error::Config(format!("interface {}: {}", iface.name, e)))?,
                None => system_mac(&iface.name)?,
            };
            Interface::new(iface.name.as_str(), mac, iface.address)
        })
        .collect()
}

/// Reads an interface's MAC from `/sys/class/net/<name>/address`.
pub fn sysfs_mac(name: &str) -> Result<MacAddr> {
    let path = format!("/sys/class/net/{}/address", name);
    let content = std::fs::read_to_string(&path).map_err(|_| Error::InterfaceNotFound {
        name: name.to_string(),
    })?;
    content
        .trim()
        .parse::<MacAddr>()
        .map_err(|e| Error::Config(format!("{}: {}", path, e)))
}
