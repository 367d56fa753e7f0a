//! Router interface table

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Longest interface name accepted, in bytes
pub const IFACE_NAME_MAX: usize = 32;

/// A router port: name, hardware address and IPv4 address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddr, ip: Ipv4Addr) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > IFACE_NAME_MAX {
            return Err(Error::Config(format!(
                "interface name {:?} must be 1..={} bytes",
                name, IFACE_NAME_MAX
            )));
        }
        Ok(Self { name, mac, ip })
    }
}

/// Interfaces loaded at startup, immutable afterwards
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Finds the interface that owns `ip`
    pub fn get_by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
