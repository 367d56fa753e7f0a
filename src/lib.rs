//! ipfwd - userspace IPv4 router
//!
//! Receives raw Ethernet frames, answers ARP and ICMP for its own addresses,
//! and forwards everything else using longest-prefix-match routing with an
//! ARP cache that queues packets while next hops are being resolved.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
