//! Network protocol implementations
//!
//! Zero-copy views and builders for the headers the router speaks.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod types;

pub use types::*;
