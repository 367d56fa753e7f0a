//! Frame I/O
//!
//! The router core only needs a way to put a frame on a named interface; the
//! [`Transport`] trait is that seam. [`AfPacketTransport`] backs it with one
//! raw socket per interface.

mod af_packet;

pub use af_packet::{AfPacketSocket, AfPacketTransport};

use crate::Result;

/// Information about a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
}

/// Outbound frame sink shared by the receive tasks and the ARP sweeper
pub trait Transport: Send + Sync {
    /// Transmits one complete Ethernet frame on `interface`.
    fn send_frame(&self, interface: &str, frame: &[u8]) -> Result<()>;
}
