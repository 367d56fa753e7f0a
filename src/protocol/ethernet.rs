//! Ethernet II framing
//!
//! Frames are handled as plain byte slices. The helpers that read a header
//! field expect at least [`HEADER_SIZE`] bytes; the receive path checks that
//! once before dispatching.

use super::{EtherType, MacAddr};

/// dst, src and EtherType; 802.1Q tags are not supported
pub const HEADER_SIZE: usize = 14;

/// Largest untagged frame without the FCS, used as the receive buffer size
pub const MAX_FRAME_SIZE: usize = 1518;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Arp,
    Ipv4,
    Unknown(u16),
}

pub fn dst_mac(frame: &[u8]) -> MacAddr {
    MacAddr::from_slice(frame)
}

pub fn src_mac(frame: &[u8]) -> MacAddr {
    MacAddr::from_slice(&frame[6..])
}

/// Classifies a frame by its EtherType.
pub fn ethernet_type(frame: &[u8]) -> FrameKind {
    let raw = u16::from_be_bytes([frame[12], frame[13]]);
    match EtherType::from_u16(raw) {
        Some(EtherType::Arp) => FrameKind::Arp,
        Some(EtherType::Ipv4) => FrameKind::Ipv4,
        None => FrameKind::Unknown(raw),
    }
}

/// Points a frame at its next hop by overwriting both addresses.
pub fn rewrite_addresses(frame: &mut [u8], src: MacAddr, dst: MacAddr) {
    frame[..6].copy_from_slice(&dst.0);
    frame[6..12].copy_from_slice(&src.0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: EtherType,
}

impl EthernetHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        rewrite_addresses(&mut out, self.src, self.dst);
        out[12..].copy_from_slice(&(self.ethertype as u16).to_be_bytes());
        out
    }
}

/// Concatenates a header and any number of payload pieces into one frame.
pub struct FrameBuilder {
    bytes: Vec<u8>,
}

impl FrameBuilder {
    pub fn new(header: EthernetHeader) -> Self {
        let mut bytes = Vec::with_capacity(MAX_FRAME_SIZE);
        bytes.extend_from_slice(&header.to_bytes());
        Self { bytes }
    }

    pub fn payload(mut self, piece: &[u8]) -> Self {
        self.bytes.extend_from_slice(piece);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
