//! ARP for Ethernet/IPv4 (RFC 826)

use super::ethernet::EthernetHeader;
use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Wire size of an Ethernet/IPv4 ARP message
pub const ARP_PACKET_SIZE: usize = 28;

/// hrd, pro, hln, pln as they appear on the wire
const FIXED_PREFIX: [u8; 6] = [0x00, 0x01, 0x08, 0x00, 6, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        [Self::Request, Self::Reply]
            .into_iter()
            .find(|op| *op as u16 == value)
    }
}

/// An ARP message with its address pairs decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

fn ipv4_at(bytes: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    )
}

impl ArpPacket {
    /// Decodes the first 28 bytes of `buffer`; trailing padding is ignored.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let Some(msg) = buffer.get(..ARP_PACKET_SIZE) else {
            return Err(Error::Parse(format!(
                "ARP message needs {} bytes, got {}",
                ARP_PACKET_SIZE,
                buffer.len()
            )));
        };

        if msg[..6] != FIXED_PREFIX {
            return Err(Error::Parse(format!(
                "not an Ethernet/IPv4 ARP message (prefix {:02x?})",
                &msg[..6]
            )));
        }

        let code = u16::from_be_bytes([msg[6], msg[7]]);
        let Some(operation) = ArpOp::from_u16(code) else {
            return Err(Error::Parse(format!("unknown ARP opcode {}", code)));
        };

        Ok(Self {
            operation,
            sender_mac: MacAddr::from_slice(&msg[8..]),
            sender_ip: ipv4_at(msg, 14),
            target_mac: MacAddr::from_slice(&msg[18..]),
            target_ip: ipv4_at(msg, 24),
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut out = [0u8; ARP_PACKET_SIZE];
        out[..6].copy_from_slice(&FIXED_PREFIX);

        let op = (self.operation as u16).to_be_bytes();
        let fields: [&[u8]; 5] = [
            &op,
            &self.sender_mac.0,
            &self.sender_ip.octets(),
            &self.target_mac.0,
            &self.target_ip.octets(),
        ];
        let mut at = 6;
        for field in fields {
            out[at..at + field.len()].copy_from_slice(field);
            at += field.len();
        }

        out
    }
}

/// Builds the reply to an ARP request on behalf of an interface.
///
/// The requester becomes the target and the interface becomes the sender.
pub fn build_arp_reply(request: &ArpPacket, mac: MacAddr, ip: Ipv4Addr) -> ArpPacket {
    ArpPacket {
        operation: ArpOp::Reply,
        sender_mac: mac,
        sender_ip: ip,
        target_mac: request.sender_mac,
        target_ip: request.sender_ip,
    }
}

/// Builds a broadcast ARP request for `wanted` sent from an interface.
pub fn build_arp_request(
    wanted: Ipv4Addr,
    mac: MacAddr,
    ip: Ipv4Addr,
) -> (EthernetHeader, ArpPacket) {
    let header = EthernetHeader {
        dst: MacAddr::BROADCAST,
        src: mac,
        ethertype: EtherType::Arp,
    };
    let request = ArpPacket {
        operation: ArpOp::Request,
        sender_mac: mac,
        sender_ip: ip,
        target_mac: MacAddr::ZERO,
        target_ip: wanted,
    };
    (header, request)
}
