//! IPv4 headers (RFC 791)

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// IPv4 header size without options
pub const HEADER_SIZE: usize = 20;

/// TTL used for packets the router originates
pub const DEFAULT_TTL: u8 = 64;

/// Protocol numbers the router acts on
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Internet checksum (RFC 1071) over `data`.
///
/// Computing it over a header that carries a valid checksum yields 0.
pub fn checksum(data: &[u8]) -> u16 {
    let words = data.chunks(2).map(|pair| match *pair {
        [hi, lo] => u16::from_be_bytes([hi, lo]),
        [hi] => u16::from_be_bytes([hi, 0]),
        _ => 0,
    });
    let mut sum: u32 = words.map(u32::from).sum();

    // End-around carry
    while sum > 0xffff {
        sum = (sum >> 16) + (sum & 0xffff);
    }

    !(sum as u16)
}

/// Read-only view of a received datagram
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Parses and length-checks an IPv4 datagram.
    ///
    /// Rejects anything whose version is not 4, whose IHL is below 5, or whose
    /// header or total length exceeds the buffer.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse(format!("IPv4: {} bytes is too short", buffer.len())));
        }

        if buffer[0] >> 4 != 4 {
            return Err(Error::Parse(format!("IPv4: version {}", buffer[0] >> 4)));
        }

        let header_len = ((buffer[0] & 0x0F) as usize) * 4;
        if header_len < HEADER_SIZE || buffer.len() < header_len {
            return Err(Error::Parse(format!("IPv4: bad header length {}", header_len)));
        }

        let total_length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        if total_length < header_len || total_length > buffer.len() {
            return Err(Error::Parse(format!(
                "IPv4 total length {} does not fit buffer of {}",
                total_length,
                buffer.len()
            )));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.addr_at(12)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.addr_at(16)
    }

    fn addr_at(&self, offset: usize) -> Ipv4Addr {
        let b = &self.buffer[offset..offset + 4];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Payload up to the total length (trailing link padding excluded)
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..self.total_length() as usize]
    }

    /// The datagram itself, header included, without link padding
    pub fn datagram(&self) -> &[u8] {
        &self.buffer[..self.total_length() as usize]
    }

    /// True when the header sums to zero with its stored checksum
    pub fn validate_checksum(&self) -> bool {
        checksum(&self.buffer[..self.header_len]) == 0
    }
}

/// In-place view used when forwarding a received datagram
#[derive(Debug)]
pub struct Ipv4HeaderMut<'a> {
    buffer: &'a mut [u8],
    header_len: usize,
}

impl<'a> Ipv4HeaderMut<'a> {
    /// Wraps a buffer that has already passed [`Ipv4Header::parse`].
    pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
        let header_len = Ipv4Header::parse(buffer)?.header_len();
        Ok(Self { buffer, header_len })
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    /// Decrements the TTL and returns the new value.
    ///
    /// A TTL of 0 stays 0. The checksum is not touched; call
    /// [`Self::update_checksum`] afterwards.
    pub fn decrement_ttl(&mut self) -> u8 {
        self.buffer[8] = self.buffer[8].saturating_sub(1);
        self.buffer[8]
    }

    pub fn update_checksum(&mut self) {
        self.buffer[10..12].fill(0);
        let sum = checksum(&self.buffer[..self.header_len]);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }
}

/// Builds the IP header of a reply to `original`.
///
/// The reply goes back to the original source, comes from `source_ip`, and
/// carries a fresh identification, the default TTL and a valid checksum.
pub fn build_ip_reply(
    original: &Ipv4Header<'_>,
    protocol: u8,
    source_ip: Ipv4Addr,
    total_length: u16,
) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];

    // Version 4, IHL 5; keep the original type of service
    header[0] = 0x45;
    header[1] = original.buffer[1];
    header[2..4].copy_from_slice(&total_length.to_be_bytes());
    // Identification 0, no fragmentation flags
    header[8] = DEFAULT_TTL;
    header[9] = protocol;
    header[12..16].copy_from_slice(&source_ip.octets());
    header[16..20].copy_from_slice(&original.src_addr().octets());

    let sum = checksum(&header);
    header[10..12].copy_from_slice(&sum.to_be_bytes());

    header
}
