//! ICMPv4 messages the router answers or originates (RFC 792)

use super::ipv4::checksum;
use crate::{Error, Result};

/// type, code, checksum and the 4-byte rest-of-header
pub const ICMP_HEADER_SIZE: usize = 8;

/// Quote of the offending datagram: its 20-byte header plus 8 payload bytes
pub const ERROR_DATA_SIZE: usize = 28;

pub const ICMP_ERROR_SIZE: usize = ICMP_HEADER_SIZE + ERROR_DATA_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        [
            Self::EchoReply,
            Self::DestinationUnreachable,
            Self::EchoRequest,
            Self::TimeExceeded,
        ]
        .into_iter()
        .find(|t| *t as u8 == value)
    }
}

/// Codes for [`IcmpType::DestinationUnreachable`]
pub mod dest_unreachable {
    /// No route to the destination network
    pub const NET_UNREACHABLE: u8 = 0;
    /// Next hop never answered ARP
    pub const HOST_UNREACHABLE: u8 = 1;
    /// TCP or UDP sent to one of our own addresses
    pub const PORT_UNREACHABLE: u8 = 3;
}

/// Codes for [`IcmpType::TimeExceeded`]
pub mod time_exceeded {
    pub const TTL_EXCEEDED: u8 = 0;
}

/// Borrowed view of an ICMP message; the body is not interpreted
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    bytes: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse(format!(
                "ICMP message of {} bytes has no room for a header",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    fn word(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    pub fn icmp_type(&self) -> u8 {
        self.bytes[0]
    }

    pub fn code(&self) -> u8 {
        self.bytes[1]
    }

    /// Echo identifier; meaningless for other types
    pub fn identifier(&self) -> u16 {
        self.word(4)
    }

    /// Echo sequence number; meaningless for other types
    pub fn sequence(&self) -> u16 {
        self.word(6)
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[ICMP_HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// The checksum covers the whole message, so a valid one sums to zero.
    pub fn validate_checksum(&self) -> bool {
        checksum(self.bytes) == 0
    }

    pub fn is_echo_request(&self) -> bool {
        IcmpType::from_u8(self.icmp_type()) == Some(IcmpType::EchoRequest) && self.code() == 0
    }
}

fn seal(message: &mut [u8]) {
    message[2..4].fill(0);
    let sum = checksum(message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
}

/// Turns an echo request into its reply, echoing identifier, sequence and
/// data unchanged.
pub fn build_echo_reply(request: &IcmpPacket<'_>) -> Vec<u8> {
    let mut reply = request.as_bytes().to_vec();
    reply[0] = IcmpType::EchoReply as u8;
    reply[1] = 0;
    seal(&mut reply);
    reply
}

/// Builds a destination-unreachable or time-exceeded message quoting the
/// start of `offending`. A datagram shorter than the quote is zero-padded.
pub fn build_icmp_error(
    icmp_type: IcmpType,
    code: u8,
    offending: &[u8],
) -> [u8; ICMP_ERROR_SIZE] {
    let mut message = [0u8; ICMP_ERROR_SIZE];
    message[0] = icmp_type as u8;
    message[1] = code;

    let quote = &offending[..offending.len().min(ERROR_DATA_SIZE)];
    message[ICMP_HEADER_SIZE..ICMP_HEADER_SIZE + quote.len()].copy_from_slice(quote);

    seal(&mut message);
    message
}
