//! Link-layer address and EtherType

use std::fmt;
use std::str::FromStr;

/// 48-bit Ethernet hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Reads a MAC address from the first six bytes of `bytes`.
    ///
    /// Callers guarantee the slice is long enough.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[..6]);
        MacAddr(mac)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set (covers broadcast too)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A string that is not six colon- or dash-separated hex octets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError(String);

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {:?}", self.0)
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts `02:00:5e:10:00:01` and `02-00-5e-10-00-01`, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        let valid_shape = octets.len() == 6
            && octets.iter().all(|o| o.len() == 2)
            && !(s.contains(':') && s.contains('-'));
        if !valid_shape {
            return Err(ParseMacAddrError(s.to_string()));
        }

        let mut mac = [0u8; 6];
        for (byte, octet) in mac.iter_mut().zip(octets) {
            *byte =
                u8::from_str_radix(octet, 16).map_err(|_| ParseMacAddrError(s.to_string()))?;
        }
        Ok(MacAddr(mac))
    }
}

/// EtherType values handled by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        [Self::Ipv4, Self::Arp]
            .into_iter()
            .find(|t| *t as u16 == value)
    }
}
