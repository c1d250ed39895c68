//! Hardware address handling for container-side interfaces.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Locally-administered OUI prefix for synthesized addresses.
const MAC_PREFIX: [u8; 2] = [0x02, 0x42];

#[derive(Debug, thiserror::Error)]
#[error("invalid hardware address: {0}")]
pub struct MacParseError(pub String);

/// A six-byte ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Synthesize a deterministic address from an IPv4 address:
    /// `02:42` followed by the four IP octets. The same IP always yields
    /// the same MAC, so containers recreated with the same address do not
    /// poison neighbour ARP caches.
    pub fn from_ipv4(ip: Ipv4Addr) -> Self {
        let [p0, p1] = MAC_PREFIX;
        let [o0, o1, o2, o3] = ip.octets();
        MacAddr([p0, p1, o0, o1, o2, o3])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [b0, b1, b2, b3, b4, b5] = self.0;
        write!(f, "{b0:02x}:{b1:02x}:{b2:02x}:{b3:02x}:{b4:02x}:{b5:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(|| MacParseError(s.to_string()))?;
            *byte =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError(s.to_string()));
        }
        Ok(MacAddr(bytes))
    }
}
