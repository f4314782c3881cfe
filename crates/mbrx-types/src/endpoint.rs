//! IPv4 endpoint type with safe parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 address and UDP port pair in `ip:port` form.
///
/// This is the unit of configuration for fabric link sources and
/// destinations. Parsing is strict: a malformed string is a
/// [`ParseError`], never a silent default.
///
/// # Examples
///
/// ```
/// use mbrx_types::Endpoint;
///
/// let ep: Endpoint = "239.1.2.3:12345".parse().unwrap();
/// assert_eq!(ep.port, 12345);
/// assert_eq!(ep.to_string(), "239.1.2.3:12345");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    /// IPv4 address.
    pub ip: Ipv4Addr,
    /// UDP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates a new endpoint.
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint { ip, port }
    }

    /// The address as a big-endian 32-bit integer, as written to
    /// `*_dest_ip` and friends.
    pub fn ip_bits(&self) -> u32 {
        u32::from(self.ip)
    }

    /// Rebuilds an endpoint from register words.
    pub fn from_bits(ip: u32, port: u16) -> Self {
        Endpoint {
            ip: Ipv4Addr::from(ip),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidEndpoint(s.to_string()))?;

        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(ip.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ParseError::InvalidPort(port.to_string()))?;

        Ok(Endpoint { ip, port })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(ep: Endpoint) -> String {
        ep.to_string()
    }
}
