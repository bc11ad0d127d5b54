//! IP and MAC address value types
//!
//! [`IpAddress`] is the versioned, fixed-size address passed by value through the
//! stack interface. Raw bytes are always stored big-endian, and only the prefix
//! that belongs to the version (4 bytes for IPv4, 16 for IPv6) is meaningful.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use core::str::FromStr;

use crate::net::error::{NetError, NetResult};

/// Maximum number of bytes of an IP address
pub const IP_BYTES: usize = IPV6_BYTES;
/// Number of bytes in an IPv4 address
pub const IPV4_BYTES: usize = 4;
/// Number of bytes in an IPv6 address
pub const IPV6_BYTES: usize = 16;

/// Size of the text representation of an IPv4 address, terminator included
pub const IPV4_SIZE: usize = 16;
/// Size of the text representation of an IPv6 address, terminator included
pub const IPV6_SIZE: usize = 40;
/// Size of the largest IP address text representation
pub const IP_SIZE: usize = IPV6_SIZE;

/// Number of bytes in a MAC address
pub const MAC_BYTES: usize = 6;
/// Size of the text representation of a MAC address, terminator included
pub const MAC_SIZE: usize = 18;

/// Length of the wire record produced by [`IpAddress::to_wire`]
pub const IP_WIRE_LEN: usize = 1 + IP_BYTES;

/// IP address version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpVersion {
    V4 = 0,
    V6 = 1,
    Unspecified = 2,
}

impl IpVersion {
    /// Number of meaningful address bytes for this version
    pub const fn byte_len(self) -> usize {
        match self {
            IpVersion::V4 => IPV4_BYTES,
            IpVersion::V6 => IPV6_BYTES,
            IpVersion::Unspecified => 0,
        }
    }

    pub fn from_tag(tag: u8) -> NetResult<Self> {
        match tag {
            0 => Ok(IpVersion::V4),
            1 => Ok(IpVersion::V6),
            2 => Ok(IpVersion::Unspecified),
            _ => Err(NetError::Parameter),
        }
    }
}

/// Versioned IP address
#[derive(Clone, Copy)]
pub struct IpAddress {
    version: IpVersion,
    bytes: [u8; IP_BYTES],
}

impl IpAddress {
    /// The address reported by a stack that is not connected to a network
    pub const UNSPECIFIED: IpAddress = IpAddress {
        version: IpVersion::Unspecified,
        bytes: [0; IP_BYTES],
    };

    /// IPv4 any address (0.0.0.0)
    pub const V4_ANY: IpAddress = IpAddress::v4([0, 0, 0, 0]);

    /// IPv4 loopback address (127.0.0.1)
    pub const V4_LOOPBACK: IpAddress = IpAddress::v4([127, 0, 0, 1]);

    /// IPv4 limited broadcast address (255.255.255.255)
    pub const V4_BROADCAST: IpAddress = IpAddress::v4([255, 255, 255, 255]);

    pub const fn v4(octets: [u8; IPV4_BYTES]) -> Self {
        let mut bytes = [0u8; IP_BYTES];
        bytes[0] = octets[0];
        bytes[1] = octets[1];
        bytes[2] = octets[2];
        bytes[3] = octets[3];
        Self {
            version: IpVersion::V4,
            bytes,
        }
    }

    pub const fn v6(octets: [u8; IPV6_BYTES]) -> Self {
        Self {
            version: IpVersion::V6,
            bytes: octets,
        }
    }

    /// Build an address from raw big-endian bytes
    ///
    /// The slice length must match the version exactly; an unspecified
    /// address takes an empty slice.
    pub fn from_bytes(version: IpVersion, raw: &[u8]) -> NetResult<Self> {
        if raw.len() != version.byte_len() {
            return Err(NetError::Parameter);
        }
        let mut bytes = [0u8; IP_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self { version, bytes })
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    /// Meaningful bytes of the address (empty when unspecified)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.version.byte_len()]
    }

    /// Full 16-byte buffer, unused tail zeroed
    pub fn raw(&self) -> &[u8; IP_BYTES] {
        &self.bytes
    }

    pub fn is_unspecified(&self) -> bool {
        self.version == IpVersion::Unspecified
    }

    /// True for unspecified addresses and for all-zero V4/V6 addresses
    ///
    /// Binding to such an address binds the port only.
    pub fn is_any(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn is_loopback(&self) -> bool {
        match self.version {
            IpVersion::V4 => self.bytes[0] == 127,
            IpVersion::V6 => Ipv6Addr::from(self.bytes).is_loopback(),
            IpVersion::Unspecified => false,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.version == IpVersion::V4 && self.as_bytes() == [255, 255, 255, 255]
    }

    /// Whether this address can be used as a destination of a transmission
    pub fn is_routable_destination(&self) -> bool {
        !self.is_unspecified() && !self.is_any()
    }

    /// Convert to the core address type, `None` when unspecified
    pub fn to_ip_addr(&self) -> Option<IpAddr> {
        match self.version {
            IpVersion::V4 => Some(IpAddr::V4(Ipv4Addr::new(
                self.bytes[0],
                self.bytes[1],
                self.bytes[2],
                self.bytes[3],
            ))),
            IpVersion::V6 => Some(IpAddr::V6(Ipv6Addr::from(self.bytes))),
            IpVersion::Unspecified => None,
        }
    }

    /// Encode as version tag followed by the 16-byte buffer
    pub fn to_wire(&self) -> [u8; IP_WIRE_LEN] {
        let mut out = [0u8; IP_WIRE_LEN];
        out[0] = self.version as u8;
        out[1..1 + self.version.byte_len()].copy_from_slice(self.as_bytes());
        out
    }

    /// Decode a record produced by [`IpAddress::to_wire`]
    ///
    /// Bytes past the version prefix are ignored.
    pub fn from_wire(wire: &[u8]) -> NetResult<Self> {
        if wire.len() != IP_WIRE_LEN {
            return Err(NetError::Parameter);
        }
        let version = IpVersion::from_tag(wire[0])?;
        Self::from_bytes(version, &wire[1..1 + version.byte_len()])
    }

    /// Whether this address satisfies a requested version
    pub fn matches_version(&self, version: IpVersion) -> bool {
        version == IpVersion::Unspecified || version == self.version
    }
}

impl Default for IpAddress {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl PartialEq for IpAddress {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for IpAddress {}

impl Hash for IpAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version.hash(state);
        self.as_bytes().hash(state);
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        Self::v4(addr.octets())
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        Self::v6(addr.octets())
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

impl FromStr for IpAddress {
    type Err = NetError;

    /// Parse a literal IPv4 or IPv6 address
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| NetError::Parameter)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_ip_addr() {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "unspecified"),
        }
    }
}

impl fmt::Debug for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IpAddress({:?}, {})", self.version, self)
    }
}

/// Hardware (MAC-like) identity, raw bytes in transmission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; MAC_BYTES]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_BYTES]);

    pub fn octets(&self) -> [u8; MAC_BYTES] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MAC_BYTES];
        let mut parts = s.split([':', '-']);
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(NetError::Parameter)?;
            if part.len() != 2 {
                return Err(NetError::Parameter);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| NetError::Parameter)?;
        }
        if parts.next().is_some() {
            return Err(NetError::Parameter);
        }
        Ok(MacAddress(bytes))
    }
}
