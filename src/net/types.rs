//! Protocol and WiFi enumerations and the access point descriptor

use core::fmt;

use crate::net::addr::{MAC_BYTES, MacAddress};
use crate::net::error::{NetError, NetResult};

/// Longest SSID allowed by 802.11
pub const SSID_MAX_LEN: usize = 32;

/// Size of the SSID field, terminator included
pub const SSID_FIELD_LEN: usize = SSID_MAX_LEN + 1;

/// Length of the packed record produced by [`WifiAccessPoint::to_bytes`]
pub const WIFI_AP_RECORD_LEN: usize = SSID_FIELD_LEN + MAC_BYTES + 3;

/// Transport protocol of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Protocol {
    Tcp = 0,
    Udp = 1,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// WiFi encryption type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Security {
    /// Open access point
    None = 0x0,
    Wep = 0x1,
    Wpa = 0x2,
    Wpa2 = 0x3,
    WpaWpa2 = 0x4,
    /// Unknown or unsupported security reported by a scan
    Unknown = 0xFF,
}

impl From<u8> for Security {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Security::None,
            0x1 => Security::Wep,
            0x2 => Security::Wpa,
            0x3 => Security::Wpa2,
            0x4 => Security::WpaWpa2,
            _ => Security::Unknown,
        }
    }
}

/// Network name, at most 32 bytes, stored in a fixed terminated field
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ssid {
    field: [u8; SSID_FIELD_LEN],
    len: u8,
}

impl Ssid {
    pub const EMPTY: Ssid = Ssid {
        field: [0; SSID_FIELD_LEN],
        len: 0,
    };

    /// Build from raw bytes (SSIDs are not required to be UTF-8)
    pub fn from_bytes(raw: &[u8]) -> NetResult<Self> {
        if raw.len() > SSID_MAX_LEN || raw.contains(&0) {
            return Err(NetError::Parameter);
        }
        let mut field = [0u8; SSID_FIELD_LEN];
        field[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            field,
            len: raw.len() as u8,
        })
    }

    pub fn new(name: &str) -> NetResult<Self> {
        Self::from_bytes(name.as_bytes())
    }

    /// Decode a terminated 33-byte field
    pub fn from_field(field: &[u8; SSID_FIELD_LEN]) -> NetResult<Self> {
        let len = field
            .iter()
            .position(|&b| b == 0)
            .ok_or(NetError::Parameter)?;
        Self::from_bytes(&field[..len])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.field[..self.len as usize]
    }

    /// The SSID as text, `None` if it is not valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    /// Fixed field with terminator
    pub fn field(&self) -> &[u8; SSID_FIELD_LEN] {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Ssid({:?})", s),
            None => write!(f, "Ssid({:02x?})", self.as_bytes()),
        }
    }
}

/// Access point found by a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiAccessPoint {
    pub ssid: Ssid,
    pub bssid: MacAddress,
    pub security: Security,
    /// Signal strength in dBm
    pub rssi: i8,
    pub channel: u8,
}

impl WifiAccessPoint {
    pub fn new(ssid: Ssid, bssid: MacAddress, security: Security, rssi: i8, channel: u8) -> Self {
        Self {
            ssid,
            bssid,
            security,
            rssi,
            channel,
        }
    }

    /// Packed record: ssid field, bssid, security, rssi, channel
    pub fn to_bytes(&self) -> [u8; WIFI_AP_RECORD_LEN] {
        let mut out = [0u8; WIFI_AP_RECORD_LEN];
        out[..SSID_FIELD_LEN].copy_from_slice(self.ssid.field());
        out[SSID_FIELD_LEN..SSID_FIELD_LEN + MAC_BYTES].copy_from_slice(&self.bssid.0);
        out[SSID_FIELD_LEN + MAC_BYTES] = self.security as u8;
        out[SSID_FIELD_LEN + MAC_BYTES + 1] = self.rssi as u8;
        out[SSID_FIELD_LEN + MAC_BYTES + 2] = self.channel;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> NetResult<Self> {
        if bytes.len() != WIFI_AP_RECORD_LEN {
            return Err(NetError::Parameter);
        }
        let mut field = [0u8; SSID_FIELD_LEN];
        field.copy_from_slice(&bytes[..SSID_FIELD_LEN]);
        let mut bssid = [0u8; MAC_BYTES];
        bssid.copy_from_slice(&bytes[SSID_FIELD_LEN..SSID_FIELD_LEN + MAC_BYTES]);

        Ok(Self {
            ssid: Ssid::from_field(&field)?,
            bssid: MacAddress(bssid),
            security: Security::from(bytes[SSID_FIELD_LEN + MAC_BYTES]),
            rssi: bytes[SSID_FIELD_LEN + MAC_BYTES + 1] as i8,
            channel: bytes[SSID_FIELD_LEN + MAC_BYTES + 2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssid_bounds() {
        assert!(Ssid::new("").unwrap().is_empty());
        let longest = "x".repeat(SSID_MAX_LEN);
        let ssid = Ssid::new(&longest).unwrap();
        assert_eq!(ssid.len(), SSID_MAX_LEN);
        assert_eq!(ssid.field()[SSID_MAX_LEN], 0);
        assert_eq!(Ssid::new(&"x".repeat(33)), Err(NetError::Parameter));
    }

    #[test]
    fn test_security_values() {
        assert_eq!(Security::WpaWpa2 as u8, 4);
        assert_eq!(Security::from(0xFF), Security::Unknown);
        assert_eq!(Security::from(0x17), Security::Unknown);
    }

    #[test]
    fn test_access_point_record() {
        let ap = WifiAccessPoint::new(
            Ssid::new("lab-net").unwrap(),
            MacAddress([0x02, 0, 0, 0, 0, 0x42]),
            Security::Wpa2,
            -67,
            11,
        );
        let bytes = ap.to_bytes();
        assert_eq!(bytes.len(), 42);
        assert_eq!(bytes[SSID_FIELD_LEN + MAC_BYTES + 1], (-67i8) as u8);
        assert_eq!(WifiAccessPoint::from_bytes(&bytes), Ok(ap));
    }

    #[test]
    fn test_unterminated_field_rejected() {
        let field = [b'a'; SSID_FIELD_LEN];
        assert_eq!(Ssid::from_field(&field), Err(NetError::Parameter));
    }
}
