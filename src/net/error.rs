//! Standardized network error codes
//!
//! Every operation of the stack interface reports failure through [`NetError`].
//! The numeric codes are negative and start at -3001 so that an integer return
//! channel can carry either a byte count (`>= 0`) or an error (`< 0`).

use core::fmt;

/// Result type used by every fallible stack operation
pub type NetResult<T> = Result<T, NetError>;

/// Success value of the integer return channel
pub const NET_OK: i32 = 0;

/// Standardized error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NetError {
    /// No data available but the call is non-blocking
    WouldBlock = -3001,
    /// Functionality not provided by this stack
    Unsupported = -3002,
    /// Invalid argument or configuration
    Parameter = -3003,
    /// Not connected to a network
    NoConnection = -3004,
    /// Socket not available for use
    NoSocket = -3005,
    /// IP address is not known
    NoAddress = -3006,
    /// Memory resource not available
    NoMemory = -3007,
    /// SSID not found
    NoSsid = -3008,
    /// DNS failed to complete successfully
    DnsFailure = -3009,
    /// DHCP failed to complete successfully
    DhcpFailure = -3010,
    /// Connection to access point failed
    AuthFailure = -3011,
    /// Failure interfacing with the network processor
    DeviceError = -3012,
}

/// Coarse classification of an error, used to decide how to react to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry later, not a failure of intent
    Transient,
    /// Permanent for this stack or build
    Unsupported,
    /// Caller error, not retryable without changing the input
    Parameter,
    /// Pool or memory exhausted, may clear once other resources are freed
    ResourceExhausted,
    /// No network or no address
    Connectivity,
    /// Name resolution failed
    NameResolution,
    /// Joining the network failed (DHCP, authentication, SSID)
    NetworkJoin,
    /// Possibly fatal to the stack instance
    Device,
}

impl NetError {
    /// All standardized errors, ordered by code
    pub const ALL: [NetError; 12] = [
        NetError::WouldBlock,
        NetError::Unsupported,
        NetError::Parameter,
        NetError::NoConnection,
        NetError::NoSocket,
        NetError::NoAddress,
        NetError::NoMemory,
        NetError::NoSsid,
        NetError::DnsFailure,
        NetError::DhcpFailure,
        NetError::AuthFailure,
        NetError::DeviceError,
    ];

    /// Numeric code of this error (always negative)
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Map a numeric code back to an error
    ///
    /// Returns `None` for success, byte counts and unknown negative codes.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    pub fn class(self) -> ErrorClass {
        match self {
            NetError::WouldBlock => ErrorClass::Transient,
            NetError::Unsupported => ErrorClass::Unsupported,
            NetError::Parameter => ErrorClass::Parameter,
            NetError::NoSocket | NetError::NoMemory => ErrorClass::ResourceExhausted,
            NetError::NoConnection | NetError::NoAddress => ErrorClass::Connectivity,
            NetError::DnsFailure => ErrorClass::NameResolution,
            NetError::DhcpFailure | NetError::AuthFailure | NetError::NoSsid => {
                ErrorClass::NetworkJoin
            }
            NetError::DeviceError => ErrorClass::Device,
        }
    }

    pub fn is_would_block(self) -> bool {
        self == NetError::WouldBlock
    }

    /// Whether the same call may succeed later without changing its input
    pub fn is_retryable(self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transient | ErrorClass::ResourceExhausted
        )
    }

    /// Whether the error may have left the stack instance unusable
    pub fn is_fatal(self) -> bool {
        self.class() == ErrorClass::Device
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            NetError::WouldBlock => "operation would block",
            NetError::Unsupported => "unsupported functionality",
            NetError::Parameter => "invalid parameter",
            NetError::NoConnection => "not connected to a network",
            NetError::NoSocket => "socket not available for use",
            NetError::NoAddress => "IP address is not known",
            NetError::NoMemory => "memory resource not available",
            NetError::NoSsid => "SSID not found",
            NetError::DnsFailure => "DNS failed to complete successfully",
            NetError::DhcpFailure => "DHCP failed to complete successfully",
            NetError::AuthFailure => "connection to access point failed",
            NetError::DeviceError => "failure interfacing with the network processor",
        };
        write!(f, "{} ({})", msg, self.code())
    }
}

impl From<NetError> for i32 {
    fn from(err: NetError) -> i32 {
        err.code()
    }
}

/// Fold a status result into the integer return channel
pub fn status_code(result: NetResult<()>) -> i32 {
    match result {
        Ok(()) => NET_OK,
        Err(e) => e.code(),
    }
}

/// Fold a byte-count result into the integer return channel
///
/// Counts that do not fit in an `i32` are clamped to `i32::MAX`.
pub fn size_to_code(result: NetResult<usize>) -> i32 {
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => e.code(),
    }
}

/// Split an integer return value into a byte count or an error
///
/// Unknown negative codes are reported as [`NetError::DeviceError`].
pub fn code_to_size(code: i32) -> NetResult<usize> {
    if code >= 0 {
        return Ok(code as usize);
    }
    Err(NetError::from_code(code).unwrap_or(NetError::DeviceError))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_contiguous() {
        for (i, err) in NetError::ALL.iter().enumerate() {
            assert_eq!(err.code(), -3001 - i as i32);
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(NetError::from_code(-3005), Some(NetError::NoSocket));
        assert_eq!(NetError::from_code(0), None);
        assert_eq!(NetError::from_code(-1), None);
        assert_eq!(NetError::from_code(-3013), None);
    }

    #[test]
    fn test_size_channel() {
        assert_eq!(size_to_code(Ok(10)), 10);
        assert_eq!(size_to_code(Err(NetError::WouldBlock)), -3001);
        assert_eq!(code_to_size(10), Ok(10));
        assert_eq!(code_to_size(-3001), Err(NetError::WouldBlock));
        assert_eq!(code_to_size(-42), Err(NetError::DeviceError));
        assert_eq!(status_code(Ok(())), NET_OK);
    }

    #[test]
    fn test_classification() {
        assert!(NetError::WouldBlock.is_retryable());
        assert!(NetError::NoSocket.is_retryable());
        assert!(!NetError::Parameter.is_retryable());
        assert!(NetError::DeviceError.is_fatal());
        assert_eq!(NetError::NoSsid.class(), ErrorClass::NetworkJoin);
        assert_eq!(NetError::NoAddress.class(), ErrorClass::Connectivity);
    }
}
