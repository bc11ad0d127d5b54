//! Stack and socket option identities and value encoding
//!
//! Options are addressed by a `(level, name)` pair. The names below are the
//! standardized ones; any other name is stack-specific. Values of the
//! standardized options are a native-endian `i32`.
//!
//! The helpers here validate before they touch anything so that stacks can
//! keep the all-or-nothing rule: a failed set applies nothing, a failed get
//! writes nothing.

use crate::net::error::{NetError, NetResult};

/// Size in bytes of an integer option value
pub const INT_OPTION_LEN: usize = core::mem::size_of::<i32>();

/// First option name free for stack-specific use
pub const STACK_SPECIFIC_BASE: i32 = 0x100;

/// Option namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OptionLevel {
    Stack = 0,
    Socket = 1,
}

/// Standardized option names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StandardOption {
    /// Allow bind to reuse local addresses
    ReuseAddr = 0,
    /// Enable sending of keepalive messages
    KeepAlive = 1,
    /// Idle time before keepalive probes start
    KeepIdle = 2,
    /// Interval between keepalive probes
    KeepIntvl = 3,
    /// Keep close from returning until queues are empty
    Linger = 4,
    /// Send buffer size
    SndBuf = 5,
    /// Receive buffer size
    RcvBuf = 6,
    /// Allow sending to broadcast addresses
    Broadcast = 7,
}

impl StandardOption {
    pub const fn name(self) -> i32 {
        self as i32
    }

    pub fn from_name(name: i32) -> Option<Self> {
        match name {
            0 => Some(StandardOption::ReuseAddr),
            1 => Some(StandardOption::KeepAlive),
            2 => Some(StandardOption::KeepIdle),
            3 => Some(StandardOption::KeepIntvl),
            4 => Some(StandardOption::Linger),
            5 => Some(StandardOption::SndBuf),
            6 => Some(StandardOption::RcvBuf),
            7 => Some(StandardOption::Broadcast),
            _ => None,
        }
    }

    /// Whether the value is an on/off flag
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            StandardOption::ReuseAddr | StandardOption::KeepAlive | StandardOption::Broadcast
        )
    }
}

/// Full identity of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionId {
    pub level: OptionLevel,
    pub name: i32,
}

impl OptionId {
    pub const fn new(level: OptionLevel, name: i32) -> Self {
        Self { level, name }
    }

    pub const fn socket(option: StandardOption) -> Self {
        Self::new(OptionLevel::Socket, option as i32)
    }

    pub const fn stack(option: StandardOption) -> Self {
        Self::new(OptionLevel::Stack, option as i32)
    }

    pub fn standard(&self) -> Option<StandardOption> {
        StandardOption::from_name(self.name)
    }
}

/// Decode an integer option value
///
/// The buffer length must match exactly.
pub fn decode_int(optval: &[u8]) -> NetResult<i32> {
    let bytes: [u8; INT_OPTION_LEN] = optval.try_into().map_err(|_| NetError::Parameter)?;
    Ok(i32::from_ne_bytes(bytes))
}

/// Decode an on/off option value, any non-zero integer is on
pub fn decode_flag(optval: &[u8]) -> NetResult<bool> {
    decode_int(optval).map(|v| v != 0)
}

/// Decode an integer option that must not be negative
pub fn decode_non_negative(optval: &[u8]) -> NetResult<u32> {
    let value = decode_int(optval)?;
    u32::try_from(value).map_err(|_| NetError::Parameter)
}

/// Encode an integer into the caller's option buffer
///
/// Returns the number of bytes written. A buffer too small for the value is
/// left untouched.
pub fn encode_int(value: i32, optval: &mut [u8]) -> NetResult<usize> {
    let dst = optval
        .get_mut(..INT_OPTION_LEN)
        .ok_or(NetError::Parameter)?;
    dst.copy_from_slice(&value.to_ne_bytes());
    Ok(INT_OPTION_LEN)
}

pub fn encode_flag(value: bool, optval: &mut [u8]) -> NetResult<usize> {
    encode_int(value as i32, optval)
}

/// Convenience for callers: the byte form of an integer option value
pub fn int_value(value: i32) -> [u8; INT_OPTION_LEN] {
    value.to_ne_bytes()
}
