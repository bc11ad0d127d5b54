//! DNS (Domain Name System) Client Implementation
//!
//! Resolution used by [`StackHandle::gethostbyname`] when the concrete stack has
//! no resolver of its own. Queries go out over a UDP socket opened on that same
//! stack, to the servers added with `add_dns_server` (or the configured default
//! server), one server after the other. Each exchange is bounded by a
//! timeout measured on the [`Clock`] of the handle.
//!
//! Everything works on fixed 512-byte buffers; nothing is allocated.
//!
//! # RFC References
//! - RFC 1035: Domain Names - Implementation and Specification
//! - RFC 3596: DNS Extensions to Support IP Version 6

use core::fmt;
use core::task::Poll;

use log::{debug, trace, warn};

use crate::net::addr::{IpAddress, IpVersion};
use crate::net::clock::Clock;
use crate::net::error::{NetError, NetResult};
use crate::net::socket::SocketHandle;
use crate::net::stack::{DnsServerList, StackHandle};
use crate::net::types::Protocol;
use crate::task::yield_now;

/// Well-known DNS port
pub const DNS_PORT: u16 = 53;

/// Largest DNS message carried over UDP
pub const DNS_MAX_PACKET: usize = 512;

const DNS_HEADER_LEN: usize = 12;
const MAX_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;
const MAX_POINTER_JUMPS: usize = 5;

const RECORD_A: u16 = 1;
const RECORD_AAAA: u16 = 28;
const CLASS_IN: u16 = 1;

/// DNS fallback settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsConfig {
    /// Destination port of queries
    pub port: u16,
    /// Milliseconds to wait for a reply before an exchange is considered lost
    pub timeout_ms: u32,
    /// Exchanges per server before moving to the next one
    pub attempts: u8,
    /// Server used when none has been added
    pub default_server: IpAddress,
}

impl DnsConfig {
    pub fn new(port: u16, timeout_ms: u32, attempts: u8, default_server: IpAddress) -> Self {
        Self {
            port,
            timeout_ms,
            attempts,
            default_server,
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            port: DNS_PORT,
            timeout_ms: 5000,
            attempts: 2,
            default_server: IpAddress::v4([8, 8, 8, 8]),
        }
    }
}

/// DNS error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    /// Invalid domain name format
    InvalidDomain,
    /// DNS query timed out
    Timeout,
    /// Failed to send DNS query
    SendFailed,
    /// Failed to parse DNS response
    ParseError,
    /// Response belongs to another query
    UnexpectedId,
    /// No matching records found in response
    NoRecords,
    /// Server returned error
    ServerError,
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DnsError::InvalidDomain => write!(f, "Invalid domain name"),
            DnsError::Timeout => write!(f, "DNS query timed out"),
            DnsError::SendFailed => write!(f, "Failed to send DNS query"),
            DnsError::ParseError => write!(f, "Failed to parse DNS response"),
            DnsError::UnexpectedId => write!(f, "Response to another query"),
            DnsError::NoRecords => write!(f, "No matching records found"),
            DnsError::ServerError => write!(f, "DNS server returned error"),
        }
    }
}

impl From<DnsError> for NetError {
    fn from(err: DnsError) -> Self {
        match err {
            DnsError::InvalidDomain => NetError::Parameter,
            _ => NetError::DnsFailure,
        }
    }
}

/// DNS header structure (12 bytes)
#[derive(Debug, Clone, Copy)]
struct DnsHeader {
    id: u16,      // Transaction ID
    flags: u16,   // Flags (QR, Opcode, AA, TC, RD, RA, Z, RCODE)
    qdcount: u16, // Number of questions
    ancount: u16, // Number of answers
    nscount: u16, // Number of authority records
    arcount: u16, // Number of additional records
}

impl DnsHeader {
    /// Create a new DNS query header
    fn new_query(id: u16) -> Self {
        Self {
            id,
            flags: 0x0100, // Standard query with recursion desired (RD=1)
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    fn from_bytes(data: &[u8]) -> Result<Self, DnsError> {
        if data.len() < DNS_HEADER_LEN {
            return Err(DnsError::ParseError);
        }

        Ok(Self {
            id: u16::from_be_bytes([data[0], data[1]]),
            flags: u16::from_be_bytes([data[2], data[3]]),
            qdcount: u16::from_be_bytes([data[4], data[5]]),
            ancount: u16::from_be_bytes([data[6], data[7]]),
            nscount: u16::from_be_bytes([data[8], data[9]]),
            arcount: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    fn to_bytes(&self) -> [u8; DNS_HEADER_LEN] {
        let mut bytes = [0u8; DNS_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.flags.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.qdcount.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.nscount.to_be_bytes());
        bytes[10..12].copy_from_slice(&self.arcount.to_be_bytes());
        bytes
    }

    /// QR bit set
    fn is_response(&self) -> bool {
        (self.flags & 0x8000) != 0
    }

    fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }

    fn is_success(&self) -> bool {
        self.rcode() == 0
    }
}

/// Encode domain name in DNS format
/// Example: "google.com" -> [6]google[3]com[0]
fn encode_domain_name(domain: &str, out: &mut [u8]) -> Result<usize, DnsError> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() || domain.len() + 2 > MAX_NAME_LEN.min(out.len()) {
        return Err(DnsError::InvalidDomain);
    }

    let mut pos = 0;
    for label in domain.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(DnsError::InvalidDomain);
        }
        out[pos] = label.len() as u8;
        out[pos + 1..pos + 1 + label.len()].copy_from_slice(label.as_bytes());
        pos += 1 + label.len();
    }

    // Terminate with zero-length label
    out[pos] = 0;
    Ok(pos + 1)
}

/// Build a DNS query packet, returns its length
fn build_query(
    domain: &str,
    id: u16,
    qtype: u16,
    out: &mut [u8; DNS_MAX_PACKET],
) -> Result<usize, DnsError> {
    out[..DNS_HEADER_LEN].copy_from_slice(&DnsHeader::new_query(id).to_bytes());
    let mut pos = DNS_HEADER_LEN;
    pos += encode_domain_name(domain, &mut out[pos..])?;
    out[pos..pos + 2].copy_from_slice(&qtype.to_be_bytes());
    out[pos + 2..pos + 4].copy_from_slice(&CLASS_IN.to_be_bytes());
    Ok(pos + 4)
}

/// Skip an encoded domain name (supports compression)
fn skip_domain_name(data: &[u8], offset: &mut usize) -> Result<(), DnsError> {
    let mut cursor = *offset;
    let mut jumped = false;
    let mut jumps = 0;

    loop {
        let length = *data.get(cursor).ok_or(DnsError::ParseError)?;

        // Compression pointer (top 2 bits set)
        if (length & 0xC0) == 0xC0 {
            let low = *data.get(cursor + 1).ok_or(DnsError::ParseError)?;
            if !jumped {
                *offset = cursor + 2;
            }
            cursor = u16::from_be_bytes([length & 0x3F, low]) as usize;
            jumped = true;
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(DnsError::ParseError);
            }
            continue;
        }

        if length == 0 {
            if !jumped {
                *offset = cursor + 1;
            }
            return Ok(());
        }

        cursor += 1 + length as usize;
        if cursor > data.len() {
            return Err(DnsError::ParseError);
        }
    }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, DnsError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DnsError::ParseError)
}

/// Parse a DNS response and extract the first record of type `qtype`
fn parse_response(data: &[u8], id: u16, qtype: u16) -> Result<IpAddress, DnsError> {
    let header = DnsHeader::from_bytes(data)?;

    if !header.is_response() {
        return Err(DnsError::ParseError);
    }
    if header.id != id {
        return Err(DnsError::UnexpectedId);
    }
    if !header.is_success() {
        return Err(DnsError::ServerError);
    }

    let mut offset = DNS_HEADER_LEN;

    // Skip questions
    for _ in 0..header.qdcount {
        skip_domain_name(data, &mut offset)?;
        // QTYPE and QCLASS
        if offset + 4 > data.len() {
            return Err(DnsError::ParseError);
        }
        offset += 4;
    }

    for _ in 0..header.ancount {
        skip_domain_name(data, &mut offset)?;

        let rtype = read_u16(data, offset)?;
        let rclass = read_u16(data, offset + 2)?;
        // TTL (4 bytes) is not used
        let rdlength = read_u16(data, offset + 8)? as usize;
        offset += 10;

        let rdata = data
            .get(offset..offset + rdlength)
            .ok_or(DnsError::ParseError)?;
        offset += rdlength;

        if rtype != qtype || rclass != CLASS_IN {
            // CNAME and friends
            continue;
        }
        let version = match rtype {
            RECORD_A => IpVersion::V4,
            _ => IpVersion::V6,
        };
        if let Ok(address) = IpAddress::from_bytes(version, rdata) {
            return Ok(address);
        }
    }

    Err(DnsError::NoRecords)
}

/// Record types to ask for, in order
fn query_types(version: IpVersion) -> &'static [u16] {
    match version {
        IpVersion::V4 => &[RECORD_A],
        IpVersion::V6 => &[RECORD_AAAA],
        IpVersion::Unspecified => &[RECORD_A, RECORD_AAAA],
    }
}

/// One name resolution in progress
///
/// Each call to [`Resolver::poll`] does at most one send or one receive on the
/// socket, so driving it never blocks. The socket is closed on drop, which
/// also covers an abandoned async resolution.
struct Resolver<'s, 'a> {
    stack: &'s StackHandle<'a>,
    clock: &'a dyn Clock,
    socket: SocketHandle,
    host: &'s str,
    servers: DnsServerList,
    server: usize,
    attempt: u8,
    qtypes: &'static [u16],
    qtype: usize,
    id: u16,
    sent: bool,
    /// Clock reading at which the current exchange is lost
    deadline: u64,
}

impl<'s, 'a> Resolver<'s, 'a> {
    fn new(stack: &'s StackHandle<'a>, host: &'s str, version: IpVersion) -> NetResult<Self> {
        // reject bad names before touching the stack
        let mut scratch = [0u8; DNS_MAX_PACKET];
        encode_domain_name(host, &mut scratch)?;

        let Some(clock) = stack.clock() else {
            warn!("dns: no clock on the handle, cannot resolve {}", host);
            return Err(NetError::Unsupported);
        };

        let mut servers = stack.dns_servers();
        if servers.is_empty() {
            servers.push(stack.config().dns.default_server)?;
        }

        let socket = stack.socket_open(Protocol::Udp)?;
        match stack.socket_bind(socket, IpAddress::UNSPECIFIED, 0) {
            Ok(()) | Err(NetError::Unsupported) => {}
            Err(e) => {
                let _ = stack.socket_close(socket);
                return Err(e);
            }
        }

        let mut resolver = Self {
            stack,
            clock,
            socket,
            host,
            servers,
            server: 0,
            attempt: 0,
            qtypes: query_types(version),
            qtype: 0,
            id: 0,
            sent: false,
            deadline: 0,
        };
        resolver.restart_exchange();
        Ok(resolver)
    }

    fn current_server(&self) -> IpAddress {
        self.servers.as_slice()[self.server]
    }

    fn restart_exchange(&mut self) {
        self.sent = false;
        let timeout = u64::from(self.stack.config().dns.timeout_ms);
        self.deadline = self.clock.now_ms().saturating_add(timeout);
    }

    /// Move on after a lost or failed exchange; false when nothing is left
    fn next_attempt(&mut self, reason: DnsError) -> bool {
        trace!("dns: {} via {}: {}", self.host, self.current_server(), reason);
        self.qtype = 0;
        self.attempt += 1;
        if self.attempt >= self.stack.config().dns.attempts.max(1) {
            self.attempt = 0;
            self.server += 1;
        }
        self.restart_exchange();
        self.server < self.servers.len()
    }

    fn poll(&mut self) -> Poll<NetResult<IpAddress>> {
        let config = self.stack.config().dns;

        if !self.sent {
            let mut query = [0u8; DNS_MAX_PACKET];
            self.id = self.stack.next_query_id();
            let len = build_query(self.host, self.id, self.qtypes[self.qtype], &mut query)?;

            match self
                .stack
                .socket_sendto(self.socket, self.current_server(), config.port, &query[..len])
            {
                Ok(_) => self.sent = true,
                Err(NetError::WouldBlock) => return self.wait(),
                Err(_) => return self.fail_exchange(DnsError::SendFailed),
            }
        }

        let mut response = [0u8; DNS_MAX_PACKET];
        let (len, from, port) = match self.stack.socket_recvfrom(self.socket, &mut response) {
            Ok(received) => received,
            Err(NetError::WouldBlock) => return self.wait(),
            Err(NetError::NoSocket) => return Poll::Ready(Err(NetError::DnsFailure)),
            Err(_) => return self.fail_exchange(DnsError::ParseError),
        };

        if from != self.current_server() || port != config.port {
            // stray datagram
            return self.wait();
        }

        match parse_response(&response[..len], self.id, self.qtypes[self.qtype]) {
            Ok(address) => {
                debug!("dns: {} resolved to {}", self.host, address);
                Poll::Ready(Ok(address))
            }
            Err(DnsError::UnexpectedId) => self.wait(),
            Err(DnsError::NoRecords) if self.qtype + 1 < self.qtypes.len() => {
                self.qtype += 1;
                self.restart_exchange();
                Poll::Pending
            }
            Err(DnsError::NoRecords) => {
                debug!("dns: no records for {}", self.host);
                Poll::Ready(Err(NetError::DnsFailure))
            }
            Err(e) => self.fail_exchange(e),
        }
    }

    /// Nothing to do until the socket moves, unless the exchange timed out
    fn wait(&mut self) -> Poll<NetResult<IpAddress>> {
        if self.clock.now_ms() >= self.deadline {
            return self.fail_exchange(DnsError::Timeout);
        }
        Poll::Pending
    }

    fn fail_exchange(&mut self, reason: DnsError) -> Poll<NetResult<IpAddress>> {
        if self.next_attempt(reason) {
            Poll::Pending
        } else {
            debug!("dns: giving up on {}: {}", self.host, reason);
            Poll::Ready(Err(reason.into()))
        }
    }
}

impl Drop for Resolver<'_, '_> {
    fn drop(&mut self) {
        let _ = self.stack.socket_close(self.socket);
    }
}

/// Resolve `host` over DNS, spinning between non-blocking polls
///
/// Bounded by the exchange timeout, the attempts per server and the number
/// of servers.
pub(crate) fn query(stack: &StackHandle<'_>, host: &str, version: IpVersion) -> NetResult<IpAddress> {
    let mut resolver = Resolver::new(stack, host, version)?;
    loop {
        match resolver.poll() {
            Poll::Ready(result) => return result,
            Poll::Pending => core::hint::spin_loop(),
        }
    }
}

/// Resolve `host` over DNS, yielding to the executor between polls
pub(crate) async fn query_async(
    stack: &StackHandle<'_>,
    host: &str,
    version: IpVersion,
) -> NetResult<IpAddress> {
    let mut resolver = Resolver::new(stack, host, version)?;
    loop {
        match resolver.poll() {
            Poll::Ready(result) => return result,
            Poll::Pending => yield_now().await,
        }
    }
}
