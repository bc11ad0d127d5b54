//! Network stack interface
//!
//! [`NetworkStack`] is the operation table every concrete stack (TCP/IP, cellular
//! modem, radio stack, loopback) implements. [`StackHandle`] is the per-instance
//! context the socket layer holds: it forwards each call to the table, fills in
//! the generic behavior a stack may leave out (literal address parsing, DNS over
//! UDP, the DNS server list) and logs failures.
//!
//! Every operation is non-blocking. Operations a stack does not provide keep
//! their default body, which returns [`NetError::Unsupported`].

use core::fmt;

use log::{debug, trace, warn};
use spin::Mutex;

use conquer_once::spin::OnceCell;

use crate::net::addr::{IpAddress, IpVersion};
use crate::net::clock::Clock;
use crate::net::dns::{self, DnsConfig};
use crate::net::error::{NetError, NetResult};
use crate::net::event::SocketNotify;
use crate::net::options::OptionLevel;
use crate::net::socket::SocketHandle;
use crate::net::types::Protocol;

/// Number of DNS servers a handle can remember
pub const DNS_SERVERS_MAX: usize = 4;

/// Network stack operation table
///
/// Implementations serialize their own internal state; every method takes
/// `&self` and may be called from any context that is allowed to do I/O.
/// Two calls on the same socket must not be issued concurrently.
pub trait NetworkStack: Send + Sync {
    /// Name of the stack, used in logs
    fn name(&self) -> &str {
        "stack"
    }

    /// Get the local IP address
    ///
    /// # Returns
    /// The local address, or [`IpAddress::UNSPECIFIED`] if not connected to a
    /// network
    fn get_ip_address(&self) -> IpAddress;

    /// Translate a domain name to an address with the stack's own resolver
    ///
    /// Literal addresses never reach this method. A stack without a resolver
    /// keeps the default, and resolution falls back to DNS over a UDP socket
    /// of this stack.
    ///
    /// # Arguments
    /// * `host` - Domain name to resolve
    /// * `version` - Requested address family, `Unspecified` for any
    fn gethostbyname(&self, host: &str, version: IpVersion) -> NetResult<IpAddress> {
        let _ = (host, version);
        Err(NetError::Unsupported)
    }

    /// Add a server to the stack's own resolver
    fn add_dns_server(&self, address: IpAddress) -> NetResult<()> {
        let _ = address;
        Err(NetError::Unsupported)
    }

    /// Set a stack option
    ///
    /// Unknown options fail with `Unsupported`, values of the wrong size with
    /// `Parameter`. A failure leaves the stack unmodified.
    fn setstackopt(&self, level: OptionLevel, name: i32, optval: &[u8]) -> NetResult<()> {
        let _ = (level, name, optval);
        Err(NetError::Unsupported)
    }

    /// Read a stack option into `optval`
    ///
    /// # Returns
    /// * `Ok(len)` - Number of bytes written
    /// * `Err(_)` - Nothing was written
    fn getstackopt(&self, level: OptionLevel, name: i32, optval: &mut [u8]) -> NetResult<usize> {
        let _ = (level, name, optval);
        Err(NetError::Unsupported)
    }

    /// Open a socket
    ///
    /// # Returns
    /// * `Ok(handle)` - Handle for following calls on the socket
    /// * `Err(NetError::NoSocket)` - The socket pool is exhausted
    fn socket_open(&self, proto: Protocol) -> NetResult<SocketHandle>;

    /// Close a socket, dropping any connection and invalidating the handle
    ///
    /// Safe to call while asynchronous work on the socket is still pending.
    fn socket_close(&self, socket: SocketHandle) -> NetResult<()>;

    /// Bind a local address and port
    ///
    /// An unspecified or all-zero address binds the port only; port 0 picks an
    /// ephemeral port.
    fn socket_bind(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        let _ = (socket, address, port);
        Err(NetError::Unsupported)
    }

    /// Mark a bound TCP socket as passive
    ///
    /// # Arguments
    /// * `backlog` - Number of pending connections that can be queued
    fn socket_listen(&self, socket: SocketHandle, backlog: usize) -> NetResult<()> {
        let _ = (socket, backlog);
        Err(NetError::Unsupported)
    }

    /// Connect a TCP socket to a remote host
    ///
    /// A stack whose handshake completes later may return `WouldBlock`; the
    /// caller retries the call until it succeeds or fails otherwise.
    fn socket_connect(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        let _ = (socket, address, port);
        Err(NetError::Unsupported)
    }

    /// Accept a pending connection on a listening socket
    ///
    /// # Returns
    /// * `Ok((socket, address, port))` - New connected socket and its peer
    /// * `Err(NetError::WouldBlock)` - No connection is queued
    fn socket_accept(&self, server: SocketHandle) -> NetResult<(SocketHandle, IpAddress, u16)> {
        let _ = server;
        Err(NetError::Unsupported)
    }

    /// Send on a connected TCP socket
    ///
    /// # Returns
    /// * `Ok(n)` - Bytes taken from `data`, possibly fewer than offered
    /// * `Err(NetError::WouldBlock)` - No buffer space right now
    fn socket_send(&self, socket: SocketHandle, data: &[u8]) -> NetResult<usize> {
        let _ = (socket, data);
        Err(NetError::Unsupported)
    }

    /// Receive from a connected TCP socket
    ///
    /// # Returns
    /// * `Ok(0)` - The peer closed the connection
    /// * `Ok(n)` - Bytes written into `data`
    /// * `Err(NetError::WouldBlock)` - No data available
    fn socket_recv(&self, socket: SocketHandle, data: &mut [u8]) -> NetResult<usize> {
        let _ = (socket, data);
        Err(NetError::Unsupported)
    }

    /// Send a UDP datagram
    ///
    /// # Returns
    /// * `Ok(n)` - Bytes sent
    /// * `Err(NetError::WouldBlock)` - The datagram cannot be queued right now
    fn socket_sendto(
        &self,
        socket: SocketHandle,
        address: IpAddress,
        port: u16,
        data: &[u8],
    ) -> NetResult<usize> {
        let _ = (socket, address, port, data);
        Err(NetError::Unsupported)
    }

    /// Receive a UDP datagram
    ///
    /// # Returns
    /// * `Ok((n, address, port))` - Bytes written into `data` and the sender
    /// * `Err(NetError::WouldBlock)` - No datagram available
    fn socket_recvfrom(
        &self,
        socket: SocketHandle,
        data: &mut [u8],
    ) -> NetResult<(usize, IpAddress, u16)> {
        let _ = (socket, data);
        Err(NetError::Unsupported)
    }

    /// Register the readiness callback of a socket
    ///
    /// Replaces any previous registration; `None` detaches. The callback may
    /// run in interrupt context and may fire without a state change.
    fn socket_attach(
        &self,
        socket: SocketHandle,
        callback: Option<&'static dyn SocketNotify>,
    ) -> NetResult<()> {
        let _ = (socket, callback);
        Err(NetError::Unsupported)
    }

    /// Set a socket option
    ///
    /// Same failure rules as [`NetworkStack::setstackopt`].
    fn setsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &[u8],
    ) -> NetResult<()> {
        let _ = (socket, level, name, optval);
        Err(NetError::Unsupported)
    }

    /// Read a socket option into `optval`
    fn getsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &mut [u8],
    ) -> NetResult<usize> {
        let _ = (socket, level, name, optval);
        Err(NetError::Unsupported)
    }
}

/// Configuration of the generic layer of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackConfig {
    pub dns: DnsConfig,
}

impl StackConfig {
    pub fn new(dns: DnsConfig) -> Self {
        Self { dns }
    }
}

/// Append-only list of resolver servers
#[derive(Debug, Clone, Copy)]
pub struct DnsServerList {
    servers: [IpAddress; DNS_SERVERS_MAX],
    len: usize,
}

impl DnsServerList {
    pub const fn new() -> Self {
        Self {
            servers: [IpAddress::UNSPECIFIED; DNS_SERVERS_MAX],
            len: 0,
        }
    }

    /// Append a server, already known servers are accepted without change
    pub fn push(&mut self, address: IpAddress) -> NetResult<()> {
        if self.as_slice().contains(&address) {
            return Ok(());
        }
        let slot = self.servers.get_mut(self.len).ok_or(NetError::NoMemory)?;
        *slot = address;
        self.len += 1;
        Ok(())
    }

    /// Whether `push` of `address` would succeed
    pub fn has_room_for(&self, address: IpAddress) -> bool {
        self.len < DNS_SERVERS_MAX || self.as_slice().contains(&address)
    }

    pub fn as_slice(&self) -> &[IpAddress] {
        &self.servers[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for DnsServerList {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping the generic layer keeps per handle
struct StackScratch {
    dns_servers: DnsServerList,
    next_query_id: u16,
}

/// Per-instance context of a concrete stack
///
/// Built once at system init and kept for the lifetime of the stack; it is a
/// handle and is never duplicated.
pub struct StackHandle<'a> {
    api: &'a dyn NetworkStack,
    config: StackConfig,
    clock: Option<&'a dyn Clock>,
    scratch: Mutex<StackScratch>,
}

impl<'a> StackHandle<'a> {
    pub fn new(api: &'a dyn NetworkStack) -> Self {
        Self::with_config(api, StackConfig::default())
    }

    pub fn with_config(api: &'a dyn NetworkStack, config: StackConfig) -> Self {
        debug!("netsock: handle created for {}", api.name());
        Self {
            api,
            config,
            clock: None,
            scratch: Mutex::new(StackScratch {
                dns_servers: DnsServerList::new(),
                next_query_id: 1,
            }),
        }
    }

    /// Time source of the DNS fallback, which is unavailable without one
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The operation table this handle was built with
    pub fn api(&self) -> &'a dyn NetworkStack {
        self.api
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn clock(&self) -> Option<&'a dyn Clock> {
        self.clock
    }

    /// Snapshot of the servers added through [`StackHandle::add_dns_server`]
    pub fn dns_servers(&self) -> DnsServerList {
        self.scratch.lock().dns_servers
    }

    pub(crate) fn next_query_id(&self) -> u16 {
        let mut scratch = self.scratch.lock();
        let id = scratch.next_query_id;
        scratch.next_query_id = scratch.next_query_id.wrapping_add(1).max(1);
        id
    }

    pub fn get_ip_address(&self) -> IpAddress {
        self.api.get_ip_address()
    }

    /// Translate a hostname to an address
    ///
    /// A literal address is returned without any network traffic, provided it
    /// matches `version`. Names go to the stack's resolver, or to DNS over a
    /// UDP socket of this stack when the stack has none.
    pub fn gethostbyname(&self, host: &str, version: IpVersion) -> NetResult<IpAddress> {
        if let Some(literal) = literal_host(host, version)? {
            return Ok(literal);
        }
        let result = match self.api.gethostbyname(host, version) {
            Err(NetError::Unsupported) => dns::query(self, host, version),
            other => other,
        };
        self.traced("gethostbyname", None, result)
    }

    /// Like [`StackHandle::gethostbyname`] but yields between polls of the
    /// DNS socket instead of spinning
    pub async fn gethostbyname_async(&self, host: &str, version: IpVersion) -> NetResult<IpAddress> {
        if let Some(literal) = literal_host(host, version)? {
            return Ok(literal);
        }
        let result = match self.api.gethostbyname(host, version) {
            Err(NetError::Unsupported) => dns::query_async(self, host, version).await,
            other => other,
        };
        self.traced("gethostbyname", None, result)
    }

    /// Append a server to the list consulted by name resolution
    ///
    /// A stack with its own resolver is handed the server too. The list of
    /// the handle holds every server that was added successfully.
    pub fn add_dns_server(&self, address: IpAddress) -> NetResult<()> {
        if !address.is_routable_destination() {
            return Err(NetError::Parameter);
        }
        if !self.scratch.lock().dns_servers.has_room_for(address) {
            return self.traced("add_dns_server", None, Err(NetError::NoMemory));
        }
        let result = match self.api.add_dns_server(address) {
            Ok(()) | Err(NetError::Unsupported) => self.scratch.lock().dns_servers.push(address),
            Err(e) => Err(e),
        };
        self.traced("add_dns_server", None, result)
    }

    pub fn setstackopt(&self, level: OptionLevel, name: i32, optval: &[u8]) -> NetResult<()> {
        let result = self.api.setstackopt(level, name, optval);
        self.traced("setstackopt", None, result)
    }

    pub fn getstackopt(&self, level: OptionLevel, name: i32, optval: &mut [u8]) -> NetResult<usize> {
        let result = self.api.getstackopt(level, name, optval);
        self.traced("getstackopt", None, result)
    }

    pub fn socket_open(&self, proto: Protocol) -> NetResult<SocketHandle> {
        let result = self.api.socket_open(proto);
        if let Ok(socket) = result {
            trace!("netsock: {} opened {} socket {}", self.api.name(), proto, socket);
        }
        self.traced("socket_open", None, result)
    }

    pub fn socket_close(&self, socket: SocketHandle) -> NetResult<()> {
        trace!("netsock: {} closing {}", self.api.name(), socket);
        let result = self.api.socket_close(socket);
        self.traced("socket_close", Some(socket), result)
    }

    pub fn socket_bind(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        let result = self.api.socket_bind(socket, address, port);
        self.traced("socket_bind", Some(socket), result)
    }

    pub fn socket_listen(&self, socket: SocketHandle, backlog: usize) -> NetResult<()> {
        let result = self.api.socket_listen(socket, backlog);
        self.traced("socket_listen", Some(socket), result)
    }

    pub fn socket_connect(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        let result = check_destination(address, port)
            .and_then(|()| self.api.socket_connect(socket, address, port));
        self.traced("socket_connect", Some(socket), result)
    }

    pub fn socket_accept(&self, server: SocketHandle) -> NetResult<(SocketHandle, IpAddress, u16)> {
        let result = self.api.socket_accept(server);
        self.traced("socket_accept", Some(server), result)
    }

    pub fn socket_send(&self, socket: SocketHandle, data: &[u8]) -> NetResult<usize> {
        let result = self.api.socket_send(socket, data);
        self.traced("socket_send", Some(socket), result)
    }

    pub fn socket_recv(&self, socket: SocketHandle, data: &mut [u8]) -> NetResult<usize> {
        let result = self.api.socket_recv(socket, data);
        self.traced("socket_recv", Some(socket), result)
    }

    pub fn socket_sendto(
        &self,
        socket: SocketHandle,
        address: IpAddress,
        port: u16,
        data: &[u8],
    ) -> NetResult<usize> {
        let result = check_destination(address, port)
            .and_then(|()| self.api.socket_sendto(socket, address, port, data));
        self.traced("socket_sendto", Some(socket), result)
    }

    pub fn socket_recvfrom(
        &self,
        socket: SocketHandle,
        data: &mut [u8],
    ) -> NetResult<(usize, IpAddress, u16)> {
        let result = self.api.socket_recvfrom(socket, data);
        self.traced("socket_recvfrom", Some(socket), result)
    }

    pub fn socket_attach(
        &self,
        socket: SocketHandle,
        callback: Option<&'static dyn SocketNotify>,
    ) -> NetResult<()> {
        let result = self.api.socket_attach(socket, callback);
        self.traced("socket_attach", Some(socket), result)
    }

    pub fn setsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &[u8],
    ) -> NetResult<()> {
        let result = self.api.setsockopt(socket, level, name, optval);
        self.traced("setsockopt", Some(socket), result)
    }

    pub fn getsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &mut [u8],
    ) -> NetResult<usize> {
        let result = self.api.getsockopt(socket, level, name, optval);
        self.traced("getsockopt", Some(socket), result)
    }

    /// Log a failed operation; `WouldBlock` is the normal polling result and
    /// is not logged
    fn traced<T>(&self, op: &str, socket: Option<SocketHandle>, result: NetResult<T>) -> NetResult<T> {
        if let Err(err) = &result {
            let name = self.api.name();
            match (err, socket) {
                (NetError::WouldBlock, _) => {}
                (NetError::DeviceError, Some(s)) => warn!("netsock: {} {} on {}: {}", name, op, s, err),
                (NetError::DeviceError, None) => warn!("netsock: {} {}: {}", name, op, err),
                (_, Some(s)) => debug!("netsock: {} {} on {}: {}", name, op, s, err),
                (_, None) => debug!("netsock: {} {}: {}", name, op, err),
            }
        }
        result
    }
}

impl fmt::Debug for StackHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StackHandle")
            .field("stack", &self.api.name())
            .field("config", &self.config)
            .field("clock", &self.clock.is_some())
            .finish()
    }
}

/// Resolve `host` locally if it is a literal address
fn literal_host(host: &str, version: IpVersion) -> NetResult<Option<IpAddress>> {
    if host.is_empty() {
        return Err(NetError::Parameter);
    }
    match host.parse::<IpAddress>() {
        Ok(literal) if literal.matches_version(version) => Ok(Some(literal)),
        Ok(_) => Err(NetError::Parameter),
        Err(_) => Ok(None),
    }
}

fn check_destination(address: IpAddress, port: u16) -> NetResult<()> {
    if !address.is_routable_destination() || port == 0 {
        return Err(NetError::Parameter);
    }
    Ok(())
}

/// Handle of the stack applications use when they do not pick one
static DEFAULT_STACK: OnceCell<&'static StackHandle<'static>> = OnceCell::uninit();

/// Register the system's default stack
///
/// Can only be done once; later calls fail with `Parameter`.
pub fn register_default_stack(handle: &'static StackHandle<'static>) -> NetResult<()> {
    DEFAULT_STACK
        .try_init_once(|| handle)
        .map_err(|_| NetError::Parameter)?;
    debug!("netsock: default stack is {}", handle.api().name());
    Ok(())
}

/// The registered default stack, if any
pub fn default_stack() -> Option<&'static StackHandle<'static>> {
    DEFAULT_STACK.try_get().ok().copied()
}
