//! Loopback Network Stack (127.0.0.1)
//!
//! A complete in-memory [`NetworkStack`]: sockets talk to each other through
//! fixed buffers without any hardware. UDP datagrams to a local address are
//! delivered to the bound socket, TCP connections to a local listener are
//! queued on its backlog and accepted like on a real stack.
//!
//! Datagrams to any other address count as transmitted and are dropped, so
//! code that sends to the network can run unchanged against this stack.
//! Stream connections only exist between local sockets.

use log::{debug, trace};
use spin::Mutex;

use crate::net::addr::{IpAddress, IpVersion};
use crate::net::buffer::{ByteRing, DatagramQueue};
use crate::net::error::{NetError, NetResult};
use crate::net::event::SocketNotify;
use crate::net::options::{
    decode_flag, decode_int, decode_non_negative, encode_flag, encode_int, OptionLevel,
    StandardOption,
};
use crate::net::socket::{SocketHandle, SocketPool, SocketState};
use crate::net::stack::NetworkStack;
use crate::net::types::Protocol;

/// Number of sockets the stack can have open, accepted ones included
pub const LOOPBACK_SOCKETS: usize = 8;

/// Storage of a stream socket's receive buffer
pub const STREAM_BUFFER_SIZE: usize = 2048;

/// Datagrams a UDP socket can hold
pub const DATAGRAM_DEPTH: usize = 4;

/// Largest datagram payload
pub const DATAGRAM_SIZE: usize = 512;

/// Largest listen backlog
pub const BACKLOG_MAX: usize = 4;

/// Port range for ephemeral (dynamic) port allocation
pub const EPHEMERAL_PORT_START: u16 = 49152;
pub const EPHEMERAL_PORT_END: u16 = 65535;

const DEFAULT_KEEP_IDLE: u32 = 7200;
const DEFAULT_KEEP_INTVL: u32 = 75;

/// Loopback stack configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// Address reported by `get_ip_address`, unspecified when detached
    pub address: IpAddress,
    /// Default send buffer size of new sockets
    pub snd_buf: usize,
    /// Default receive buffer size of new sockets
    pub rcv_buf: usize,
    /// Datagrams queued per UDP socket, at most [`DATAGRAM_DEPTH`]
    pub datagram_depth: usize,
}

impl LoopbackConfig {
    pub fn new(address: IpAddress) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            address: IpAddress::V4_LOOPBACK,
            snd_buf: STREAM_BUFFER_SIZE,
            rcv_buf: STREAM_BUFFER_SIZE,
            datagram_depth: DATAGRAM_DEPTH,
        }
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    /// Datagrams that left the host
    pub datagrams_sent: u64,
    /// Payload bytes of those datagrams
    pub bytes_sent: u64,
    /// Datagrams queued on a local socket
    pub datagrams_delivered: u64,
    /// Local datagrams nobody could take
    pub datagrams_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    address: IpAddress,
    port: u16,
}

#[derive(Debug, Clone, Copy)]
struct SocketOptions {
    reuse_addr: bool,
    keep_alive: bool,
    keep_idle: u32,
    keep_intvl: u32,
    linger: i32,
    snd_buf: usize,
    rcv_buf: usize,
    broadcast: bool,
}

impl SocketOptions {
    fn new(snd_buf: usize, rcv_buf: usize) -> Self {
        Self {
            reuse_addr: false,
            keep_alive: false,
            keep_idle: DEFAULT_KEEP_IDLE,
            keep_intvl: DEFAULT_KEEP_INTVL,
            linger: -1,
            snd_buf,
            rcv_buf,
            broadcast: false,
        }
    }
}

struct LoopbackSocket {
    proto: Protocol,
    state: SocketState,
    local: Option<Endpoint>,
    remote: Option<Endpoint>,
    /// Other end of a stream connection
    peer: Option<SocketHandle>,
    peer_closed: bool,
    /// Connection dropped without an orderly close
    reset: bool,
    /// Created by a connect, not yet accepted from this listener
    accept_on: Option<SocketHandle>,
    /// Created by a connect rather than opened by the user
    child: bool,
    seq: u32,
    backlog: usize,
    options: SocketOptions,
    notify: Option<&'static dyn SocketNotify>,
    stream: ByteRing<STREAM_BUFFER_SIZE>,
    datagrams: DatagramQueue<DATAGRAM_DEPTH, DATAGRAM_SIZE>,
}

impl LoopbackSocket {
    fn new(proto: Protocol, options: SocketOptions) -> Self {
        let mut stream = ByteRing::new();
        // sizes are validated before they become defaults
        let _ = stream.set_limit(options.rcv_buf);
        Self {
            proto,
            state: SocketState::Open,
            local: None,
            remote: None,
            peer: None,
            peer_closed: false,
            reset: false,
            accept_on: None,
            child: false,
            seq: 0,
            backlog: 0,
            options,
            notify: None,
            stream,
            datagrams: DatagramQueue::new(),
        }
    }

    fn require(&self, proto: Protocol) -> NetResult<()> {
        if self.proto == proto {
            Ok(())
        } else {
            Err(NetError::Unsupported)
        }
    }
}

/// Callbacks to fire once the state lock is released
struct PendingNotify {
    entries: [Option<(&'static dyn SocketNotify, SocketHandle)>; LOOPBACK_SOCKETS],
    len: usize,
}

impl PendingNotify {
    fn new() -> Self {
        Self {
            entries: [None; LOOPBACK_SOCKETS],
            len: 0,
        }
    }

    fn push(&mut self, callback: Option<&'static dyn SocketNotify>, socket: SocketHandle) {
        if let (Some(callback), Some(slot)) = (callback, self.entries.get_mut(self.len)) {
            *slot = Some((callback, socket));
            self.len += 1;
        }
    }

    fn fire(self) {
        for (callback, socket) in self.entries.into_iter().flatten() {
            callback.notify(socket);
        }
    }
}

struct StackState {
    address: IpAddress,
    sockets: SocketPool<LoopbackSocket, LOOPBACK_SOCKETS>,
    defaults: SocketOptions,
    datagram_depth: usize,
    next_ephemeral: u16,
    next_seq: u32,
    stats: LoopbackStats,
}

fn check_buffer_size(size: u32) -> NetResult<usize> {
    match size as usize {
        size @ 1..=STREAM_BUFFER_SIZE => Ok(size),
        _ => Err(NetError::Parameter),
    }
}

impl StackState {
    /// Whether traffic to `address` stays on this host
    fn is_local(&self, address: IpAddress) -> bool {
        address.is_loopback() || (!self.address.is_unspecified() && address == self.address)
    }

    /// Source address used towards `dest` by a socket bound to any address
    fn source_for(&self, dest: IpAddress) -> IpAddress {
        match dest.version() {
            IpVersion::V4 if dest.is_loopback() => IpAddress::V4_LOOPBACK,
            _ if dest.is_loopback() => dest,
            _ => self.address,
        }
    }

    fn port_in_use(&self, proto: Protocol, port: u16, except: Option<SocketHandle>, reuse: bool) -> bool {
        self.sockets.iter().any(|(handle, s)| {
            Some(handle) != except
                && s.proto == proto
                && !s.child
                && s.local.is_some_and(|l| l.port == port)
                && !(reuse && s.options.reuse_addr)
        })
    }

    /// Allocate an ephemeral port
    fn allocate_port(&mut self, proto: Protocol) -> NetResult<u16> {
        let span = EPHEMERAL_PORT_END - EPHEMERAL_PORT_START + 1;
        for _ in 0..span {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == EPHEMERAL_PORT_END {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            };
            if !self.port_in_use(proto, port, None, false) {
                return Ok(port);
            }
        }
        Err(NetError::NoMemory)
    }

    fn bind(&mut self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        let s = self.sockets.get(socket)?;
        if s.local.is_some() || s.state != SocketState::Open {
            return Err(NetError::Parameter);
        }
        if !address.is_any() && !self.is_local(address) {
            return Err(NetError::Parameter);
        }

        let (proto, reuse) = (s.proto, s.options.reuse_addr);
        let port = match port {
            0 => self.allocate_port(proto)?,
            port if self.port_in_use(proto, port, Some(socket), reuse) => {
                return Err(NetError::Parameter);
            }
            port => port,
        };

        let address = if address.is_any() {
            IpAddress::UNSPECIFIED
        } else {
            address
        };
        self.sockets.get_mut(socket)?.local = Some(Endpoint { address, port });
        trace!("loopback: {} bound to {}:{}", socket, address, port);
        Ok(())
    }

    /// Local endpoint of `socket`, binding an ephemeral port first if needed
    fn auto_bind(&mut self, socket: SocketHandle) -> NetResult<Endpoint> {
        let s = self.sockets.get(socket)?;
        if let Some(local) = s.local {
            return Ok(local);
        }
        let proto = s.proto;
        let port = self.allocate_port(proto)?;
        let local = Endpoint {
            address: IpAddress::UNSPECIFIED,
            port,
        };
        self.sockets.get_mut(socket)?.local = Some(local);
        Ok(local)
    }

    fn listen(&mut self, socket: SocketHandle, backlog: usize) -> NetResult<()> {
        let s = self.sockets.get_mut(socket)?;
        s.require(Protocol::Tcp)?;
        if s.local.is_none() || !matches!(s.state, SocketState::Open | SocketState::Listening) {
            return Err(NetError::Parameter);
        }
        s.state = SocketState::Listening;
        s.backlog = backlog.clamp(1, BACKLOG_MAX);
        Ok(())
    }

    fn find_listener(&self, address: IpAddress, port: u16) -> Option<SocketHandle> {
        self.sockets
            .iter()
            .find(|(_, s)| {
                s.state == SocketState::Listening
                    && s.local
                        .is_some_and(|l| l.port == port && (l.address.is_any() || l.address == address))
            })
            .map(|(handle, _)| handle)
    }

    fn pending_connections(&self, listener: SocketHandle) -> usize {
        self.sockets
            .iter()
            .filter(|(_, s)| s.accept_on == Some(listener))
            .count()
    }

    fn connect(
        &mut self,
        socket: SocketHandle,
        address: IpAddress,
        port: u16,
        pending: &mut PendingNotify,
    ) -> NetResult<()> {
        let client = self.sockets.get(socket)?;
        client.require(Protocol::Tcp)?;
        if client.state != SocketState::Open || !address.is_routable_destination() || port == 0 {
            return Err(NetError::Parameter);
        }
        if !self.is_local(address) {
            return Err(NetError::NoConnection);
        }

        let listener = self.find_listener(address, port).ok_or(NetError::NoConnection)?;
        let server = self.sockets.get(listener)?;
        if self.pending_connections(listener) >= server.backlog {
            return Err(NetError::WouldBlock);
        }
        let options = server.options;
        // the accepted end needs a slot, checked before the client is bound
        if self.sockets.is_full() {
            return Err(NetError::NoMemory);
        }

        let local = self.auto_bind(socket)?;
        let client_end = Endpoint {
            address: if local.address.is_any() {
                self.source_for(address)
            } else {
                local.address
            },
            port: local.port,
        };
        let server_end = Endpoint { address, port };

        let mut child = LoopbackSocket::new(Protocol::Tcp, options);
        child.state = SocketState::Connected;
        child.local = Some(server_end);
        child.remote = Some(client_end);
        child.peer = Some(socket);
        child.accept_on = Some(listener);
        child.child = true;
        child.seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let child = self.sockets.insert(child).map_err(|_| NetError::NoMemory)?;

        let client = self.sockets.get_mut(socket)?;
        client.state = SocketState::Connected;
        client.remote = Some(server_end);
        client.peer = Some(child);
        pending.push(client.notify, socket);
        pending.push(self.sockets.get(listener)?.notify, listener);

        trace!("loopback: {} connected to {}:{}", socket, address, port);
        Ok(())
    }

    fn accept(&mut self, server: SocketHandle) -> NetResult<(SocketHandle, IpAddress, u16)> {
        let listener = self.sockets.get(server)?;
        listener.require(Protocol::Tcp)?;
        if listener.state != SocketState::Listening {
            return Err(NetError::Parameter);
        }

        let (child, _) = self
            .sockets
            .iter()
            .filter(|(_, s)| s.accept_on == Some(server))
            .min_by_key(|(_, s)| s.seq)
            .ok_or(NetError::WouldBlock)?;

        let s = self.sockets.get_mut(child)?;
        s.accept_on = None;
        let remote = s.remote.ok_or(NetError::NoConnection)?;
        Ok((child, remote.address, remote.port))
    }

    fn peer_gone(&mut self, peer: SocketHandle, reset: bool, pending: &mut PendingNotify) {
        if let Ok(s) = self.sockets.get_mut(peer) {
            s.peer = None;
            s.peer_closed = true;
            s.reset = reset;
            pending.push(s.notify, peer);
        }
    }

    fn close(&mut self, socket: SocketHandle, pending: &mut PendingNotify) -> NetResult<()> {
        let closed = self.sockets.remove(socket)?;
        if let Some(peer) = closed.peer {
            self.peer_gone(peer, false, pending);
        }

        if closed.state == SocketState::Listening {
            // connections never accepted are reset
            let mut orphans = [None; LOOPBACK_SOCKETS];
            for (slot, (handle, _)) in orphans.iter_mut().zip(
                self.sockets
                    .iter()
                    .filter(|(_, s)| s.accept_on == Some(socket)),
            ) {
                *slot = Some(handle);
            }
            for orphan in orphans.into_iter().flatten() {
                if let Some(peer) = self.sockets.remove(orphan).ok().and_then(|s| s.peer) {
                    self.peer_gone(peer, true, pending);
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, socket: SocketHandle, data: &[u8], pending: &mut PendingNotify) -> NetResult<usize> {
        let s = self.sockets.get(socket)?;
        s.require(Protocol::Tcp)?;
        let peer = match (s.state, s.peer) {
            (SocketState::Connected, Some(peer)) => peer,
            _ => return Err(NetError::NoConnection),
        };
        if data.is_empty() {
            return Ok(0);
        }
        let limit = s.options.snd_buf;

        let p = self.sockets.get_mut(peer)?;
        let n = p.stream.write(&data[..data.len().min(limit)]);
        if n == 0 {
            return Err(NetError::WouldBlock);
        }
        pending.push(p.notify, peer);
        Ok(n)
    }

    fn recv(&mut self, socket: SocketHandle, data: &mut [u8], pending: &mut PendingNotify) -> NetResult<usize> {
        let s = self.sockets.get_mut(socket)?;
        s.require(Protocol::Tcp)?;
        if s.state != SocketState::Connected || s.reset {
            return Err(NetError::NoConnection);
        }
        if data.is_empty() {
            return Ok(0);
        }

        if !s.stream.is_empty() {
            let n = s.stream.read(data);
            if let Some(peer) = s.peer {
                // room for the writer again
                if let Ok(p) = self.sockets.get(peer) {
                    pending.push(p.notify, peer);
                }
            }
            return Ok(n);
        }
        if s.peer_closed {
            return Ok(0);
        }
        Err(NetError::WouldBlock)
    }

    fn sendto(
        &mut self,
        socket: SocketHandle,
        dest: Endpoint,
        data: &[u8],
        pending: &mut PendingNotify,
    ) -> NetResult<usize> {
        let s = self.sockets.get(socket)?;
        s.require(Protocol::Udp)?;
        if !dest.address.is_routable_destination() || dest.port == 0 {
            return Err(NetError::Parameter);
        }
        if data.len() > DATAGRAM_SIZE || data.len() > s.options.snd_buf {
            return Err(NetError::Parameter);
        }
        let broadcast = dest.address.is_broadcast();
        if broadcast && !s.options.broadcast {
            return Err(NetError::Parameter);
        }
        let local_dest = self.is_local(dest.address);
        if !local_dest && self.address.is_unspecified() {
            return Err(NetError::NoConnection);
        }

        let local = self.auto_bind(socket)?;
        let source = Endpoint {
            address: if local.address.is_any() {
                self.source_for(dest.address)
            } else {
                local.address
            },
            port: local.port,
        };

        if local_dest || broadcast {
            self.deliver(dest, source, data, broadcast, pending);
        }
        if !local_dest {
            self.stats.datagrams_sent += 1;
            self.stats.bytes_sent += data.len() as u64;
            trace!("loopback: {} bytes to {}:{} left the host", data.len(), dest.address, dest.port);
        }
        Ok(data.len())
    }

    /// Queue a datagram on every local socket it is addressed to
    fn deliver(
        &mut self,
        dest: Endpoint,
        source: Endpoint,
        payload: &[u8],
        broadcast: bool,
        pending: &mut PendingNotify,
    ) {
        let mut targets = [None; LOOPBACK_SOCKETS];
        let mut count = 0;
        for (handle, s) in self.sockets.iter() {
            let matches = s.proto == Protocol::Udp
                && s.local.is_some_and(|l| {
                    l.port == dest.port
                        && (broadcast || l.address.is_any() || l.address == dest.address)
                });
            if matches {
                targets[count] = Some(handle);
                count += 1;
                if !broadcast {
                    break;
                }
            }
        }

        if count == 0 && !broadcast {
            debug!("loopback: no socket on port {}, datagram dropped", dest.port);
            self.stats.datagrams_dropped += 1;
            return;
        }

        let depth = self.datagram_depth;
        for target in targets.into_iter().flatten() {
            let Ok(s) = self.sockets.get_mut(target) else {
                continue;
            };
            if s.datagrams.len() >= depth
                || s.datagrams.push(source.address, source.port, payload).is_err()
            {
                debug!("loopback: receive queue of {} full, datagram dropped", target);
                self.stats.datagrams_dropped += 1;
                continue;
            }
            self.stats.datagrams_delivered += 1;
            pending.push(s.notify, target);
        }
    }

    fn recvfrom(&mut self, socket: SocketHandle, data: &mut [u8]) -> NetResult<(usize, IpAddress, u16)> {
        let s = self.sockets.get_mut(socket)?;
        s.require(Protocol::Udp)?;
        let info = s.datagrams.pop(data)?;
        Ok((info.len, info.source, info.port))
    }

    fn set_socket_option(&mut self, socket: SocketHandle, option: StandardOption, optval: &[u8]) -> NetResult<()> {
        let s = self.sockets.get_mut(socket)?;
        match option {
            StandardOption::ReuseAddr => s.options.reuse_addr = decode_flag(optval)?,
            StandardOption::KeepAlive => s.options.keep_alive = decode_flag(optval)?,
            StandardOption::KeepIdle => s.options.keep_idle = decode_non_negative(optval)?,
            StandardOption::KeepIntvl => s.options.keep_intvl = decode_non_negative(optval)?,
            // negative disables lingering
            StandardOption::Linger => s.options.linger = decode_int(optval)?.max(-1),
            StandardOption::SndBuf => {
                s.options.snd_buf = check_buffer_size(decode_non_negative(optval)?)?;
            }
            StandardOption::RcvBuf => {
                let size = check_buffer_size(decode_non_negative(optval)?)?;
                s.stream.set_limit(size)?;
                s.options.rcv_buf = size;
            }
            StandardOption::Broadcast => s.options.broadcast = decode_flag(optval)?,
        }
        Ok(())
    }

    fn get_socket_option(&self, socket: SocketHandle, option: StandardOption, optval: &mut [u8]) -> NetResult<usize> {
        let options = &self.sockets.get(socket)?.options;
        match option {
            StandardOption::ReuseAddr => encode_flag(options.reuse_addr, optval),
            StandardOption::KeepAlive => encode_flag(options.keep_alive, optval),
            StandardOption::KeepIdle => encode_int(options.keep_idle as i32, optval),
            StandardOption::KeepIntvl => encode_int(options.keep_intvl as i32, optval),
            StandardOption::Linger => encode_int(options.linger, optval),
            StandardOption::SndBuf => encode_int(options.snd_buf as i32, optval),
            StandardOption::RcvBuf => encode_int(options.rcv_buf as i32, optval),
            StandardOption::Broadcast => encode_flag(options.broadcast, optval),
        }
    }
}

/// Option name at `level`, `Unsupported` for anything not understood
fn standard_option(expected: OptionLevel, level: OptionLevel, name: i32) -> NetResult<StandardOption> {
    if level != expected {
        return Err(NetError::Unsupported);
    }
    StandardOption::from_name(name).ok_or(NetError::Unsupported)
}

/// In-memory network stack
pub struct LoopbackStack {
    state: Mutex<StackState>,
}

impl LoopbackStack {
    pub fn new(config: LoopbackConfig) -> Self {
        let defaults = SocketOptions::new(
            config.snd_buf.clamp(1, STREAM_BUFFER_SIZE),
            config.rcv_buf.clamp(1, STREAM_BUFFER_SIZE),
        );
        debug!("loopback: stack up at {}", config.address);
        Self {
            state: Mutex::new(StackState {
                address: config.address,
                sockets: SocketPool::new(),
                defaults,
                datagram_depth: config.datagram_depth.clamp(1, DATAGRAM_DEPTH),
                next_ephemeral: EPHEMERAL_PORT_START,
                next_seq: 0,
                stats: LoopbackStats::default(),
            }),
        }
    }

    /// Attach to a network with `address`, or detach with
    /// [`IpAddress::UNSPECIFIED`]
    ///
    /// While detached only loopback destinations are reachable.
    pub fn set_address(&self, address: IpAddress) {
        debug!("loopback: address now {}", address);
        self.state.lock().address = address;
    }

    pub fn stats(&self) -> LoopbackStats {
        self.state.lock().stats
    }

    /// Number of open sockets, accepted and pending ones included
    pub fn socket_count(&self) -> usize {
        self.state.lock().sockets.len()
    }

    /// Run `op` under the state lock, then fire the callbacks it collected
    fn with_state<R>(&self, op: impl FnOnce(&mut StackState, &mut PendingNotify) -> NetResult<R>) -> NetResult<R> {
        let mut pending = PendingNotify::new();
        let result = {
            let mut state = self.state.lock();
            op(&mut state, &mut pending)
        };
        pending.fire();
        result
    }
}

impl Default for LoopbackStack {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl NetworkStack for LoopbackStack {
    fn name(&self) -> &str {
        "loopback"
    }

    fn get_ip_address(&self) -> IpAddress {
        self.state.lock().address
    }

    fn gethostbyname(&self, host: &str, version: IpVersion) -> NetResult<IpAddress> {
        if !host.eq_ignore_ascii_case("localhost") {
            return Err(NetError::Unsupported);
        }
        Ok(match version {
            IpVersion::V6 => IpAddress::v6(core::net::Ipv6Addr::LOCALHOST.octets()),
            _ => IpAddress::V4_LOOPBACK,
        })
    }

    fn setstackopt(&self, level: OptionLevel, name: i32, optval: &[u8]) -> NetResult<()> {
        let option = standard_option(OptionLevel::Stack, level, name)?;
        let mut state = self.state.lock();
        match option {
            StandardOption::SndBuf => {
                state.defaults.snd_buf = check_buffer_size(decode_non_negative(optval)?)?;
            }
            StandardOption::RcvBuf => {
                state.defaults.rcv_buf = check_buffer_size(decode_non_negative(optval)?)?;
            }
            _ => return Err(NetError::Unsupported),
        }
        Ok(())
    }

    fn getstackopt(&self, level: OptionLevel, name: i32, optval: &mut [u8]) -> NetResult<usize> {
        let option = standard_option(OptionLevel::Stack, level, name)?;
        let state = self.state.lock();
        match option {
            StandardOption::SndBuf => encode_int(state.defaults.snd_buf as i32, optval),
            StandardOption::RcvBuf => encode_int(state.defaults.rcv_buf as i32, optval),
            _ => Err(NetError::Unsupported),
        }
    }

    fn socket_open(&self, proto: Protocol) -> NetResult<SocketHandle> {
        let mut state = self.state.lock();
        let socket = LoopbackSocket::new(proto, state.defaults);
        state.sockets.insert(socket)
    }

    fn socket_close(&self, socket: SocketHandle) -> NetResult<()> {
        self.with_state(|state, pending| state.close(socket, pending))
    }

    fn socket_bind(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        self.state.lock().bind(socket, address, port)
    }

    fn socket_listen(&self, socket: SocketHandle, backlog: usize) -> NetResult<()> {
        self.state.lock().listen(socket, backlog)
    }

    fn socket_connect(&self, socket: SocketHandle, address: IpAddress, port: u16) -> NetResult<()> {
        self.with_state(|state, pending| state.connect(socket, address, port, pending))
    }

    fn socket_accept(&self, server: SocketHandle) -> NetResult<(SocketHandle, IpAddress, u16)> {
        self.state.lock().accept(server)
    }

    fn socket_send(&self, socket: SocketHandle, data: &[u8]) -> NetResult<usize> {
        self.with_state(|state, pending| state.send(socket, data, pending))
    }

    fn socket_recv(&self, socket: SocketHandle, data: &mut [u8]) -> NetResult<usize> {
        self.with_state(|state, pending| state.recv(socket, data, pending))
    }

    fn socket_sendto(
        &self,
        socket: SocketHandle,
        address: IpAddress,
        port: u16,
        data: &[u8],
    ) -> NetResult<usize> {
        let dest = Endpoint { address, port };
        self.with_state(|state, pending| state.sendto(socket, dest, data, pending))
    }

    fn socket_recvfrom(
        &self,
        socket: SocketHandle,
        data: &mut [u8],
    ) -> NetResult<(usize, IpAddress, u16)> {
        self.state.lock().recvfrom(socket, data)
    }

    fn socket_attach(
        &self,
        socket: SocketHandle,
        callback: Option<&'static dyn SocketNotify>,
    ) -> NetResult<()> {
        self.state.lock().sockets.get_mut(socket)?.notify = callback;
        Ok(())
    }

    fn setsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &[u8],
    ) -> NetResult<()> {
        let mut state = self.state.lock();
        // a stale handle is reported before the option name
        state.sockets.get(socket)?;
        let option = standard_option(OptionLevel::Socket, level, name)?;
        state.set_socket_option(socket, option, optval)
    }

    fn getsockopt(
        &self,
        socket: SocketHandle,
        level: OptionLevel,
        name: i32,
        optval: &mut [u8],
    ) -> NetResult<usize> {
        let state = self.state.lock();
        state.sockets.get(socket)?;
        let option = standard_option(OptionLevel::Socket, level, name)?;
        state.get_socket_option(socket, option, optval)
    }
}
