use netsock::drivers::net::loopback::{LoopbackConfig, LoopbackStack, STREAM_BUFFER_SIZE};
use netsock::net::event::{EventQueue, SocketEvent};
use netsock::net::options::{int_value, OptionLevel, StandardOption};
use netsock::net::{IpAddress, NetError, NetworkStack, Protocol, SocketHandle, StackHandle};

const REMOTE: IpAddress = IpAddress::v4([192, 0, 2, 1]);

fn leaked_queue(capacity: usize) -> &'static EventQueue {
    Box::leak(Box::new(EventQueue::new(capacity)))
}

fn listener(handle: &StackHandle, port: u16, backlog: usize) -> SocketHandle {
    let server = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_bind(server, IpAddress::UNSPECIFIED, port).unwrap();
    handle.socket_listen(server, backlog).unwrap();
    server
}

#[test]
fn test_udp_send_to_remote_then_close() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);

    let socket = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(socket, IpAddress::UNSPECIFIED, 5000).unwrap();
    assert_eq!(handle.socket_sendto(socket, REMOTE, 7, &[0x55; 10]), Ok(10));

    let stats = stack.stats();
    assert_eq!(stats.datagrams_sent, 1);
    assert_eq!(stats.bytes_sent, 10);

    handle.socket_close(socket).unwrap();
    assert_eq!(
        handle.socket_sendto(socket, REMOTE, 7, &[0x55; 10]),
        Err(NetError::NoSocket)
    );
}

#[test]
fn test_udp_local_delivery() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);

    let receiver = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(receiver, IpAddress::UNSPECIFIED, 5000).unwrap();
    let sender = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(sender, IpAddress::UNSPECIFIED, 6000).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(handle.socket_recvfrom(receiver, &mut buf), Err(NetError::WouldBlock));

    assert_eq!(
        handle.socket_sendto(sender, IpAddress::V4_LOOPBACK, 5000, b"hello"),
        Ok(5)
    );
    assert_eq!(
        handle.socket_recvfrom(receiver, &mut buf),
        Ok((5, IpAddress::V4_LOOPBACK, 6000))
    );
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(stack.stats().datagrams_sent, 0);

    // excess of a long datagram is discarded
    handle.socket_sendto(sender, IpAddress::V4_LOOPBACK, 5000, b"truncated").unwrap();
    let mut small = [0u8; 4];
    assert_eq!(
        handle.socket_recvfrom(receiver, &mut small),
        Ok((4, IpAddress::V4_LOOPBACK, 6000))
    );
    assert_eq!(handle.socket_recvfrom(receiver, &mut buf), Err(NetError::WouldBlock));
}

#[test]
fn test_udp_to_own_address() {
    let own = IpAddress::v4([10, 0, 0, 2]);
    let stack = LoopbackStack::new(LoopbackConfig::new(own));
    let handle = StackHandle::new(&stack);
    assert_eq!(handle.get_ip_address(), own);

    let receiver = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(receiver, own, 5353).unwrap();
    let sender = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_sendto(sender, own, 5353, &[1, 2, 3]).unwrap();

    let mut buf = [0u8; 8];
    let (len, from, _port) = handle.socket_recvfrom(receiver, &mut buf).unwrap();
    assert_eq!((len, from), (3, own));
}

#[test]
fn test_detached_stack() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let socket = handle.socket_open(Protocol::Udp).unwrap();

    stack.set_address(IpAddress::UNSPECIFIED);
    assert!(handle.get_ip_address().is_unspecified());
    assert_eq!(
        handle.socket_sendto(socket, REMOTE, 7, &[0]),
        Err(NetError::NoConnection)
    );
    // loopback keeps working
    assert_eq!(handle.socket_sendto(socket, IpAddress::V4_LOOPBACK, 7, &[0]), Ok(1));
}

#[test]
fn test_broadcast_requires_option() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);

    let receiver = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(receiver, IpAddress::UNSPECIFIED, 67).unwrap();
    let sender = handle.socket_open(Protocol::Udp).unwrap();

    assert_eq!(
        handle.socket_sendto(sender, IpAddress::V4_BROADCAST, 67, &[9]),
        Err(NetError::Parameter)
    );

    let on = int_value(1);
    handle
        .setsockopt(sender, OptionLevel::Socket, StandardOption::Broadcast.name(), &on)
        .unwrap();
    assert_eq!(handle.socket_sendto(sender, IpAddress::V4_BROADCAST, 67, &[9]), Ok(1));

    let mut buf = [0u8; 4];
    assert_eq!(handle.socket_recvfrom(receiver, &mut buf).map(|r| r.0), Ok(1));
    assert_eq!(stack.stats().datagrams_sent, 1);
}

#[test]
fn test_tcp_exchange() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let server = listener(&handle, 8080, 2);

    let client = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_connect(client, IpAddress::V4_LOOPBACK, 8080).unwrap();

    let (conn, peer, peer_port) = handle.socket_accept(server).unwrap();
    assert_eq!(peer, IpAddress::V4_LOOPBACK);
    assert_ne!(peer_port, 0);
    assert_ne!(conn, server);

    assert_eq!(handle.socket_send(client, b"ping"), Ok(4));
    let mut buf = [0u8; 16];
    assert_eq!(handle.socket_recv(conn, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"ping");

    assert_eq!(handle.socket_send(conn, b"pong"), Ok(4));
    assert_eq!(handle.socket_recv(client, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"pong");
    assert_eq!(handle.socket_recv(client, &mut buf), Err(NetError::WouldBlock));

    // orderly close is seen as end of stream
    handle.socket_send(client, b"bye").unwrap();
    handle.socket_close(client).unwrap();
    assert_eq!(handle.socket_recv(conn, &mut buf), Ok(3));
    assert_eq!(handle.socket_recv(conn, &mut buf), Ok(0));
    assert_eq!(handle.socket_send(conn, b"x"), Err(NetError::NoConnection));
}

#[test]
fn test_accept_would_block_when_empty() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let server = listener(&handle, 80, 1);

    assert_eq!(handle.socket_accept(server), Err(NetError::WouldBlock));
}

#[test]
fn test_backlog_full() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let server = listener(&handle, 80, 1);

    let first = handle.socket_open(Protocol::Tcp).unwrap();
    let second = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_connect(first, IpAddress::V4_LOOPBACK, 80).unwrap();
    assert_eq!(
        handle.socket_connect(second, IpAddress::V4_LOOPBACK, 80),
        Err(NetError::WouldBlock)
    );

    handle.socket_accept(server).unwrap();
    handle.socket_connect(second, IpAddress::V4_LOOPBACK, 80).unwrap();
    assert_eq!(stack.socket_count(), 5);
}

#[test]
fn test_connect_failures() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let client = handle.socket_open(Protocol::Tcp).unwrap();

    assert_eq!(
        handle.socket_connect(client, IpAddress::V4_LOOPBACK, 81),
        Err(NetError::NoConnection)
    );
    assert_eq!(
        handle.socket_connect(client, REMOTE, 80),
        Err(NetError::NoConnection)
    );

    let udp = handle.socket_open(Protocol::Udp).unwrap();
    assert_eq!(handle.socket_send(udp, &[1]), Err(NetError::Unsupported));
    assert_eq!(
        handle.socket_sendto(client, IpAddress::V4_LOOPBACK, 80, &[1]),
        Err(NetError::Unsupported)
    );
}

#[test]
fn test_partial_send() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let server = listener(&handle, 9000, 1);
    // accepted sockets inherit the listener's options
    handle
        .setsockopt(server, OptionLevel::Socket, StandardOption::RcvBuf.name(), &int_value(16))
        .unwrap();

    let client = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_connect(client, IpAddress::V4_LOOPBACK, 9000).unwrap();
    let (conn, _, _) = handle.socket_accept(server).unwrap();

    let data: Vec<u8> = (0..24).collect();
    let taken = handle.socket_send(client, &data).unwrap();
    assert_eq!(taken, 16);
    assert_eq!(handle.socket_send(client, &data[taken..]), Err(NetError::WouldBlock));

    let mut buf = [0u8; 64];
    assert_eq!(handle.socket_recv(conn, &mut buf), Ok(16));
    // the remainder goes through once there is room
    assert_eq!(handle.socket_send(client, &data[taken..]), Ok(data.len() - taken));
    assert_eq!(handle.socket_recv(conn, &mut buf[16..]), Ok(8));
    assert_eq!(&buf[..24], &data[..]);
}

#[test]
fn test_closed_handle_is_poisoned() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let socket = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_close(socket).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(handle.socket_close(socket), Err(NetError::NoSocket));
    assert_eq!(
        handle.socket_bind(socket, IpAddress::UNSPECIFIED, 80),
        Err(NetError::NoSocket)
    );
    assert_eq!(handle.socket_listen(socket, 1), Err(NetError::NoSocket));
    assert_eq!(
        handle.socket_connect(socket, IpAddress::V4_LOOPBACK, 80),
        Err(NetError::NoSocket)
    );
    assert_eq!(handle.socket_accept(socket), Err(NetError::NoSocket));
    assert_eq!(handle.socket_send(socket, &[1]), Err(NetError::NoSocket));
    assert_eq!(handle.socket_recv(socket, &mut buf), Err(NetError::NoSocket));
    assert_eq!(handle.socket_recvfrom(socket, &mut buf), Err(NetError::NoSocket));
    assert_eq!(handle.socket_attach(socket, None), Err(NetError::NoSocket));
    assert_eq!(
        handle.getsockopt(socket, OptionLevel::Socket, StandardOption::KeepAlive.name(), &mut buf),
        Err(NetError::NoSocket)
    );

    // the slot is reused, the old handle stays dead
    let reused = handle.socket_open(Protocol::Tcp).unwrap();
    assert_eq!(reused.index(), socket.index());
    assert_eq!(handle.socket_close(socket), Err(NetError::NoSocket));
    handle.socket_close(reused).unwrap();
}

#[test]
fn test_socket_pool_exhaustion() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let mut open = Vec::new();
    loop {
        match handle.socket_open(Protocol::Udp) {
            Ok(socket) => open.push(socket),
            Err(err) => {
                assert_eq!(err, NetError::NoSocket);
                break;
            }
        }
    }
    assert_eq!(open.len(), netsock::drivers::net::loopback::LOOPBACK_SOCKETS);
    handle.socket_close(open[0]).unwrap();
    assert!(handle.socket_open(Protocol::Udp).is_ok());
}

fn option_snapshot(handle: &StackHandle, socket: SocketHandle) -> Vec<[u8; 4]> {
    (0..8)
        .map(|name| {
            let mut out = [0u8; 4];
            handle.getsockopt(socket, OptionLevel::Socket, name, &mut out).unwrap();
            out
        })
        .collect()
}

#[test]
fn test_options_untouched_on_failure() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let socket = handle.socket_open(Protocol::Tcp).unwrap();
    let before = option_snapshot(&handle, socket);

    assert_eq!(
        handle.setsockopt(socket, OptionLevel::Socket, 0x1234, &int_value(1)),
        Err(NetError::Unsupported)
    );
    assert_eq!(
        handle.setsockopt(socket, OptionLevel::Stack, StandardOption::KeepAlive.name(), &int_value(1)),
        Err(NetError::Unsupported)
    );
    // wrong length
    assert_eq!(
        handle.setsockopt(socket, OptionLevel::Socket, StandardOption::KeepAlive.name(), &[1]),
        Err(NetError::Parameter)
    );
    assert_eq!(
        handle.setsockopt(socket, OptionLevel::Socket, StandardOption::SndBuf.name(), &int_value(-1)),
        Err(NetError::Parameter)
    );
    let too_big = int_value(STREAM_BUFFER_SIZE as i32 + 1);
    assert_eq!(
        handle.setsockopt(socket, OptionLevel::Socket, StandardOption::RcvBuf.name(), &too_big),
        Err(NetError::Parameter)
    );
    assert_eq!(option_snapshot(&handle, socket), before);

    let mut out = [0xAAu8; 4];
    assert_eq!(
        handle.getsockopt(socket, OptionLevel::Socket, 0x1234, &mut out),
        Err(NetError::Unsupported)
    );
    assert_eq!(out, [0xAA; 4]);
    let mut short = [0xAAu8; 2];
    assert_eq!(
        handle.getsockopt(socket, OptionLevel::Socket, StandardOption::Linger.name(), &mut short),
        Err(NetError::Parameter)
    );
    assert_eq!(short, [0xAA; 2]);
}

#[test]
fn test_option_set_and_get() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let socket = handle.socket_open(Protocol::Tcp).unwrap();
    let idle = StandardOption::KeepIdle.name();

    handle.setsockopt(socket, OptionLevel::Socket, idle, &int_value(30)).unwrap();
    let mut out = [0u8; 8];
    assert_eq!(handle.getsockopt(socket, OptionLevel::Socket, idle, &mut out), Ok(4));
    assert_eq!(i32::from_ne_bytes([out[0], out[1], out[2], out[3]]), 30);
}

#[test]
fn test_notifications() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let queue = leaked_queue(8);

    let receiver = handle.socket_open(Protocol::Udp).unwrap();
    handle.socket_bind(receiver, IpAddress::UNSPECIFIED, 5000).unwrap();
    handle.socket_attach(receiver, Some(queue)).unwrap();
    let sender = handle.socket_open(Protocol::Udp).unwrap();

    handle.socket_sendto(sender, IpAddress::V4_LOOPBACK, 5000, &[1]).unwrap();
    assert_eq!(queue.pop(), Some(SocketEvent::Ready(receiver)));
    assert_eq!(queue.pop(), None);

    // detached sockets stay silent
    handle.socket_attach(receiver, None).unwrap();
    handle.socket_sendto(sender, IpAddress::V4_LOOPBACK, 5000, &[2]).unwrap();
    assert!(queue.is_empty());
}

#[test]
fn test_listener_notified_on_connect() {
    let stack = LoopbackStack::default();
    let handle = StackHandle::new(&stack);
    let queue = leaked_queue(8);
    let server = listener(&handle, 7000, 1);
    handle.socket_attach(server, Some(queue)).unwrap();

    let client = handle.socket_open(Protocol::Tcp).unwrap();
    handle.socket_connect(client, IpAddress::V4_LOOPBACK, 7000).unwrap();

    let mut events = Vec::new();
    queue.drain(|event| events.push(event));
    assert_eq!(events, vec![SocketEvent::Ready(server)]);
}

#[test]
fn test_stack_reports_name_through_table() {
    let stack = LoopbackStack::default();
    let table: &dyn NetworkStack = &stack;
    assert_eq!(table.name(), "loopback");
    assert_eq!(table.get_ip_address(), IpAddress::V4_LOOPBACK);
}
