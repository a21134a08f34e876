//! Non-blocking outbound TCP connection setup.
//!
//! `socket2` is used so `SO_REUSEADDR` and an optional source-address bind
//! can be applied *before* `connect()` — setting it afterward has no effect
//! on an already-connecting socket.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

/// Creates a non-blocking TCP socket, optionally bound to `source`, and
/// begins connecting to `addr`. Returns immediately; the caller drives
/// completion via write-readiness.
pub fn connect_nonblocking(
    addr: SocketAddr,
    source: Option<Ipv4Addr>,
) -> io::Result<std::net::TcpStream> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;

    if let Some(source) = source {
        let bind_addr: SocketAddr = (source, 0).into();
        socket.bind(&bind_addr.into())?;
    }

    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        // std only maps EAGAIN/EWOULDBLOCK to `WouldBlock`, not EINPROGRESS,
        // so a non-blocking connect to any target that doesn't finish its
        // handshake synchronously (every real remote host) lands here
        // instead. `wrk.c` treats `errno == EINPROGRESS` as success; do the
        // same.
        #[cfg(unix)]
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }

    Ok(socket.into())
}
