//! Uniform non-blocking transport contract over plain TCP and TLS.
//!
//! A [`Transport`] is a capability interface: rather than branching on a
//! "is this TLS?" flag at every call site, a connection holds one
//! [`Transport`] value and dispatches through it.

pub mod plain;
pub mod tls;

use std::io;
use std::sync::Arc;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use rustls::ClientConfig;

use crate::net::tcp_stream::TcpStream;

pub use plain::PlainTransport;
pub use tls::TlsTransport;

/// Result discipline shared by every [`Transport`] operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed; for `read`, check the byte count separately.
    Ok,
    /// The operation would block; the caller should wait for readiness.
    Retry,
    /// The operation failed; the caller should count an error and reconnect.
    Error,
}

/// Either a plain TCP stream or a TLS-wrapped one, dispatched without a
/// branch at every read/write call site.
#[derive(Debug)]
pub enum Transport<S: TcpStream + io::Read + io::Write + Source> {
    Plain(PlainTransport<S>),
    Tls(Box<TlsTransport<S>>),
}

impl<S: TcpStream + io::Read + io::Write + Source> Transport<S> {
    pub fn plain(stream: S) -> Self {
        Transport::Plain(PlainTransport::new(stream))
    }

    pub fn tls(stream: S, config: Arc<ClientConfig>, server_name: &str) -> io::Result<Self> {
        Ok(Transport::Tls(Box::new(TlsTransport::new(
            stream,
            config,
            server_name,
        )?)))
    }

    /// Drives the handshake (a no-op for plain TCP) forward.
    pub fn connect(&mut self) -> Outcome {
        match self {
            Transport::Plain(t) => t.connect(),
            Transport::Tls(t) => t.connect(),
        }
    }

    /// Reads up to `buf.len()` bytes. `Ok` with `*n == 0` means EOF.
    pub fn read(&mut self, buf: &mut [u8], n: &mut usize) -> Outcome {
        match self {
            Transport::Plain(t) => t.read(buf, n),
            Transport::Tls(t) => t.read(buf, n),
        }
    }

    /// Writes up to `buf.len()` bytes, partial writes allowed.
    pub fn write(&mut self, buf: &[u8], n: &mut usize) -> Outcome {
        match self {
            Transport::Plain(t) => t.write(buf, n),
            Transport::Tls(t) => t.write(buf, n),
        }
    }

    /// Releases transport state. Idempotent, never errors.
    pub fn close(&mut self) {
        match self {
            Transport::Plain(t) => t.close(),
            Transport::Tls(t) => t.close(),
        }
    }

    /// Nonzero if bytes are already buffered and a further read wouldn't
    /// need to wait on readiness (only meaningful for TLS).
    pub fn readable(&self) -> bool {
        match self {
            Transport::Plain(t) => t.readable(),
            Transport::Tls(t) => t.readable(),
        }
    }

    pub fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        match self {
            Transport::Plain(t) => t.register(registry, token, interest),
            Transport::Tls(t) => t.register(registry, token, interest),
        }
    }

    pub fn reregister(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        match self {
            Transport::Plain(t) => t.reregister(registry, token, interest),
            Transport::Tls(t) => t.reregister(registry, token, interest),
        }
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Transport::Plain(t) => t.deregister(registry),
            Transport::Tls(t) => t.deregister(registry),
        }
    }

    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            Transport::Plain(t) => t.stream().take_error(),
            Transport::Tls(t) => t.stream().take_error(),
        }
    }
}
