//! TLS implementation of the [`crate::transport::Transport`] contract, built
//! on `rustls::ClientConnection` with manual `read_tls`/`write_tls`/
//! `process_new_packets` pumping rather than the blocking `Stream` adapter.

use std::io::{self, Read, Write};

use mio::event::Source;
use mio::{Interest, Registry, Token};
use rustls::ClientConnection;

use super::Outcome;
use crate::net::tcp_stream::TcpStream;
use crate::tls_context::server_name;

#[derive(Debug)]
pub struct TlsTransport<S: TcpStream + Read + Write + Source> {
    stream: S,
    tls: ClientConnection,
    /// Decrypted bytes rustls is holding that the last `read()` didn't drain,
    /// per `process_new_packets`'s `IoState::plaintext_bytes_to_read`. Lets
    /// `readable()` answer "more plaintext without a syscall?" instead of
    /// `wants_read()`, which stays true for as long as the socket could
    /// accept more ciphertext at all.
    plaintext_buffered: usize,
}

impl<S: TcpStream + Read + Write + Source> TlsTransport<S> {
    /// Wraps `stream` in a TLS client connection using `config`, which
    /// should be the worker's shared config so its single-slot session
    /// cache is reused across this worker's connections rather than built
    /// fresh (and thrown away) per connection.
    pub fn new(stream: S, config: std::sync::Arc<rustls::ClientConfig>, host: &str) -> io::Result<Self> {
        let name = server_name(host).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let tls = ClientConnection::new(config, name)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(TlsTransport {
            stream,
            tls,
            plaintext_buffered: 0,
        })
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn connect(&mut self) -> Outcome {
        if self.tls.wants_write() {
            match self.tls.write_tls(&mut self.stream) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Outcome::Retry,
                Err(_) => return Outcome::Error,
            }
        }

        if self.tls.is_handshaking() {
            Outcome::Retry
        } else {
            Outcome::Ok
        }
    }

    fn pump_read_tls(&mut self) -> Outcome {
        loop {
            match self.tls.read_tls(&mut self.stream) {
                Ok(0) => return Outcome::Ok,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Outcome::Ok,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Outcome::Error,
            }
        }
    }

    pub fn read(&mut self, buf: &mut [u8], n: &mut usize) -> Outcome {
        if let Outcome::Error = self.pump_read_tls() {
            return Outcome::Error;
        }

        let io_state = match self.tls.process_new_packets() {
            Ok(state) => state,
            Err(_) => return Outcome::Error,
        };
        self.plaintext_buffered = io_state.plaintext_bytes_to_read();

        match self.tls.reader().read(buf) {
            Ok(read) => {
                *n = read;
                self.plaintext_buffered = self.plaintext_buffered.saturating_sub(read);
                Outcome::Ok
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                *n = 0;
                self.plaintext_buffered = 0;
                Outcome::Retry
            }
            Err(_) => Outcome::Error,
        }
    }

    pub fn write(&mut self, buf: &[u8], n: &mut usize) -> Outcome {
        match self.tls.writer().write(buf) {
            Ok(written) => *n = written,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Outcome::Retry,
            Err(_) => return Outcome::Error,
        }

        while self.tls.wants_write() {
            match self.tls.write_tls(&mut self.stream) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => return Outcome::Error,
            }
        }

        Outcome::Ok
    }

    pub fn close(&mut self) {
        self.tls.send_close_notify();
        let _ = self.tls.write_tls(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    pub fn readable(&self) -> bool {
        self.plaintext_buffered > 0 && !self.tls.is_handshaking()
    }

    pub fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        registry.register(&mut self.stream, token, interest)
    }

    pub fn reregister(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        registry.reregister(&mut self.stream, token, interest)
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }
}
