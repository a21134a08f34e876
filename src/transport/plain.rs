//! Plain-TCP implementation of the [`crate::transport::Transport`] contract.

use std::io::{self, Read, Write};

use mio::event::Source;
use mio::{Interest, Registry, Token};

use super::Outcome;
use crate::net::tcp_stream::TcpStream;

#[derive(Debug)]
pub struct PlainTransport<S: TcpStream + Read + Write + Source> {
    stream: S,
}

impl<S: TcpStream + Read + Write + Source> PlainTransport<S> {
    pub fn new(stream: S) -> Self {
        PlainTransport { stream }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn connect(&mut self) -> Outcome {
        // The TCP handshake itself is driven by the OS once the socket was
        // created non-blocking; nothing more to do once write-readiness
        // fires, beyond the take_error() check the connection performs.
        Outcome::Ok
    }

    pub fn read(&mut self, buf: &mut [u8], n: &mut usize) -> Outcome {
        match self.stream.read(buf) {
            Ok(read) => {
                *n = read;
                Outcome::Ok
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Outcome::Retry,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Outcome::Retry,
            Err(_) => Outcome::Error,
        }
    }

    pub fn write(&mut self, buf: &[u8], n: &mut usize) -> Outcome {
        match self.stream.write(buf) {
            Ok(written) => {
                *n = written;
                Outcome::Ok
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Outcome::Retry,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Outcome::Retry,
            Err(_) => Outcome::Error,
        }
    }

    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    pub fn readable(&self) -> bool {
        false
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
