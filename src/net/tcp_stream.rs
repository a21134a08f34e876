// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A capability trait over outbound, non-blocking TCP streams, so the
//! [`crate::transport`] layer can be written generically rather than
//! hard-coding `mio::net::TcpStream` at every call site.

use std::io::{Error, Read, Result, Write};
use std::net::{Shutdown, SocketAddr};

/// A non-blocking outbound TCP stream, as required by [`crate::transport::Transport`].
pub trait TcpStream: Read + Write {
    /// Wraps an already-connected, non-blocking socket. Callers are
    /// expected to have performed `connect()` (and any source-address
    /// bind) themselves via `socket2`, then handed the resulting socket in.
    fn from_connected(std_stream: std::net::TcpStream) -> Result<Self>
    where
        Self: Sized;

    /// The remote address of this connection.
    fn peer_addr(&self) -> Result<SocketAddr>;

    /// Shuts down both halves of this connection.
    fn shutdown(&self, how: Shutdown) -> Result<()>;

    /// Sets `TCP_NODELAY`.
    fn set_nodelay(&self, nodelay: bool) -> Result<()>;

    /// Reads back the pending socket error, if any, without tearing down
    /// the connection. Used to detect whether a non-blocking `connect`
    /// succeeded once the socket becomes writable.
    fn take_error(&self) -> Result<Option<Error>>;
}

impl TcpStream for mio::net::TcpStream {
    #[inline]
    fn from_connected(std_stream: std::net::TcpStream) -> Result<Self> {
        Ok(mio::net::TcpStream::from_std(std_stream))
    }

    #[inline]
    fn peer_addr(&self) -> Result<SocketAddr> {
        Self::peer_addr(self)
    }

    #[inline]
    fn shutdown(&self, how: Shutdown) -> Result<()> {
        Self::shutdown(self, how)
    }

    #[inline]
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Self::set_nodelay(self, nodelay)
    }

    #[inline]
    fn take_error(&self) -> Result<Option<Error>> {
        Self::take_error(self)
    }
}
