//! Representation of the HTTP version on the wire.
//!
//! HTTP/2 and HTTP/3 are out of scope; only the two HTTP/1.x minor
//! versions are represented.

use std::fmt::Display;

/// HTTP/1.x protocol version.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    Http11,
}

impl Version {
    /// Whether a response with no explicit `Connection` header defaults to
    /// keep-alive under this version (RFC 9112 §9.3).
    pub fn keeps_alive_by_default(self) -> bool {
        matches!(self, Version::Http11)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        })
    }
}
