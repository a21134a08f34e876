//! Low-level socket abstractions used by the [`crate::transport`] layer.

pub mod connect;
pub mod tcp_stream;
