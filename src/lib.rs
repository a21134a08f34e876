//! `surge`: a concurrent HTTP/HTTPS load generator.
//!
//! Modules are laid out leaves-first: [`clock`] and [`stats`] have no
//! internal dependencies; [`parser`], [`net`], and [`transport`] build on
//! them; [`event_loop`] and [`script`] are the per-worker collaborators;
//! [`connection`] composes all of the above into one socket's state
//! machine; [`worker`] drives N connections on one thread; [`coordinator`]
//! ties the whole run together.

pub mod clock;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod event_loop;
pub mod net;
pub mod parser;
pub mod report;
pub mod script;
pub mod stats;
pub mod tls_context;
pub mod transport;
pub mod worker;
