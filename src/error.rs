//! Fatal error taxonomy.
//!
//! Everything that can happen *during* a run (connect/read/write/timeout/
//! status) is tallied as a counter on the worker, never propagated as a
//! `Result` — only startup failures become a [`SurgeError`], reported on
//! stderr and mapped to a process exit code in `main`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurgeError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve any address for {0}")]
    NoAddress(String),

    #[error("TLS initialization failed: {0}")]
    TlsInit(String),

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

impl SurgeError {
    /// Process exit code for this error: 1 for argument or resolution
    /// errors, 2 for worker startup failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            SurgeError::Resolve { .. } | SurgeError::NoAddress(_) | SurgeError::InvalidArgs(_) => 1,
            SurgeError::TlsInit(_) | SurgeError::WorkerSpawn(_) => 2,
        }
    }
}
