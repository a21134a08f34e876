//! Process-wide TLS context and per-worker session-reuse bookkeeping.
//!
//! `surge` connects outward, so this wraps `rustls` in its *client*
//! configuration (`ClientConfig`) rather than a server-side `ServerConfig`.
//! The root store comes from `rustls-native-certs` so an `https://` target
//! verifies against the system trust store without extra flags.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls::client::Resumption;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};

use crate::error::SurgeError;

/// Built once at startup and shared (read-only) by every worker.
#[derive(Debug)]
pub struct ClientTlsContext {
    root_store: Arc<RootCertStore>,
}

impl ClientTlsContext {
    /// Loads the platform's native trust store.
    pub fn new() -> Result<Self, SurgeError> {
        let mut root_store = RootCertStore::empty();
        let result = rustls_native_certs::load_native_certs();

        for err in &result.errors {
            tracing::warn!(%err, "skipping unreadable native certificate entry");
        }

        let (added, _) = root_store.add_parsable_certificates(result.certs);
        if added == 0 {
            return Err(SurgeError::TlsInit(
                "no usable certificates found in the native trust store".into(),
            ));
        }

        Ok(ClientTlsContext {
            root_store: Arc::new(root_store),
        })
    }

    /// Builds a fresh `ClientConfig` for one worker. Each worker gets its
    /// own resumption store (capacity 1 when `reuse_sessions` is set) so
    /// sessions are never shared across workers, per the one-slot-per-worker
    /// rule.
    pub fn build_worker_config(&self, reuse_sessions: bool) -> Result<Arc<ClientConfig>, SurgeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| SurgeError::TlsInit(e.to_string()))?
            .with_root_certificates(self.root_store.clone())
            .with_no_client_auth();

        config.resumption = if reuse_sessions {
            Resumption::in_memory_sessions(1)
        } else {
            Resumption::disabled()
        };

        Ok(Arc::new(config))
    }
}

/// Converts a hostname into the `ServerName` rustls needs for certificate
/// verification and SNI.
pub fn server_name(host: &str) -> Result<ServerName<'static>, SurgeError> {
    ServerName::try_from(host.to_string()).map_err(|_| SurgeError::TlsInit(format!("invalid DNS name: {host}")))
}

/// Session-cache counters for a `TLS new conn ... reused ...` report line,
/// in the shape of `wrk.c`'s `SSL_CTX_stats`-backed report.
///
/// `rustls`'s public `Resumption::in_memory_sessions` API doesn't expose a
/// session-store callback surface, so `reused`/`miss` stay at zero; only
/// `new_conn` and `finished_conn`, which the connection state machine can
/// observe directly, are populated.
#[derive(Debug, Default)]
pub struct TlsSessionStats {
    pub new_conn: AtomicU64,
    pub reused: AtomicU64,
    pub miss: AtomicU64,
    pub finished_conn: AtomicU64,
}

impl TlsSessionStats {
    pub fn record_new_conn(&self) {
        self.new_conn.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished_conn(&self) {
        self.finished_conn.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TlsSessionSnapshot {
        TlsSessionSnapshot {
            new_conn: self.new_conn.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            finished_conn: self.finished_conn.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`TlsSessionStats`], used by the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsSessionSnapshot {
    pub new_conn: u64,
    pub reused: u64,
    pub miss: u64,
    pub finished_conn: u64,
}
