//! Top-level run orchestration: parse args, spawn workers, sleep for the
//! test duration, join, aggregate, report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::now_us;
use crate::config::{Config, Scheme};
use crate::connection::WorkerCounters;
use crate::error::SurgeError;
use crate::report;
use crate::stats::Stats;
use crate::tls_context::{ClientTlsContext, TlsSessionStats};
use crate::worker::{self, WorkerParams};

/// Large fixed bound for the rate histogram (requests/sec samples rarely
/// exceed a few million even on a beefy box).
const MAX_THREAD_RATE_S: u64 = 10_000_000;

/// Runs one load test end to end, from parsed CLI to printed report.
pub fn run() -> Result<(), SurgeError> {
    let config = Arc::new(Config::parse()?);

    let tls_ctx = match config.scheme {
        Scheme::Https => Some(ClientTlsContext::new()?),
        Scheme::Http => None,
    };

    let addr = resolve(&config.host, config.port)?;

    let timeout_us = (config.timeout.as_micros() as u64).max(1);
    let latency = Arc::new(Stats::new(timeout_us));
    let rate = Arc::new(Stats::new(MAX_THREAD_RATE_S));
    let tls_stats = Arc::new(TlsSessionStats::default());
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::with_capacity(config.threads as usize);
    for id in 0..config.threads as usize {
        let tls_config = match &tls_ctx {
            Some(ctx) => Some(ctx.build_worker_config(config.tls_session_reuse)?),
            None => None,
        };

        let params = WorkerParams {
            id,
            config: config.clone(),
            addr,
            tls_config,
            tls_stats: tls_stats.clone(),
            latency: latency.clone(),
            rate: rate.clone(),
            stop: stop.clone(),
        };

        let handle = worker::spawn(params).map_err(|e| SurgeError::WorkerSpawn(e.to_string()))?;
        handles.push(handle);
    }

    install_signal_handlers(stop.clone());

    let start = now_us();
    std::thread::sleep(config.duration);
    stop.store(true, Ordering::Relaxed);

    let mut totals = WorkerCounters::default();
    for handle in handles {
        match handle.join() {
            Ok(counters) => totals = merge(totals, counters),
            Err(_) => tracing::error!("a worker thread panicked"),
        }
    }
    let runtime_us = now_us() - start;

    if config.connections > 0 {
        let per_connection = totals.complete / config.connections;
        if per_connection > 0 {
            latency.correct(runtime_us / per_connection);
        }
    }

    if !config.quiet {
        report::print(&config, runtime_us, totals, &latency, &rate, &tls_stats);
    }

    Ok(())
}

fn merge(a: WorkerCounters, b: WorkerCounters) -> WorkerCounters {
    WorkerCounters {
        complete: a.complete + b.complete,
        requests: a.requests + b.requests,
        bytes: a.bytes + b.bytes,
        connects: a.connects + b.connects,
        connect_errors: a.connect_errors + b.connect_errors,
        read_errors: a.read_errors + b.read_errors,
        write_errors: a.write_errors + b.write_errors,
        timeout_errors: a.timeout_errors + b.timeout_errors,
        status_errors: a.status_errors + b.status_errors,
    }
}

fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr, SurgeError> {
    use std::net::ToSocketAddrs;

    (host, port)
        .to_socket_addrs()
        .map_err(|e| SurgeError::Resolve {
            host: host.to_string(),
            source: e,
        })?
        .next()
        .ok_or_else(|| SurgeError::NoAddress(host.to_string()))
}

/// Ignores `SIGPIPE` (a write to an already-closed socket shouldn't kill the
/// process) and wires `SIGINT`/`SIGTERM` to the shared stop flag so a signal
/// after workers have started converges the run through the normal timed
/// shutdown path rather than an abrupt exit.
fn install_signal_handlers(stop: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        unsafe {
            let _ = signal_hook::low_level::register(signal_hook::consts::SIGPIPE, || {});
        }
        if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, stop.clone()) {
            tracing::warn!(error = %e, "failed to install SIGINT handler");
        }
        if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGTERM, stop) {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = stop;
    }
}
