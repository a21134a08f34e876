//! One worker thread: its own `mio::Poll`, its own slice of connections, its
//! own script instance. Workers never touch each other's state; the
//! coordinator only reads the [`WorkerCounters`] handed back when a worker's
//! thread joins.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Token;
use rustls::ClientConfig;
use slab::Slab;

use crate::clock::now_us;
use crate::config::Config;
use crate::connection::{Action, ConnDeps, Connection, WorkerCounters};
use crate::event_loop::{EventLoop, TimerId};
use crate::net::connect::connect_nonblocking;
use crate::net::tcp_stream::TcpStream;
use crate::script::{RunTotals, Script, StaticScript};
use crate::stats::Stats;
use crate::tls_context::TlsSessionStats;
use crate::transport::Transport;

/// How often requests/sec samples are taken into the rate histogram.
const RECORD_INTERVAL_MS: u64 = 100;

/// Everything one worker thread needs, handed in once at spawn time.
pub struct WorkerParams {
    pub id: usize,
    pub config: Arc<Config>,
    pub addr: SocketAddr,
    pub tls_config: Option<Arc<ClientConfig>>,
    pub tls_stats: Arc<TlsSessionStats>,
    pub latency: Arc<Stats>,
    pub rate: Arc<Stats>,
    pub stop: Arc<AtomicBool>,
}

/// Spawns one worker thread, returning a handle that yields its
/// [`WorkerCounters`] once the run stops and the thread joins.
pub fn spawn(params: WorkerParams) -> io::Result<std::thread::JoinHandle<WorkerCounters>> {
    std::thread::Builder::new()
        .name(format!("surge-worker-{}", params.id))
        .spawn(move || {
            let id = params.id;
            match run(&params) {
                Ok(counters) => counters,
                Err(e) => {
                    tracing::error!(worker = id, error = %e, "worker terminated early");
                    WorkerCounters::default()
                }
            }
        })
}

type Conn = Connection<mio::net::TcpStream>;

fn run(params: &WorkerParams) -> io::Result<WorkerCounters> {
    let mut event_loop = EventLoop::create(1024)?;
    let mut connections: Slab<Conn> = Slab::new();

    let mut script: Box<dyn Script> = Box::new(StaticScript::new(&params.config));
    script.init(params.id, &[]);

    let pipeline = script.verify_request().max(1);
    let capture = script.want_response();
    let static_request: Option<Arc<[u8]>> = if params.config.dynamic {
        None
    } else {
        let mut bytes = Vec::new();
        for _ in 0..pipeline {
            bytes.extend_from_slice(&script.request());
        }
        Some(Arc::from(bytes.into_boxed_slice()))
    };

    let mut counters = WorkerCounters::default();
    let wanted = params.config.connections_for_worker(params.id as u64) as usize;
    for _ in 0..wanted {
        if open_connection(&mut connections, &mut event_loop, params, &static_request, pipeline, capture).is_err() {
            counters.connect_errors += 1;
        }
    }

    event_loop.add_timer(RECORD_INTERVAL_MS, RECORD_INTERVAL_MS);
    let mut delay_timers: HashMap<TimerId, usize> = HashMap::new();
    let mut last_complete = 0u64;
    let started = now_us();

    while !params.stop.load(Ordering::Relaxed) {
        let ready = event_loop.poll()?;

        for ev in &ready.events {
            let action = match connections.get_mut(ev.token.0) {
                Some(conn) => {
                    let mut deps = ConnDeps {
                        registry: event_loop.registry(),
                        config: &params.config,
                        script: script.as_mut(),
                        latency: &params.latency,
                        counters: &mut counters,
                    };
                    conn.on_event(ev.readable, ev.writable, ev.error, &mut deps)
                }
                None => continue,
            };

            apply_action(
                action,
                ev.token,
                &mut connections,
                &mut event_loop,
                params,
                &static_request,
                pipeline,
                capture,
                &mut counters,
                &mut delay_timers,
            );
        }

        for timer in ready.due_timers {
            if let Some(idx) = delay_timers.remove(&timer) {
                let action = match connections.get_mut(idx) {
                    Some(conn) => {
                        let mut deps = ConnDeps {
                            registry: event_loop.registry(),
                            config: &params.config,
                            script: script.as_mut(),
                            latency: &params.latency,
                            counters: &mut counters,
                        };
                        conn.resume_after_delay(&mut deps)
                    }
                    None => continue,
                };

                apply_action(
                    action,
                    Token(idx),
                    &mut connections,
                    &mut event_loop,
                    params,
                    &static_request,
                    pipeline,
                    capture,
                    &mut counters,
                    &mut delay_timers,
                );
            } else {
                let delta = counters.complete.saturating_sub(last_complete);
                if delta > 0 {
                    last_complete = counters.complete;
                    let per_second = delta * (1000 / RECORD_INTERVAL_MS);
                    params.rate.record(per_second);
                }
            }
        }
    }

    for (_, conn) in connections.iter_mut() {
        let _ = conn.deregister(event_loop.registry());
        conn.close();
        if params.tls_config.is_some() {
            params.tls_stats.record_finished_conn();
        }
    }

    let run_totals = RunTotals {
        runtime_us: now_us().saturating_sub(started),
        requests: counters.requests,
        bytes: counters.bytes,
        connect_errors: counters.connect_errors,
        read_errors: counters.read_errors,
        write_errors: counters.write_errors,
        timeout_errors: counters.timeout_errors,
        status_errors: counters.status_errors,
    };
    script.summary(run_totals);
    if run_totals.connect_errors + run_totals.read_errors + run_totals.write_errors + run_totals.timeout_errors > 0 {
        script.errors(run_totals);
    }
    if script.has_done() {
        script.done(run_totals);
    }

    Ok(counters)
}

#[allow(clippy::too_many_arguments)]
fn apply_action(
    action: Action,
    token: Token,
    connections: &mut Slab<Conn>,
    event_loop: &mut EventLoop,
    params: &WorkerParams,
    static_request: &Option<Arc<[u8]>>,
    pipeline: usize,
    capture: bool,
    counters: &mut WorkerCounters,
    delay_timers: &mut HashMap<TimerId, usize>,
) {
    match action {
        Action::None => {}
        Action::Reconnect => {
            if let Some(mut conn) = connections.try_remove(token.0) {
                let _ = conn.deregister(event_loop.registry());
                conn.close();
                if params.tls_config.is_some() {
                    params.tls_stats.record_finished_conn();
                }
            }
            if open_connection(connections, event_loop, params, static_request, pipeline, capture).is_err() {
                counters.connect_errors += 1;
            }
        }
        Action::ScheduleDelay { ms } => {
            let timer = event_loop.add_timer(ms, 0);
            delay_timers.insert(timer, token.0);
        }
    }
}

fn open_connection(
    connections: &mut Slab<Conn>,
    event_loop: &mut EventLoop,
    params: &WorkerParams,
    static_request: &Option<Arc<[u8]>>,
    pipeline: usize,
    capture: bool,
) -> io::Result<()> {
    let std_stream = connect_nonblocking(params.addr, params.config.source_addr)?;
    let stream = mio::net::TcpStream::from_connected(std_stream)?;

    let transport = match &params.tls_config {
        Some(cfg) => {
            params.tls_stats.record_new_conn();
            Transport::tls(stream, cfg.clone(), &params.config.host)?
        }
        None => Transport::plain(stream),
    };

    let entry = connections.vacant_entry();
    let token = Token(entry.key());
    let mut conn = Conn::new(token, transport, params.addr, pipeline, capture, static_request.clone());
    conn.register(event_loop.registry())?;
    entry.insert(conn);

    Ok(())
}
