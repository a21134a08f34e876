//! End-to-end scenarios driving a real worker thread against a loopback
//! mock HTTP server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use surge::config::{Config, Scheme};
use surge::stats::Stats;
use surge::tls_context::TlsSessionStats;
use surge::worker::{self, WorkerParams};

fn test_config(port: u16, timeout: Duration, no_keep_alive: bool) -> Config {
    Config {
        connections: 1,
        threads: 1,
        duration: Duration::from_secs(1),
        timeout,
        quiet: true,
        latency_detail: false,
        tls_session_reuse: false,
        no_keep_alive,
        dynamic: false,
        delay: false,
        host: "127.0.0.1".to_string(),
        scheme: Scheme::Http,
        port,
        path: "/".to_string(),
        headers: Vec::new(),
        script: None,
        source_addr: None,
    }
}

/// Runs one worker against `addr` for `run_for`, returning its final counters.
fn run_worker(config: Config, run_for: Duration) -> surge::connection::WorkerCounters {
    let addr = format!("{}:{}", config.host, config.port).parse().unwrap();
    let timeout_us = (config.timeout.as_micros() as u64).max(1);

    let params = WorkerParams {
        id: 0,
        config: Arc::new(config),
        addr,
        tls_config: None,
        tls_stats: Arc::new(TlsSessionStats::default()),
        latency: Arc::new(Stats::new(timeout_us)),
        rate: Arc::new(Stats::new(10_000_000)),
        stop: Arc::new(AtomicBool::new(false)),
    };
    let stop = params.stop.clone();

    let handle = worker::spawn(params).expect("worker thread spawns");
    thread::sleep(run_for);
    stop.store(true, Ordering::Relaxed);
    handle.join().expect("worker thread does not panic")
}

/// Serves `response` to every request accepted on `listener`; closes the
/// connection after writing if `close_after_write` is set, otherwise keeps
/// reading and responding until the client hangs up.
fn serve_fixed_response(listener: TcpListener, response: &'static [u8], close_after_write: bool) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            thread::spawn(move || {
                handle_fixed(&mut stream, response, close_after_write);
            });
        }
    });
}

fn handle_fixed(stream: &mut TcpStream, response: &'static [u8], close_after_write: bool) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                if stream.write_all(response).is_err() {
                    return;
                }
                if close_after_write {
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                    return;
                }
            }
        }
    }
}

/// Like [`serve_fixed_response`] but sleeps `delay` before replying, to
/// exercise the timeout path.
fn serve_slow(listener: TcpListener, response: &'static [u8], delay: Duration) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {
                            thread::sleep(delay);
                            if stream.write_all(response).is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
}

const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
const NOT_FOUND_RESPONSE: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
const CLOSE_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

#[test]
fn static_single_connection_no_tls() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_fixed_response(listener, OK_RESPONSE, false);

    let config = test_config(port, Duration::from_millis(2000), false);
    let counters = run_worker(config, Duration::from_millis(800));

    assert!(counters.complete > 0, "expected at least one completed request");
    assert_eq!(0, counters.status_errors);
    assert_eq!(0, counters.connect_errors);
    assert_eq!(counters.complete * OK_RESPONSE.len() as u64, counters.bytes);
}

#[test]
fn not_found_responses_count_as_status_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_fixed_response(listener, NOT_FOUND_RESPONSE, false);

    let config = test_config(port, Duration::from_millis(2000), false);
    let counters = run_worker(config, Duration::from_millis(800));

    assert!(counters.complete > 0);
    assert_eq!(counters.complete, counters.status_errors);
}

#[test]
fn slow_server_triggers_timeouts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_slow(listener, OK_RESPONSE, Duration::from_millis(500));

    let config = test_config(port, Duration::from_millis(100), false);
    let counters = run_worker(config, Duration::from_millis(1200));

    assert!(counters.complete > 0, "expected at least one slow completion");
    assert_eq!(counters.complete, counters.timeout_errors);
}

#[test]
fn connection_churn_reconnects_after_each_response() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_fixed_response(listener, CLOSE_RESPONSE, true);

    let config = test_config(port, Duration::from_millis(2000), false);
    let counters = run_worker(config, Duration::from_millis(800));

    assert!(counters.connects > 1, "expected several reconnects from server-side closes");
    // Every connect either completes exactly one response before the peer
    // closes, or (the last one) is still in flight when stop fires.
    assert!(counters.connects == counters.complete || counters.connects == counters.complete + 1);
}
