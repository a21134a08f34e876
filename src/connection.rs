//! The per-connection state machine: connect → write → read → parse →
//! record → repeat/reconnect.
//!
//! Rather than a `Connection` trait realized by separate plain/TLS structs,
//! dispatch is collapsed into [`crate::transport::Transport`] so this struct
//! stays transport-agnostic while driving an outbound request/response
//! cycle.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use mio::event::Source;
use mio::{Interest, Registry, Token};

use crate::clock::now_us;
use crate::config::Config;
use crate::net::tcp_stream::TcpStream;
use crate::parser::response::{Completion, ResponseParser};
use crate::script::{ResponseView, Script};
use crate::stats::Stats;
use crate::transport::Transport;

/// Size of one non-blocking read, matching `wrk.c`'s `RECVBUF`.
pub const RECVBUF: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Writing,
    Reading,
    Delayed,
}

/// What a connection wants its owning worker to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do; the connection handled the event itself.
    None,
    /// The connection hit an unrecoverable error or the peer closed; the
    /// worker should tear it down and open a fresh one in its place.
    Reconnect,
    /// `delayed` was set; the worker should arm a one-shot timer for `ms`
    /// and call [`Connection::resume_after_delay`] when it fires.
    ScheduleDelay { ms: u64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerCounters {
    pub complete: u64,
    pub requests: u64,
    pub bytes: u64,
    pub connects: u64,
    pub connect_errors: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub timeout_errors: u64,
    pub status_errors: u64,
}

/// The request bytes a connection writes: either a shared, pre-built static
/// buffer (the common case) or a fresh one pulled from the script before
/// every send.
#[derive(Debug)]
enum RequestBuf {
    Static(Arc<[u8]>),
    Dynamic(Vec<u8>),
}

impl RequestBuf {
    fn bytes(&self) -> &[u8] {
        match self {
            RequestBuf::Static(b) => b,
            RequestBuf::Dynamic(b) => b,
        }
    }
}

/// Everything a connection needs from its worker to advance, bundled so
/// [`Connection::on_event`] doesn't need a dozen parameters.
pub struct ConnDeps<'a> {
    pub registry: &'a Registry,
    pub config: &'a Config,
    pub script: &'a mut dyn Script,
    pub latency: &'a Stats,
    pub counters: &'a mut WorkerCounters,
}

pub struct Connection<S: TcpStream + Read + Write + Source> {
    token: Token,
    transport: Transport<S>,
    state: State,
    parser: ResponseParser,
    request: RequestBuf,
    pipeline: usize,
    written: usize,
    pending: usize,
    delayed: bool,
    start_us: u64,
    capture: bool,
    remote_addr: SocketAddr,
}

impl<S: TcpStream + Read + Write + Source> Connection<S> {
    /// Wraps a freshly created, still-connecting transport. The caller has
    /// already created the non-blocking socket and begun `connect()`.
    pub fn new(
        token: Token,
        transport: Transport<S>,
        remote_addr: SocketAddr,
        pipeline: usize,
        capture: bool,
        static_request: Option<Arc<[u8]>>,
    ) -> Self {
        let request = match static_request {
            Some(bytes) => RequestBuf::Static(bytes),
            None => RequestBuf::Dynamic(Vec::new()),
        };

        Connection {
            token,
            transport,
            state: State::Connecting,
            parser: ResponseParser::new(capture),
            request,
            pipeline: pipeline.max(1),
            written: 0,
            pending: 0,
            delayed: false,
            start_us: 0,
            capture,
            remote_addr,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Registers for both readiness kinds, as required the moment a socket
    /// is created: a still-connecting socket becomes writable on success.
    pub fn register(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.transport
            .register(registry, self.token, Interest::READABLE | Interest::WRITABLE)
    }

    pub fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.transport.deregister(registry)
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Advances the state machine in response to one readiness event.
    pub fn on_event(&mut self, readable: bool, writable: bool, error: bool, deps: &mut ConnDeps) -> Action {
        if error {
            let kind = match self.state {
                State::Connecting => ErrorKind::Connect,
                State::Reading => ErrorKind::Read,
                State::Writing | State::Delayed => ErrorKind::Write,
            };
            return self.fail(deps, kind);
        }

        match self.state {
            State::Connecting => {
                if writable {
                    self.advance_connect(deps)
                } else {
                    Action::None
                }
            }
            State::Writing => {
                if writable {
                    self.do_write(deps)
                } else if readable {
                    self.drain_unexpected_read(deps)
                } else {
                    Action::None
                }
            }
            State::Reading => {
                if readable {
                    self.do_read(deps)
                } else {
                    Action::None
                }
            }
            State::Delayed => Action::None,
        }
    }

    /// Called by the worker once the delay timer armed by
    /// [`Action::ScheduleDelay`] fires.
    pub fn resume_after_delay(&mut self, deps: &mut ConnDeps) -> Action {
        self.delayed = false;
        self.state = State::Writing;
        if self
            .transport
            .reregister(deps.registry, self.token, Interest::READABLE | Interest::WRITABLE)
            .is_err()
        {
            return self.fail(deps, ErrorKind::Write);
        }
        Action::None
    }

    fn advance_connect(&mut self, deps: &mut ConnDeps) -> Action {
        match self.transport.connect() {
            crate::transport::Outcome::Retry => Action::None,
            crate::transport::Outcome::Error => self.fail(deps, ErrorKind::Connect),
            crate::transport::Outcome::Ok => match self.transport.take_error() {
                Ok(None) => {
                    deps.counters.connects += 1;
                    self.parser.reset();
                    self.written = 0;
                    self.state = State::Writing;
                    self.do_write(deps)
                }
                _ => self.fail(deps, ErrorKind::Connect),
            },
        }
    }

    fn do_write(&mut self, deps: &mut ConnDeps) -> Action {
        if self.delayed {
            let ms = deps.script.delay();
            self.state = State::Delayed;
            if self
                .transport
                .reregister(deps.registry, self.token, Interest::READABLE)
                .is_err()
            {
                return self.fail(deps, ErrorKind::Write);
            }
            return Action::ScheduleDelay { ms };
        }

        if self.written == 0 {
            if deps.config.dynamic {
                let mut bytes = Vec::new();
                for _ in 0..self.pipeline {
                    bytes.extend_from_slice(&deps.script.request());
                }
                self.request = RequestBuf::Dynamic(bytes);
            }
            self.start_us = now_us();
            self.pending = self.pipeline;
        }

        loop {
            let remaining = &self.request.bytes()[self.written..];
            if remaining.is_empty() {
                break;
            }

            let mut n = 0usize;
            match self.transport.write(remaining, &mut n) {
                crate::transport::Outcome::Ok => {
                    if n == 0 {
                        break;
                    }
                    self.written += n;
                }
                crate::transport::Outcome::Retry => return Action::None,
                crate::transport::Outcome::Error => return self.fail(deps, ErrorKind::Write),
            }
        }

        if self.written < self.request.bytes().len() {
            // Partial write exhausted this writable event; wait for the next.
            return Action::None;
        }

        self.written = 0;
        self.state = State::Reading;
        if self
            .transport
            .reregister(deps.registry, self.token, Interest::READABLE)
            .is_err()
        {
            return self.fail(deps, ErrorKind::Write);
        }
        Action::None
    }

    /// A connection in `Writing` or `Delayed` shouldn't normally see a
    /// readable event (nothing outstanding to read), but an early peer
    /// close still shows up as readable-with-EOF; treat it as a read error.
    fn drain_unexpected_read(&mut self, deps: &mut ConnDeps) -> Action {
        let mut buf = [0u8; 1];
        let mut n = 0usize;
        match self.transport.read(&mut buf, &mut n) {
            crate::transport::Outcome::Ok if n == 0 => self.fail(deps, ErrorKind::Read),
            crate::transport::Outcome::Error => self.fail(deps, ErrorKind::Read),
            _ => Action::None,
        }
    }

    fn do_read(&mut self, deps: &mut ConnDeps) -> Action {
        let mut buf = [0u8; RECVBUF];

        loop {
            let mut n = 0usize;
            match self.transport.read(&mut buf, &mut n) {
                crate::transport::Outcome::Retry => return Action::None,
                crate::transport::Outcome::Error => return self.fail(deps, ErrorKind::Read),
                crate::transport::Outcome::Ok if n == 0 => return self.handle_eof(deps),
                crate::transport::Outcome::Ok => {
                    deps.counters.bytes += n as u64;

                    let mut reconnect = false;
                    let mut resume_writing = false;

                    let mut parser = std::mem::replace(&mut self.parser, ResponseParser::new(self.capture));
                    let outcome = parser.execute(&buf[..n], |c| {
                        let (rc, rw) = self.on_response_complete(deps, c);
                        reconnect |= rc;
                        resume_writing |= rw;
                    });
                    self.parser = parser;

                    match outcome {
                        Ok(consumed) if consumed == n => {}
                        _ => return self.fail(deps, ErrorKind::Read),
                    }

                    if reconnect {
                        return Action::Reconnect;
                    }
                    if resume_writing && self.begin_next_write(deps).is_err() {
                        return self.fail(deps, ErrorKind::Write);
                    }

                    if n < RECVBUF || !self.transport.readable() {
                        return Action::None;
                    }
                }
            }
        }
    }

    fn handle_eof(&mut self, deps: &mut ConnDeps) -> Action {
        let had_pending = self.pending > 0;

        // An `UntilClose` body completes exactly via EOF; whether the
        // completion also demanded keep-alive is moot since the socket is
        // already gone either way.
        let mut parser = std::mem::replace(&mut self.parser, ResponseParser::new(self.capture));
        let completed = parser.eof(|c| {
            self.on_response_complete(deps, c);
        });
        self.parser = parser;

        if had_pending && !completed {
            deps.counters.read_errors += 1;
        }
        Action::Reconnect
    }

    /// Applies one completed response's bookkeeping. Returns
    /// `(should_reconnect, should_resume_writing)`.
    fn on_response_complete(&mut self, deps: &mut ConnDeps, c: Completion<'_>) -> (bool, bool) {
        deps.counters.complete += 1;
        deps.counters.requests += 1;
        if c.status >= 400 {
            deps.counters.status_errors += 1;
        }

        if self.capture {
            deps.script.response(ResponseView {
                status: c.status,
                headers: c.headers,
                body: c.body,
            });
        }

        self.pending = self.pending.saturating_sub(1);

        let mut resume_writing = false;
        if self.pending == 0 {
            let latency = now_us().saturating_sub(self.start_us);
            if !deps.latency.record(latency) {
                deps.counters.timeout_errors += 1;
            }
            self.delayed = deps.config.delay;
            resume_writing = true;
        }

        let must_reconnect = deps.config.no_keep_alive || !c.keep_alive;
        (must_reconnect, resume_writing)
    }

    fn begin_next_write(&mut self, deps: &mut ConnDeps) -> std::io::Result<()> {
        self.state = State::Writing;
        self.transport
            .reregister(deps.registry, self.token, Interest::READABLE | Interest::WRITABLE)
    }

    fn fail(&mut self, deps: &mut ConnDeps, kind: ErrorKind) -> Action {
        match kind {
            ErrorKind::Connect => deps.counters.connect_errors += 1,
            ErrorKind::Read => deps.counters.read_errors += 1,
            ErrorKind::Write => deps.counters.write_errors += 1,
        }
        Action::Reconnect
    }
}

#[derive(Debug, Clone, Copy)]
enum ErrorKind {
    Connect,
    Read,
    Write,
}

impl<S: TcpStream + Read + Write + Source> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::io::Read as _;
    use std::io::Write as _;
    use std::net::TcpListener;
    use std::time::Duration;

    use mio::{Events, Poll, Token};

    use super::*;
    use crate::config::Config;
    use crate::net::connect::connect_nonblocking;
    use crate::script::StaticScript;

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

    /// Drives one `Connection` against a real loopback listener with
    /// pipeline depth 4, whose server writes all four responses back to
    /// back once it has seen all four pipelined requests arrive.
    #[test]
    fn pipelined_requests_complete_together() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let request = build_request_bytes(&addr);
        let expected_bytes = request.len() * 4;

        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while received.len() < expected_bytes {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    return;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let batch = RESPONSE.repeat(4);
            stream.write_all(&batch).unwrap();
        });

        let config = Config::for_test(&addr.ip().to_string(), addr.port(), "/");
        let mut script: Box<dyn Script> = Box::new(StaticScript::new(&config));
        let latency = Stats::new(60_000_000);
        let mut counters = WorkerCounters::default();

        let static_request: Arc<[u8]> = Arc::from(request.repeat(4).into_boxed_slice());

        let std_stream = connect_nonblocking(addr, None).unwrap();
        let stream = mio::net::TcpStream::from_std(std_stream);

        let mut poll = Poll::new().unwrap();
        let mut events = Events::with_capacity(16);

        let transport = Transport::plain(stream);
        let mut conn = Connection::new(Token(0), transport, addr, 4, false, Some(static_request));
        conn.register(poll.registry()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counters.complete < 4 && std::time::Instant::now() < deadline {
            poll.poll(&mut events, Some(Duration::from_millis(200))).unwrap();
            for ev in events.iter() {
                let mut deps = ConnDeps {
                    registry: poll.registry(),
                    config: &config,
                    script: script.as_mut(),
                    latency: &latency,
                    counters: &mut counters,
                };
                conn.on_event(ev.is_readable(), ev.is_writable(), ev.is_error(), &mut deps);
            }
        }

        assert_eq!(4, counters.complete);
        assert_eq!(0, counters.read_errors);
        assert_eq!(1, latency.count(), "one latency sample per completed pipeline batch");
    }

    fn build_request_bytes(addr: &std::net::SocketAddr) -> Vec<u8> {
        let config = Config::for_test(&addr.ip().to_string(), addr.port(), "/");
        let mut script = StaticScript::new(&config);
        script.request()
    }
}
