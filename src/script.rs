//! The scripting hook contract consumed from an embedded interpreter.
//!
//! `surge` models this as a Rust trait and ships one concrete, non-scripted
//! implementation (`StaticScript`) rather than embedding a real interpreter
//! — wiring in something like `mlua` to drive user Lua scripts the way `wrk`
//! does is out of scope; the interpreter stays an external collaborator
//! behind this trait.

use crate::config::Config;

/// A completed response, handed to [`Script::response`] once the parser
/// finishes a message.
pub struct ResponseView<'a> {
    pub status: u16,
    /// `field\0value\0field\0value\0...`, empty unless capture is enabled.
    pub headers: &'a [u8],
    pub body: &'a [u8],
}

/// Aggregated totals handed to the summary/errors/done hooks after join.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub runtime_us: u64,
    pub requests: u64,
    pub bytes: u64,
    pub connect_errors: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub timeout_errors: u64,
    pub status_errors: u64,
}

/// The core's view of an embedded interpreter. One instance is created per
/// worker via [`Script::init`] (never shared across workers, matching the
/// rule that no worker touches another's interpreter state).
pub trait Script: Send {
    /// Called once per worker before its event loop starts.
    fn init(&mut self, worker_id: usize, argv: &[String]);

    /// Produces the bytes of the next request. Called once at worker
    /// startup if [`Script::is_static`], or before every write otherwise.
    fn request(&mut self) -> Vec<u8>;

    /// Milliseconds to wait before the next write, consulted only when
    /// [`Script::has_delay`] is true.
    fn delay(&mut self) -> u64 {
        0
    }

    /// Invoked once per completed response when [`Script::want_response`]
    /// is true.
    fn response(&mut self, _view: ResponseView<'_>) {}

    /// Invoked once per run after every worker has joined.
    fn summary(&mut self, _totals: RunTotals) {}

    /// Invoked once per run after every worker has joined, when any errors
    /// were recorded.
    fn errors(&mut self, _totals: RunTotals) {}

    /// Invoked once per run, after `summary`/`errors`, if [`Script::has_done`].
    fn done(&mut self, _totals: RunTotals) {}

    /// Pipeline depth to use; consulted once at startup.
    fn verify_request(&self) -> usize {
        1
    }

    /// Whether [`Script::request`] returns the same bytes every call (a
    /// static script builds its request once and reuses the buffer).
    fn is_static(&self) -> bool {
        true
    }

    /// Whether [`Script::delay`] should be consulted before each write.
    fn has_delay(&self) -> bool {
        false
    }

    /// Whether completed responses should be captured and handed to
    /// [`Script::response`]. Capture has a real cost (two growable buffers
    /// per connection), so it defaults to off.
    fn want_response(&self) -> bool {
        false
    }

    /// Whether [`Script::done`] should run after the report.
    fn has_done(&self) -> bool {
        false
    }
}

/// The default, non-scripted request generator: one fixed HTTP/1.1 request
/// built once from [`Config`] (method, path, host header, and any
/// user-supplied `-H` headers), reused verbatim for the life of the run.
#[derive(Debug, Clone)]
pub struct StaticScript {
    request: Vec<u8>,
}

impl StaticScript {
    pub fn new(config: &Config) -> Self {
        StaticScript {
            request: build_request(config),
        }
    }
}

impl Script for StaticScript {
    fn init(&mut self, _worker_id: usize, _argv: &[String]) {}

    fn request(&mut self) -> Vec<u8> {
        self.request.clone()
    }
}

fn build_request(config: &Config) -> Vec<u8> {
    let mut req = Vec::with_capacity(128);
    req.extend_from_slice(b"GET ");
    req.extend_from_slice(config.path.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\n");

    req.extend_from_slice(b"Host: ");
    req.extend_from_slice(config.host.as_bytes());
    if !config.is_default_port() {
        req.push(b':');
        req.extend_from_slice(config.port.to_string().as_bytes());
    }
    req.extend_from_slice(b"\r\n");

    if config.no_keep_alive {
        req.extend_from_slice(b"Connection: close\r\n");
    }

    let mut has_user_agent = false;
    for header in &config.headers {
        if header.to_ascii_lowercase().starts_with("user-agent:") {
            has_user_agent = true;
        }
        req.extend_from_slice(header.as_bytes());
        req.extend_from_slice(b"\r\n");
    }
    if !has_user_agent {
        req.extend_from_slice(b"User-Agent: surge\r\n");
    }

    req.extend_from_slice(b"\r\n");
    req
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn static_request_includes_host_and_path() {
        let config = Config::for_test("127.0.0.1", 8080, "/bench");
        let script = StaticScript::new(&config);
        let req = String::from_utf8(script.request.clone()).unwrap();

        assert!(req.starts_with("GET /bench HTTP/1.1\r\n"));
        assert!(req.contains("Host: 127.0.0.1:8080\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn custom_headers_are_appended() {
        let mut config = Config::for_test("example.com", 80, "/");
        config.headers.push("X-Bench: 1".to_string());
        let script = StaticScript::new(&config);
        let req = String::from_utf8(script.request.clone()).unwrap();

        assert!(req.contains("X-Bench: 1\r\n"));
        // default HTTP port is omitted from the Host header.
        assert!(req.contains("Host: example.com\r\n"));
    }

    #[test]
    fn no_keep_alive_adds_connection_close() {
        let mut config = Config::for_test("example.com", 80, "/");
        config.no_keep_alive = true;
        let script = StaticScript::new(&config);
        let req = String::from_utf8(script.request.clone()).unwrap();
        assert!(req.contains("Connection: close\r\n"));
    }
}
