//! Command-line surface and the immutable run configuration it produces.
//!
//! `clap`'s derive API replaces the hand-rolled `getopt_long` loop `wrk.c`
//! uses; [`scan_metric`] and [`scan_time`] are `clap` value parsers standing
//! in for its `scan_metric`/`scan_time` SI/time-suffix scanners, so `-c 10k`
//! and `-d 2m30s` keep working.

use std::net::Ipv4Addr;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::SurgeError;

#[derive(Debug, Parser)]
#[command(name = "surge", version, about = "HTTP/HTTPS load generator")]
struct Cli {
    /// Target URL, e.g. http://127.0.0.1:8080/path
    url: String,

    /// Total concurrent connections (SI suffixes: k, m).
    #[arg(short = 'c', long, value_parser = scan_metric, default_value = "10")]
    connections: u64,

    /// Test duration (time suffixes: s, m, h; default seconds).
    #[arg(short = 'd', long, value_parser = scan_time, default_value = "10s")]
    duration: Duration,

    /// Number of worker threads.
    #[arg(short = 't', long, default_value_t = 2)]
    threads: u64,

    /// Path to a script file for an embedded interpreter.
    #[arg(short = 's', long)]
    script: Option<String>,

    /// Additional request header "Key: Value"; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Suppress progress output.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print extra latency percentiles.
    #[arg(short = 'L', long = "latency")]
    latency_detail: bool,

    /// Per-request/socket timeout (time suffixes; default milliseconds).
    #[arg(short = 'T', long, value_parser = scan_time, default_value = "2000ms")]
    timeout: Duration,

    /// Enable TLS session reuse.
    #[arg(short = 'r', long = "reuse")]
    tls_session_reuse: bool,

    /// Disable HTTP keep-alive.
    #[arg(short = 'k', long = "no_keepalive")]
    no_keep_alive: bool,

    /// Bind outgoing connections to this source IPv4 address.
    #[arg(long = "bind")]
    source_addr: Option<Ipv4Addr>,
}

/// Immutable run configuration, produced once at startup from the CLI and
/// shared (read-only) across every worker.
#[derive(Debug, Clone)]
pub struct Config {
    pub connections: u64,
    pub threads: u64,
    pub duration: Duration,
    pub timeout: Duration,
    pub quiet: bool,
    pub latency_detail: bool,
    pub tls_session_reuse: bool,
    pub no_keep_alive: bool,
    pub dynamic: bool,
    pub delay: bool,
    pub host: String,
    pub scheme: Scheme,
    pub port: u16,
    pub path: String,
    pub headers: Vec<String>,
    pub script: Option<String>,
    pub source_addr: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Config {
    /// Parses `std::env::args()` into a [`Config`], exactly as `main` sees it.
    pub fn parse() -> Result<Self, SurgeError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, SurgeError> {
        if cli.connections < cli.threads {
            return Err(SurgeError::InvalidArgs(
                "connections must be >= threads".to_string(),
            ));
        }
        if cli.connections == 0 || cli.threads == 0 {
            return Err(SurgeError::InvalidArgs(
                "connections and threads must be nonzero".to_string(),
            ));
        }

        let url = Url::parse(&cli.url)
            .map_err(|e| SurgeError::InvalidArgs(format!("invalid URL {}: {e}", cli.url)))?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(SurgeError::InvalidArgs(format!(
                    "unsupported scheme {other}, expected http or https"
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| SurgeError::InvalidArgs("URL is missing a host".to_string()))?
            .to_string();

        let port = url.port().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        if path.is_empty() {
            path = "/".to_string();
        }

        for header in &cli.headers {
            if !header.contains(':') {
                return Err(SurgeError::InvalidArgs(format!(
                    "header {header:?} must be in \"Key: Value\" form"
                )));
            }
        }

        Ok(Config {
            connections: cli.connections,
            threads: cli.threads,
            duration: cli.duration,
            timeout: cli.timeout,
            quiet: cli.quiet,
            latency_detail: cli.latency_detail,
            tls_session_reuse: cli.tls_session_reuse,
            no_keep_alive: cli.no_keep_alive,
            dynamic: cli.script.is_some(),
            delay: false,
            host,
            scheme,
            port,
            path,
            headers: cli.headers,
            script: cli.script,
            source_addr: cli.source_addr,
        })
    }

    pub fn is_default_port(&self) -> bool {
        matches!(
            (self.scheme, self.port),
            (Scheme::Http, 80) | (Scheme::Https, 443)
        )
    }

    /// Connections assigned to worker `index` (0-based) out of
    /// `self.threads` workers: `connections / threads`, with the remainder
    /// distributed one-each to the first `connections % threads` workers.
    pub fn connections_for_worker(&self, index: u64) -> u64 {
        let base = self.connections / self.threads;
        let remainder = self.connections % self.threads;
        base + u64::from(index < remainder)
    }

    #[cfg(test)]
    pub fn for_test(host: &str, port: u16, path: &str) -> Self {
        Config {
            connections: 1,
            threads: 1,
            duration: Duration::from_secs(1),
            timeout: Duration::from_millis(2000),
            quiet: true,
            latency_detail: false,
            tls_session_reuse: false,
            no_keep_alive: false,
            dynamic: false,
            delay: false,
            host: host.to_string(),
            scheme: Scheme::Http,
            port,
            path: path.to_string(),
            headers: Vec::new(),
            script: None,
            source_addr: None,
        }
    }
}

/// Parses an integer with an optional SI suffix (`k` = 1_000, `m` =
/// 1_000_000), case-insensitive, matching `wrk.c`'s `scan_metric`.
fn scan_metric(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&'k') => (&s[..s.len() - 1], 1_000),
        Some(c) if c.eq_ignore_ascii_case(&'m') => (&s[..s.len() - 1], 1_000_000),
        Some(c) if c.eq_ignore_ascii_case(&'g') => (&s[..s.len() - 1], 1_000_000_000),
        _ => (s, 1),
    };

    let base: u64 = digits
        .parse()
        .map_err(|_| format!("invalid number: {s}"))?;
    Ok(base * multiplier)
}

/// Parses a duration with an optional time suffix (`ms`, `s`, `m`, `h`); a
/// bare number defaults to milliseconds, matching `wrk.c`'s `scan_time`.
fn scan_time(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if let Some(digits) = s.strip_suffix("ms") {
        let ms: u64 = digits.parse().map_err(|_| format!("invalid duration: {s}"))?;
        return Ok(Duration::from_millis(ms));
    }
    if let Some(digits) = s.strip_suffix('h') {
        let h: u64 = digits.parse().map_err(|_| format!("invalid duration: {s}"))?;
        return Ok(Duration::from_secs(h * 3600));
    }
    if let Some(digits) = s.strip_suffix('m') {
        let m: u64 = digits.parse().map_err(|_| format!("invalid duration: {s}"))?;
        return Ok(Duration::from_secs(m * 60));
    }
    if let Some(digits) = s.strip_suffix('s') {
        let secs: u64 = digits.parse().map_err(|_| format!("invalid duration: {s}"))?;
        return Ok(Duration::from_secs(secs));
    }

    let n: u64 = s.parse().map_err(|_| format!("invalid duration: {s}"))?;
    Ok(Duration::from_millis(n))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scan_metric_applies_si_suffixes() {
        assert_eq!(10, scan_metric("10").unwrap());
        assert_eq!(10_000, scan_metric("10k").unwrap());
        assert_eq!(5_000_000, scan_metric("5M").unwrap());
    }

    #[test]
    fn scan_time_applies_time_suffixes() {
        assert_eq!(Duration::from_secs(30), scan_time("30s").unwrap());
        assert_eq!(Duration::from_secs(120), scan_time("2m").unwrap());
        assert_eq!(Duration::from_millis(500), scan_time("500ms").unwrap());
        assert_eq!(Duration::from_secs(3600), scan_time("1h").unwrap());
    }

    #[test]
    fn connections_are_distributed_remainder_first() {
        let mut config = Config::for_test("h", 80, "/");
        config.connections = 10;
        config.threads = 3;

        assert_eq!(4, config.connections_for_worker(0));
        assert_eq!(3, config.connections_for_worker(1));
        assert_eq!(3, config.connections_for_worker(2));
    }

    #[test]
    fn from_cli_rejects_fewer_connections_than_threads() {
        let cli = Cli {
            url: "http://localhost/".to_string(),
            connections: 1,
            duration: Duration::from_secs(1),
            threads: 4,
            script: None,
            headers: Vec::new(),
            quiet: false,
            latency_detail: false,
            timeout: Duration::from_secs(1),
            tls_session_reuse: false,
            no_keep_alive: false,
            source_addr: None,
        };
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn from_cli_parses_host_port_and_path() {
        let cli = Cli {
            url: "http://example.com:8080/bench?x=1".to_string(),
            connections: 4,
            duration: Duration::from_secs(1),
            threads: 2,
            script: None,
            headers: vec!["X-Test: 1".to_string()],
            quiet: false,
            latency_detail: false,
            timeout: Duration::from_secs(1),
            tls_session_reuse: false,
            no_keep_alive: false,
            source_addr: None,
        };
        let config = Config::from_cli(cli).unwrap();
        assert_eq!("example.com", config.host);
        assert_eq!(8080, config.port);
        assert_eq!("/bench?x=1", config.path);
        assert_eq!(Scheme::Http, config.scheme);
    }
}
