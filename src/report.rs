//! Stdout report formatting, in the shape of `wrk.c`'s `Thread Stats`
//! table plus totals, error, and TLS lines.

use crate::config::Config;
use crate::connection::WorkerCounters;
use crate::stats::Stats;
use crate::tls_context::TlsSessionStats;

const PERCENTILES: [f64; 4] = [50.0, 75.0, 90.0, 99.0];

pub fn print(
    config: &Config,
    runtime_us: u64,
    totals: WorkerCounters,
    latency: &Stats,
    rate: &Stats,
    tls_stats: &TlsSessionStats,
) {
    println!("surge {} [mio]", env!("CARGO_PKG_VERSION"));
    println!(
        "Running {} test @ {}://{}{}",
        fmt_time_us(config.duration.as_micros() as f64),
        scheme_str(config),
        config.host,
        config.path
    );
    println!(
        "  {} threads and {} connections",
        config.threads, config.connections
    );

    let lat_mean = latency.mean();
    let lat_stdev = latency.stdev(lat_mean);
    let lat_within = latency.within_stdev(lat_mean, lat_stdev, 1.0);

    let rate_mean = rate.mean();
    let rate_stdev = rate.stdev(rate_mean);
    let rate_within = rate.within_stdev(rate_mean, rate_stdev, 1.0);

    println!(
        "  Thread Stats{:>10}{:>10}{:>10}{:>10}",
        "Avg", "Stdev", "Max", "+/- Stdev"
    );
    println!(
        "    Latency  {:>9}{:>10}{:>10}{:>9.2}%",
        fmt_time_us(lat_mean),
        fmt_time_us(lat_stdev),
        fmt_time_us(latency.max() as f64),
        lat_within
    );
    println!(
        "    Req/Sec  {:>9}{:>10}{:>10}{:>9.2}%",
        fmt_metric(rate_mean),
        fmt_metric(rate_stdev),
        fmt_metric(rate.max() as f64),
        rate_within
    );

    if config.latency_detail {
        println!("  Latency Distribution");
        for p in PERCENTILES {
            println!("    {:>5.0}%{:>11}", p, fmt_time_us(latency.percentile(p) as f64));
        }
    }

    let runtime_s = (runtime_us as f64 / 1_000_000.0).max(f64::MIN_POSITIVE);

    println!(
        "  {} requests in {}, {} read",
        totals.requests,
        fmt_time_us(runtime_us as f64),
        fmt_bytes(totals.bytes as f64)
    );

    let socket_errors = totals.connect_errors + totals.read_errors + totals.write_errors + totals.timeout_errors;
    if socket_errors > 0 {
        println!(
            "  Socket errors: connect {}, read {}, write {}, timeout {}",
            totals.connect_errors, totals.read_errors, totals.write_errors, totals.timeout_errors
        );
    }
    if totals.status_errors > 0 {
        println!("  Non-2xx or 3xx responses: {}", totals.status_errors);
    }

    println!("Requests/sec: {:>10.2}", totals.requests as f64 / runtime_s);
    println!("Transfer/sec: {:>10}", fmt_bytes(totals.bytes as f64 / runtime_s));

    let tls = tls_stats.snapshot();
    if tls.new_conn > 0 || tls.reused > 0 {
        println!(
            "TLS: new conn {}, reused {}, miss {}, finished {}",
            tls.new_conn, tls.reused, tls.miss, tls.finished_conn
        );
    }
}

fn scheme_str(config: &Config) -> &'static str {
    match config.scheme {
        crate::config::Scheme::Http => "http",
        crate::config::Scheme::Https => "https",
    }
}

/// Formats a microsecond value with the largest whole-number-friendly unit,
/// matching `wrk.c`'s `print_units` behavior for time.
fn fmt_time_us(us: f64) -> String {
    if us < 1000.0 {
        format!("{us:.2}us")
    } else if us < 1_000_000.0 {
        format!("{:.2}ms", us / 1000.0)
    } else if us < 60_000_000.0 {
        format!("{:.2}s", us / 1_000_000.0)
    } else {
        format!("{:.2}m", us / 60_000_000.0)
    }
}

/// Formats a plain count with an SI suffix (k/M/G), matching `wrk.c`'s
/// `print_units` behavior for the Req/Sec column.
fn fmt_metric(v: f64) -> String {
    if v < 1_000.0 {
        format!("{v:.2}")
    } else if v < 1_000_000.0 {
        format!("{:.2}k", v / 1_000.0)
    } else if v < 1_000_000_000.0 {
        format!("{:.2}M", v / 1_000_000.0)
    } else {
        format!("{:.2}G", v / 1_000_000_000.0)
    }
}

/// Formats a byte count with a binary suffix (KB/MB/GB).
fn fmt_bytes(v: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if v < KB {
        format!("{v:.2}B")
    } else if v < MB {
        format!("{:.2}KB", v / KB)
    } else if v < GB {
        format!("{:.2}MB", v / MB)
    } else {
        format!("{:.2}GB", v / GB)
    }
}
