//! Service counters, exposed in Prometheus text format on `/metrics`.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

/// Monotonic event count.
pub struct Counter(AtomicU64);

impl Counter {
    const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Total time spent plus the slowest sample since the last scrape, in µs.
pub struct Latency {
    sum_us: AtomicU64,
    max_us: AtomicU64,
}

impl Latency {
    const fn new() -> Self {
        Self {
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    pub fn record(&self, start: Instant) {
        let us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    fn sum_seconds(&self) -> Seconds {
        Seconds(self.sum_us.load(Ordering::Relaxed))
    }

    fn take_max_seconds(&self) -> Seconds {
        Seconds(self.max_us.swap(0, Ordering::Relaxed))
    }
}

struct Seconds(u64);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0 as f64 / 1_000_000.0)
    }
}

pub struct Metrics {
    pub logins_started: Counter,
    pub logins_completed: Counter,
    pub login_failures: Counter,

    pub proof_requests: Counter,
    pub proof_failures: Counter,
    pub proof_latency: Latency,

    pub tx_submitted: Counter,
    pub tx_confirmed: Counter,
    pub tx_rejected: Counter,
    pub tx_latency: Latency,

    pub rpc_failovers: Counter,
    pub rpc_errors: Counter,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            logins_started: Counter::new(),
            logins_completed: Counter::new(),
            login_failures: Counter::new(),
            proof_requests: Counter::new(),
            proof_failures: Counter::new(),
            proof_latency: Latency::new(),
            tx_submitted: Counter::new(),
            tx_confirmed: Counter::new(),
            tx_rejected: Counter::new(),
            tx_latency: Latency::new(),
            rpc_failovers: Counter::new(),
            rpc_errors: Counter::new(),
        }
    }

    fn counters(&self) -> [(&'static str, &'static str, &Counter); 10] {
        [
            ("zklogin_logins_started_total", "Login attempts started.", &self.logins_started),
            ("zklogin_logins_completed_total", "Logins that produced credentials.", &self.logins_completed),
            ("zklogin_login_failures_total", "Failed login completions.", &self.login_failures),
            ("zklogin_proof_requests_total", "Proof requests sent to the prover.", &self.proof_requests),
            ("zklogin_proof_failures_total", "Proof requests that failed.", &self.proof_failures),
            ("zklogin_tx_submitted_total", "Sponsored transactions submitted.", &self.tx_submitted),
            ("zklogin_tx_confirmed_total", "Submitted transactions that succeeded.", &self.tx_confirmed),
            ("zklogin_tx_rejected_total", "Submitted transactions the network rejected.", &self.tx_rejected),
            ("zklogin_rpc_failovers_total", "RPC primary-to-fallback failovers.", &self.rpc_failovers),
            ("zklogin_rpc_errors_total", "RPC errors.", &self.rpc_errors),
        ]
    }

    fn latencies(&self) -> [(&'static str, &'static str, &Latency); 2] {
        [
            ("zklogin_proof_duration_seconds", "prover round trip", &self.proof_latency),
            ("zklogin_tx_duration_seconds", "submission", &self.tx_latency),
        ]
    }

    /// Prometheus text exposition. Latency maxima reset on every call.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);
        for (name, help, counter) in self.counters() {
            sample(&mut out, name, help, "counter", counter.get());
        }
        for (base, what, latency) in self.latencies() {
            sample(
                &mut out,
                &format!("{base}_sum"),
                &format!("Total {what} time (seconds)."),
                "counter",
                latency.sum_seconds(),
            );
            sample(
                &mut out,
                &format!("{base}_max"),
                &format!("Slowest {what} since last scrape (seconds)."),
                "gauge",
                latency.take_max_seconds(),
            );
        }
        out
    }
}

fn sample(out: &mut String, name: &str, help: &str, kind: &str, value: impl fmt::Display) {
    // Writing into a String cannot fail.
    let _ = write!(out, "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n");
}
