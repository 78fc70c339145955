//! Metrics instrumentation for libvirt-dns.
//!
//! All metrics are prefixed with `libvirt_dns.`

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: Duration) {
    counter!(
        "libvirt_dns.query.count",
        "type" => record_type.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
    histogram!("libvirt_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// How the dispatcher finished a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Authoritative answer with at least one record.
    Answered,
    /// Authoritative answer, but every address was filtered out.
    Empty,
    /// Handed to the next stage.
    Delegated,
    /// SERVFAIL.
    Failed,
}

impl QueryResult {
    /// Label value for this result.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Empty => "empty",
            Self::Delegated => "delegated",
            Self::Failed => "failed",
        }
    }
}

/// Record the number of addresses placed in an answer.
pub fn record_addresses_returned(count: usize) {
    histogram!("libvirt_dns.query.addresses_returned").record(count as f64);
}

/// Record how long reading the state directory took and how many bridges it held.
pub fn record_state_load(duration: Duration, bridges: usize) {
    histogram!("libvirt_dns.state.load.duration.seconds").record(duration.as_secs_f64());
    histogram!("libvirt_dns.state.bridges").record(bridges as f64);
}

/// Record a failed state directory load.
pub fn record_state_load_error(kind: &'static str) {
    counter!("libvirt_dns.state.load.error.count", "kind" => kind).increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
