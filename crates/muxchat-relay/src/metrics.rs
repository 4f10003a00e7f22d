use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::StreamFailure;

/// Monotonic counters shared by every transcoder of one relay.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    streams_started: AtomicU64,
    streams_completed: AtomicU64,
    text_events: AtomicU64,
    protocol_errors: AtomicU64,
    protocol_failures: AtomicU64,
    upstream_failures: AtomicU64,
    upstream_timeouts: AtomicU64,
    cancelled: AtomicU64,
}

/// Point-in-time copy of `RelayMetrics`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub streams_started: u64,
    pub streams_completed: u64,
    pub text_events: u64,
    /// Upstream increments skipped because they could not be decoded.
    pub protocol_errors: u64,
    /// Streams ended because the upstream did not speak the expected protocol.
    pub protocol_failures: u64,
    pub upstream_failures: u64,
    pub upstream_timeouts: u64,
    pub cancelled: u64,
}

impl RelayMetrics {
    pub(crate) fn record_started(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.streams_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_text_event(&self) {
        self.text_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, failure: StreamFailure) {
        let counter = match failure {
            StreamFailure::UpstreamUnavailable => &self.upstream_failures,
            StreamFailure::UpstreamProtocol => &self.protocol_failures,
            StreamFailure::UpstreamTimeout => &self.upstream_timeouts,
            StreamFailure::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            text_events: self.text_events.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            protocol_failures: self.protocol_failures.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            upstream_timeouts: self.upstream_timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
