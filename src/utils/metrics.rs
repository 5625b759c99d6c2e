//! Observability and Metrics
//!
//! Counters for the timing feed: connections, traffic, framing and key
//! recovery outcomes.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for timing feed connections
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Resolution or connect failures
    pub connection_errors: AtomicU64,
    /// Total bytes read off the wire
    pub bytes_received: AtomicU64,
    /// Non-empty reads
    pub reads_total: AtomicU64,
    /// Polls that timed out without data
    pub idle_polls: AtomicU64,
    /// Keep-alive bytes written
    pub pings_sent: AtomicU64,
    /// Packets completed by the framer
    pub packets_framed: AtomicU64,
    /// Fatal framing errors
    pub framing_errors: AtomicU64,
    /// Keys recovered (including plaintext feeds)
    pub keys_recovered: AtomicU64,
    /// Failed key recovery attempts
    pub key_recovery_failures: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            reads_total: AtomicU64::new(0),
            idle_polls: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            packets_framed: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            keys_recovered: AtomicU64::new(0),
            key_recovery_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never wraps below zero, even if a close is reported twice
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a non-empty read
    pub fn bytes_read(&self, byte_count: u64) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_framed(&self) {
        self.packets_framed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_recovered(&self) {
        self.keys_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_recovery_failed(&self) {
        self.key_recovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            reads_total: self.reads_total.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            packets_framed: self.packets_framed.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            keys_recovered: self.keys_recovered.load(Ordering::Relaxed),
            key_recovery_failures: self.key_recovery_failures.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connection_errors = snapshot.connection_errors,
            bytes_received = snapshot.bytes_received,
            reads_total = snapshot.reads_total,
            idle_polls = snapshot.idle_polls,
            pings_sent = snapshot.pings_sent,
            packets_framed = snapshot.packets_framed,
            framing_errors = snapshot.framing_errors,
            keys_recovered = snapshot.keys_recovered,
            key_recovery_failures = snapshot.key_recovery_failures,
            uptime_seconds = snapshot.uptime_seconds,
            "Timing feed metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connection_errors: u64,
    pub bytes_received: u64,
    pub reads_total: u64,
    pub idle_polls: u64,
    pub pings_sent: u64,
    pub packets_framed: u64,
    pub framing_errors: u64,
    pub keys_recovered: u64,
    pub key_recovery_failures: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Logs how long an operation took when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.bytes_read(40);
        metrics.bytes_read(2);
        metrics.packet_framed();
        metrics.ping_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.bytes_received, 42);
        assert_eq!(snapshot.reads_total, 2);
        assert_eq!(snapshot.packets_framed, 1);
        assert_eq!(snapshot.pings_sent, 1);
    }

    #[test]
    fn test_active_connections_do_not_underflow() {
        let metrics = Metrics::new();
        metrics.connection_closed();
        assert_eq!(metrics.snapshot().connections_active, 0);

        metrics.connection_established();
        metrics.connection_closed();
        metrics.connection_closed();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active, 0);
        assert_eq!(snapshot.connections_total, 1);
    }
}
