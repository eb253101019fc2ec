//! Thread-safe metrics collection system
//!
//! Atomic counters tracking connection attempts, retry orchestration and
//! message traffic on the control plane channel.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Connection metrics
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connected_since: AtomicU64,

    // Orchestration metrics
    reconnects_triggered: AtomicU64,
    orchestrations_exhausted: AtomicU64,

    // Message metrics
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,

    started_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connected_since: AtomicU64::new(0),
            reconnects_triggered: AtomicU64::new(0),
            orchestrations_exhausted: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
        }
    }

    // Connection metrics
    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Track whether the channel currently holds an open connection
    pub fn set_connected(&self, connected: bool) {
        let was_connected = self.connected.swap(connected, Ordering::Relaxed);
        if connected && !was_connected {
            self.connected_since
                .store(current_timestamp(), Ordering::Relaxed);
        } else if !connected {
            self.connected_since.store(0, Ordering::Relaxed);
        }
    }

    // Orchestration metrics
    pub fn reconnect_triggered(&self) {
        self.reconnects_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn orchestration_exhausted(&self) {
        self.orchestrations_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    // Message metrics
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        self.connected_since.store(0, Ordering::Relaxed);
        self.reconnects_triggered.store(0, Ordering::Relaxed);
        self.orchestrations_exhausted.store(0, Ordering::Relaxed);
        self.messages_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.messages_dropped.store(0, Ordering::Relaxed);
        self.started_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Seconds the current connection has been open (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.connected.load(Ordering::Relaxed) {
            return 0;
        }
        match self.connected_since.load(Ordering::Relaxed) {
            0 => 0,
            since => now.saturating_sub(since),
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            orchestration: OrchestrationMetrics {
                reconnects_triggered: self.reconnects_triggered.load(Ordering::Relaxed),
                orchestrations_exhausted: self.orchestrations_exhausted.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                messages_sent: self.messages_sent.load(Ordering::Relaxed),
                send_failures: self.send_failures.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub orchestration: OrchestrationMetrics,
    pub messages: MessageMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationMetrics {
    pub reconnects_triggered: u64,
    pub orchestrations_exhausted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub messages_sent: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_connection_metrics() {
        let collector = MetricsCollector::new();

        collector.connection_attempt();
        collector.connection_failed();
        collector.connection_attempt();
        collector.connection_established();
        collector.set_connected(true);

        let metrics = collector.get_metrics();
        assert_eq!(metrics.connection.connection_attempts, 2);
        assert_eq!(metrics.connection.connection_failures, 1);
        assert_eq!(metrics.connection.connections_established, 1);
        assert!(metrics.connection.connected);
    }

    #[test]
    fn test_disconnect_clears_duration() {
        let collector = MetricsCollector::new();

        collector.set_connected(true);
        collector.set_connected(false);

        let metrics = collector.get_metrics();
        assert!(!metrics.connection.connected);
        assert_eq!(metrics.connection.connection_duration_seconds, 0);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.message_sent();
                        collector.message_received();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.messages.messages_sent, 1000);
        assert_eq!(metrics.messages.messages_received, 1000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector.reconnect_triggered();
        collector.orchestration_exhausted();

        let json = serde_json::to_value(collector.get_metrics()).unwrap();
        assert_eq!(json["orchestration"]["reconnects_triggered"], 1);
        assert_eq!(json["orchestration"]["orchestrations_exhausted"], 1);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.message_dropped();
        collector.send_failed();
        collector.set_connected(true);

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.messages.messages_dropped, 0);
        assert_eq!(metrics.messages.send_failures, 0);
        assert!(!metrics.connection.connected);
    }
}
