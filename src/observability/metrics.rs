//! Thread-safe metrics collection
//!
//! Atomic counters tracking link transitions, broker session lifecycle,
//! and telemetry publish volume. The collector is a process-wide singleton
//! so the connectivity and session layers can record events without
//! plumbing a handle through every call site.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::message::QosLevel;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Network link metrics
    link_up: AtomicBool,
    link_established_count: AtomicU64,
    link_lost_count: AtomicU64,

    // Broker session metrics
    session_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    reconnects_started: AtomicU64,
    reconnects_completed: AtomicU64,
    session_start_time: AtomicU64,

    // Telemetry metrics
    published_qos0: AtomicU64,
    published_qos1: AtomicU64,
    publish_failures_qos0: AtomicU64,
    publish_failures_qos1: AtomicU64,
    messages_received: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            link_up: AtomicBool::new(false),
            link_established_count: AtomicU64::new(0),
            link_lost_count: AtomicU64::new(0),
            session_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            reconnects_started: AtomicU64::new(0),
            reconnects_completed: AtomicU64::new(0),
            session_start_time: AtomicU64::new(0),
            published_qos0: AtomicU64::new(0),
            published_qos1: AtomicU64::new(0),
            publish_failures_qos0: AtomicU64::new(0),
            publish_failures_qos1: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    // Link metrics
    pub fn link_established(&self) {
        self.link_up.store(true, Ordering::Relaxed);
        self.link_established_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_lost(&self) {
        self.link_up.store(false, Ordering::Relaxed);
        self.link_lost_count.fetch_add(1, Ordering::Relaxed);
    }

    // Session metrics
    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.session_connected.store(true, Ordering::Relaxed);
        self.session_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.session_connected.store(false, Ordering::Relaxed);
    }

    pub fn reconnect_started(&self) {
        self.reconnects_started.fetch_add(1, Ordering::Relaxed);
        self.session_connected.store(false, Ordering::Relaxed);
    }

    pub fn reconnect_completed(&self) {
        self.reconnects_completed.fetch_add(1, Ordering::Relaxed);
        self.session_connected.store(true, Ordering::Relaxed);
    }

    // Telemetry metrics
    pub fn message_published(&self, tier: QosLevel) {
        match tier {
            QosLevel::AtMostOnce => self.published_qos0.fetch_add(1, Ordering::Relaxed),
            QosLevel::AtLeastOnce => self.published_qos1.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn publish_failure(&self, tier: QosLevel) {
        match tier {
            QosLevel::AtMostOnce => self.publish_failures_qos0.fetch_add(1, Ordering::Relaxed),
            QosLevel::AtLeastOnce => self.publish_failures_qos1.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the current session was established, zero when down.
    fn session_duration(&self, now: u64) -> u64 {
        if self.session_connected.load(Ordering::Relaxed) {
            let start = self.session_start_time.load(Ordering::Relaxed);
            if start > 0 {
                now.saturating_sub(start)
            } else {
                0
            }
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            link: LinkMetrics {
                up: self.link_up.load(Ordering::Relaxed),
                established: self.link_established_count.load(Ordering::Relaxed),
                lost: self.link_lost_count.load(Ordering::Relaxed),
            },
            session: SessionMetrics {
                connected: self.session_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                reconnects_started: self.reconnects_started.load(Ordering::Relaxed),
                reconnects_completed: self.reconnects_completed.load(Ordering::Relaxed),
                session_duration_seconds: self.session_duration(now),
            },
            telemetry: TelemetryMetrics {
                published_qos0: self.published_qos0.load(Ordering::Relaxed),
                published_qos1: self.published_qos1.load(Ordering::Relaxed),
                publish_failures_qos0: self.publish_failures_qos0.load(Ordering::Relaxed),
                publish_failures_qos1: self.publish_failures_qos1.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.link_up.store(false, Ordering::Relaxed);
        self.link_established_count.store(0, Ordering::Relaxed);
        self.link_lost_count.store(0, Ordering::Relaxed);
        self.session_connected.store(false, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.connections_established.store(0, Ordering::Relaxed);
        self.connection_failures.store(0, Ordering::Relaxed);
        self.reconnects_started.store(0, Ordering::Relaxed);
        self.reconnects_completed.store(0, Ordering::Relaxed);
        self.session_start_time.store(0, Ordering::Relaxed);
        self.published_qos0.store(0, Ordering::Relaxed);
        self.published_qos1.store(0, Ordering::Relaxed);
        self.publish_failures_qos0.store(0, Ordering::Relaxed);
        self.publish_failures_qos1.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub link: LinkMetrics,
    pub session: SessionMetrics,
    pub telemetry: TelemetryMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct LinkMetrics {
    pub up: bool,
    pub established: u64,
    pub lost: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub reconnects_started: u64,
    pub reconnects_completed: u64,
    pub session_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct TelemetryMetrics {
    pub published_qos0: u64,
    pub published_qos1: u64,
    pub publish_failures_qos0: u64,
    pub publish_failures_qos1: u64,
    pub messages_received: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
