//! Server metrics for observability
//!
//! Provides runtime metrics for monitoring relay health and throughput.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently active WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Message metrics
    /// Frames received from clients
    pub messages_received: AtomicU64,
    /// Messages committed and fanned out
    pub messages_broadcast: AtomicU64,
    /// Inbound frames dropped because they did not parse
    pub malformed_messages: AtomicU64,

    // Error metrics
    /// Storage read/write failures
    pub store_errors: AtomicU64,

    // History metrics
    /// Number of history replays served
    pub history_replays: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Instant,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_broadcast: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            history_replays: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_broadcast(&self) {
        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn history_replayed(&self) {
        self.history_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            history_replays: self.history_replays.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the metrics, served at /metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub messages_received: u64,
    pub messages_broadcast: u64,
    pub malformed_messages: u64,
    pub store_errors: u64,
    pub history_replays: u64,
    pub uptime_secs: u64,
}

/// Health summary served at /health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub messages_stored: u64,
    pub uptime_secs: u64,
}
