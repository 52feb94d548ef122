//! Intake statistics and the periodic stats logger.
//!
//! Counters are plain atomics shared by every connection handler; the
//! [`Monitor`] samples them on an interval and emits one structured log line.

use crate::core::{Protocol, QuarryError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

/// Counters updated by the ingestion front-ends.
#[derive(Debug, Default)]
pub struct IntakeStats {
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    connections_active: AtomicU64,
    plaintext_points: AtomicU64,
    pickle_points: AtomicU64,
    batches: AtomicU64,
    parse_errors: AtomicU64,
    decode_errors: AtomicU64,
    sink_errors: AtomicU64,
    index_errors: AtomicU64,
}

/// Point-in-time copy of [`IntakeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSnapshot {
    /// Connections handed to a handler
    pub connections_accepted: u64,
    /// Connections closed because the cap was reached
    pub connections_rejected: u64,
    /// Handlers currently running
    pub connections_active: u64,
    /// Points decoded from the text protocol
    pub plaintext_points: u64,
    /// Points decoded from batches
    pub pickle_points: u64,
    /// Batches decoded
    pub batches: u64,
    /// Text protocol failures
    pub parse_errors: u64,
    /// Batch decode and shape failures
    pub decode_errors: u64,
    /// Point sink write failures
    pub sink_errors: u64,
    /// Path index write failures
    pub index_errors: u64,
}

impl IntakeSnapshot {
    /// Points from both protocols.
    pub fn points(&self) -> u64 {
        self.plaintext_points + self.pickle_points
    }
}

impl IntakeStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler started.
    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// A handler finished.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A connection was shed at the cap.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Points forwarded to the sink.
    pub fn record_points(&self, protocol: Protocol, count: u64) {
        let counter = match protocol {
            Protocol::Plaintext => &self.plaintext_points,
            Protocol::Pickle => &self.pickle_points,
        };
        counter.fetch_add(count, Ordering::Relaxed);
    }

    /// One batch decoded.
    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Point sink rejected a write.
    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Path index rejected a write.
    pub fn record_index_error(&self) {
        self.index_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a connection-ending error by category.
    pub fn record_error(&self, error: &QuarryError) {
        let counter = match error.category() {
            "protocol" => &self.parse_errors,
            "decode" => &self.decode_errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> IntakeSnapshot {
        IntakeSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            plaintext_points: self.plaintext_points.load(Ordering::Relaxed),
            pickle_points: self.pickle_points.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            index_errors: self.index_errors.load(Ordering::Relaxed),
        }
    }
}

/// Logs intake statistics on a fixed interval until stopped.
#[derive(Debug)]
pub struct Monitor {
    stats: Arc<IntakeStats>,
    interval: Duration,
    started: Instant,
    shutdown: Arc<AtomicBool>,
}

impl Monitor {
    /// Create a monitor over shared stats.
    pub fn new(stats: Arc<IntakeStats>, interval: Duration) -> Self {
        Self {
            stats,
            interval,
            started: Instant::now(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the logging loop.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let shutdown = Arc::clone(&self.shutdown);
        let period = self.interval;
        let started = self.started;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            let mut previous = stats.snapshot();

            while !shutdown.load(Ordering::Relaxed) {
                ticker.tick().await;
                let current = stats.snapshot();
                let rate = (current.points() - previous.points()) as f64 / period.as_secs_f64();

                tracing::info!(
                    uptime_secs = started.elapsed().as_secs(),
                    points = current.points(),
                    points_per_sec = rate,
                    batches = current.batches,
                    active_connections = current.connections_active,
                    rejected_connections = current.connections_rejected,
                    parse_errors = current.parse_errors,
                    decode_errors = current.decode_errors,
                    sink_errors = current.sink_errors,
                    index_errors = current.index_errors,
                    "Intake stats"
                );
                previous = current;
            }
        })
    }

    /// Ask the logging loop to exit after its next tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<IntakeStats> {
        &self.stats
    }
}
