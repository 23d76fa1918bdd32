//! Queue counters and derived throughput figures.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Point-in-time view of scheduler activity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    pub rejected: u64,
    pub evicted: u64,
    /// Live jobs waiting for a slot (Pending or Retrying)
    pub waiting: usize,
    /// Jobs holding a slot (Processing or Paused)
    pub active: usize,
    pub average_processing_ms: f64,
    pub throughput_per_minute: f64,
}

/// Running totals kept by the scheduler
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    pub enqueued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    pub rejected: u64,
    pub evicted: u64,
    processing_total: Duration,
    since: Instant,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            enqueued: 0,
            dequeued: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            retried: 0,
            rejected: 0,
            evicted: 0,
            processing_total: Duration::ZERO,
            since: Instant::now(),
        }
    }

    pub fn record_completion(&mut self, processing: Duration) {
        self.completed += 1;
        self.processing_total += processing;
    }

    pub fn snapshot(&self, waiting: usize, active: usize) -> QueueStats {
        let average_processing_ms = if self.completed == 0 {
            0.0
        } else {
            self.processing_total.as_secs_f64() * 1000.0 / self.completed as f64
        };
        let minutes = self.since.elapsed().as_secs_f64() / 60.0;
        let throughput_per_minute = if minutes > 0.0 {
            self.completed as f64 / minutes
        } else {
            0.0
        };

        QueueStats {
            enqueued: self.enqueued,
            dequeued: self.dequeued,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            retried: self.retried,
            rejected: self.rejected,
            evicted: self.evicted,
            waiting,
            active,
            average_processing_ms,
            throughput_per_minute,
        }
    }
}
