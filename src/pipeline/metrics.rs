// src/pipeline/metrics.rs
//
// Per-stream counters. Shared with the control plane through clones, so
// snapshots can be taken while the stream task runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub frames_processed: Arc<AtomicU64>,
    pub frames_with_detections: Arc<AtomicU64>,
    pub alerts_emitted: Arc<AtomicU64>,
    pub alerts_dispatched: Arc<AtomicU64>,
    pub dispatch_failures: Arc<AtomicU64>,
    pub source_retries: Arc<AtomicU64>,
    pub entry_count: Arc<AtomicU64>,
    pub exit_count: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: Arc::new(AtomicU64::new(0)),
            frames_with_detections: Arc::new(AtomicU64::new(0)),
            alerts_emitted: Arc::new(AtomicU64::new(0)),
            alerts_dispatched: Arc::new(AtomicU64::new(0)),
            dispatch_failures: Arc::new(AtomicU64::new(0)),
            source_retries: Arc::new(AtomicU64::new(0)),
            entry_count: Arc::new(AtomicU64::new(0)),
            exit_count: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_with_detections: self.frames_with_detections.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_dispatched: self.alerts_dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            source_retries: self.source_retries.load(Ordering::Relaxed),
            entry_count: self.entry_count.load(Ordering::Relaxed),
            exit_count: self.exit_count.load(Ordering::Relaxed),
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub frames_with_detections: u64,
    pub alerts_emitted: u64,
    pub alerts_dispatched: u64,
    pub dispatch_failures: u64,
    pub source_retries: u64,
    pub entry_count: u64,
    pub exit_count: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = StreamMetrics::new();
        let clone = metrics.clone();
        metrics.inc(&metrics.frames_processed);
        clone.inc(&clone.frames_processed);
        assert_eq!(metrics.summary().frames_processed, 2);
    }

    #[test]
    fn test_summary_snapshot() {
        let metrics = StreamMetrics::new();
        metrics.add(&metrics.alerts_emitted, 3);
        metrics.inc(&metrics.dispatch_failures);
        let summary = metrics.summary();
        assert_eq!(summary.alerts_emitted, 3);
        assert_eq!(summary.dispatch_failures, 1);
        assert_eq!(summary.frames_processed, 0);
    }
}
