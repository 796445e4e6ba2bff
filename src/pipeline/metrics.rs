// src/pipeline/metrics.rs
//
// Run-wide counters. Shared by every fight job and pool worker through
// cheap clones; all fields are atomics so no job ever waits on another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub fights_started: Arc<AtomicU64>,
    pub fights_complete: Arc<AtomicU64>,
    pub fights_partial: Arc<AtomicU64>,
    pub windows_submitted: Arc<AtomicU64>,
    pub windows_scored: Arc<AtomicU64>,
    pub windows_corrupt: Arc<AtomicU64>,
    pub windows_timed_out: Arc<AtomicU64>,
    pub windows_skipped: Arc<AtomicU64>,
    pub predictions_below_floor: Arc<AtomicU64>,
    pub strike_events: Arc<AtomicU64>,
    pub segments: Arc<AtomicU64>,
    pub missing_track_gaps: Arc<AtomicU64>,
    pub combos: Arc<AtomicU64>,
    pub vulnerabilities: Arc<AtomicU64>,
    pub inference_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            fights_started: Arc::new(AtomicU64::new(0)),
            fights_complete: Arc::new(AtomicU64::new(0)),
            fights_partial: Arc::new(AtomicU64::new(0)),
            windows_submitted: Arc::new(AtomicU64::new(0)),
            windows_scored: Arc::new(AtomicU64::new(0)),
            windows_corrupt: Arc::new(AtomicU64::new(0)),
            windows_timed_out: Arc::new(AtomicU64::new(0)),
            windows_skipped: Arc::new(AtomicU64::new(0)),
            predictions_below_floor: Arc::new(AtomicU64::new(0)),
            strike_events: Arc::new(AtomicU64::new(0)),
            segments: Arc::new(AtomicU64::new(0)),
            missing_track_gaps: Arc::new(AtomicU64::new(0)),
            combos: Arc::new(AtomicU64::new(0)),
            vulnerabilities: Arc::new(AtomicU64::new(0)),
            inference_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> MetricsSummary {
        let scored = Self::get(&self.windows_scored);
        let inference_us = Self::get(&self.inference_time_us);
        MetricsSummary {
            fights_started: Self::get(&self.fights_started),
            fights_complete: Self::get(&self.fights_complete),
            fights_partial: Self::get(&self.fights_partial),
            windows_submitted: Self::get(&self.windows_submitted),
            windows_scored: scored,
            windows_corrupt: Self::get(&self.windows_corrupt),
            windows_timed_out: Self::get(&self.windows_timed_out),
            windows_skipped: Self::get(&self.windows_skipped),
            predictions_below_floor: Self::get(&self.predictions_below_floor),
            strike_events: Self::get(&self.strike_events),
            segments: Self::get(&self.segments),
            missing_track_gaps: Self::get(&self.missing_track_gaps),
            combos: Self::get(&self.combos),
            vulnerabilities: Self::get(&self.vulnerabilities),
            avg_inference_us: if scored > 0 { inference_us / scored } else { 0 },
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub fights_started: u64,
    pub fights_complete: u64,
    pub fights_partial: u64,
    pub windows_submitted: u64,
    pub windows_scored: u64,
    pub windows_corrupt: u64,
    pub windows_timed_out: u64,
    pub windows_skipped: u64,
    pub predictions_below_floor: u64,
    pub strike_events: u64,
    pub segments: u64,
    pub missing_track_gaps: u64,
    pub combos: u64,
    pub vulnerabilities: u64,
    pub avg_inference_us: u64,
    pub elapsed_secs: f64,
}
