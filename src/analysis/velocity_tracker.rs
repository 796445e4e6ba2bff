// src/analysis/velocity_tracker.rs

use std::collections::VecDeque;

/// Centroid velocity in ring units per second, estimated across a short
/// history of canonical positions.
pub struct PositionVelocityTracker {
    history: VecDeque<((f64, f64), f64)>, // (position, timestamp_s)
    history_size: usize,
}

impl PositionVelocityTracker {
    pub fn new(history_size: usize) -> Self {
        let history_size = history_size.max(2);
        Self {
            history: VecDeque::with_capacity(history_size),
            history_size,
        }
    }

    /// Push a sample and return the velocity over the whole history.
    pub fn update(&mut self, position: (f64, f64), timestamp: f64) -> (f64, f64) {
        self.history.push_back((position, timestamp));
        if self.history.len() > self.history_size {
            self.history.pop_front();
        }
        self.velocity()
    }

    pub fn velocity(&self) -> (f64, f64) {
        let (Some(first), Some(last)) = (self.history.front(), self.history.back()) else {
            return (0.0, 0.0);
        };
        let dt = last.1 - first.1;
        if self.history.len() < 2 || dt <= 1e-3 {
            return (0.0, 0.0);
        }
        ((last.0 .0 - first.0 .0) / dt, (last.0 .1 - first.0 .1) / dt)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Forget the history (explicit track loss).
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
