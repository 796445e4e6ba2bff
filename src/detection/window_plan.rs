// src/detection/window_plan.rs
//
// Deterministic window layout over one fighter's frame stream.
// T frames, window W, stride S (S < W) gives ceil((T - W) / S) + 1 windows;
// the last one is pulled back so it ends exactly on the final frame.

/// Half-open frame range `[start, end)` into the fighter's ordered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub window_id: u64,
    pub start: usize,
    pub end: usize,
}

impl WindowSpec {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

pub fn window_count(total: usize, window: usize, stride: usize) -> usize {
    if total == 0 || window == 0 || stride == 0 {
        return 0;
    }
    if total <= window {
        return 1;
    }
    (total - window + stride - 1) / stride + 1
}

/// Streams shorter than one window get a single window over everything.
pub fn plan_windows(total: usize, window: usize, stride: usize) -> Vec<WindowSpec> {
    let count = window_count(total, window, stride);
    if count == 0 {
        return Vec::new();
    }
    if total <= window {
        return vec![WindowSpec {
            window_id: 0,
            start: 0,
            end: total,
        }];
    }

    let last_start = total - window;
    (0..count)
        .map(|i| {
            let start = (i * stride).min(last_start);
            WindowSpec {
                window_id: i as u64,
                start,
                end: start + window,
            }
        })
        .collect()
}
