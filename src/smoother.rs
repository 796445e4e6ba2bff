// src/smoother.rs
//
// Hysteresis state smoother. One component drives guard height, stance and
// grappling position; only the HysteresisConfig differs.
//
// Rules:
//   - a new value replaces the current one only after `min_dwell_frames`
//     consecutive evidence frames; the change is dated to the first of them
//   - the first state (and the first after a gap) is the confidence-weighted
//     majority of the first `min_dwell_frames` evidence frames
//   - suppressed frames (active strike) carry the current state forward
//   - uncovered stretches longer than `max_gap_secs` become UNKNOWN
//
// Output segments are ordered, contiguous and cover [0, duration) exactly once.

use crate::config::HysteresisConfig;
use crate::types::{StateCategory, StateSegment, StateValue};

/// One frame of per-frame labeler output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledFrame {
    pub timestamp: f64,
    /// Label and its confidence; `None` means the labeler had no evidence.
    pub label: Option<(StateValue, f32)>,
    /// Frame falls inside an active strike; its label must not move the state.
    pub suppressed: bool,
}

impl LabeledFrame {
    pub fn new(timestamp: f64, label: Option<(StateValue, f32)>) -> Self {
        Self {
            timestamp,
            label,
            suppressed: false,
        }
    }
}

/// Flag frames within `pad_secs` of any strike timestamp as suppressed.
pub fn mark_active_strikes(frames: &mut [LabeledFrame], strike_ts: &[f64], pad_secs: f64) {
    let mut sorted: Vec<f64> = strike_ts.iter().copied().filter(|t| t.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return;
    }
    for frame in frames.iter_mut() {
        let idx = sorted.partition_point(|&t| t < frame.timestamp - pad_secs);
        if idx < sorted.len() && sorted[idx] <= frame.timestamp + pad_secs {
            frame.suppressed = true;
        }
    }
}

/// Ordered, contiguous, and spanning `[0, duration)`.
pub fn validate_segments(segments: &[StateSegment], duration: f64) -> bool {
    const EPS: f64 = 1e-9;
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return false;
    };
    if first.start_ts.abs() > EPS || (last.end_ts - duration).abs() > EPS {
        return false;
    }
    segments.iter().all(|s| s.end_ts > s.start_ts)
        && segments
            .windows(2)
            .all(|w| (w[0].end_ts - w[1].start_ts).abs() <= EPS && w[0].value != w[1].value)
}

#[derive(Debug, Clone, Copy)]
struct Run {
    value: StateValue,
    start_ts: f64,
    count: usize,
    conf_sum: f64,
}

impl Run {
    fn new(value: StateValue, start_ts: f64, conf: f32) -> Self {
        Self {
            value,
            start_ts,
            count: 1,
            conf_sum: conf as f64,
        }
    }

    fn add(&mut self, conf: f32) {
        self.count += 1;
        self.conf_sum += conf as f64;
    }

    fn mean_conf(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.conf_sum / self.count as f64) as f32
        }
    }
}

enum Phase {
    Idle,
    Bootstrap(Vec<(StateValue, f32, f64)>),
    Stable { current: Run, candidate: Option<Run> },
}

pub struct StateSmoother<'a> {
    config: &'a HysteresisConfig,
    /// Seconds per frame; a segment closed by a gap ends one period after its last frame.
    frame_period: f64,
}

impl<'a> StateSmoother<'a> {
    pub fn new(config: &'a HysteresisConfig, fps: f64) -> Self {
        Self {
            config,
            frame_period: if fps > 0.0 { 1.0 / fps } else { 0.0 },
        }
    }

    /// Smooth one fighter's per-frame labels for one category. `frames` must be
    /// in timestamp order.
    pub fn smooth(
        &self,
        fight_id: &str,
        fighter_id: &str,
        category: StateCategory,
        frames: &[LabeledFrame],
        duration: f64,
    ) -> Vec<StateSegment> {
        let mut out = SegmentWriter {
            fight_id,
            fighter_id,
            category,
            duration,
            cursor: 0.0,
            segments: Vec::new(),
        };
        let dwell = self.config.min_dwell_frames.max(1);
        let mut phase = Phase::Idle;
        let mut last_covered: Option<f64> = None;

        for frame in frames {
            if !(frame.timestamp >= 0.0 && frame.timestamp < duration) {
                continue;
            }
            let evidence = match frame.label {
                Some((value, conf)) if !frame.suppressed && conf >= self.config.min_confidence => {
                    Some((value, conf))
                }
                _ => None,
            };
            let carries = frame.suppressed && matches!(phase, Phase::Stable { .. });
            if evidence.is_none() && !carries {
                continue;
            }

            // Gap: close whatever was open and start over
            if let Some(prev) = last_covered {
                if frame.timestamp - prev > self.config.max_gap_secs {
                    if let Phase::Stable { current, .. } = phase {
                        out.push(current.value, current.start_ts, prev + self.frame_period, current.mean_conf());
                    }
                    phase = Phase::Idle;
                    if evidence.is_none() {
                        last_covered = None;
                        continue;
                    }
                }
            }
            last_covered = Some(frame.timestamp);

            let Some((value, conf)) = evidence else {
                continue;
            };

            phase = match phase {
                Phase::Idle => self.bootstrap(vec![(value, conf, frame.timestamp)], dwell, &mut out),
                Phase::Bootstrap(mut pending) => {
                    pending.push((value, conf, frame.timestamp));
                    self.bootstrap(pending, dwell, &mut out)
                }
                Phase::Stable {
                    mut current,
                    candidate,
                } => {
                    if value == current.value {
                        current.add(conf);
                        Phase::Stable {
                            current,
                            candidate: None,
                        }
                    } else {
                        let mut cand = match candidate {
                            Some(mut c) if c.value == value => {
                                c.add(conf);
                                c
                            }
                            _ => Run::new(value, frame.timestamp, conf),
                        };
                        if cand.count >= dwell {
                            out.push(current.value, current.start_ts, cand.start_ts, current.mean_conf());
                            cand.start_ts = cand.start_ts.max(out.cursor);
                            Phase::Stable {
                                current: cand,
                                candidate: None,
                            }
                        } else {
                            Phase::Stable {
                                current,
                                candidate: Some(cand),
                            }
                        }
                    }
                }
            };
        }

        if let (Phase::Stable { current, .. }, Some(prev)) = (phase, last_covered) {
            let end = if duration - prev <= self.config.max_gap_secs {
                duration
            } else {
                prev + self.frame_period
            };
            out.push(current.value, current.start_ts, end, current.mean_conf());
        }
        out.finish()
    }

    /// Resolve the opening state once `dwell` evidence frames are in.
    fn bootstrap(&self, pending: Vec<(StateValue, f32, f64)>, dwell: usize, out: &mut SegmentWriter) -> Phase {
        if pending.len() < dwell {
            return Phase::Bootstrap(pending);
        }

        // Confidence-weighted vote; ties go to the value seen first
        let mut tally: Vec<(StateValue, f64, usize)> = Vec::new();
        for &(value, conf, _) in &pending {
            match tally.iter_mut().find(|(v, _, _)| *v == value) {
                Some(entry) => {
                    entry.1 += conf as f64;
                    entry.2 += 1;
                }
                None => tally.push((value, conf as f64, 1)),
            }
        }
        let mut winner = tally[0];
        for entry in &tally[1..] {
            if entry.1 > winner.1 {
                winner = *entry;
            }
        }

        let first_ts = pending[0].2;
        // The opening segment absorbs a short unlabeled lead-in
        let start_ts = if out.segments.is_empty() && out.cursor == 0.0 && first_ts <= self.config.max_gap_secs {
            0.0
        } else {
            first_ts
        };
        Phase::Stable {
            current: Run {
                value: winner.0,
                start_ts,
                count: winner.2,
                conf_sum: winner.1,
            },
            candidate: None,
        }
    }
}

struct SegmentWriter<'a> {
    fight_id: &'a str,
    fighter_id: &'a str,
    category: StateCategory,
    duration: f64,
    /// End of the last emitted segment
    cursor: f64,
    segments: Vec<StateSegment>,
}

impl<'a> SegmentWriter<'a> {
    /// Append `[start, end)`, filling any hole before it with UNKNOWN.
    fn push(&mut self, value: StateValue, start: f64, end: f64, confidence: f32) {
        let start = start.clamp(self.cursor, self.duration);
        let end = end.clamp(start, self.duration);
        if start > self.cursor {
            self.append(StateValue::Unknown, self.cursor, start, 0.0);
        }
        if end > start {
            self.append(value, start, end, confidence);
        }
    }

    fn append(&mut self, value: StateValue, start: f64, end: f64, confidence: f32) {
        self.cursor = end;
        if let Some(last) = self.segments.last_mut() {
            if last.value == value && last.end_ts == start {
                let (a, b) = (last.duration(), end - start);
                last.confidence = ((last.confidence as f64 * a + confidence as f64 * b) / (a + b)) as f32;
                last.end_ts = end;
                return;
            }
        }
        self.segments.push(StateSegment {
            fight_id: self.fight_id.to_string(),
            fighter_id: self.fighter_id.to_string(),
            category: self.category,
            value,
            start_ts: start,
            end_ts: end,
            confidence,
            partial: false,
        });
    }

    fn finish(mut self) -> Vec<StateSegment> {
        if self.cursor < self.duration {
            self.append(StateValue::Unknown, self.cursor, self.duration, 0.0);
        }
        self.segments
    }
}
