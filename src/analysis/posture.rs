// src/analysis/posture.rs
//
// Per-frame posture labels for the state smoother, derived from pose
// keypoints and boxes:
//   guard height  ← wrist height against nose / shoulders / hips
//   stance        ← which ankle leads toward the opponent
//   position      ← both boxes' aspect ratio and overlap
//
// A missing or low-score keypoint yields no label, never a guess.

use crate::config::PostureConfig;
use crate::smoother::LabeledFrame;
use crate::types::{
    coco, FrameRecord, GrapplingPosition, GuardHeight, Keypoint, StateCategory, StateValue, Stance,
};
use std::collections::HashMap;

pub struct PostureLabeler<'a> {
    config: &'a PostureConfig,
}

impl<'a> PostureLabeler<'a> {
    pub fn new(config: &'a PostureConfig) -> Self {
        Self { config }
    }

    fn point(&self, frame: &FrameRecord, idx: usize) -> Option<Keypoint> {
        frame
            .pose_keypoints
            .get(idx)
            .copied()
            .filter(|kp| kp.score >= self.config.min_keypoint_score && kp.x.is_finite() && kp.y.is_finite())
    }

    /// Mean of the visible points of a left/right pair, with the lowest score used.
    fn pair(&self, frame: &FrameRecord, left: usize, right: usize) -> Option<(f32, f32)> {
        match (self.point(frame, left), self.point(frame, right)) {
            (Some(l), Some(r)) => Some(((l.y + r.y) * 0.5, l.score.min(r.score))),
            (Some(p), None) | (None, Some(p)) => Some((p.y, p.score)),
            (None, None) => None,
        }
    }

    pub fn guard(&self, frame: &FrameRecord) -> Option<(GuardHeight, f32)> {
        let nose = self.point(frame, coco::NOSE)?;
        let (shoulder_y, s_score) = self.pair(frame, coco::LEFT_SHOULDER, coco::RIGHT_SHOULDER)?;
        let (hip_y, h_score) = self.pair(frame, coco::LEFT_HIP, coco::RIGHT_HIP)?;
        let (wrist_y, w_score) = self.pair(frame, coco::LEFT_WRIST, coco::RIGHT_WRIST)?;

        // Image y grows downward; an upright torso has nose < shoulders < hips
        if !(nose.y < shoulder_y && shoulder_y < hip_y) {
            return None;
        }

        let high_line = nose.y + self.config.guard_high_ratio * (shoulder_y - nose.y);
        let mid_line = shoulder_y + self.config.guard_mid_ratio * (hip_y - shoulder_y);
        let height = if wrist_y <= high_line {
            GuardHeight::High
        } else if wrist_y <= mid_line {
            GuardHeight::Mid
        } else {
            GuardHeight::Low
        };
        let confidence = nose.score.min(s_score).min(h_score).min(w_score);
        Some((height, confidence))
    }

    /// `toward_x` is +1 when the opponent is to the right in image space, -1 when left.
    pub fn stance(&self, frame: &FrameRecord, toward_x: f32) -> Option<(Stance, f32)> {
        let la = self.point(frame, coco::LEFT_ANKLE)?;
        let ra = self.point(frame, coco::RIGHT_ANKLE)?;
        let ls = self.point(frame, coco::LEFT_SHOULDER)?;
        let rs = self.point(frame, coco::RIGHT_SHOULDER)?;

        let shoulder_width = (ls.x - rs.x).abs();
        if shoulder_width <= f32::EPSILON {
            return None;
        }
        let confidence = la.score.min(ra.score);
        let lead = (la.x - ra.x) * toward_x.signum();
        if lead.abs() < self.config.square_stance_ratio * shoulder_width {
            return Some((Stance::Square, confidence));
        }
        // Left foot forward is orthodox
        if lead > 0.0 {
            Some((Stance::Orthodox, confidence))
        } else {
            Some((Stance::Southpaw, confidence))
        }
    }

    pub fn position(&self, own: &FrameRecord, opponent: &FrameRecord) -> Option<(GrapplingPosition, f32)> {
        let a = own.bbox.filter(|b| b.is_finite() && b.area() > 0.0)?;
        let b = opponent.bbox.filter(|b| b.is_finite() && b.area() > 0.0)?;
        let threshold = self.config.standing_aspect;
        let a_up = a.aspect() >= threshold;
        let b_up = b.aspect() >= threshold;
        let iou = a.iou(&b);

        // Further from the upright threshold = more certain
        let margin = |aspect: f32| ((aspect - threshold).abs() / threshold).min(1.0);
        let confidence = 0.5 + 0.5 * margin(a.aspect()).min(margin(b.aspect()));

        let position = match (a_up, b_up) {
            (true, true) if iou >= self.config.clinch_iou => GrapplingPosition::Clinch,
            (true, true) => GrapplingPosition::Standing,
            (true, false) if iou > 0.0 => GrapplingPosition::TopControl,
            (true, false) => GrapplingPosition::Standing,
            (false, true) if iou > 0.0 => GrapplingPosition::BottomControl,
            (false, true) => return None,
            (false, false) if iou > 0.0 => {
                if a.y1 < b.y1 {
                    GrapplingPosition::TopControl
                } else {
                    GrapplingPosition::BottomControl
                }
            }
            (false, false) => return None,
        };
        Some((position, confidence))
    }

    /// Label one fighter's frames for `category`, paired with the opponent's
    /// frame at the same index where one exists.
    pub fn label_stream(
        &self,
        category: StateCategory,
        own: &[&FrameRecord],
        opponent: &[&FrameRecord],
    ) -> Vec<LabeledFrame> {
        let by_index: HashMap<u64, &FrameRecord> = opponent.iter().map(|f| (f.frame_index, *f)).collect();

        own.iter()
            .map(|frame| {
                let opp = by_index.get(&frame.frame_index).copied();
                let label = match category {
                    StateCategory::GuardHeight => self
                        .guard(frame)
                        .map(|(g, c)| (StateValue::Guard(g), c)),
                    StateCategory::Stance => opp
                        .and_then(|o| toward(frame, o))
                        .and_then(|dir| self.stance(frame, dir))
                        .map(|(s, c)| (StateValue::Stance(s), c)),
                    StateCategory::Position => opp
                        .and_then(|o| self.position(frame, o))
                        .map(|(p, c)| (StateValue::Position(p), c)),
                };
                LabeledFrame::new(frame.timestamp, label)
            })
            .collect()
    }
}

fn toward(own: &FrameRecord, opponent: &FrameRecord) -> Option<f32> {
    let (ox, _) = own.bbox?.center();
    let (tx, _) = opponent.bbox?.center();
    let dx = tx - ox;
    if dx.abs() <= f32::EPSILON {
        None
    } else {
        Some(dx.signum())
    }
}
