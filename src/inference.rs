// src/inference.rs
//
// Frame scorer contract. The strike classifier lives outside this crate; the
// window manager only sees it through `FrameScorer`, so a different model can
// be dropped in without touching windowing, NMS or smoothing.

use crate::error::ScorerError;
use crate::types::{coco, FrameRecord, Stance, StrikeType};
use tracing::debug;

/// Frames handed to the scorer for one window.
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub window_id: u64,
    pub fight_id: String,
    pub fighter_id: String,
    pub first_frame: u64,
    pub last_frame: u64,
    pub center_ts: f64,
    pub frames: Vec<FrameRecord>,
    /// Keypoints were mirrored into the canonical orientation
    pub mirrored: bool,
}

/// Scorer output for one window: `[background, StrikeType::ALL...]`
/// probabilities plus the probability the strike landed.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScores {
    pub class_probs: Vec<f32>,
    pub landed_prob: f32,
}

impl WindowScores {
    pub fn is_finite(&self) -> bool {
        self.landed_prob.is_finite() && self.class_probs.iter().all(|p| p.is_finite())
    }

    /// Best non-background class and its probability.
    pub fn top_strike(&self) -> Option<(StrikeType, f32)> {
        self.class_probs
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, &p)| StrikeType::from_class_index(idx).map(|s| (s, p)))
            .fold(None, |best: Option<(StrikeType, f32)>, (s, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((s, p)),
            })
    }
}

pub trait FrameScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Score one window. Must fail explicitly rather than return partial output.
    fn score(&self, batch: &WindowBatch) -> Result<WindowScores, ScorerError>;
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// Whether a fighter with `stance` must be mirrored into `canonical`.
pub fn needs_mirroring(stance: Stance, canonical: Stance) -> bool {
    matches!(
        (stance, canonical),
        (Stance::Southpaw, Stance::Orthodox) | (Stance::Orthodox, Stance::Southpaw)
    )
}

/// Mirror pose keypoints horizontally: x → 1 − x, left/right joints swapped.
pub fn mirror_frames(frames: &mut [FrameRecord]) {
    for frame in frames.iter_mut() {
        for kp in frame.pose_keypoints.iter_mut() {
            kp.x = 1.0 - kp.x;
        }
        if frame.pose_keypoints.len() >= coco::COUNT {
            for (l, r) in coco::FLIP_PAIRS {
                frame.pose_keypoints.swap(l, r);
            }
        }
    }
}

/// Map scores produced in the canonical orientation back to the fighter's own.
pub fn remirror_scores(scores: &mut WindowScores, class_pairs: &[(usize, usize)]) {
    let n = scores.class_probs.len();
    for &(a, b) in class_pairs {
        if a < n && b < n {
            scores.class_probs.swap(a, b);
        }
    }
}

// ============================================================================
// LOGIT POOLING SCORER
// ============================================================================

/// Scores a window from the extractor's per-frame strike-head logits:
/// mean-pool across the window, softmax over classes, sigmoid on the
/// trailing landed logit.
#[derive(Debug, Default, Clone)]
pub struct LogitPoolingScorer;

impl LogitPoolingScorer {
    pub fn new() -> Self {
        Self
    }
}

impl FrameScorer for LogitPoolingScorer {
    fn name(&self) -> &str {
        "logit-pooling"
    }

    fn score(&self, batch: &WindowBatch) -> Result<WindowScores, ScorerError> {
        if batch.frames.is_empty() {
            return Err(ScorerError::MalformedBatch("empty window".to_string()));
        }

        let len = StrikeType::LOGIT_LEN;
        let mut pooled = vec![0.0f64; len];
        for frame in &batch.frames {
            if frame.raw_class_logits.len() != len {
                return Err(ScorerError::MalformedBatch(format!(
                    "frame {} has {} logits, expected {}",
                    frame.frame_index,
                    frame.raw_class_logits.len(),
                    len
                )));
            }
            if frame.raw_class_logits.iter().any(|v| !v.is_finite()) {
                return Err(ScorerError::MalformedBatch(format!(
                    "frame {} has non-finite logits",
                    frame.frame_index
                )));
            }
            for (acc, &v) in pooled.iter_mut().zip(&frame.raw_class_logits) {
                *acc += v as f64;
            }
        }
        let n = batch.frames.len() as f64;
        for v in pooled.iter_mut() {
            *v /= n;
        }

        let class_logits = &pooled[..len - 1];
        let max = class_logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = class_logits.iter().map(|v| (v - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        let class_probs: Vec<f32> = exps.iter().map(|e| (e / sum) as f32).collect();
        let landed_prob = (1.0 / (1.0 + (-pooled[len - 1]).exp())) as f32;

        debug!(
            window = batch.window_id,
            fighter = %batch.fighter_id,
            "pooled {} frames",
            batch.frames.len()
        );

        Ok(WindowScores {
            class_probs,
            landed_prob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;

    fn frame_with_logits(idx: u64, logits: Vec<f32>) -> FrameRecord {
        FrameRecord {
            fight_id: "f".into(),
            fighter_id: "red".into(),
            frame_index: idx,
            timestamp: idx as f64 / 30.0,
            bbox: None,
            pose_keypoints: vec![],
            raw_class_logits: logits,
            track_id: Some(1),
            track_lost: false,
        }
    }

    fn batch(frames: Vec<FrameRecord>) -> WindowBatch {
        WindowBatch {
            window_id: 0,
            fight_id: "f".into(),
            fighter_id: "red".into(),
            first_frame: 0,
            last_frame: frames.len() as u64,
            center_ts: 0.0,
            frames,
            mirrored: false,
        }
    }

    #[test]
    fn test_pooling_picks_dominant_class() {
        let mut logits = vec![0.0; StrikeType::LOGIT_LEN];
        logits[StrikeType::Cross.class_index()] = 6.0;
        logits[StrikeType::LOGIT_LEN - 1] = 3.0;
        let frames = (0..4).map(|i| frame_with_logits(i, logits.clone())).collect();

        let scores = LogitPoolingScorer::new().score(&batch(frames)).unwrap();
        let (strike, p) = scores.top_strike().unwrap();
        assert_eq!(strike, StrikeType::Cross);
        assert!(p > 0.9);
        assert!(scores.landed_prob > 0.9);
        let total: f32 = scores.class_probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_wrong_logit_length_is_malformed() {
        let frames = vec![frame_with_logits(0, vec![0.0; 3])];
        let err = LogitPoolingScorer::new().score(&batch(frames)).unwrap_err();
        assert!(matches!(err, ScorerError::MalformedBatch(_)));
    }

    #[test]
    fn test_mirror_swaps_joints() {
        let mut kps = vec![
            Keypoint {
                x: 0.5,
                y: 0.5,
                score: 1.0
            };
            coco::COUNT
        ];
        kps[coco::LEFT_WRIST] = Keypoint { x: 0.2, y: 0.3, score: 0.9 };
        kps[coco::RIGHT_WRIST] = Keypoint { x: 0.7, y: 0.4, score: 0.8 };
        let mut frames = vec![FrameRecord {
            pose_keypoints: kps,
            ..frame_with_logits(0, vec![])
        }];

        mirror_frames(&mut frames);
        let left = frames[0].pose_keypoints[coco::LEFT_WRIST];
        let right = frames[0].pose_keypoints[coco::RIGHT_WRIST];
        assert!((left.x - 0.3).abs() < 1e-6 && (left.y - 0.4).abs() < 1e-6);
        assert!((right.x - 0.8).abs() < 1e-6 && (right.y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_remirror_swaps_configured_classes() {
        let mut scores = WindowScores {
            class_probs: vec![0.1, 0.6, 0.3],
            landed_prob: 0.5,
        };
        remirror_scores(&mut scores, &[(1, 2), (7, 9)]);
        assert_eq!(scores.class_probs, vec![0.1, 0.3, 0.6]);
    }

    #[test]
    fn test_southpaw_is_mirrored_into_orthodox() {
        assert!(needs_mirroring(Stance::Southpaw, Stance::Orthodox));
        assert!(!needs_mirroring(Stance::Orthodox, Stance::Orthodox));
        assert!(!needs_mirroring(Stance::Square, Stance::Orthodox));
    }
}
