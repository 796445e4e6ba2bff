// src/detection/strike_detector.rs
//
// Temporal inference window manager for one fighter:
//   plan windows → (mirror) → submit to pool → collect outcomes
//   → confidence floor → temporal NMS → StrikeEvents
//
// Window outcomes are collected in window order, and the merge is an
// order-independent reduction, so worker completion order never changes
// the events produced.

use crate::config::Config;
use crate::detection::nms::{temporal_nms, StrikeCandidate};
use crate::detection::window_plan::{plan_windows, WindowSpec};
use crate::error::MinerError;
use crate::inference::{mirror_frames, needs_mirroring, remirror_scores, WindowBatch};
use crate::pipeline::audit::AuditLog;
use crate::pipeline::cancel::JobSignals;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::worker_pool::{InferencePool, WindowOutcome};
use crate::types::{FightInput, FighterMeta, FrameRecord, StrikeEvent};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Landed probability at or above which a strike counts as landed.
const LANDED_THRESHOLD: f32 = 0.5;

#[derive(Debug, Default)]
pub struct FighterStrikes {
    pub events: Vec<StrikeEvent>,
    pub windows_planned: usize,
    pub windows_scored: usize,
    /// Set when detection stopped early (cancelled or model unreachable).
    pub interrupted: Option<MinerError>,
}

struct PendingWindow {
    spec: WindowSpec,
    start_ts: f64,
    end_ts: f64,
    center_ts: f64,
    first_frame: u64,
    last_frame: u64,
    result: oneshot::Receiver<WindowOutcome>,
}

pub struct StrikeDetector<'a> {
    config: &'a Config,
    pool: &'a InferencePool,
    metrics: &'a PipelineMetrics,
}

impl<'a> StrikeDetector<'a> {
    pub fn new(config: &'a Config, pool: &'a InferencePool, metrics: &'a PipelineMetrics) -> Self {
        Self {
            config,
            pool,
            metrics,
        }
    }

    pub async fn detect(
        &self,
        fight: &FightInput,
        fighter: &FighterMeta,
        signals: &JobSignals,
        audit: &mut AuditLog,
    ) -> FighterStrikes {
        let fighter_id = fighter.fighter_id.as_str();
        let target_id = fight
            .opponent_of(fighter_id)
            .map(|o| o.fighter_id.clone())
            .unwrap_or_default();
        let frames = fight.frames_for(fighter_id);
        let plan = plan_windows(
            frames.len(),
            self.config.window.window_frames,
            self.config.window.stride_frames,
        );
        let mirrored = needs_mirroring(fighter.stance, self.config.window.canonical_stance);

        let mut out = FighterStrikes {
            windows_planned: plan.len(),
            ..Default::default()
        };

        debug!(
            fight = %fight.fight_id,
            fighter = %fighter_id,
            frames = frames.len(),
            windows = plan.len(),
            mirrored,
            "planning strike windows"
        );

        // Submit everything; `submit` blocks while the pool queue is full
        let mut pending = Vec::with_capacity(plan.len());
        for spec in &plan {
            if signals.should_stop() {
                break;
            }
            let window_frames = &frames[spec.start..spec.end];
            let batch = self.build_batch(fight, fighter_id, *spec, window_frames, mirrored);
            let (start_ts, end_ts) = (window_frames[0].timestamp, window_frames[spec.len() - 1].timestamp);
            let (center_ts, first_frame, last_frame) = (batch.center_ts, batch.first_frame, batch.last_frame);

            match self.pool.submit(batch, signals).await {
                Ok(result) => {
                    self.metrics.inc(&self.metrics.windows_submitted);
                    pending.push(PendingWindow {
                        spec: *spec,
                        start_ts,
                        end_ts,
                        center_ts,
                        first_frame,
                        last_frame,
                        result,
                    });
                }
                Err(e) => {
                    out.interrupted = Some(e);
                    break;
                }
            }
        }

        let floor = self.config.nms.confidence_floor;
        let mut candidates = Vec::new();
        for window in pending {
            let outcome = window.result.await.unwrap_or(WindowOutcome::Skipped);
            match outcome {
                WindowOutcome::Scored { mut scores, .. } => {
                    out.windows_scored += 1;
                    if mirrored {
                        remirror_scores(&mut scores, &self.config.window.mirror_class_pairs);
                    }
                    let background = scores.class_probs.first().copied().unwrap_or(0.0);
                    let Some((strike_type, confidence)) = scores.top_strike() else {
                        continue;
                    };
                    if confidence <= background {
                        continue;
                    }
                    if confidence < floor {
                        self.metrics.inc(&self.metrics.predictions_below_floor);
                        audit.record(
                            Some(fighter_id),
                            window.start_ts,
                            window.end_ts,
                            &MinerError::LowConfidenceSkip { confidence, floor },
                        );
                        continue;
                    }
                    candidates.push(StrikeCandidate {
                        strike_type,
                        center_ts: window.center_ts,
                        confidence,
                        landed_prob: scores.landed_prob,
                        window_ids: vec![window.spec.window_id],
                    });
                }
                WindowOutcome::Malformed(reason) => audit.record(
                    Some(fighter_id),
                    window.start_ts,
                    window.end_ts,
                    &MinerError::CorruptFrameBatch {
                        window_id: window.spec.window_id,
                        start_frame: window.first_frame,
                        end_frame: window.last_frame,
                        reason,
                    },
                ),
                WindowOutcome::TimedOut { attempts } => audit.record(
                    Some(fighter_id),
                    window.start_ts,
                    window.end_ts,
                    &MinerError::InferenceTimeout {
                        window_id: window.spec.window_id,
                        attempts,
                    },
                ),
                WindowOutcome::Unavailable(reason) => {
                    if out.interrupted.is_none() {
                        let err = MinerError::ModelUnavailable(reason);
                        audit.record(Some(fighter_id), window.start_ts, window.end_ts, &err);
                        out.interrupted = Some(err);
                    }
                }
                WindowOutcome::Skipped => {}
            }
        }

        if out.interrupted.is_none() {
            if signals.model_unavailable() {
                out.interrupted = Some(MinerError::ModelUnavailable("scorer unreachable".to_string()));
            } else if signals.cancel.is_cancelled() {
                out.interrupted = Some(MinerError::Cancelled);
            }
        }

        let merged = temporal_nms(&candidates, &self.config.nms);
        out.events = merged
            .into_iter()
            .map(|c| StrikeEvent {
                event_id: StrikeEvent::derive_id(&fight.fight_id, fighter_id, c.strike_type, c.center_ts),
                fight_id: fight.fight_id.clone(),
                fighter_id: fighter_id.to_string(),
                target_id: target_id.clone(),
                strike_type: c.strike_type,
                timestamp: c.center_ts,
                confidence: c.confidence,
                landed: c.landed_prob >= LANDED_THRESHOLD,
                window_ids: c.window_ids,
            })
            .collect();
        self.metrics
            .add(&self.metrics.strike_events, out.events.len() as u64);

        info!(
            fight = %fight.fight_id,
            fighter = %fighter_id,
            "strikes: {} events from {}/{} windows ({} candidates){}",
            out.events.len(),
            out.windows_scored,
            out.windows_planned,
            candidates.len(),
            if out.interrupted.is_some() { " [interrupted]" } else { "" }
        );

        out
    }

    fn build_batch(
        &self,
        fight: &FightInput,
        fighter_id: &str,
        spec: WindowSpec,
        window_frames: &[&FrameRecord],
        mirrored: bool,
    ) -> WindowBatch {
        let mut frames: Vec<FrameRecord> = window_frames.iter().map(|f| (*f).clone()).collect();
        if mirrored {
            mirror_frames(&mut frames);
        }
        let first = window_frames[0];
        let last = window_frames[window_frames.len() - 1];
        WindowBatch {
            window_id: spec.window_id,
            fight_id: fight.fight_id.clone(),
            fighter_id: fighter_id.to_string(),
            first_frame: first.frame_index,
            last_frame: last.frame_index,
            center_ts: (first.timestamp + last.timestamp) * 0.5,
            frames,
            mirrored,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::ring::RingGeometry;
    use crate::error::ScorerError;
    use crate::inference::{FrameScorer, LogitPoolingScorer, WindowScores};
    use crate::pipeline::cancel::CancelToken;
    use crate::types::{Stance, StrikeType};
    use std::sync::Arc;

    pub(crate) fn logits_for(strike: Option<StrikeType>, landed: bool) -> Vec<f32> {
        let mut logits = vec![0.0; StrikeType::LOGIT_LEN];
        match strike {
            Some(s) => logits[s.class_index()] = 8.0,
            None => logits[0] = 8.0,
        }
        logits[StrikeType::LOGIT_LEN - 1] = if landed { 4.0 } else { -4.0 };
        logits
    }

    /// 30fps fight where `red` throws a landed jab over frames 40..56 and
    /// `blue` does nothing.
    pub(crate) fn jab_fight() -> FightInput {
        let mut frames = Vec::new();
        for fighter in ["red", "blue"] {
            for i in 0..120u64 {
                let strike = if fighter == "red" && (40..56).contains(&i) {
                    Some(StrikeType::Jab)
                } else {
                    None
                };
                frames.push(FrameRecord {
                    fight_id: "f1".into(),
                    fighter_id: fighter.into(),
                    frame_index: i,
                    timestamp: i as f64 / 30.0,
                    bbox: None,
                    pose_keypoints: vec![],
                    raw_class_logits: logits_for(strike, true),
                    track_id: Some(1),
                    track_lost: false,
                });
            }
        }
        FightInput {
            fight_id: "f1".into(),
            video_id: "v1".into(),
            fps: 30.0,
            duration: 4.0,
            fighters: vec![
                FighterMeta {
                    fighter_id: "red".into(),
                    stance: Stance::Orthodox,
                    age: None,
                    reach_cm: None,
                    decimal_odds: None,
                },
                FighterMeta {
                    fighter_id: "blue".into(),
                    stance: Stance::Southpaw,
                    age: None,
                    reach_cm: None,
                    decimal_odds: None,
                },
            ],
            rounds: vec![],
            ring: RingGeometry::default(),
            frames,
        }
    }

    struct FlakyScorer;

    impl FrameScorer for FlakyScorer {
        fn name(&self) -> &str {
            "flaky"
        }

        fn score(&self, batch: &WindowBatch) -> Result<WindowScores, ScorerError> {
            if batch.window_id == 2 {
                return Err(ScorerError::MalformedBatch("truncated tensor".into()));
            }
            LogitPoolingScorer::new().score(batch)
        }
    }

    struct UnreachableScorer;

    impl FrameScorer for UnreachableScorer {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn score(&self, _batch: &WindowBatch) -> Result<WindowScores, ScorerError> {
            Err(ScorerError::Unavailable("gpu host down".into()))
        }
    }

    async fn run(scorer: Arc<dyn FrameScorer>, fighter: usize) -> (FighterStrikes, AuditLog) {
        let config = Config::default();
        let metrics = PipelineMetrics::new();
        let pool = InferencePool::spawn(scorer, &config.pool, metrics.clone());
        let fight = jab_fight();
        let signals = JobSignals::new(CancelToken::new());
        let mut audit = AuditLog::new("f1", 100);
        let out = StrikeDetector::new(&config, &pool, &metrics)
            .detect(&fight, &fight.fighters[fighter], &signals, &mut audit)
            .await;
        pool.shutdown().await;
        (out, audit)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_windows_yield_one_jab() {
        let (out, _) = run(Arc::new(LogitPoolingScorer::new()), 0).await;
        // 120 frames, W=16, S=4 → 27 windows
        assert_eq!(out.windows_planned, 27);
        assert_eq!(out.windows_scored, 27);
        assert_eq!(out.events.len(), 1);
        let jab = &out.events[0];
        assert_eq!(jab.strike_type, StrikeType::Jab);
        assert_eq!(jab.target_id, "blue");
        assert!(jab.landed);
        assert!(jab.window_ids.len() > 1);
        assert!(jab.timestamp > 1.2 && jab.timestamp < 1.9);
        assert!(out.interrupted.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_mirrored_fighter_has_no_events() {
        let (out, _) = run(Arc::new(LogitPoolingScorer::new()), 1).await;
        assert!(out.events.is_empty());
        assert_eq!(out.windows_scored, 27);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_corrupt_window_is_skipped_and_audited() {
        let (out, audit) = run(Arc::new(FlakyScorer), 0).await;
        assert_eq!(out.windows_scored, 26);
        assert_eq!(audit.count_kind("corrupt_frame_batch"), 1);
        assert_eq!(out.events.len(), 1);
        assert!(out.interrupted.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_model_interrupts_fighter() {
        let (out, audit) = run(Arc::new(UnreachableScorer), 0).await;
        assert!(out.events.is_empty());
        assert!(matches!(out.interrupted, Some(MinerError::ModelUnavailable(_))));
        assert_eq!(audit.count_kind("model_unavailable"), 1);
    }
}
