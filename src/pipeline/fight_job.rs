// src/pipeline/fight_job.rs
//
// One fight, end to end. Each job owns its buffers and audit log; the only
// things shared with other jobs are the read-only context, the pool queue and
// the metric counters.
//
// Stage order:
//   1. validate input
//   2. strikes per fighter (window manager → pool → NMS)
//   3. posture labels → hysteresis smoothing per fighter per category
//   4. territory / pressure per round
//   5. combos per fighter, vulnerabilities per defender
//   6. style feature rows (complete jobs only)
//
// Cancellation and ModelUnavailable are checked between stages. A stopped job
// keeps what it already computed, marks its segments partial, and reports
// JobStatus::Partial.

use crate::analysis::posture::PostureLabeler;
use crate::analysis::territory::{TerritoryAnalyzer, TerritoryReport};
use crate::clips::{clip_requests, ClipRequest};
use crate::config::Config;
use crate::detection::strike_detector::StrikeDetector;
use crate::error::{MinerError, MinerResult};
use crate::export::EventRecord;
use crate::mining::{mine_combos, mine_vulnerabilities};
use crate::pipeline::audit::{AuditLog, AuditRecord};
use crate::pipeline::cancel::{CancelToken, JobSignals};
use crate::pipeline::context::AnalysisContext;
use crate::smoother::{mark_active_strikes, validate_segments, StateSmoother};
use crate::style::features::{build_features, FeatureInputs, FeatureRecord};
use crate::types::{
    ComboPattern, FightInput, JobStatus, PressureSample, StateCategory, StateSegment, StrikeEvent,
    VulnerabilityFinding,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Job-level record written at the end of each fight's block in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub fight_id: String,
    pub video_id: String,
    pub status: JobStatus,
    pub windows_planned: usize,
    pub windows_scored: usize,
    pub strike_events: usize,
    pub segments: usize,
    pub combos: usize,
    pub vulnerabilities: usize,
    pub audit_records: usize,
    pub audit_dropped: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FightReport {
    pub fight_id: String,
    pub video_id: String,
    pub duration: f64,
    pub strikes: Vec<StrikeEvent>,
    pub segments: Vec<StateSegment>,
    pub pressure: Vec<PressureSample>,
    pub combos: Vec<ComboPattern>,
    pub vulnerabilities: Vec<VulnerabilityFinding>,
    pub features: Vec<FeatureRecord>,
    pub audit: Vec<AuditRecord>,
    pub summary: JobSummary,
}

impl FightReport {
    pub fn status(&self) -> &JobStatus {
        &self.summary.status
    }

    /// Every entity of this fight as event log records (clips and style
    /// profiles are added by the run, not the job).
    pub fn to_records(&self) -> Vec<EventRecord> {
        let mut records = Vec::new();
        records.extend(self.strikes.iter().cloned().map(EventRecord::Strike));
        records.extend(self.segments.iter().cloned().map(EventRecord::Segment));
        records.extend(self.pressure.iter().cloned().map(EventRecord::Pressure));
        records.extend(self.combos.iter().cloned().map(EventRecord::Combo));
        records.extend(self.vulnerabilities.iter().cloned().map(EventRecord::Vulnerability));
        records.extend(self.audit.iter().cloned().map(EventRecord::Audit));
        records.push(EventRecord::Job(self.summary.clone()));
        records
    }

    pub fn clip_requests(&self) -> Vec<ClipRequest> {
        clip_requests(&self.strikes, &self.combos, &self.vulnerabilities)
    }
}

/// Mutable state of one running job.
struct JobState {
    audit: AuditLog,
    stop: Option<MinerError>,
    strikes: Vec<StrikeEvent>,
    segments: Vec<StateSegment>,
    territory: TerritoryReport,
    combos: Vec<ComboPattern>,
    vulnerabilities: Vec<VulnerabilityFinding>,
    features: Vec<FeatureRecord>,
    windows_planned: usize,
    windows_scored: usize,
}

impl JobState {
    fn check(&mut self, signals: &JobSignals) -> bool {
        if self.stop.is_none() {
            if signals.model_unavailable() {
                self.stop = Some(MinerError::ModelUnavailable("scorer unreachable".to_string()));
            } else if signals.cancel.is_cancelled() {
                self.stop = Some(MinerError::Cancelled);
            }
        }
        self.stop.is_none()
    }
}

/// Run one fight. Only invalid input is an error; every other failure ends
/// in a report, possibly `Partial`.
pub async fn run_fight(ctx: &AnalysisContext, fight: FightInput, cancel: CancelToken) -> MinerResult<FightReport> {
    fight.validate()?;

    let started = Instant::now();
    let config: &Config = &ctx.config;
    let metrics = &ctx.metrics;
    metrics.inc(&metrics.fights_started);
    info!(
        fight = %fight.fight_id,
        frames = fight.frames.len(),
        "fight job started ({:.1}s @ {:.1}fps)",
        fight.duration,
        fight.fps
    );

    let signals = JobSignals::new(cancel);
    let mut job = JobState {
        audit: AuditLog::new(&fight.fight_id, config.logging.audit_capacity),
        stop: None,
        strikes: Vec::new(),
        segments: Vec::new(),
        territory: TerritoryReport::default(),
        combos: Vec::new(),
        vulnerabilities: Vec::new(),
        features: Vec::new(),
        windows_planned: 0,
        windows_scored: 0,
    };

    // Strikes
    let detector = StrikeDetector::new(config, &ctx.pool, metrics);
    for fighter in &fight.fighters {
        if !job.check(&signals) {
            break;
        }
        let found = detector.detect(&fight, fighter, &signals, &mut job.audit).await;
        job.windows_planned += found.windows_planned;
        job.windows_scored += found.windows_scored;
        job.strikes.extend(found.events);
        if let Some(e) = found.interrupted {
            job.stop.get_or_insert(e);
        }
    }
    job.strikes
        .sort_by(|a, b| a.fighter_id.cmp(&b.fighter_id).then_with(|| a.timestamp.total_cmp(&b.timestamp)));

    // Posture segments
    if job.check(&signals) {
        smooth_states(ctx, &fight, &mut job, &signals);
    }

    // Territory
    if job.check(&signals) {
        job.territory = TerritoryAnalyzer::new(&config.territory).analyze(&fight, &mut job.audit, metrics);
    }

    // Mining
    if job.check(&signals) {
        for fighter in &fight.fighters {
            let id = fighter.fighter_id.as_str();
            job.combos
                .extend(mine_combos(&fight.fight_id, id, &job.strikes, &config.combos, &mut job.audit));

            let guard: Vec<StateSegment> = job
                .segments
                .iter()
                .filter(|s| s.fighter_id == id && s.category == StateCategory::GuardHeight)
                .cloned()
                .collect();
            job.vulnerabilities.extend(mine_vulnerabilities(
                &fight.fight_id,
                id,
                &job.strikes,
                &guard,
                &config.vulnerability,
                &mut job.audit,
            ));
        }
        metrics.add(&metrics.combos, job.combos.len() as u64);
        metrics.add(&metrics.vulnerabilities, job.vulnerabilities.len() as u64);
    }

    // Style rows only from fights that ran to the end
    if job.check(&signals) {
        for fighter in &fight.fighters {
            let id = fighter.fighter_id.as_str();
            let own_segments: Vec<StateSegment> = job.segments.iter().filter(|s| s.fighter_id == id).cloned().collect();
            let own_combos: Vec<ComboPattern> = job.combos.iter().filter(|c| c.fighter_id == id).cloned().collect();
            job.features.push(build_features(&FeatureInputs {
                fight: &fight,
                fighter_id: id,
                strikes: &job.strikes,
                segments: &own_segments,
                combos: &own_combos,
                motion: job.territory.motion.get(id),
            }));
        }
    }

    let status = match &job.stop {
        None => {
            metrics.inc(&metrics.fights_complete);
            JobStatus::Complete
        }
        Some(e) => {
            metrics.inc(&metrics.fights_partial);
            for seg in &mut job.segments {
                seg.partial = true;
            }
            warn!(fight = %fight.fight_id, "fight job stopped early: {}", e);
            JobStatus::Partial { reason: e.to_string() }
        }
    };

    let audit_dropped = job.audit.dropped();
    let audit: Vec<AuditRecord> = job.audit.into_records();
    let summary = JobSummary {
        fight_id: fight.fight_id.clone(),
        video_id: fight.video_id.clone(),
        status,
        windows_planned: job.windows_planned,
        windows_scored: job.windows_scored,
        strike_events: job.strikes.len(),
        segments: job.segments.len(),
        combos: job.combos.len(),
        vulnerabilities: job.vulnerabilities.len(),
        audit_records: audit.len(),
        audit_dropped,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        fight = %fight.fight_id,
        "fight job {}: {} strikes, {} segments, {} combos, {} findings, {} audit records in {}ms",
        if summary.status.is_complete() { "complete" } else { "partial" },
        summary.strike_events,
        summary.segments,
        summary.combos,
        summary.vulnerabilities,
        summary.audit_records,
        summary.elapsed_ms
    );

    Ok(FightReport {
        fight_id: fight.fight_id,
        video_id: fight.video_id,
        duration: fight.duration,
        strikes: job.strikes,
        segments: job.segments,
        pressure: job.territory.samples,
        combos: job.combos,
        vulnerabilities: job.vulnerabilities,
        features: job.features,
        audit,
        summary,
    })
}

/// Label and smooth every (fighter, category) stream. Guard labels are
/// suppressed around the fighter's own strikes: a punch moves the hands
/// without changing the guard.
fn smooth_states(ctx: &AnalysisContext, fight: &FightInput, job: &mut JobState, signals: &JobSignals) {
    let config = &ctx.config;
    let labeler = PostureLabeler::new(&config.posture);

    for fighter in &fight.fighters {
        let id = fighter.fighter_id.as_str();
        let own = fight.frames_for(id);
        let opponent = fight
            .opponent_of(id)
            .map(|o| fight.frames_for(&o.fighter_id))
            .unwrap_or_default();
        let strike_ts: Vec<f64> = job.strikes.iter().filter(|e| e.fighter_id == id).map(|e| e.timestamp).collect();

        for category in StateCategory::ALL {
            if !job.check(signals) {
                return;
            }
            let hysteresis = match category {
                StateCategory::GuardHeight => &config.smoother.guard,
                StateCategory::Stance => &config.smoother.stance,
                StateCategory::Position => &config.smoother.position,
            };

            let mut labels = labeler.label_stream(category, &own, &opponent);
            if category == StateCategory::GuardHeight {
                mark_active_strikes(&mut labels, &strike_ts, config.smoother.strike_active_pad_secs);
            }
            let segments = StateSmoother::new(hysteresis, fight.fps).smooth(
                &fight.fight_id,
                id,
                category,
                &labels,
                fight.duration,
            );
            if !validate_segments(&segments, fight.duration) {
                warn!(
                    fight = %fight.fight_id,
                    fighter = %id,
                    "{} segments do not tile the fight",
                    category.as_str()
                );
            }
            ctx.metrics.add(&ctx.metrics.segments, segments.len() as u64);
            job.segments.extend(segments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::strike_detector::tests::{jab_fight, logits_for};
    use crate::error::ScorerError;
    use crate::inference::{FrameScorer, LogitPoolingScorer, WindowBatch, WindowScores};
    use crate::types::{coco, FrameRecord, GuardHeight, Keypoint, StrikeType};
    use std::sync::Arc;

    /// Upright pose in normalised image space with the wrists at `wrist_y`.
    fn pose(wrist_y: f32) -> Vec<Keypoint> {
        let mut kps = vec![
            Keypoint {
                x: 0.0,
                y: 0.0,
                score: 0.0
            };
            coco::COUNT
        ];
        let mut set = |idx: usize, y: f32| kps[idx] = Keypoint { x: 0.5, y, score: 0.9 };
        set(coco::NOSE, 0.2);
        set(coco::LEFT_SHOULDER, 0.3);
        set(coco::RIGHT_SHOULDER, 0.3);
        set(coco::LEFT_HIP, 0.6);
        set(coco::RIGHT_HIP, 0.6);
        set(coco::LEFT_WRIST, wrist_y);
        set(coco::RIGHT_WRIST, wrist_y);
        kps
    }

    const HIGH_WRISTS: f32 = 0.22;
    const LOW_WRISTS: f32 = 0.5;

    /// 8s at 30fps. `blue` keeps a high guard for the first 4s and a low one
    /// after. `red` throws six jabs at blue: three missed into the high guard,
    /// three landed on the low one. Late in the fight blue throws a cross
    /// that lifts its hands for 12 frames.
    fn guard_fight() -> FightInput {
        let red_jabs = [(16u64, false), (48, false), (80, false), (136, true), (168, true), (200, true)];
        let blue_cross = 216u64;

        let mut fight = jab_fight();
        fight.duration = 8.0;
        fight.frames.clear();
        for i in 0..240u64 {
            let jab = red_jabs.iter().find(|(start, _)| (*start..start + 16).contains(&i));
            fight.frames.push(FrameRecord {
                fight_id: "f1".into(),
                fighter_id: "red".into(),
                frame_index: i,
                timestamp: i as f64 / 30.0,
                bbox: None,
                pose_keypoints: vec![],
                raw_class_logits: match jab {
                    Some((_, landed)) => logits_for(Some(StrikeType::Jab), *landed),
                    None => logits_for(None, false),
                },
                track_id: Some(1),
                track_lost: false,
            });

            let throwing = (blue_cross..blue_cross + 16).contains(&i);
            let wrists = if (blue_cross + 2..blue_cross + 14).contains(&i) || i < 120 {
                HIGH_WRISTS
            } else {
                LOW_WRISTS
            };
            fight.frames.push(FrameRecord {
                fight_id: "f1".into(),
                fighter_id: "blue".into(),
                frame_index: i,
                timestamp: i as f64 / 30.0,
                bbox: None,
                pose_keypoints: pose(wrists),
                raw_class_logits: logits_for(throwing.then_some(StrikeType::Cross), true),
                track_id: Some(2),
                track_lost: false,
            });
        }
        fight
    }

    struct DownScorer;

    impl FrameScorer for DownScorer {
        fn name(&self) -> &str {
            "down"
        }

        fn score(&self, _batch: &WindowBatch) -> Result<WindowScores, ScorerError> {
            Err(ScorerError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_fight_job_completes() {
        let ctx = AnalysisContext::new(Config::default(), Arc::new(LogitPoolingScorer::new()));
        let report = run_fight(&ctx, jab_fight(), CancelToken::new()).await.unwrap();

        assert!(report.status().is_complete());
        assert_eq!(report.strikes.len(), 1);
        assert_eq!(report.strikes[0].strike_type, StrikeType::Jab);

        // Every (fighter, category) stream tiles the fight; no pose data, so all UNKNOWN
        for fighter in ["red", "blue"] {
            for category in StateCategory::ALL {
                let stream: Vec<StateSegment> = report
                    .segments
                    .iter()
                    .filter(|s| s.fighter_id == fighter && s.category == category)
                    .cloned()
                    .collect();
                assert!(validate_segments(&stream, 4.0), "{} {}", fighter, category.as_str());
                assert!(stream.iter().all(|s| s.value.is_unknown() && !s.partial));
            }
        }

        // No boxes at all: one empty pressure sample per fighter, gaps audited
        assert_eq!(report.pressure.len(), 2);
        assert!(report.pressure.iter().all(|p| p.valid_frames == 0));
        assert!(report.audit.iter().any(|a| a.kind == "missing_track"));
        assert_eq!(report.features.len(), 2);

        let records = report.to_records();
        assert!(matches!(records.last(), Some(EventRecord::Job(_))));
        assert_eq!(ctx.metrics.summary().fights_complete, 1);
        ctx.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pose_guard_feeds_vulnerabilities() {
        let mut config = Config::default();
        config.vulnerability.min_sample_size = 3;
        let ctx = AnalysisContext::new(config, Arc::new(LogitPoolingScorer::new()));
        let report = run_fight(&ctx, guard_fight(), CancelToken::new()).await.unwrap();
        assert!(report.status().is_complete());

        let jabs: Vec<&StrikeEvent> = report.strikes.iter().filter(|e| e.fighter_id == "red").collect();
        assert_eq!(jabs.len(), 6);
        assert!(jabs.iter().all(|e| e.strike_type == StrikeType::Jab && e.target_id == "blue"));
        assert_eq!(jabs.iter().filter(|e| e.landed).count(), 3);
        let cross: Vec<&StrikeEvent> = report.strikes.iter().filter(|e| e.fighter_id == "blue").collect();
        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].strike_type, StrikeType::Cross);

        // High then low; the cross lifts the hands but the guard stays low
        let guard: Vec<&StateSegment> = report
            .segments
            .iter()
            .filter(|s| s.fighter_id == "blue" && s.category == StateCategory::GuardHeight)
            .collect();
        let known: Vec<GuardHeight> = guard.iter().filter_map(|s| s.value.guard()).collect();
        assert_eq!(known, vec![GuardHeight::High, GuardHeight::Low]);
        let last = guard.last().unwrap();
        assert_eq!(last.value.guard(), Some(GuardHeight::Low));
        assert!(last.start_ts < 4.5 && (last.end_ts - 8.0).abs() < 1e-9);

        // Landed only against the low guard: 3/3 vs baseline 3/6
        assert_eq!(report.vulnerabilities.len(), 1);
        let finding = &report.vulnerabilities[0];
        assert_eq!(finding.fighter_id, "blue");
        assert_eq!(finding.strike_type, StrikeType::Jab);
        assert_eq!(finding.guard_state, GuardHeight::Low);
        assert_eq!(finding.sample_size, 3);
        assert!((finding.conditional_probability - 1.0).abs() < 1e-9);
        assert!((finding.baseline_probability - 0.5).abs() < 1e-9);
        assert_eq!(finding.supporting_event_ids.len(), 3);
        ctx.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_job_is_partial() {
        let ctx = AnalysisContext::new(Config::default(), Arc::new(LogitPoolingScorer::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_fight(&ctx, jab_fight(), cancel).await.unwrap();

        assert!(matches!(report.status(), JobStatus::Partial { .. }));
        assert!(report.strikes.is_empty());
        assert!(report.features.is_empty());
        ctx.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_model_ends_job_as_partial() {
        let ctx = AnalysisContext::new(Config::default(), Arc::new(DownScorer));
        let report = run_fight(&ctx, jab_fight(), CancelToken::new()).await.unwrap();

        match report.status() {
            JobStatus::Partial { reason } => assert!(reason.contains("unavailable")),
            other => panic!("expected partial, got {:?}", other),
        }
        assert!(report.strikes.is_empty());
        assert!(report.audit.iter().any(|a| a.kind == "model_unavailable"));
        assert_eq!(ctx.metrics.summary().fights_partial, 1);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_fight_is_rejected() {
        let ctx = AnalysisContext::new(Config::default(), Arc::new(LogitPoolingScorer::new()));
        let mut fight = jab_fight();
        fight.fighters.pop();
        assert!(matches!(
            run_fight(&ctx, fight, CancelToken::new()).await,
            Err(MinerError::InvalidInput(_))
        ));
        ctx.shutdown().await;
    }
}
