// src/analysis/territory.rs
//
// Tracking & territory analysis. Box centroids are mapped into ring
// coordinates (center = origin, circumradius = 1), then per frame and per
// fighter:
//
//   advance  = velocity component toward the opponent, saturating at
//              advance_speed_scale
//   center   = how much closer to the center than the opponent
//   cage     = how close the opponent is to the boundary
//   pressure = weighted sum of the three
//
// Short track losses are bridged with the last known position; longer ones
// are excluded and audited as MissingTrack. Aggregated per round.

use crate::analysis::velocity_tracker::PositionVelocityTracker;
use crate::config::TerritoryConfig;
use crate::error::MinerError;
use crate::pipeline::audit::AuditLog;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{FightInput, FighterId, PressureSample};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResolvedPosition {
    timestamp: f64,
    pos: (f64, f64),
    bridged: bool,
    /// Tracker reassigned the id on this frame
    track_reset: bool,
}

/// Movement summary consumed by the style engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FighterMotion {
    /// Mean distance to the opponent in ring radii.
    pub mean_opponent_distance: f64,
    /// Measured (not bridged) vertical centroid in ring units, by timestamp.
    pub vertical_series: Vec<(f64, f64)>,
    pub valid_frames: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TerritoryReport {
    pub samples: Vec<PressureSample>,
    pub motion: HashMap<FighterId, FighterMotion>,
}

#[derive(Default)]
struct RoundAccumulator {
    pressure_sum: f64,
    territory_sum: f64,
    pressuring_frames: u32,
    frames: u32,
}

/// Per-frame territory terms for one fighter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePressure {
    pub pressure: f64,
    /// Signed center dominance in [-1, 1]
    pub territory: f64,
}

pub struct TerritoryAnalyzer<'a> {
    config: &'a TerritoryConfig,
}

impl<'a> TerritoryAnalyzer<'a> {
    pub fn new(config: &'a TerritoryConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, fight: &FightInput, audit: &mut AuditLog, metrics: &PipelineMetrics) -> TerritoryReport {
        let tracks: HashMap<&str, BTreeMap<u64, ResolvedPosition>> = fight
            .fighters
            .iter()
            .map(|f| {
                let id = f.fighter_id.as_str();
                (id, self.resolve_track(fight, id, audit, metrics))
            })
            .collect();

        let mut report = TerritoryReport::default();
        for fighter in &fight.fighters {
            let id = fighter.fighter_id.as_str();
            let Some(opponent) = fight.opponent_of(id) else { continue };
            let empty = BTreeMap::new();
            let own = tracks.get(id).unwrap_or(&empty);
            let opp = tracks.get(opponent.fighter_id.as_str()).unwrap_or(&empty);

            let (samples, motion) = self.analyze_fighter(fight, id, own, opp);
            report.samples.extend(samples);
            report.motion.insert(id.to_string(), motion);
        }
        report
    }

    fn resolve_track(
        &self,
        fight: &FightInput,
        fighter_id: &str,
        audit: &mut AuditLog,
        metrics: &PipelineMetrics,
    ) -> BTreeMap<u64, ResolvedPosition> {
        let mut out = BTreeMap::new();
        let mut last: Option<((f64, f64), f64)> = None;
        let mut gap_start: Option<f64> = None;

        let frames = fight.frames_for(fighter_id);
        let mut report_gap = |start: f64, end: f64, last_seen: Option<f64>| {
            let gap_secs = end - last_seen.unwrap_or(start);
            metrics.inc(&metrics.missing_track_gaps);
            audit.record(
                Some(fighter_id),
                start,
                end,
                &MinerError::MissingTrack {
                    fighter_id: fighter_id.to_string(),
                    start_ts: start,
                    end_ts: end,
                    gap_secs,
                },
            );
        };

        for frame in &frames {
            match frame.bbox.filter(|b| b.is_finite() && b.area() > 0.0) {
                Some(bbox) => {
                    if let Some(start) = gap_start.take() {
                        report_gap(start, frame.timestamp, last.map(|l| l.1));
                    }
                    let (cx, cy) = bbox.center();
                    let pos = fight.ring.normalize(cx as f64, cy as f64);
                    out.insert(
                        frame.frame_index,
                        ResolvedPosition {
                            timestamp: frame.timestamp,
                            pos,
                            bridged: false,
                            track_reset: frame.track_lost,
                        },
                    );
                    last = Some((pos, frame.timestamp));
                }
                None => match last {
                    Some((pos, seen)) if gap_start.is_none() && frame.timestamp - seen <= self.config.max_bridge_gap_secs => {
                        out.insert(
                            frame.frame_index,
                            ResolvedPosition {
                                timestamp: frame.timestamp,
                                pos,
                                bridged: true,
                                track_reset: frame.track_lost,
                            },
                        );
                    }
                    _ => {
                        if gap_start.is_none() {
                            gap_start = Some(frame.timestamp);
                        }
                    }
                },
            }
        }
        if let (Some(start), Some(end)) = (gap_start, frames.last().map(|f| f.timestamp)) {
            report_gap(start, end, last.map(|l| l.1));
        }
        out
    }

    /// Pressure terms for one frame, seen from `own`.
    pub fn frame_pressure(
        &self,
        fight: &FightInput,
        own: (f64, f64),
        own_velocity: (f64, f64),
        opponent: (f64, f64),
    ) -> FramePressure {
        let cfg = self.config;
        let ring = &fight.ring;

        let (dx, dy) = (opponent.0 - own.0, opponent.1 - own.1);
        let dist = (dx * dx + dy * dy).sqrt();
        let advance = if dist > 1e-9 {
            (own_velocity.0 * dx + own_velocity.1 * dy) / dist
        } else {
            0.0
        };
        let advance_term = if cfg.advance_speed_scale > 0.0 {
            (advance / cfg.advance_speed_scale).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let territory = (ring.center_distance(opponent) - ring.center_distance(own)).clamp(-1.0, 1.0);
        let center_term = territory.max(0.0);

        let opp_boundary = ring.boundary_distance(opponent);
        let cage_term = if cfg.cage_proximity_scale > 0.0 {
            (1.0 - opp_boundary / cfg.cage_proximity_scale).clamp(0.0, 1.0)
        } else {
            0.0
        };

        FramePressure {
            pressure: cfg.weight_advance * advance_term + cfg.weight_center * center_term + cfg.weight_cage * cage_term,
            territory,
        }
    }

    fn analyze_fighter(
        &self,
        fight: &FightInput,
        fighter_id: &str,
        own: &BTreeMap<u64, ResolvedPosition>,
        opp: &BTreeMap<u64, ResolvedPosition>,
    ) -> (Vec<PressureSample>, FighterMotion) {
        let mut tracker = PositionVelocityTracker::new(self.config.velocity_history);
        let mut rounds: BTreeMap<u32, RoundAccumulator> = BTreeMap::new();
        if fight.rounds.is_empty() {
            rounds.insert(1, RoundAccumulator::default());
        }
        for r in &fight.rounds {
            rounds.insert(r.round, RoundAccumulator::default());
        }

        let mut motion = FighterMotion::default();
        let mut distance_sum = 0.0;

        for (idx, p) in own {
            if p.track_reset {
                tracker.reset();
            }
            let velocity = tracker.update(p.pos, p.timestamp);
            if !p.bridged {
                motion.vertical_series.push((p.timestamp, p.pos.1));
            }

            let Some(o) = opp.get(idx) else { continue };
            let Some(round) = fight.round_at(p.timestamp) else { continue };

            let terms = self.frame_pressure(fight, p.pos, velocity, o.pos);
            let acc = rounds.entry(round).or_default();
            acc.frames += 1;
            acc.pressure_sum += terms.pressure;
            acc.territory_sum += terms.territory;
            if terms.pressure >= self.config.pressure_threshold {
                acc.pressuring_frames += 1;
            }

            let (dx, dy) = (o.pos.0 - p.pos.0, o.pos.1 - p.pos.1);
            distance_sum += (dx * dx + dy * dy).sqrt();
            motion.valid_frames += 1;
        }

        if motion.valid_frames > 0 {
            motion.mean_opponent_distance = distance_sum / motion.valid_frames as f64;
        }

        let samples: Vec<PressureSample> = rounds
            .into_iter()
            .map(|(round, acc)| {
                let n = acc.frames.max(1) as f64;
                PressureSample {
                    fight_id: fight.fight_id.clone(),
                    fighter_id: fighter_id.to_string(),
                    round,
                    pressure_score: if acc.frames > 0 { acc.pressure_sum / n } else { 0.0 },
                    territory_score: if acc.frames > 0 { acc.territory_sum / n } else { 0.0 },
                    pressuring_secs: acc.pressuring_frames as f64 / fight.fps,
                    valid_frames: acc.frames,
                }
            })
            .collect();

        debug!(
            fight = %fight.fight_id,
            fighter = %fighter_id,
            valid_frames = motion.valid_frames,
            "territory: {} round samples",
            samples.len()
        );
        (samples, motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ring::RingGeometry;
    use crate::types::{BBox, FighterMeta, FrameRecord, RoundSpan, Stance};

    fn meta(id: &str) -> FighterMeta {
        FighterMeta {
            fighter_id: id.into(),
            stance: Stance::Orthodox,
            age: None,
            reach_cm: None,
            decimal_odds: None,
        }
    }

    /// Box of 80x200 px centered on ring-unit position (x, y) for the default ring.
    fn bbox_at(x: f64, y: f64) -> BBox {
        let ring = RingGeometry::default();
        let cx = (ring.center_x + x * ring.radius_px) as f32;
        let cy = (ring.center_y + y * ring.radius_px) as f32;
        BBox::new(cx - 40.0, cy - 100.0, cx + 40.0, cy + 100.0)
    }

    fn frame(fighter: &str, i: u64, bbox: Option<BBox>) -> FrameRecord {
        FrameRecord {
            fight_id: "f".into(),
            fighter_id: fighter.into(),
            frame_index: i,
            timestamp: i as f64 / 30.0,
            bbox,
            pose_keypoints: vec![],
            raw_class_logits: vec![],
            track_id: Some(1),
            track_lost: false,
        }
    }

    /// Red walks from the center toward blue, who is pinned near the right fence.
    fn pressure_fight(frames_n: u64) -> FightInput {
        let mut frames = Vec::new();
        for i in 0..frames_n {
            let t = i as f64 / 30.0;
            frames.push(frame("red", i, Some(bbox_at((0.1 * t).min(0.5), 0.0))));
            frames.push(frame("blue", i, Some(bbox_at(0.85, 0.0))));
        }
        FightInput {
            fight_id: "f".into(),
            video_id: "v".into(),
            fps: 30.0,
            duration: frames_n as f64 / 30.0,
            fighters: vec![meta("red"), meta("blue")],
            rounds: vec![],
            ring: RingGeometry::default(),
            frames,
        }
    }

    fn sample<'s>(report: &'s TerritoryReport, fighter: &str, round: u32) -> &'s PressureSample {
        report
            .samples
            .iter()
            .find(|s| s.fighter_id == fighter && s.round == round)
            .unwrap()
    }

    #[test]
    fn test_advancing_center_fighter_pressures() {
        let cfg = TerritoryConfig::default();
        let fight = pressure_fight(150);
        let mut audit = AuditLog::new("f", 100);
        let report = TerritoryAnalyzer::new(&cfg).analyze(&fight, &mut audit, &PipelineMetrics::new());

        let red = sample(&report, "red", 1);
        let blue = sample(&report, "blue", 1);
        assert_eq!(red.valid_frames, 150);
        assert!(red.pressure_score > blue.pressure_score);
        assert!(red.territory_score > 0.0 && blue.territory_score < 0.0);
        assert!(red.pressuring_secs > 0.0);
        assert_eq!(blue.pressuring_secs, 0.0);
        assert!(audit.is_empty());

        let motion = &report.motion["red"];
        assert_eq!(motion.vertical_series.len(), 150);
        assert!(motion.mean_opponent_distance > 0.3 && motion.mean_opponent_distance < 0.9);
    }

    #[test]
    fn test_short_loss_bridged_long_loss_excluded() {
        let cfg = TerritoryConfig {
            max_bridge_gap_secs: 0.95,
            ..TerritoryConfig::default()
        };
        let mut fight = pressure_fight(300);
        for f in fight.frames.iter_mut().filter(|f| f.fighter_id == "red") {
            // 0.5s loss (bridged) and a 3s loss (excluded past the bridge limit)
            if (30..45).contains(&f.frame_index) || (120..210).contains(&f.frame_index) {
                f.bbox = None;
            }
        }
        let mut audit = AuditLog::new("f", 100);
        let metrics = PipelineMetrics::new();
        let report = TerritoryAnalyzer::new(&cfg).analyze(&fight, &mut audit, &metrics);

        let red = sample(&report, "red", 1);
        // 300 frames − (90 lost − 28 bridged within 0.95s of the last sighting)
        assert_eq!(red.valid_frames, 300 - 62);
        assert_eq!(audit.count_kind("missing_track"), 1);
        assert_eq!(PipelineMetrics::get(&metrics.missing_track_gaps), 1);
        assert_eq!(report.motion["red"].vertical_series.len(), 300 - 15 - 90);
    }

    #[test]
    fn test_samples_per_round() {
        let cfg = TerritoryConfig::default();
        let mut fight = pressure_fight(180);
        fight.rounds = vec![
            RoundSpan { round: 1, start_ts: 0.0, end_ts: 3.0 },
            RoundSpan { round: 2, start_ts: 3.0, end_ts: 6.0 },
            RoundSpan { round: 3, start_ts: 6.0, end_ts: 9.0 },
        ];
        let mut audit = AuditLog::new("f", 100);
        let report = TerritoryAnalyzer::new(&cfg).analyze(&fight, &mut audit, &PipelineMetrics::new());

        assert_eq!(report.samples.len(), 6);
        assert_eq!(sample(&report, "red", 1).valid_frames, 90);
        assert_eq!(sample(&report, "red", 2).valid_frames, 90);
        // Round 3 has no frames but is still reported
        assert_eq!(sample(&report, "red", 3).valid_frames, 0);
        assert_eq!(sample(&report, "red", 3).pressure_score, 0.0);
    }
}
