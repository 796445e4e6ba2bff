// src/types.rs
//
// Shared data model. Every entity is created by exactly one stage and only
// read downstream; later stages derive new entities instead of editing these.

use crate::analysis::ring::RingGeometry;
use crate::error::MinerError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type FightId = String;
pub type FighterId = String;
pub type EventId = Uuid;

// ============================================================================
// FRAME INPUT
// ============================================================================

/// Axis-aligned box in source-video pixels, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Height over width. Standing fighters are tall, grounded ones are flat.
    pub fn aspect(&self) -> f32 {
        if self.width() > f32::EPSILON {
            self.height() / self.width()
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > f32::EPSILON {
            inter / union
        } else {
            0.0
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// Pose keypoint in normalised image coordinates (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// COCO-17 keypoint indices used by posture labeling.
pub mod coco {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 5;
    pub const RIGHT_SHOULDER: usize = 6;
    pub const LEFT_WRIST: usize = 9;
    pub const RIGHT_WRIST: usize = 10;
    pub const LEFT_HIP: usize = 11;
    pub const RIGHT_HIP: usize = 12;
    pub const LEFT_ANKLE: usize = 15;
    pub const RIGHT_ANKLE: usize = 16;
    pub const COUNT: usize = 17;

    /// Left/right pairs swapped when a pose is mirrored horizontally.
    pub const FLIP_PAIRS: [(usize, usize); 8] = [
        (1, 2),
        (3, 4),
        (5, 6),
        (7, 8),
        (9, 10),
        (11, 12),
        (13, 14),
        (15, 16),
    ];
}

/// One extractor output row: one fighter, one frame.
///
/// `raw_class_logits` follows the strike head layout
/// `[background, StrikeType::ALL..., landed]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    pub frame_index: u64,
    pub timestamp: f64,
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub pose_keypoints: Vec<Keypoint>,
    #[serde(default)]
    pub raw_class_logits: Vec<f32>,
    /// Tracker id for this fighter on this frame.
    #[serde(default)]
    pub track_id: Option<u32>,
    /// Set by the tracker when the id for this physical fighter was reassigned.
    #[serde(default)]
    pub track_lost: bool,
}

// ============================================================================
// STRIKES
// ============================================================================

/// Stance-relative strike taxonomy ("lead"/"rear" rather than left/right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeType {
    Jab,
    Cross,
    LeadHook,
    RearHook,
    Uppercut,
    Overhand,
    LowKick,
    BodyKick,
    HeadKick,
    Knee,
    Elbow,
}

impl StrikeType {
    pub const ALL: [StrikeType; 11] = [
        StrikeType::Jab,
        StrikeType::Cross,
        StrikeType::LeadHook,
        StrikeType::RearHook,
        StrikeType::Uppercut,
        StrikeType::Overhand,
        StrikeType::LowKick,
        StrikeType::BodyKick,
        StrikeType::HeadKick,
        StrikeType::Knee,
        StrikeType::Elbow,
    ];

    /// Background class + one per strike + trailing landed logit.
    pub const LOGIT_LEN: usize = Self::ALL.len() + 2;

    /// Position of this strike in the classifier's probability vector (0 is background).
    pub fn class_index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn from_class_index(idx: usize) -> Option<Self> {
        if idx == 0 {
            return None;
        }
        Self::ALL.get(idx - 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jab => "jab",
            Self::Cross => "cross",
            Self::LeadHook => "lead_hook",
            Self::RearHook => "rear_hook",
            Self::Uppercut => "uppercut",
            Self::Overhand => "overhand",
            Self::LowKick => "low_kick",
            Self::BodyKick => "body_kick",
            Self::HeadKick => "head_kick",
            Self::Knee => "knee",
            Self::Elbow => "elbow",
        }
    }

    pub fn is_kick(&self) -> bool {
        matches!(self, Self::LowKick | Self::BodyKick | Self::HeadKick)
    }
}

/// One physical strike after window merging. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeEvent {
    pub event_id: EventId,
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    /// The fighter the strike was thrown at.
    pub target_id: FighterId,
    pub strike_type: StrikeType,
    pub timestamp: f64,
    pub confidence: f32,
    pub landed: bool,
    pub window_ids: Vec<u64>,
}

impl StrikeEvent {
    /// Deterministic id: the same strike re-detected on a re-run keeps its id.
    pub fn derive_id(fight_id: &str, fighter_id: &str, strike: StrikeType, timestamp: f64) -> EventId {
        let name = format!(
            "{}/{}/{}/{:016x}",
            fight_id,
            fighter_id,
            strike.as_str(),
            timestamp.to_bits()
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

// ============================================================================
// STATE SEGMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCategory {
    GuardHeight,
    Stance,
    Position,
}

impl StateCategory {
    pub const ALL: [StateCategory; 3] = [Self::GuardHeight, Self::Stance, Self::Position];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuardHeight => "guard_height",
            Self::Stance => "stance",
            Self::Position => "position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardHeight {
    High,
    Mid,
    Low,
}

impl GuardHeight {
    pub const ALL: [GuardHeight; 3] = [Self::High, Self::Mid, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Orthodox,
    Southpaw,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrapplingPosition {
    Standing,
    Clinch,
    TopControl,
    BottomControl,
}

/// Value of a smoothed state. `Unknown` fills tracking gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Guard(GuardHeight),
    Stance(Stance),
    Position(GrapplingPosition),
    Unknown,
}

impl StateValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn guard(&self) -> Option<GuardHeight> {
        match self {
            Self::Guard(g) => Some(*g),
            _ => None,
        }
    }

    pub fn stance(&self) -> Option<Stance> {
        match self {
            Self::Stance(s) => Some(*s),
            _ => None,
        }
    }
}

/// Contiguous, non-overlapping stretch of one state for one fighter.
/// Covers `[start_ts, end_ts)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSegment {
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    pub category: StateCategory,
    pub value: StateValue,
    pub start_ts: f64,
    pub end_ts: f64,
    /// Mean label confidence of the frames that supported this segment.
    pub confidence: f32,
    /// Set when the owning job stopped before the fight was fully processed.
    #[serde(default)]
    pub partial: bool,
}

impl StateSegment {
    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    /// Length of the overlap between this segment and `[start, end)`.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end_ts.min(end) - self.start_ts.max(start)).max(0.0)
    }
}

// ============================================================================
// DERIVED ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    pub round: u32,
    /// Mean per-frame pressure score over the round's valid frames.
    pub pressure_score: f64,
    /// Mean center dominance over the round's valid frames.
    pub territory_score: f64,
    pub pressuring_secs: f64,
    pub valid_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboPattern {
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    pub token_sequence: Vec<StrikeType>,
    pub frequency: u32,
    pub landed_rate: f64,
    pub supporting_event_ids: Vec<EventId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    pub fight_id: FightId,
    /// The defending fighter.
    pub fighter_id: FighterId,
    pub strike_type: StrikeType,
    pub guard_state: GuardHeight,
    pub conditional_probability: f64,
    pub baseline_probability: f64,
    pub sample_size: u32,
    pub effect_size: f64,
    pub supporting_event_ids: Vec<EventId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub fighter_id: FighterId,
    pub feature_vector: Vec<f64>,
    pub cluster_id: usize,
    pub style_label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipReference {
    pub fight_id: FightId,
    pub fighter_id: FighterId,
    pub start_ts: f64,
    pub end_ts: f64,
    /// Earliest event that produced this clip.
    pub source_event_id: EventId,
    pub source_event_ids: Vec<EventId>,
}

// ============================================================================
// FIGHT JOB INPUT / STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterMeta {
    pub fighter_id: FighterId,
    /// Stored lead stance, used for orientation normalisation.
    pub stance: Stance,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub reach_cm: Option<f64>,
    #[serde(default)]
    pub decimal_odds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundSpan {
    pub round: u32,
    pub start_ts: f64,
    pub end_ts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightInput {
    pub fight_id: FightId,
    pub video_id: String,
    pub fps: f64,
    /// Fight length in seconds; every segment list spans `[0, duration)`.
    pub duration: f64,
    pub fighters: Vec<FighterMeta>,
    #[serde(default)]
    pub rounds: Vec<RoundSpan>,
    #[serde(default)]
    pub ring: RingGeometry,
    pub frames: Vec<FrameRecord>,
}

impl FightInput {
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.fighters.len() != 2 {
            return Err(MinerError::InvalidInput(format!(
                "fight {} has {} fighters, expected 2",
                self.fight_id,
                self.fighters.len()
            )));
        }
        if !(self.fps > 0.0) || !(self.duration > 0.0) {
            return Err(MinerError::InvalidInput(format!(
                "fight {} has non-positive fps/duration",
                self.fight_id
            )));
        }
        if !self.ring.is_valid() {
            return Err(MinerError::InvalidInput(format!(
                "fight {} has invalid ring geometry",
                self.fight_id
            )));
        }
        if let Some(f) = self
            .frames
            .iter()
            .find(|f| f.fight_id != self.fight_id || self.fighter(&f.fighter_id).is_none())
        {
            return Err(MinerError::InvalidInput(format!(
                "frame {} ({}/{}) does not belong to fight {}",
                f.frame_index, f.fight_id, f.fighter_id, self.fight_id
            )));
        }
        Ok(())
    }

    /// This fighter's frames in `frame_index` order.
    pub fn frames_for(&self, fighter_id: &str) -> Vec<&FrameRecord> {
        let mut frames: Vec<&FrameRecord> = self
            .frames
            .iter()
            .filter(|f| f.fighter_id == fighter_id)
            .collect();
        frames.sort_by_key(|f| f.frame_index);
        frames
    }

    pub fn opponent_of(&self, fighter_id: &str) -> Option<&FighterMeta> {
        self.fighters.iter().find(|f| f.fighter_id != fighter_id)
    }

    pub fn fighter(&self, fighter_id: &str) -> Option<&FighterMeta> {
        self.fighters.iter().find(|f| f.fighter_id == fighter_id)
    }

    /// Round containing `ts`. With no round table the whole fight is round 1.
    pub fn round_at(&self, ts: f64) -> Option<u32> {
        if self.rounds.is_empty() {
            return Some(1);
        }
        self.rounds
            .iter()
            .find(|r| ts >= r.start_ts && ts < r.end_ts)
            .map(|r| r.round)
    }
}

/// Outcome of one fight job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Complete,
    Partial { reason: String },
}

impl JobStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}
