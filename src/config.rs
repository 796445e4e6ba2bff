// src/config.rs
//
// Run configuration, loaded from YAML. Every threshold the mining stages use
// lives here; nothing is hard-coded in the stages themselves. Missing sections
// fall back to their Default.

use crate::error::MinerError;
use crate::types::Stance;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub nms: NmsConfig,
    pub pool: PoolConfig,
    pub smoother: SmootherConfig,
    pub posture: PostureConfig,
    pub territory: TerritoryConfig,
    pub combos: ComboConfig,
    pub vulnerability: VulnerabilityConfig,
    pub style: StyleConfig,
    pub clips: ClipConfig,
    pub io: IoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Frames per inference window (W)
    pub window_frames: usize,
    /// Frames between window starts (S < W)
    pub stride_frames: usize,
    /// Orientation the classifier was trained in
    pub canonical_stance: Stance,
    /// Class-index pairs swapped when re-mirroring a mirrored window's scores
    pub mirror_class_pairs: Vec<(usize, usize)>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_frames: 16, // ~530ms at 30fps
            stride_frames: 4,
            canonical_stance: Stance::Orthodox,
            mirror_class_pairs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsConfig {
    /// Same-class predictions closer than this (seconds) are one strike
    pub overlap_secs: f64,
    /// Predictions below this confidence are dropped
    pub confidence_floor: f32,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            overlap_secs: 0.2,
            confidence_floor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// Bounded request queue; submitters wait when it is full
    pub queue_capacity: usize,
    pub timeout_ms: u64,
    /// Extra attempts after a timeout
    pub retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 32,
            timeout_ms: 2_000,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    /// Consecutive frames a new state must persist before it is accepted
    pub min_dwell_frames: usize,
    /// Labels below this confidence count as no evidence
    pub min_confidence: f32,
    /// Unlabeled stretches longer than this become UNKNOWN segments
    pub max_gap_secs: f64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            min_dwell_frames: 5,
            min_confidence: 0.3,
            max_gap_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    pub guard: HysteresisConfig,
    pub stance: HysteresisConfig,
    pub position: HysteresisConfig,
    /// Half-width (seconds) of the "active strike" span around each strike
    pub strike_active_pad_secs: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            guard: HysteresisConfig::default(),
            stance: HysteresisConfig {
                min_dwell_frames: 15, // stance switches are deliberate
                ..HysteresisConfig::default()
            },
            position: HysteresisConfig {
                min_dwell_frames: 20,
                max_gap_secs: 2.0,
                ..HysteresisConfig::default()
            },
            strike_active_pad_secs: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    pub min_keypoint_score: f32,
    /// Hands above nose + ratio * (shoulder - nose) => high guard
    pub guard_high_ratio: f32,
    /// Hands above shoulder + ratio * (hip - shoulder) => mid guard
    pub guard_mid_ratio: f32,
    /// Ankle x-separation below ratio * shoulder width => square stance
    pub square_stance_ratio: f32,
    /// Box height/width above this => upright
    pub standing_aspect: f32,
    /// IoU between upright fighters above this => clinch
    pub clinch_iou: f32,
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            min_keypoint_score: 0.3,
            guard_high_ratio: 0.5,
            guard_mid_ratio: 0.35,
            square_stance_ratio: 0.25,
            standing_aspect: 1.2,
            clinch_iou: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryConfig {
    /// Track loss shorter than this is bridged with the last known position
    pub max_bridge_gap_secs: f64,
    /// Samples used for velocity estimation
    pub velocity_history: usize,
    /// Advancing speed (ring radii per second) that saturates the advance term
    pub advance_speed_scale: f64,
    /// Opponent boundary distance (ring radii) under which cage proximity counts
    pub cage_proximity_scale: f64,
    pub weight_advance: f64,
    pub weight_center: f64,
    pub weight_cage: f64,
    /// Frames scoring at or above this count as pressuring
    pub pressure_threshold: f64,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            max_bridge_gap_secs: 1.0,
            velocity_history: 6,
            advance_speed_scale: 0.5,
            cage_proximity_scale: 0.25,
            weight_advance: 0.4,
            weight_center: 0.3,
            weight_cage: 0.3,
            pressure_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    pub min_len: usize,
    pub max_len: usize,
    /// Gap (seconds) between strikes beyond which a sequence breaks
    pub max_gap_secs: f64,
    pub min_frequency: u32,
    pub top_k: usize,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 4,
            max_gap_secs: 0.8,
            min_frequency: 2,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityConfig {
    /// Guard window inspected before each incoming strike (seconds)
    pub lookback_secs: f64,
    /// Share of the lookback a guard state must cover to be attributed
    pub min_coverage: f64,
    pub min_sample_size: u32,
    pub min_effect_size: f64,
    pub top_k: usize,
}

impl Default for VulnerabilityConfig {
    fn default() -> Self {
        Self {
            lookback_secs: 0.3,
            min_coverage: 0.5,
            min_sample_size: 8,
            min_effect_size: 0.1,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub clusters: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Softmax temperature for label confidence (in standardised distance units)
    pub temperature: f64,
    /// Ridge term for the outcome regression
    pub ridge_lambda: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            max_iterations: 100,
            tolerance: 1e-6,
            temperature: 1.0,
            ridge_lambda: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    pub pre_pad_secs: f64,
    pub post_pad_secs: f64,
    /// Padded windows closer than this are merged into one clip
    pub merge_gap_secs: f64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            pre_pad_secs: 2.0,
            post_pad_secs: 1.5,
            merge_gap_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub corpus_dir: String,
    pub exemplars_path: String,
    pub outcomes_path: Option<String>,
    /// Fight jobs run at the same time
    pub max_concurrent_fights: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: "fights".to_string(),
            output_dir: "out".to_string(),
            corpus_dir: "corpus".to_string(),
            exemplars_path: "exemplars.yaml".to_string(),
            outcomes_path: None,
            max_concurrent_fights: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Audit records kept per fight job before the oldest are dropped
    pub audit_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit_capacity: 10_000,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MinerError> {
        let bad = |msg: &str| Err(MinerError::InvalidConfig(msg.to_string()));

        if self.window.window_frames == 0 {
            return bad("window.window_frames must be > 0");
        }
        if self.window.stride_frames == 0 || self.window.stride_frames >= self.window.window_frames {
            return bad("window.stride_frames must be in 1..window_frames");
        }
        if !(self.nms.overlap_secs >= 0.0) {
            return bad("nms.overlap_secs must be >= 0");
        }
        if self.pool.workers == 0 || self.pool.queue_capacity == 0 {
            return bad("pool.workers and pool.queue_capacity must be > 0");
        }
        for (name, h) in [
            ("guard", &self.smoother.guard),
            ("stance", &self.smoother.stance),
            ("position", &self.smoother.position),
        ] {
            if h.min_dwell_frames == 0 {
                return Err(MinerError::InvalidConfig(format!(
                    "smoother.{}.min_dwell_frames must be > 0",
                    name
                )));
            }
        }
        if self.combos.min_len < 2 || self.combos.max_len < self.combos.min_len {
            return bad("combos.min_len must be >= 2 and <= combos.max_len");
        }
        if self.vulnerability.min_sample_size == 0 {
            return bad("vulnerability.min_sample_size must be > 0");
        }
        if !(self.vulnerability.lookback_secs > 0.0) {
            return bad("vulnerability.lookback_secs must be > 0");
        }
        if self.style.clusters == 0 || !(self.style.temperature > 0.0) {
            return bad("style.clusters and style.temperature must be > 0");
        }
        if self.clips.pre_pad_secs < 0.0 || self.clips.post_pad_secs < 0.0 || self.clips.merge_gap_secs < 0.0 {
            return bad("clip padding must be >= 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "nms:\n  overlap_secs: 0.35\nvulnerability:\n  min_sample_size: 12\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.nms.overlap_secs, 0.35);
        assert_eq!(config.nms.confidence_floor, 0.5);
        assert_eq!(config.vulnerability.min_sample_size, 12);
        assert_eq!(config.window.window_frames, 16);
    }

    #[test]
    fn test_stride_must_be_smaller_than_window() {
        let mut config = Config::default();
        config.window.stride_frames = config.window.window_frames;
        assert!(matches!(config.validate(), Err(MinerError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "pool:\n  workers: 2\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.queue_capacity, 32);
    }
}
