// src/lib.rs
//
// fight_miner: offline pattern mining over per-frame fight-video inference.
//
//   FightInput ─→ detection (windows → pool → NMS) ─→ StrikeEvent
//              ─→ analysis::posture → smoother      ─→ StateSegment
//              ─→ analysis::territory               ─→ PressureSample
//   strikes + segments ─→ mining                    ─→ ComboPattern, VulnerabilityFinding
//   per-fight features ─→ style (corpus, k-means)   ─→ StyleProfile, outcome stats
//   findings ─→ clips ─→ MediaSink;  everything ─→ export (versioned JSON lines)

pub mod analysis;
pub mod clips;
pub mod config;
pub mod detection;
pub mod error;
pub mod export;
pub mod fight_source;
pub mod inference;
pub mod mining;
pub mod pipeline;
pub mod smoother;
pub mod style;
pub mod types;

pub use config::Config;
pub use error::{MinerError, MinerResult};
