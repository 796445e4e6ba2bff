// src/analysis/mod.rs
//
// Per-frame analysis feeding the smoother and the territory stage.
//
// Signal flow:
//   pose keypoints + boxes → posture ──→ LabeledFrame streams → smoother
//   boxes → ring (normalise) → velocity_tracker ─┐
//                                                └→ territory → PressureSample

pub mod posture;
pub mod ring;
pub mod territory;
pub mod velocity_tracker;

pub use posture::PostureLabeler;
pub use ring::{RingGeometry, RingShape};
pub use territory::{FighterMotion, TerritoryAnalyzer, TerritoryReport};
pub use velocity_tracker::PositionVelocityTracker;
