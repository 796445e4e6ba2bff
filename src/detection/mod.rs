// src/detection/mod.rs

mod nms;
pub mod strike_detector;
mod window_plan;

// Re-export public APIs
pub use nms::{temporal_nms, StrikeCandidate};
pub use strike_detector::{FighterStrikes, StrikeDetector};
pub use window_plan::{plan_windows, window_count, WindowSpec};
