// src/mining/mod.rs
//
// Pattern mining over merged strike events:
//   strikes thrown   → combos         → ComboPattern
//   strikes received → vulnerability  → VulnerabilityFinding (+ guard segments)

pub mod combos;
pub mod vulnerability;

pub use combos::mine_combos;
pub use vulnerability::{attributed_guard, mine_vulnerabilities};
