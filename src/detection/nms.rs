// src/detection/nms.rs
//
// Temporal non-maximum suppression. Overlapping windows see the same strike
// several times; same-class predictions within `overlap_secs` of a stronger
// one collapse into it. Kept predictions are pairwise further apart than the
// threshold, so running the merge on its own output changes nothing.
//
// Ordering inside a class: confidence desc, then earliest center timestamp,
// then lowest window id. Input order never matters.

use crate::config::NmsConfig;
use crate::types::StrikeType;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct StrikeCandidate {
    pub strike_type: StrikeType,
    pub center_ts: f64,
    pub confidence: f32,
    pub landed_prob: f32,
    /// Windows that contributed to this candidate, sorted and unique.
    pub window_ids: Vec<u64>,
}

fn rank(a: &StrikeCandidate, b: &StrikeCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.center_ts.total_cmp(&b.center_ts))
        .then_with(|| a.window_ids.first().cmp(&b.window_ids.first()))
}

pub fn temporal_nms(candidates: &[StrikeCandidate], cfg: &NmsConfig) -> Vec<StrikeCandidate> {
    let mut by_class: BTreeMap<StrikeType, Vec<StrikeCandidate>> = BTreeMap::new();
    for c in candidates {
        if c.confidence.is_nan() || c.confidence < cfg.confidence_floor {
            continue;
        }
        let mut c = c.clone();
        c.window_ids.sort_unstable();
        c.window_ids.dedup();
        by_class.entry(c.strike_type).or_default().push(c);
    }

    let mut merged: Vec<StrikeCandidate> = Vec::new();
    for (_, mut group) in by_class {
        group.sort_by(rank);
        let mut kept: Vec<StrikeCandidate> = Vec::new();
        for cand in group {
            match kept
                .iter_mut()
                .find(|k| (k.center_ts - cand.center_ts).abs() <= cfg.overlap_secs)
            {
                Some(winner) => {
                    winner.window_ids.extend(cand.window_ids);
                    winner.window_ids.sort_unstable();
                    winner.window_ids.dedup();
                }
                None => kept.push(cand),
            }
        }
        merged.extend(kept);
    }

    merged.sort_by(|a, b| {
        a.center_ts
            .total_cmp(&b.center_ts)
            .then_with(|| a.strike_type.cmp(&b.strike_type))
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(strike: StrikeType, ts: f64, conf: f32, window: u64) -> StrikeCandidate {
        StrikeCandidate {
            strike_type: strike,
            center_ts: ts,
            confidence: conf,
            landed_prob: 0.5,
            window_ids: vec![window],
        }
    }

    fn cfg() -> NmsConfig {
        NmsConfig {
            overlap_secs: 0.2,
            confidence_floor: 0.5,
        }
    }

    #[test]
    fn test_overlapping_same_class_keeps_strongest() {
        let input = vec![
            cand(StrikeType::Jab, 1.00, 0.6, 3),
            cand(StrikeType::Jab, 1.05, 0.9, 4),
        ];
        let out = temporal_nms(&input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].center_ts, 1.05);
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[0].window_ids, vec![3, 4]);
    }

    #[test]
    fn test_different_classes_do_not_merge() {
        let input = vec![
            cand(StrikeType::Jab, 1.00, 0.8, 0),
            cand(StrikeType::Cross, 1.05, 0.9, 1),
        ];
        assert_eq!(temporal_nms(&input, &cfg()).len(), 2);
    }

    #[test]
    fn test_tie_breaks_on_earliest_timestamp() {
        let input = vec![
            cand(StrikeType::LeadHook, 2.10, 0.7, 9),
            cand(StrikeType::LeadHook, 2.00, 0.7, 8),
        ];
        let out = temporal_nms(&input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].center_ts, 2.00);
    }

    #[test]
    fn test_below_floor_is_discarded() {
        let input = vec![cand(StrikeType::Jab, 1.0, 0.3, 0)];
        assert!(temporal_nms(&input, &cfg()).is_empty());
    }

    #[test]
    fn test_nan_confidence_is_discarded() {
        let input = vec![
            cand(StrikeType::Jab, 1.0, f32::NAN, 0),
            cand(StrikeType::Cross, 2.0, 0.8, 1),
        ];
        let out = temporal_nms(&input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strike_type, StrikeType::Cross);
    }

    #[test]
    fn test_merge_is_idempotent() {
        // A chain where greedy NMS keeps both ends: 1.0 (0.9) suppresses 1.15,
        // 1.3 survives because it is 0.3s from the winner.
        let input = vec![
            cand(StrikeType::Jab, 1.00, 0.9, 0),
            cand(StrikeType::Jab, 1.15, 0.8, 1),
            cand(StrikeType::Jab, 1.30, 0.7, 2),
            cand(StrikeType::Cross, 1.10, 0.55, 3),
            cand(StrikeType::Cross, 4.00, 0.95, 4),
            cand(StrikeType::Jab, 6.00, 0.4, 5),
        ];
        let once = temporal_nms(&input, &cfg());
        let twice = temporal_nms(&once, &cfg());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 4);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut input = vec![
            cand(StrikeType::Jab, 1.00, 0.6, 0),
            cand(StrikeType::Jab, 1.05, 0.9, 1),
            cand(StrikeType::Jab, 1.20, 0.9, 2),
            cand(StrikeType::LowKick, 3.0, 0.7, 3),
        ];
        let forward = temporal_nms(&input, &cfg());
        input.reverse();
        assert_eq!(forward, temporal_nms(&input, &cfg()));
    }
}
