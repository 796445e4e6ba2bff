// src/mining/combos.rs
//
// Combo extraction: a fighter's strikes, in time order, are cut into
// sequences wherever two strikes are more than `max_gap_secs` apart; every
// n-gram (min_len..=max_len) inside a sequence is counted. Ranked by
// frequency, then landed rate.

use crate::config::ComboConfig;
use crate::error::MinerError;
use crate::pipeline::audit::AuditLog;
use crate::types::{ComboPattern, EventId, StrikeEvent, StrikeType};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Default)]
struct NgramStats {
    frequency: u32,
    strikes: u32,
    landed: u32,
    event_ids: Vec<EventId>,
    first_ts: f64,
    last_ts: f64,
}

/// Split time-ordered strikes into gap-separated sequences.
pub fn split_sequences<'e>(events: &[&'e StrikeEvent], max_gap_secs: f64) -> Vec<Vec<&'e StrikeEvent>> {
    let mut sequences: Vec<Vec<&StrikeEvent>> = Vec::new();
    for &event in events {
        match sequences.last_mut() {
            Some(seq) if seq.last().map_or(false, |prev| event.timestamp - prev.timestamp <= max_gap_secs) => {
                seq.push(event)
            }
            _ => sequences.push(vec![event]),
        }
    }
    sequences
}

pub fn token_label(tokens: &[StrikeType]) -> String {
    tokens.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("-")
}

/// Mine one fighter's combos from the strikes they threw.
pub fn mine_combos(
    fight_id: &str,
    fighter_id: &str,
    events: &[StrikeEvent],
    config: &ComboConfig,
    audit: &mut AuditLog,
) -> Vec<ComboPattern> {
    let mut ordered: Vec<&StrikeEvent> = events.iter().filter(|e| e.fighter_id == fighter_id).collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut stats: BTreeMap<Vec<StrikeType>, NgramStats> = BTreeMap::new();
    for seq in split_sequences(&ordered, config.max_gap_secs) {
        for n in config.min_len..=config.max_len {
            if seq.len() < n {
                break;
            }
            for gram in seq.windows(n) {
                let key: Vec<StrikeType> = gram.iter().map(|e| e.strike_type).collect();
                let entry = stats.entry(key).or_insert_with(|| NgramStats {
                    first_ts: gram[0].timestamp,
                    ..Default::default()
                });
                entry.frequency += 1;
                entry.strikes += n as u32;
                entry.landed += gram.iter().filter(|e| e.landed).count() as u32;
                entry.last_ts = gram[n - 1].timestamp;
                for e in gram {
                    if !entry.event_ids.contains(&e.event_id) {
                        entry.event_ids.push(e.event_id);
                    }
                }
            }
        }
    }

    let mut patterns = Vec::new();
    for (tokens, s) in stats {
        if s.frequency < config.min_frequency {
            audit.record(
                Some(fighter_id),
                s.first_ts,
                s.last_ts,
                &MinerError::InsufficientSample {
                    what: format!("combo {}", token_label(&tokens)),
                    got: s.frequency,
                    need: config.min_frequency,
                },
            );
            continue;
        }
        patterns.push(ComboPattern {
            fight_id: fight_id.to_string(),
            fighter_id: fighter_id.to_string(),
            landed_rate: s.landed as f64 / s.strikes.max(1) as f64,
            token_sequence: tokens,
            frequency: s.frequency,
            supporting_event_ids: s.event_ids,
        });
    }

    patterns.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| b.landed_rate.total_cmp(&a.landed_rate))
            .then_with(|| b.token_sequence.len().cmp(&a.token_sequence.len()))
            .then_with(|| a.token_sequence.cmp(&b.token_sequence))
    });
    patterns.truncate(config.top_k);

    debug!(
        fight = %fight_id,
        fighter = %fighter_id,
        "combos: {} patterns from {} strikes",
        patterns.len(),
        ordered.len()
    );
    patterns
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn strike(fighter: &str, target: &str, strike: StrikeType, ts: f64, landed: bool) -> StrikeEvent {
        StrikeEvent {
            event_id: StrikeEvent::derive_id("f", fighter, strike, ts),
            fight_id: "f".into(),
            fighter_id: fighter.into(),
            target_id: target.into(),
            strike_type: strike,
            timestamp: ts,
            confidence: 0.9,
            landed,
            window_ids: vec![0],
        }
    }

    #[test]
    fn test_repeated_one_two_is_top_combo() {
        use StrikeType::*;
        let mut events = Vec::new();
        for k in 0..3 {
            let t = 5.0 * k as f64;
            events.push(strike("red", "blue", Jab, t, false));
            events.push(strike("red", "blue", Cross, t + 0.3, true));
        }
        let mut audit = AuditLog::new("f", 100);
        let combos = mine_combos("f", "red", &events, &ComboConfig::default(), &mut audit);

        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].token_sequence, vec![Jab, Cross]);
        assert_eq!(combos[0].frequency, 3);
        assert!((combos[0].landed_rate - 0.5).abs() < 1e-12);
        assert_eq!(combos[0].supporting_event_ids.len(), 6);
    }

    #[test]
    fn test_long_gap_breaks_sequence() {
        use StrikeType::*;
        let events = vec![
            strike("red", "blue", Jab, 1.0, true),
            strike("red", "blue", Cross, 2.5, true),
            strike("red", "blue", Jab, 4.0, true),
            strike("red", "blue", Cross, 5.5, true),
        ];
        let mut audit = AuditLog::new("f", 100);
        let combos = mine_combos("f", "red", &events, &ComboConfig::default(), &mut audit);
        assert!(combos.is_empty());
        assert!(audit.is_empty());
    }

    #[test]
    fn test_rare_combos_are_suppressed_and_audited() {
        use StrikeType::*;
        let events = vec![
            strike("red", "blue", Jab, 1.0, true),
            strike("red", "blue", LeadHook, 1.4, true),
            strike("red", "blue", LowKick, 1.9, false),
        ];
        let mut audit = AuditLog::new("f", 100);
        let combos = mine_combos("f", "red", &events, &ComboConfig::default(), &mut audit);
        assert!(combos.is_empty());
        // jab-lead_hook, lead_hook-low_kick, jab-lead_hook-low_kick
        assert_eq!(audit.count_kind("insufficient_sample"), 3);
    }

    #[test]
    fn test_ranking_prefers_frequency_then_landed_rate() {
        use StrikeType::*;
        let mut events = Vec::new();
        for k in 0..4 {
            let t = 10.0 * k as f64;
            events.push(strike("red", "blue", Jab, t, true));
            events.push(strike("red", "blue", Jab, t + 0.2, true));
            events.push(strike("red", "blue", LowKick, t + 0.8, k < 2));
        }
        let mut audit = AuditLog::new("f", 100);
        let combos = mine_combos("f", "red", &events, &ComboConfig::default(), &mut audit);

        // All three n-grams occur 4 times; jab-jab lands every time
        assert_eq!(combos.len(), 3);
        assert_eq!(combos[0].token_sequence, vec![Jab, Jab]);
        assert!(combos.iter().all(|c| c.frequency == 4));
        assert!(combos[0].landed_rate >= combos[1].landed_rate);
    }
}
