// src/mining/vulnerability.rs
//
// Guard-linked vulnerability mining for one defender.
//
// Each incoming strike is attributed to the defender's guard height over
// the lookback window just before it: the guard value with the largest
// overlap, provided it covers at least `min_coverage` of the window.
// Strikes with no attributable guard are left out entirely.
//
//   P(landed | type, guard)  vs  baseline P(landed | type)
//
// A finding needs `sample_size >= min_sample_size` AND
// `conditional - baseline >= min_effect_size`.

use crate::config::VulnerabilityConfig;
use crate::error::MinerError;
use crate::pipeline::audit::AuditLog;
use crate::types::{EventId, GuardHeight, StateCategory, StateSegment, StrikeEvent, StrikeType, VulnerabilityFinding};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Default)]
struct Tally {
    attempts: u32,
    landed: u32,
    landed_ids: Vec<EventId>,
    first_ts: f64,
    last_ts: f64,
}

impl Tally {
    fn add(&mut self, event: &StrikeEvent) {
        if self.attempts == 0 {
            self.first_ts = event.timestamp;
        }
        self.attempts += 1;
        self.last_ts = event.timestamp;
        if event.landed {
            self.landed += 1;
            self.landed_ids.push(event.event_id);
        }
    }

    fn rate(&self) -> Option<f64> {
        (self.attempts > 0).then(|| self.landed as f64 / self.attempts as f64)
    }
}

/// Guard height covering `[ts - lookback, ts)`, if any value covers enough of it.
/// Ties go High, then Mid, then Low.
pub fn attributed_guard(guard_segments: &[StateSegment], ts: f64, config: &VulnerabilityConfig) -> Option<GuardHeight> {
    let start = ts - config.lookback_secs;
    let mut best: Option<(GuardHeight, f64)> = None;
    for height in GuardHeight::ALL {
        let covered: f64 = guard_segments
            .iter()
            .filter(|s| s.category == StateCategory::GuardHeight && s.value.guard() == Some(height))
            .map(|s| s.overlap(start, ts))
            .sum();
        if best.map_or(true, |(_, b)| covered > b) {
            best = Some((height, covered));
        }
    }
    best.filter(|(_, covered)| *covered > 0.0 && covered / config.lookback_secs >= config.min_coverage)
        .map(|(h, _)| h)
}

/// Mine findings for `defender_id` from the strikes thrown at them.
pub fn mine_vulnerabilities(
    fight_id: &str,
    defender_id: &str,
    incoming: &[StrikeEvent],
    guard_segments: &[StateSegment],
    config: &VulnerabilityConfig,
    audit: &mut AuditLog,
) -> Vec<VulnerabilityFinding> {
    let mut baseline: BTreeMap<StrikeType, Tally> = BTreeMap::new();
    let mut conditional: BTreeMap<(StrikeType, GuardHeight), Tally> = BTreeMap::new();
    let mut unattributed = 0u32;

    let mut ordered: Vec<&StrikeEvent> = incoming.iter().filter(|e| e.target_id == defender_id).collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    for event in &ordered {
        let Some(guard) = attributed_guard(guard_segments, event.timestamp, config) else {
            unattributed += 1;
            continue;
        };
        baseline.entry(event.strike_type).or_default().add(event);
        conditional.entry((event.strike_type, guard)).or_default().add(event);
    }

    let mut findings = Vec::new();
    for ((strike_type, guard), tally) in conditional {
        let (Some(p), Some(base)) = (
            tally.rate(),
            baseline.get(&strike_type).and_then(Tally::rate),
        ) else {
            continue;
        };

        if tally.attempts < config.min_sample_size {
            audit.record(
                Some(defender_id),
                tally.first_ts,
                tally.last_ts,
                &MinerError::InsufficientSample {
                    what: format!("{} vs {} guard", strike_type.as_str(), guard.as_str()),
                    got: tally.attempts,
                    need: config.min_sample_size,
                },
            );
            continue;
        }

        let effect = p - base;
        if effect < config.min_effect_size {
            debug!(
                fight = %fight_id,
                defender = %defender_id,
                "{} vs {} guard: effect {:.3} below {:.3}",
                strike_type.as_str(),
                guard.as_str(),
                effect,
                config.min_effect_size
            );
            continue;
        }

        findings.push(VulnerabilityFinding {
            fight_id: fight_id.to_string(),
            fighter_id: defender_id.to_string(),
            strike_type,
            guard_state: guard,
            conditional_probability: p,
            baseline_probability: base,
            sample_size: tally.attempts,
            effect_size: effect,
            supporting_event_ids: tally.landed_ids,
        });
    }

    findings.sort_by(|a, b| {
        b.effect_size
            .total_cmp(&a.effect_size)
            .then_with(|| b.sample_size.cmp(&a.sample_size))
            .then_with(|| (a.strike_type, a.guard_state).cmp(&(b.strike_type, b.guard_state)))
    });
    findings.truncate(config.top_k);

    debug!(
        fight = %fight_id,
        defender = %defender_id,
        "vulnerabilities: {} findings from {} incoming strikes ({} without guard)",
        findings.len(),
        ordered.len(),
        unattributed
    );
    findings
}
