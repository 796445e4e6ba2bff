// src/style/features.rs
//
// One tactical feature vector per fighter per fight, built only from
// already-derived signals (strike events, smoothed segments, combos,
// territory motion). Column order is FEATURE_NAMES.

use crate::analysis::territory::FighterMotion;
use crate::types::{ComboPattern, FightInput, GuardHeight, StateCategory, StateSegment, StrikeEvent};
use serde::{Deserialize, Serialize};

pub const FEATURE_NAMES: [&str; 10] = [
    "mean_opponent_distance",
    "bounce_hz",
    "kick_ratio",
    "guard_high_frac",
    "guard_mid_frac",
    "guard_low_frac",
    "stance_switches_per_min",
    "mean_combo_len",
    "combos_per_min",
    "strikes_per_min",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Corpus row: one fighter in one fight, plus what outcome adjustment needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub fight_id: String,
    pub fighter_id: String,
    pub opponent_id: String,
    pub feature_vector: Vec<f64>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub reach_cm: Option<f64>,
    #[serde(default)]
    pub decimal_odds: Option<f64>,
}

/// Everything the feature builder reads for one fighter.
pub struct FeatureInputs<'a> {
    pub fight: &'a FightInput,
    pub fighter_id: &'a str,
    /// Strikes this fighter threw
    pub strikes: &'a [StrikeEvent],
    /// This fighter's smoothed segments, all categories
    pub segments: &'a [StateSegment],
    pub combos: &'a [ComboPattern],
    pub motion: Option<&'a FighterMotion>,
}

pub fn build_features(inputs: &FeatureInputs) -> FeatureRecord {
    let fight = inputs.fight;
    let minutes = (fight.duration / 60.0).max(1e-9);

    let thrown: Vec<&StrikeEvent> = inputs
        .strikes
        .iter()
        .filter(|e| e.fighter_id == inputs.fighter_id)
        .collect();
    let kicks = thrown.iter().filter(|e| e.strike_type.is_kick()).count();
    let kick_ratio = if thrown.is_empty() {
        0.0
    } else {
        kicks as f64 / thrown.len() as f64
    };

    let guard = guard_time_fractions(inputs.segments);

    let combo_total: u32 = inputs.combos.iter().map(|c| c.frequency).sum();
    let mean_combo_len = if combo_total > 0 {
        inputs
            .combos
            .iter()
            .map(|c| c.token_sequence.len() as f64 * c.frequency as f64)
            .sum::<f64>()
            / combo_total as f64
    } else {
        0.0
    };

    let (distance, bounce) = match inputs.motion {
        Some(m) => (m.mean_opponent_distance, bounce_cadence(&m.vertical_series)),
        None => (0.0, 0.0),
    };

    let meta = fight.fighter(inputs.fighter_id);
    FeatureRecord {
        fight_id: fight.fight_id.clone(),
        fighter_id: inputs.fighter_id.to_string(),
        opponent_id: fight
            .opponent_of(inputs.fighter_id)
            .map(|o| o.fighter_id.clone())
            .unwrap_or_default(),
        feature_vector: vec![
            distance,
            bounce,
            kick_ratio,
            guard[0],
            guard[1],
            guard[2],
            stance_switches(inputs.segments) as f64 / minutes,
            mean_combo_len,
            combo_total as f64 / minutes,
            thrown.len() as f64 / minutes,
        ],
        age: meta.and_then(|m| m.age),
        reach_cm: meta.and_then(|m| m.reach_cm),
        decimal_odds: meta.and_then(|m| m.decimal_odds),
    }
}

/// Share of known guard time spent high / mid / low. All zero with no guard data.
pub fn guard_time_fractions(segments: &[StateSegment]) -> [f64; 3] {
    let mut totals = [0.0; 3];
    for seg in segments.iter().filter(|s| s.category == StateCategory::GuardHeight) {
        if let Some(g) = seg.value.guard() {
            let idx = GuardHeight::ALL.iter().position(|h| *h == g).unwrap_or(0);
            totals[idx] += seg.duration();
        }
    }
    let known: f64 = totals.iter().sum();
    if known > 0.0 {
        totals.map(|t| t / known)
    } else {
        [0.0; 3]
    }
}

/// Changes between consecutive known stances; UNKNOWN stretches are skipped over.
pub fn stance_switches(segments: &[StateSegment]) -> usize {
    let mut stances: Vec<&StateSegment> = segments
        .iter()
        .filter(|s| s.category == StateCategory::Stance && s.value.stance().is_some())
        .collect();
    stances.sort_by(|a, b| a.start_ts.total_cmp(&b.start_ts));
    stances.windows(2).filter(|w| w[0].value != w[1].value).count()
}

/// Oscillation frequency (Hz) of the vertical centroid: sign changes of the
/// linearly detrended series, two per cycle.
pub fn bounce_cadence(series: &[(f64, f64)]) -> f64 {
    const DEADBAND: f64 = 1e-4;
    if series.len() < 3 {
        return 0.0;
    }
    let span = series[series.len() - 1].0 - series[0].0;
    if span <= 0.0 {
        return 0.0;
    }

    let n = series.len() as f64;
    let mean_t = series.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = series.iter().map(|p| p.1).sum::<f64>() / n;
    let var_t: f64 = series.iter().map(|p| (p.0 - mean_t).powi(2)).sum();
    let slope = if var_t > 0.0 {
        series.iter().map(|p| (p.0 - mean_t) * (p.1 - mean_y)).sum::<f64>() / var_t
    } else {
        0.0
    };

    let mut crossings = 0usize;
    let mut last_sign = 0i8;
    for &(t, y) in series {
        let r = y - (mean_y + slope * (t - mean_t));
        let sign = if r > DEADBAND {
            1
        } else if r < -DEADBAND {
            -1
        } else {
            0
        };
        if sign != 0 {
            if last_sign != 0 && sign != last_sign {
                crossings += 1;
            }
            last_sign = sign;
        }
    }
    crossings as f64 / 2.0 / span
}
