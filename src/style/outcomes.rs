// src/style/outcomes.rs
//
// Style-conditioned outcome statistics, a thin consumer of style labels.
//
//   raw:      win rate by style, style-vs-style matrix
//   adjusted: linear-probability model, ridge-stabilised
//             won ~ 1 + style dummies + age_diff + reach_diff + implied_prob_diff
//             adjusted rate = intercept + style coefficient (evenly matched)
//
// Draws and no-contests (no winner) are left out.

use crate::error::MinerResult;
use crate::style::features::FeatureRecord;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightOutcome {
    pub fight_id: String,
    #[serde(default)]
    pub winner_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OutcomeFile {
    #[serde(default)]
    outcomes: Vec<FightOutcome>,
}

pub fn load_outcomes(path: &Path) -> MinerResult<Vec<FightOutcome>> {
    let file: OutcomeFile = serde_yaml::from_str(&fs::read_to_string(path)?)?;
    info!("loaded {} fight outcomes", file.outcomes.len());
    Ok(file.outcomes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleWinRate {
    pub style: String,
    pub fights: u32,
    pub wins: u32,
    pub win_rate: f64,
    /// Rate against an evenly matched opponent; None when the fit failed
    pub adjusted_win_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupCell {
    pub style: String,
    pub opponent_style: String,
    pub fights: u32,
    pub wins: u32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub observations: usize,
    pub by_style: Vec<StyleWinRate>,
    pub matchups: Vec<MatchupCell>,
    /// (term, coefficient) of the adjustment model
    pub coefficients: Vec<(String, f64)>,
}

struct Observation<'a> {
    style: &'a str,
    opponent_style: &'a str,
    won: bool,
    age_diff: f64,
    reach_diff: f64,
    implied_diff: f64,
}

fn diff(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => a - b,
        _ => 0.0,
    }
}

fn implied_probability(odds: Option<f64>) -> Option<f64> {
    odds.filter(|o| *o > 1.0).map(|o| 1.0 / o)
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

/// Ridge fit; the intercept (column 0) is not penalised.
pub fn ridge_fit(x: &Array2<f64>, y: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let mut gram = x.t().dot(x);
    for i in 1..gram.nrows() {
        gram[[i, i]] += lambda;
    }
    let rhs = x.t().dot(y);
    solve_linear(gram, rhs)
}

/// `labels` maps fighter id to style label.
pub fn aggregate_outcomes(
    corpus: &[FeatureRecord],
    labels: &HashMap<String, String>,
    outcomes: &[FightOutcome],
    ridge_lambda: f64,
) -> OutcomeReport {
    let winners: HashMap<&str, &str> = outcomes
        .iter()
        .filter_map(|o| o.winner_id.as_deref().map(|w| (o.fight_id.as_str(), w)))
        .collect();
    let by_key: HashMap<(&str, &str), &FeatureRecord> = corpus
        .iter()
        .map(|r| ((r.fight_id.as_str(), r.fighter_id.as_str()), r))
        .collect();

    let mut obs = Vec::new();
    for r in corpus {
        let Some(winner) = winners.get(r.fight_id.as_str()) else { continue };
        let (Some(style), Some(opponent_style)) = (labels.get(&r.fighter_id), labels.get(&r.opponent_id)) else {
            continue;
        };
        let opp = by_key.get(&(r.fight_id.as_str(), r.opponent_id.as_str()));
        obs.push(Observation {
            style,
            opponent_style,
            won: *winner == r.fighter_id,
            age_diff: diff(r.age, opp.and_then(|o| o.age)),
            reach_diff: diff(r.reach_cm, opp.and_then(|o| o.reach_cm)),
            implied_diff: diff(
                implied_probability(r.decimal_odds),
                opp.and_then(|o| implied_probability(o.decimal_odds)),
            ),
        });
    }
    if obs.is_empty() {
        warn!("no labeled fighter-fights with outcomes; outcome report is empty");
        return OutcomeReport::default();
    }

    let mut raw: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    let mut matrix: BTreeMap<(&str, &str), (u32, u32)> = BTreeMap::new();
    for o in &obs {
        let e = raw.entry(o.style).or_default();
        e.0 += 1;
        e.1 += o.won as u32;
        let m = matrix.entry((o.style, o.opponent_style)).or_default();
        m.0 += 1;
        m.1 += o.won as u32;
    }

    // Design: intercept, one dummy per non-baseline style, three covariates
    let styles: Vec<&str> = obs.iter().map(|o| o.style).collect::<BTreeSet<_>>().into_iter().collect();
    let dummies = styles.len().saturating_sub(1);
    let cols = 1 + dummies + 3;
    let mut x = Array2::<f64>::zeros((obs.len(), cols));
    let mut y = Array1::<f64>::zeros(obs.len());
    for (i, o) in obs.iter().enumerate() {
        x[[i, 0]] = 1.0;
        if let Some(pos) = styles.iter().position(|s| *s == o.style) {
            if pos > 0 {
                x[[i, pos]] = 1.0;
            }
        }
        x[[i, 1 + dummies]] = o.age_diff;
        x[[i, 2 + dummies]] = o.reach_diff;
        x[[i, 3 + dummies]] = o.implied_diff;
        y[i] = o.won as u8 as f64;
    }

    let beta = ridge_fit(&x, &y, ridge_lambda);
    if beta.is_none() {
        warn!("outcome regression is singular; adjusted rates omitted");
    }

    let mut coefficients = Vec::new();
    if let Some(b) = &beta {
        coefficients.push(("intercept".to_string(), b[0]));
        for (k, style) in styles.iter().enumerate().skip(1) {
            coefficients.push((format!("style:{}", style), b[k]));
        }
        coefficients.push(("age_diff".to_string(), b[1 + dummies]));
        coefficients.push(("reach_diff".to_string(), b[2 + dummies]));
        coefficients.push(("implied_prob_diff".to_string(), b[3 + dummies]));
        debug!("outcome coefficients: {:?}", coefficients);
    }

    let by_style = raw
        .iter()
        .map(|(style, (fights, wins))| {
            let adjusted = beta.as_ref().map(|b| {
                let k = styles.iter().position(|s| s == style).unwrap_or(0);
                let effect = if k > 0 { b[k] } else { 0.0 };
                (b[0] + effect).clamp(0.0, 1.0)
            });
            StyleWinRate {
                style: style.to_string(),
                fights: *fights,
                wins: *wins,
                win_rate: *wins as f64 / *fights as f64,
                adjusted_win_rate: adjusted,
            }
        })
        .collect();

    let matchups = matrix
        .iter()
        .map(|((style, opponent_style), (fights, wins))| MatchupCell {
            style: style.to_string(),
            opponent_style: opponent_style.to_string(),
            fights: *fights,
            wins: *wins,
            win_rate: *wins as f64 / *fights as f64,
        })
        .collect();

    info!("outcome report over {} fighter-fights, {} styles", obs.len(), styles.len());
    OutcomeReport {
        observations: obs.len(),
        by_style,
        matchups,
        coefficients,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::features::FEATURE_COUNT;
    use ndarray::array;

    fn row(fight: &str, fighter: &str, opponent: &str, age: f64) -> FeatureRecord {
        FeatureRecord {
            fight_id: fight.into(),
            fighter_id: fighter.into(),
            opponent_id: opponent.into(),
            feature_vector: vec![0.0; FEATURE_COUNT],
            age: Some(age),
            reach_cm: Some(180.0),
            decimal_odds: None,
        }
    }

    /// Ten boxer-vs-kicker fights, boxer wins the first `boxer_wins`.
    fn corpus(boxer_wins: usize) -> (Vec<FeatureRecord>, HashMap<String, String>, Vec<FightOutcome>) {
        let mut records = Vec::new();
        let mut labels = HashMap::new();
        let mut outcomes = Vec::new();
        for i in 0..10 {
            let fight = format!("f{}", i);
            let (b, k) = (format!("b{}", i), format!("k{}", i));
            records.push(row(&fight, &b, &k, 30.0));
            records.push(row(&fight, &k, &b, 30.0));
            labels.insert(b.clone(), "boxing".to_string());
            labels.insert(k.clone(), "kickboxing".to_string());
            outcomes.push(FightOutcome {
                fight_id: fight,
                winner_id: Some(if i < boxer_wins { b } else { k }),
            });
        }
        (records, labels, outcomes)
    }

    #[test]
    fn test_solve_linear() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve_linear(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve_linear(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_raw_and_adjusted_win_rates() {
        let (records, labels, outcomes) = corpus(8);
        let report = aggregate_outcomes(&records, &labels, &outcomes, 1e-3);

        assert_eq!(report.observations, 20);
        let boxing = report.by_style.iter().find(|s| s.style == "boxing").unwrap();
        assert_eq!((boxing.fights, boxing.wins), (10, 8));
        assert!((boxing.win_rate - 0.8).abs() < 1e-12);
        let adjusted = boxing.adjusted_win_rate.unwrap();
        assert!((adjusted - 0.8).abs() < 0.01, "got {}", adjusted);

        let cell = report
            .matchups
            .iter()
            .find(|m| m.style == "kickboxing" && m.opponent_style == "boxing")
            .unwrap();
        assert_eq!((cell.fights, cell.wins), (10, 2));
    }

    #[test]
    fn test_draws_and_unlabeled_fighters_are_left_out() {
        let (records, mut labels, mut outcomes) = corpus(5);
        outcomes[0].winner_id = None;
        labels.remove("b1");
        let report = aggregate_outcomes(&records, &labels, &outcomes, 1e-3);
        assert_eq!(report.observations, 16);
        assert!(aggregate_outcomes(&records, &HashMap::new(), &outcomes, 1e-3)
            .by_style
            .is_empty());
    }
}
