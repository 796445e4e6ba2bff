// src/style/mod.rs
//
// Style engine, downstream of the per-fight pipeline:
//   features   → one FeatureRecord per fighter-fight (written to the corpus)
//   corpus     → read path over all records + human exemplars
//   clustering → k-means + exemplar labeling → StyleProfile per fighter
//   outcomes   → win rates by style, adjusted for age / reach / odds

pub mod clustering;
pub mod corpus;
pub mod features;
pub mod outcomes;

pub use clustering::StyleModel;
pub use corpus::{load_corpus, write_record, Exemplar, ExemplarSet};
pub use features::{build_features, FeatureInputs, FeatureRecord, FEATURE_NAMES};
pub use outcomes::{aggregate_outcomes, load_outcomes, FightOutcome, OutcomeReport};

use crate::config::StyleConfig;
use crate::types::StyleProfile;
use clustering::nearest;
use corpus::mean_vector;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Everything one re-clustering run produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleBook {
    pub feature_names: Vec<String>,
    pub cluster_labels: Vec<String>,
    pub profiles: Vec<StyleProfile>,
    #[serde(default)]
    pub outcomes: Option<OutcomeReport>,
}

impl StyleBook {
    /// Profile every fighter in the corpus. Fighters are represented by the
    /// mean of their fighter-fight rows.
    pub fn build(corpus: &[FeatureRecord], exemplars: &ExemplarSet, config: &StyleConfig) -> Self {
        let fighters: Vec<&str> = corpus
            .iter()
            .map(|r| r.fighter_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut rows = Array2::<f64>::zeros((corpus.len(), features::FEATURE_COUNT));
        for (i, r) in corpus.iter().enumerate() {
            for (j, v) in r.feature_vector.iter().enumerate().take(features::FEATURE_COUNT) {
                rows[[i, j]] = *v;
            }
        }

        let labeled = exemplars.resolve(corpus);
        let Some(model) = StyleModel::fit(&rows, &labeled, config) else {
            info!("empty style corpus; no profiles");
            return Self {
                feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            };
        };

        let mut profiles = Vec::with_capacity(fighters.len());
        for fighter_id in fighters {
            let Some(raw) = mean_vector(corpus, fighter_id) else { continue };
            let (cluster_id, style_label, confidence) = match exemplars.label_of(fighter_id) {
                Some(label) => {
                    let z = model.standardizer.transform_row(raw.view());
                    (nearest(&model.centroids, z.view()).0, label.to_string(), 1.0)
                }
                None => model.classify_raw(raw.view()),
            };
            profiles.push(StyleProfile {
                fighter_id: fighter_id.to_string(),
                feature_vector: raw.to_vec(),
                cluster_id,
                style_label,
                confidence,
            });
        }

        info!(
            "style book: {} profiles over {} clusters",
            profiles.len(),
            model.cluster_labels.len()
        );
        Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            cluster_labels: model.cluster_labels,
            profiles,
            outcomes: None,
        }
    }

    pub fn labels(&self) -> HashMap<String, String> {
        self.profiles
            .iter()
            .map(|p| (p.fighter_id.clone(), p.style_label.clone()))
            .collect()
    }

    pub fn with_outcomes(mut self, corpus: &[FeatureRecord], outcomes: &[FightOutcome], config: &StyleConfig) -> Self {
        self.outcomes = Some(aggregate_outcomes(corpus, &self.labels(), outcomes, config.ridge_lambda));
        self
    }

    pub fn profile(&self, fighter_id: &str) -> Option<&StyleProfile> {
        self.profiles.iter().find(|p| p.fighter_id == fighter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::features::FEATURE_COUNT;

    /// Three style archetypes: distance, kick ratio and guard split differ.
    fn archetype(kind: usize, jitter: f64) -> Vec<f64> {
        let mut v = vec![0.0; FEATURE_COUNT];
        match kind {
            0 => {
                v[0] = 0.4 + jitter;
                v[2] = 0.05;
                v[3] = 0.8;
                v[9] = 30.0 + 10.0 * jitter;
            }
            1 => {
                v[0] = 0.7 + jitter;
                v[2] = 0.45;
                v[4] = 0.7;
                v[9] = 20.0 + 10.0 * jitter;
            }
            _ => {
                v[0] = 1.1 + jitter;
                v[1] = 2.5;
                v[2] = 0.3;
                v[5] = 0.6;
                v[9] = 8.0 + 10.0 * jitter;
            }
        }
        v
    }

    fn record(fighter: &str, vector: Vec<f64>) -> FeatureRecord {
        FeatureRecord {
            fight_id: format!("fight_{}", fighter),
            fighter_id: fighter.into(),
            opponent_id: "opp".into(),
            feature_vector: vector,
            age: None,
            reach_cm: None,
            decimal_odds: None,
        }
    }

    #[test]
    fn test_three_exemplars_label_every_fighter() {
        let labels = ["boxing", "kickboxing", "karate"];
        let mut corpus = Vec::new();
        let mut exemplars = ExemplarSet::default();
        for (kind, label) in labels.iter().enumerate() {
            let id = format!("exemplar_{}", label);
            corpus.push(record(&id, archetype(kind, 0.0)));
            exemplars.exemplars.push(Exemplar {
                fighter_id: id,
                label: label.to_string(),
                feature_vector: None,
            });
        }
        for i in 0..50 {
            let jitter = ((i * 37) % 11) as f64 / 100.0 - 0.05;
            corpus.push(record(&format!("u{:02}", i), archetype(i % 3, jitter)));
        }

        let book = StyleBook::build(&corpus, &exemplars, &StyleConfig::default());
        assert_eq!(book.profiles.len(), 53);
        for p in &book.profiles {
            assert!(labels.contains(&p.style_label.as_str()), "{} unlabeled", p.fighter_id);
            assert!(p.confidence > 0.0 && p.confidence <= 1.0);
        }
        for i in 0..50 {
            let p = book.profile(&format!("u{:02}", i)).unwrap();
            assert_eq!(p.style_label, labels[i % 3]);
        }
        let e = book.profile("exemplar_karate").unwrap();
        assert_eq!((e.style_label.as_str(), e.confidence), ("karate", 1.0));
    }

    #[test]
    fn test_without_exemplars_clusters_keep_numeric_labels() {
        let corpus: Vec<FeatureRecord> = (0..6)
            .map(|i| record(&format!("u{}", i), archetype(i % 2, 0.0)))
            .collect();
        let book = StyleBook::build(&corpus, &ExemplarSet::default(), &StyleConfig::default());
        assert_eq!(book.profiles.len(), 6);
        assert!(book.profiles.iter().all(|p| p.style_label.starts_with("cluster_")));
    }

    #[test]
    fn test_empty_corpus_has_no_profiles() {
        let book = StyleBook::build(&[], &ExemplarSet::default(), &StyleConfig::default());
        assert!(book.profiles.is_empty());
        assert_eq!(book.feature_names.len(), FEATURE_COUNT);
    }
}
