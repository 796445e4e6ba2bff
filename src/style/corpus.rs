// src/style/corpus.rs
//
// Corpus read/write path for the style engine.
//
//   corpus_dir/<fight>__<fighter>.json   one FeatureRecord per fighter-fight
//   exemplars.yaml                       human-labeled fighters
//
// Unreadable corpus files are skipped with a warning; one bad file must not
// block a re-clustering run.

use crate::error::{MinerError, MinerResult};
use crate::fight_source::find_files_with_extension;
use crate::style::features::{FeatureRecord, FEATURE_COUNT};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn record_path(dir: &Path, record: &FeatureRecord) -> PathBuf {
    dir.join(format!(
        "{}__{}.json",
        file_safe(&record.fight_id),
        file_safe(&record.fighter_id)
    ))
}

/// Write (or overwrite) one record. Re-running a fight replaces its rows.
pub fn write_record(dir: &Path, record: &FeatureRecord) -> MinerResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = record_path(dir, record);
    fs::write(&path, serde_json::to_string_pretty(record)?)?;
    debug!("corpus record written: {}", path.display());
    Ok(path)
}

/// Every well-formed record under `dir`, ordered by (fight, fighter).
pub fn load_corpus(dir: &Path) -> MinerResult<Vec<FeatureRecord>> {
    if !dir.exists() {
        warn!("corpus directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for path in find_files_with_extension(dir, "json") {
        let parsed = fs::read_to_string(&path)
            .map_err(MinerError::from)
            .and_then(|s| serde_json::from_str::<FeatureRecord>(&s).map_err(MinerError::from));
        match parsed {
            Ok(r) if r.feature_vector.len() == FEATURE_COUNT => records.push(r),
            Ok(r) => warn!(
                "skipping {}: {} features, expected {}",
                path.display(),
                r.feature_vector.len(),
                FEATURE_COUNT
            ),
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }

    records.sort_by(|a, b| (&a.fight_id, &a.fighter_id).cmp(&(&b.fight_id, &b.fighter_id)));
    info!("loaded {} corpus records from {}", records.len(), dir.display());
    Ok(records)
}

/// Human-assigned style for one fighter. `feature_vector` overrides the
/// fighter's corpus mean when given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub fighter_id: String,
    pub label: String,
    #[serde(default)]
    pub feature_vector: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExemplarSet {
    #[serde(default)]
    pub exemplars: Vec<Exemplar>,
}

impl ExemplarSet {
    /// A missing file is an empty set; clusters then keep numeric labels.
    pub fn load(path: &Path) -> MinerResult<Self> {
        if !path.exists() {
            warn!("exemplar file {} not found", path.display());
            return Ok(Self::default());
        }
        let set: ExemplarSet = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        info!("loaded {} style exemplars", set.exemplars.len());
        Ok(set)
    }

    pub fn label_of(&self, fighter_id: &str) -> Option<&str> {
        self.exemplars
            .iter()
            .find(|e| e.fighter_id == fighter_id)
            .map(|e| e.label.as_str())
    }

    /// (fighter, label, raw vector) for every exemplar with usable features.
    pub fn resolve(&self, corpus: &[FeatureRecord]) -> Vec<(String, String, Array1<f64>)> {
        let mut out = Vec::new();
        for e in &self.exemplars {
            let vector = match &e.feature_vector {
                Some(v) if v.len() == FEATURE_COUNT => Some(Array1::from(v.clone())),
                Some(v) => {
                    warn!(
                        fighter = %e.fighter_id,
                        "exemplar vector has {} features, expected {}",
                        v.len(),
                        FEATURE_COUNT
                    );
                    None
                }
                None => mean_vector(corpus, &e.fighter_id),
            };
            match vector {
                Some(v) => out.push((e.fighter_id.clone(), e.label.clone(), v)),
                None => warn!(fighter = %e.fighter_id, "exemplar has no corpus rows; ignored"),
            }
        }
        out
    }
}

/// Mean of a fighter's rows across all their fights.
pub fn mean_vector(corpus: &[FeatureRecord], fighter_id: &str) -> Option<Array1<f64>> {
    let rows: Vec<&FeatureRecord> = corpus.iter().filter(|r| r.fighter_id == fighter_id).collect();
    if rows.is_empty() {
        return None;
    }
    let mut acc = Array1::<f64>::zeros(FEATURE_COUNT);
    for r in &rows {
        acc += &Array1::from(r.feature_vector.clone());
    }
    Some(acc / rows.len() as f64)
}
