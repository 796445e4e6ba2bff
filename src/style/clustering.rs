// src/style/clustering.rs
//
// Unsupervised pass over the corpus, then exemplar labeling:
//   z-score columns → k-means (farthest-point init, Lloyd iterations)
//   → exemplar label centroids → each cluster takes the nearest label
//   → every fighter gets its cluster's label, confidence from a softmax
//     over distances to the label groups
//
// Deterministic: no random initialisation, ties go to the lowest index.

use crate::config::StyleConfig;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Column-wise z-score transform fitted on the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardizer {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n = data.nrows().max(1) as f64;
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(data.ncols()));
        let std: Vec<f64> = data
            .axis_iter(Axis(1))
            .zip(mean.iter())
            .map(|(col, m)| {
                let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
                // Constant columns carry no information; leave them centred only
                if var.sqrt() > 1e-12 {
                    var.sqrt()
                } else {
                    1.0
                }
            })
            .collect();
        Self {
            mean: mean.to_vec(),
            std,
        }
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .zip(self.mean.iter().zip(self.std.iter()))
                .map(|(v, (m, s))| (v - m) / s),
        )
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let z = self.transform_row(row.view());
            row.assign(&z);
        }
        out
    }
}

pub fn sq_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest row of `centroids`; ties go to the lowest index.
pub fn nearest(centroids: &Array2<f64>, point: ArrayView1<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.axis_iter(Axis(0)).enumerate() {
        let d = sq_distance(c, point);
        if d < best.1 {
            best = (i, d);
        }
    }
    (best.0, best.1.sqrt())
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: Array2<f64>,
    pub assignments: Vec<usize>,
    pub iterations: usize,
}

/// Farthest-point seeding: start at the row nearest the data mean, then
/// repeatedly take the row farthest from every chosen seed.
fn seed_centroids(data: &Array2<f64>, k: usize) -> Vec<usize> {
    let Some(mean) = data.mean_axis(Axis(0)) else {
        return Vec::new();
    };
    let rows: Vec<ArrayView1<f64>> = data.axis_iter(Axis(0)).collect();

    let mut first = 0;
    let mut best = f64::INFINITY;
    for (i, r) in rows.iter().enumerate() {
        let d = sq_distance(*r, mean.view());
        if d < best {
            best = d;
            first = i;
        }
    }

    let mut seeds = vec![first];
    let mut min_dist: Vec<f64> = rows.iter().map(|r| sq_distance(*r, rows[first])).collect();
    while seeds.len() < k {
        let mut pick = None;
        let mut far = 0.0;
        for (i, d) in min_dist.iter().enumerate() {
            if *d > far {
                far = *d;
                pick = Some(i);
            }
        }
        // Fewer distinct points than k
        let Some(next) = pick else { break };
        seeds.push(next);
        for (i, r) in rows.iter().enumerate() {
            min_dist[i] = min_dist[i].min(sq_distance(*r, rows[next]));
        }
    }
    seeds
}

pub fn kmeans(data: &Array2<f64>, k: usize, max_iterations: usize, tolerance: f64) -> KMeansResult {
    let (n, dims) = data.dim();
    let seeds = seed_centroids(data, k.min(n));
    let k = seeds.len();
    let mut centroids = Array2::<f64>::zeros((k, dims));
    for (c, &s) in seeds.iter().enumerate() {
        centroids.row_mut(c).assign(&data.row(s));
    }

    let mut assignments = vec![0usize; n];
    let mut iterations = 0;
    for iter in 0..max_iterations.max(1) {
        iterations = iter + 1;
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            assignments[i] = nearest(&centroids, row).0;
        }

        let mut sums = Array2::<f64>::zeros((k, dims));
        let mut counts = vec![0usize; k];
        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            let mut s = sums.row_mut(assignments[i]);
            s += &row;
            counts[assignments[i]] += 1;
        }

        let mut shift = 0.0f64;
        for c in 0..k {
            // An empty cluster keeps its previous centroid
            if counts[c] == 0 {
                continue;
            }
            let updated = sums.row(c).mapv(|v| v / counts[c] as f64);
            shift = shift.max(sq_distance(updated.view(), centroids.row(c)).sqrt());
            centroids.row_mut(c).assign(&updated);
        }
        if shift <= tolerance {
            break;
        }
    }

    // Final assignment against the settled centroids
    for (i, row) in data.axis_iter(Axis(0)).enumerate() {
        assignments[i] = nearest(&centroids, row).0;
    }

    KMeansResult {
        centroids,
        assignments,
        iterations,
    }
}

/// A fighter with a human-assigned style and its standardised features.
#[derive(Debug, Clone)]
pub struct LabeledPoint {
    pub fighter_id: String,
    pub label: String,
    pub z: Array1<f64>,
}

/// Cluster labels: nearest exemplar label centroid, or `cluster_<id>` when
/// there are no exemplars at all.
pub fn label_clusters(centroids: &Array2<f64>, exemplars: &[LabeledPoint]) -> Vec<String> {
    let mut groups: BTreeMap<&str, Vec<&Array1<f64>>> = BTreeMap::new();
    for e in exemplars {
        groups.entry(e.label.as_str()).or_default().push(&e.z);
    }
    if groups.is_empty() {
        warn!("no style exemplars; clusters keep numeric labels");
        return (0..centroids.nrows()).map(|c| format!("cluster_{}", c)).collect();
    }

    let dims = centroids.ncols();
    let labels: Vec<&str> = groups.keys().copied().collect();
    let mut label_centroids = Array2::<f64>::zeros((labels.len(), dims));
    for (i, label) in labels.iter().enumerate() {
        let members = &groups[label];
        let mut acc = Array1::<f64>::zeros(dims);
        for z in members {
            acc += *z;
        }
        label_centroids.row_mut(i).assign(&acc.mapv(|v| v / members.len() as f64));
    }

    centroids
        .axis_iter(Axis(0))
        .map(|c| labels[nearest(&label_centroids, c).0].to_string())
        .collect()
}

/// Label and confidence for one standardised point.
///
/// The point takes its nearest cluster's label; confidence is that label's
/// softmax weight over `-d / temperature`, `d` being the distance to the
/// nearest cluster carrying each label.
pub fn classify(
    point: ArrayView1<f64>,
    centroids: &Array2<f64>,
    cluster_labels: &[String],
    temperature: f64,
) -> (usize, String, f64) {
    let (cluster, _) = nearest(centroids, point);
    let label = cluster_labels.get(cluster).cloned().unwrap_or_default();

    let mut per_label: BTreeMap<&str, f64> = BTreeMap::new();
    for (c, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
        let Some(l) = cluster_labels.get(c) else { continue };
        let d = sq_distance(centroid, point).sqrt();
        let entry = per_label.entry(l.as_str()).or_insert(f64::INFINITY);
        *entry = entry.min(d);
    }

    let t = temperature.max(1e-9);
    let best = per_label.values().cloned().fold(f64::INFINITY, f64::min);
    let denom: f64 = per_label.values().map(|d| (-(d - best) / t).exp()).sum();
    let own = per_label.get(label.as_str()).copied().unwrap_or(best);
    let confidence = if denom > 0.0 {
        (-(own - best) / t).exp() / denom
    } else {
        1.0
    };
    (cluster, label, confidence)
}

/// Fitted clustering over the corpus.
#[derive(Debug, Clone)]
pub struct StyleModel {
    pub standardizer: Standardizer,
    pub centroids: Array2<f64>,
    pub cluster_labels: Vec<String>,
    pub temperature: f64,
}

impl StyleModel {
    /// `rows` are raw fighter-fight vectors; `exemplars` are (fighter, label, raw vector).
    pub fn fit(rows: &Array2<f64>, exemplars: &[(String, String, Array1<f64>)], config: &StyleConfig) -> Option<Self> {
        if rows.nrows() == 0 {
            return None;
        }
        let standardizer = Standardizer::fit(rows);
        let z = standardizer.transform(rows);
        let result = kmeans(&z, config.clusters, config.max_iterations, config.tolerance);

        let labeled: Vec<LabeledPoint> = exemplars
            .iter()
            .map(|(fighter_id, label, raw)| LabeledPoint {
                fighter_id: fighter_id.clone(),
                label: label.clone(),
                z: standardizer.transform_row(raw.view()),
            })
            .collect();
        let cluster_labels = label_clusters(&result.centroids, &labeled);

        info!(
            "style clustering: {} rows, {} clusters after {} iterations, labels {:?}",
            rows.nrows(),
            result.centroids.nrows(),
            result.iterations,
            cluster_labels
        );
        for (p, label) in labeled.iter().zip(exemplars.iter().map(|e| &e.1)) {
            let (cluster, _) = nearest(&result.centroids, p.z.view());
            if cluster_labels.get(cluster) != Some(label) {
                debug!(
                    fighter = %p.fighter_id,
                    "exemplar labeled {} falls in a cluster labeled {}",
                    label,
                    cluster_labels.get(cluster).map(String::as_str).unwrap_or("-")
                );
            }
        }

        Some(Self {
            standardizer,
            centroids: result.centroids,
            cluster_labels,
            temperature: config.temperature,
        })
    }

    pub fn classify_raw(&self, raw: ArrayView1<f64>) -> (usize, String, f64) {
        let z = self.standardizer.transform_row(raw);
        classify(z.view(), &self.centroids, &self.cluster_labels, self.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kmeans_separates_blobs_deterministically() {
        let data = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1],
        ];
        let a = kmeans(&data, 2, 50, 1e-9);
        let b = kmeans(&data, 2, 50, 1e-9);
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.assignments[0], a.assignments[1]);
        assert_eq!(a.assignments[0], a.assignments[2]);
        assert_eq!(a.assignments[3], a.assignments[5]);
        assert_ne!(a.assignments[0], a.assignments[3]);
    }

    #[test]
    fn test_k_larger_than_distinct_points() {
        let data = array![[1.0, 1.0], [1.0, 1.0]];
        let result = kmeans(&data, 3, 10, 1e-9);
        assert_eq!(result.centroids.nrows(), 1);
        assert_eq!(result.assignments, vec![0, 0]);
    }

    #[test]
    fn test_standardizer_handles_constant_column() {
        let data = array![[1.0, 7.0], [3.0, 7.0]];
        let s = Standardizer::fit(&data);
        let z = s.transform(&data);
        assert!((z[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((z[[1, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(z[[0, 1]], 0.0);
    }

    #[test]
    fn test_classify_confidence_is_a_probability() {
        let centroids = array![[0.0, 0.0], [4.0, 0.0]];
        let labels = vec!["boxing".to_string(), "karate".to_string()];
        let (cluster, label, conf) = classify(array![0.5, 0.0].view(), &centroids, &labels, 1.0);
        assert_eq!(cluster, 0);
        assert_eq!(label, "boxing");
        assert!(conf > 0.5 && conf <= 1.0);

        // Two clusters sharing a label: confidence is 1
        let same = vec!["boxing".to_string(), "boxing".to_string()];
        let (_, _, conf) = classify(array![3.0, 0.0].view(), &centroids, &same, 1.0);
        assert!((conf - 1.0).abs() < 1e-12);
    }
}
