//! Customer clustering with semantic labels
//!
//! Standardizes the configured features, fits k-means (or DBSCAN), ranks the
//! resulting clusters by the mean of an ordering feature and names them High,
//! Medium and Low Value. Quality is reported as silhouette plus
//! Calinski-Harabasz and Davies-Bouldin indices; a run that collapses to
//! fewer than two clusters yields a structured degenerate result instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::dbscan::{Dbscan, DbscanConfig, NOISE};
use super::kmeans::{squared_distance, KMeans, KMeansConfig};
use crate::config::{ClusterAlgorithm, ClusteringConfig};
use crate::data::Dataset;
use crate::error::{EngineError, EngineResult};
use crate::preprocess::StandardScaler;

/// Positional cluster names, best first.
const RANK_LABELS: [&str; 3] = ["High Value", "Medium Value", "Low Value"];

/// Label for DBSCAN noise points.
const NOISE_LABEL: &str = "Noise";

/// One customer's cluster membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: String,
    /// Raw cluster id; -1 is DBSCAN noise.
    pub cluster_id: i64,
    /// Rank-based semantic label.
    pub label: String,
}

/// Internal validation indices, or a degenerate marker when the run
/// produced fewer than two clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClusterQuality {
    Scored {
        n_clusters: usize,
        silhouette: f64,
        calinski_harabasz: f64,
        davies_bouldin: f64,
    },
    Degenerate {
        n_clusters: usize,
    },
}

/// Per-cluster statistics for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster_id: i64,
    pub label: String,
    pub customer_count: usize,
    pub customer_share: f64,
    /// (feature, mean, min, max) per clustering feature.
    pub feature_stats: Vec<FeatureStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStat {
    pub feature: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// One entry of the optimal-k sweep.
#[derive(Debug, Clone, Serialize)]
pub struct KSweepEntry {
    pub k: usize,
    pub inertia: f64,
    pub silhouette: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KSweep {
    pub entries: Vec<KSweepEntry>,
    pub optimal_k: usize,
}

/// Clustering model: scaler + algorithm + label map.
pub struct ClusteringModel {
    config: ClusteringConfig,
    scaler: StandardScaler,
    kmeans: Option<KMeans>,
    cluster_labels: BTreeMap<i64, String>,
    pub quality: Option<ClusterQuality>,
}

impl ClusteringModel {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            scaler: StandardScaler::new(),
            kmeans: None,
            cluster_labels: BTreeMap::new(),
            quality: None,
        }
    }

    /// Fit on the dataset and return labeled assignments.
    pub fn fit_predict(&mut self, dataset: &Dataset) -> EngineResult<Vec<ClusterAssignment>> {
        if dataset.n_samples() == 0 {
            return Err(EngineError::EmptyInput);
        }
        let scaled = self.scaler.fit_transform(dataset)?;
        let points = &scaled.features;

        let raw_labels: Vec<i64> = match self.config.algorithm {
            ClusterAlgorithm::KMeans => {
                let mut model = KMeans::new(KMeansConfig {
                    n_clusters: self.config.n_clusters,
                    max_iter: self.config.max_iter,
                    n_init: self.config.n_init,
                    seed: self.config.seed,
                });
                let labels = model.fit_predict(points)?;
                self.kmeans = Some(model);
                labels.into_iter().map(|l| l as i64).collect()
            }
            ClusterAlgorithm::Dbscan => {
                let mut model = Dbscan::new(DbscanConfig {
                    eps: self.config.eps,
                    min_samples: self.config.min_samples,
                });
                model.fit_predict(points)?
            }
        };

        self.assign_cluster_labels(dataset, &raw_labels)?;
        self.quality = Some(evaluate(points, &raw_labels));
        if let Some(ClusterQuality::Degenerate { n_clusters }) = self.quality {
            warn!(n_clusters, "clustering collapsed below two clusters");
        }

        Ok(dataset
            .customer_ids
            .iter()
            .zip(raw_labels.iter())
            .map(|(customer_id, &cluster_id)| ClusterAssignment {
                customer_id: customer_id.clone(),
                cluster_id,
                label: self.label_for(cluster_id),
            })
            .collect())
    }

    /// Assign new points to the fitted clusters. Only k-means supports this;
    /// DBSCAN has no out-of-sample rule and must be re-fitted.
    pub fn predict(&self, dataset: &Dataset) -> EngineResult<Vec<ClusterAssignment>> {
        let kmeans = self.kmeans.as_ref().ok_or(EngineError::NotFitted)?;
        let scaled = self.scaler.transform(dataset)?;
        let labels = kmeans.predict(&scaled.features)?;
        Ok(dataset
            .customer_ids
            .iter()
            .zip(labels.iter())
            .map(|(customer_id, &cluster_id)| ClusterAssignment {
                customer_id: customer_id.clone(),
                cluster_id: cluster_id as i64,
                label: self.label_for(cluster_id as i64),
            })
            .collect())
    }

    fn label_for(&self, cluster_id: i64) -> String {
        if cluster_id == NOISE {
            return NOISE_LABEL.to_string();
        }
        self.cluster_labels
            .get(&cluster_id)
            .cloned()
            .unwrap_or_else(|| format!("Cluster {cluster_id}"))
    }

    /// Rank clusters by the mean of the ordering feature in raw units,
    /// descending, and hand out positional names.
    fn assign_cluster_labels(&mut self, dataset: &Dataset, labels: &[i64]) -> EngineResult<()> {
        let order_idx = dataset.feature_index(&self.config.order_by)?;
        let values = dataset.column(order_idx);

        let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for (&label, &value) in labels.iter().zip(values.iter()) {
            if label == NOISE {
                continue;
            }
            let entry = sums.entry(label).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let mut ranked: Vec<(i64, f64)> = sums
            .into_iter()
            .map(|(id, (sum, count))| (id, sum / count as f64))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        self.cluster_labels.clear();
        for (rank, (cluster_id, mean)) in ranked.iter().enumerate() {
            let name = RANK_LABELS
                .get(rank)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("Cluster {cluster_id}"));
            info!(cluster_id, %name, order_mean = mean, "labeled cluster");
            self.cluster_labels.insert(*cluster_id, name);
        }
        Ok(())
    }

    /// Per-cluster statistics in raw feature units.
    pub fn cluster_profiles(
        &self,
        dataset: &Dataset,
        assignments: &[ClusterAssignment],
    ) -> Vec<ClusterProfile> {
        let n = assignments.len();
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, a) in assignments.iter().enumerate() {
            groups.entry(a.cluster_id).or_default().push(i);
        }

        groups
            .into_iter()
            .map(|(cluster_id, rows)| {
                let feature_stats = dataset
                    .feature_names
                    .iter()
                    .enumerate()
                    .map(|(j, name)| {
                        let values: Vec<f64> =
                            rows.iter().map(|&i| dataset.features[i][j]).collect();
                        FeatureStat {
                            feature: name.clone(),
                            mean: values.iter().sum::<f64>() / values.len() as f64,
                            min: values.iter().copied().fold(f64::INFINITY, f64::min),
                            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        }
                    })
                    .collect();
                ClusterProfile {
                    cluster_id,
                    label: self.label_for(cluster_id),
                    customer_count: rows.len(),
                    customer_share: rows.len() as f64 / n as f64,
                    feature_stats,
                }
            })
            .collect()
    }

    /// Sweep k over `k_range` on scaled features, optimizing silhouette.
    pub fn find_optimal_k(
        &self,
        dataset: &Dataset,
        k_range: std::ops::RangeInclusive<usize>,
    ) -> EngineResult<KSweep> {
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(dataset)?;
        let points = &scaled.features;

        let mut entries = Vec::new();
        for k in k_range {
            if points.len() < k {
                break;
            }
            let mut model = KMeans::new(KMeansConfig {
                n_clusters: k,
                max_iter: self.config.max_iter,
                n_init: self.config.n_init,
                seed: self.config.seed,
            });
            let labels: Vec<i64> = model
                .fit_predict(points)?
                .into_iter()
                .map(|l| l as i64)
                .collect();
            entries.push(KSweepEntry {
                k,
                inertia: model.inertia,
                silhouette: silhouette(points, &labels),
            });
        }
        if entries.is_empty() {
            return Err(EngineError::InsufficientSamples {
                needed: 2,
                got: points.len(),
            });
        }

        let optimal_k = entries
            .iter()
            .max_by(|a, b| {
                a.silhouette
                    .partial_cmp(&b.silhouette)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|e| e.k)
            .unwrap_or(self.config.n_clusters);
        Ok(KSweep { entries, optimal_k })
    }
}

/// Score a finished clustering; noise points are excluded.
pub fn evaluate(points: &[Vec<f64>], labels: &[i64]) -> ClusterQuality {
    let mut cluster_ids: Vec<i64> = labels.iter().filter(|&&l| l != NOISE).copied().collect();
    cluster_ids.sort_unstable();
    cluster_ids.dedup();
    let n_clusters = cluster_ids.len();

    if n_clusters < 2 {
        return ClusterQuality::Degenerate { n_clusters };
    }
    ClusterQuality::Scored {
        n_clusters,
        silhouette: silhouette(points, labels),
        calinski_harabasz: calinski_harabasz(points, labels),
        davies_bouldin: davies_bouldin(points, labels),
    }
}

fn clustered_indices(labels: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        if l != NOISE {
            groups.entry(l).or_default().push(i);
        }
    }
    groups
}

/// Mean silhouette over non-noise samples; singleton clusters score 0.
pub fn silhouette(points: &[Vec<f64>], labels: &[i64]) -> f64 {
    let groups = clustered_indices(labels);
    if groups.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut count = 0usize;
    for (&label, members) in &groups {
        for &i in members {
            if members.len() == 1 {
                count += 1;
                continue;
            }
            let a: f64 = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| squared_distance(&points[i], &points[j]).sqrt())
                .sum::<f64>()
                / (members.len() - 1) as f64;

            let b = groups
                .iter()
                .filter(|(&other, _)| other != label)
                .map(|(_, others)| {
                    others
                        .iter()
                        .map(|&j| squared_distance(&points[i], &points[j]).sqrt())
                        .sum::<f64>()
                        / others.len() as f64
                })
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Between/within dispersion ratio; higher is better.
fn calinski_harabasz(points: &[Vec<f64>], labels: &[i64]) -> f64 {
    let groups = clustered_indices(labels);
    let k = groups.len();
    let indices: Vec<usize> = groups.values().flatten().copied().collect();
    let n = indices.len();
    if k < 2 || n <= k {
        return 0.0;
    }

    let dim = points[0].len();
    let global = centroid_of(points, &indices, dim);

    let mut between = 0.0;
    let mut within = 0.0;
    for members in groups.values() {
        let center = centroid_of(points, members, dim);
        between += members.len() as f64 * squared_distance(&center, &global);
        within += members
            .iter()
            .map(|&i| squared_distance(&points[i], &center))
            .sum::<f64>();
    }
    if within == 0.0 {
        return 0.0;
    }
    (between / (k - 1) as f64) / (within / (n - k) as f64)
}

/// Mean worst-case cluster similarity; lower is better.
fn davies_bouldin(points: &[Vec<f64>], labels: &[i64]) -> f64 {
    let groups = clustered_indices(labels);
    let k = groups.len();
    if k < 2 {
        return 0.0;
    }
    let dim = points[0].len();

    let stats: Vec<(Vec<f64>, f64)> = groups
        .values()
        .map(|members| {
            let center = centroid_of(points, members, dim);
            let scatter = members
                .iter()
                .map(|&i| squared_distance(&points[i], &center).sqrt())
                .sum::<f64>()
                / members.len() as f64;
            (center, scatter)
        })
        .collect();

    let mut total = 0.0;
    for i in 0..k {
        let mut worst: f64 = 0.0;
        for j in 0..k {
            if i == j {
                continue;
            }
            let d = squared_distance(&stats[i].0, &stats[j].0).sqrt();
            if d > 0.0 {
                worst = worst.max((stats[i].1 + stats[j].1) / d);
            }
        }
        total += worst;
    }
    total / k as f64
}

fn centroid_of(points: &[Vec<f64>], indices: &[usize], dim: usize) -> Vec<f64> {
    let mut center = vec![0.0; dim];
    for &i in indices {
        for (c, v) in center.iter_mut().zip(points[i].iter()) {
            *c += v;
        }
    }
    for c in center.iter_mut() {
        *c /= indices.len() as f64;
    }
    center
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_dataset() -> Dataset {
        let mut ds = Dataset::new(vec!["monetary".to_string(), "frequency".to_string()]);
        let mut id = 0;
        // Low, medium and high value groups
        for i in 0..8 {
            let j = i as f64 * 0.1;
            ds.add_sample(format!("L{id}"), vec![100.0 + j, 1.0 + j], 0.0);
            id += 1;
        }
        for i in 0..8 {
            let j = i as f64 * 0.1;
            ds.add_sample(format!("M{id}"), vec![1000.0 + j, 5.0 + j], 0.0);
            id += 1;
        }
        for i in 0..8 {
            let j = i as f64 * 0.1;
            ds.add_sample(format!("H{id}"), vec![10000.0 + j, 20.0 + j], 0.0);
            id += 1;
        }
        ds
    }

    fn test_config() -> ClusteringConfig {
        ClusteringConfig {
            order_by: "monetary".to_string(),
            ..ClusteringConfig::default()
        }
    }

    #[test]
    fn test_high_value_label_follows_monetary_rank() {
        let ds = blob_dataset();
        let mut model = ClusteringModel::new(test_config());
        let assignments = model.fit_predict(&ds).unwrap();

        for a in &assignments {
            if a.customer_id.starts_with('H') {
                assert_eq!(a.label, "High Value");
            } else if a.customer_id.starts_with('M') {
                assert_eq!(a.label, "Medium Value");
            } else {
                assert_eq!(a.label, "Low Value");
            }
        }
    }

    #[test]
    fn test_quality_scored_on_separated_blobs() {
        let ds = blob_dataset();
        let mut model = ClusteringModel::new(test_config());
        model.fit_predict(&ds).unwrap();

        match model.quality.as_ref().unwrap() {
            ClusterQuality::Scored {
                n_clusters,
                silhouette,
                davies_bouldin,
                ..
            } => {
                assert_eq!(*n_clusters, 3);
                assert!(*silhouette > 0.5);
                assert!(*davies_bouldin < 1.0);
            }
            ClusterQuality::Degenerate { .. } => panic!("expected scored quality"),
        }
    }

    #[test]
    fn test_degenerate_single_cluster() {
        let points = vec![vec![0.0], vec![0.1], vec![0.2]];
        let labels = vec![0, 0, 0];
        assert!(matches!(
            evaluate(&points, &labels),
            ClusterQuality::Degenerate { n_clusters: 1 }
        ));
    }

    #[test]
    fn test_profiles_cover_all_clusters() {
        let ds = blob_dataset();
        let mut model = ClusteringModel::new(test_config());
        let assignments = model.fit_predict(&ds).unwrap();
        let profiles = model.cluster_profiles(&ds, &assignments);
        assert_eq!(profiles.len(), 3);
        let total: usize = profiles.iter().map(|p| p.customer_count).sum();
        assert_eq!(total, ds.n_samples());
    }

    #[test]
    fn test_optimal_k_prefers_three_blobs() {
        let ds = blob_dataset();
        let model = ClusteringModel::new(test_config());
        let sweep = model.find_optimal_k(&ds, 2..=6).unwrap();
        assert_eq!(sweep.optimal_k, 3);
    }

    #[test]
    fn test_labels_stable_across_runs() {
        let ds = blob_dataset();
        let mut first = ClusteringModel::new(test_config());
        let mut second = ClusteringModel::new(test_config());
        let a = first.fit_predict(&ds).unwrap();
        let b = second.fit_predict(&ds).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.label, y.label);
        }
    }

    #[test]
    fn test_predict_reuses_fit() {
        let ds = blob_dataset();
        let mut model = ClusteringModel::new(test_config());
        model.fit_predict(&ds).unwrap();

        let mut fresh = Dataset::new(ds.feature_names.clone());
        fresh.add_sample("X".to_string(), vec![10000.0, 20.0], 0.0);
        let assigned = model.predict(&fresh).unwrap();
        assert_eq!(assigned[0].label, "High Value");
    }
}
