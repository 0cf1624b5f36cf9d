//! K-means clustering
//!
//! Lloyd's algorithm with k-means++ seeding, restarted `n_init` times with
//! derived seeds; the run with the lowest inertia wins. Fully deterministic
//! for a given seed.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub n_init: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            max_iter: 300,
            n_init: 10,
            seed: 42,
        }
    }
}

/// Fitted k-means model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    config: KMeansConfig,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self {
            config,
            centroids: Vec::new(),
            inertia: f64::INFINITY,
        }
    }

    /// Fit and return per-row cluster assignments.
    pub fn fit_predict(&mut self, points: &[Vec<f64>]) -> EngineResult<Vec<usize>> {
        let k = self.config.n_clusters;
        if points.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if points.len() < k {
            return Err(EngineError::InsufficientSamples {
                needed: k,
                got: points.len(),
            });
        }

        // Refits discard any previous state and compare restarts locally.
        let mut best_inertia = f64::INFINITY;
        let mut best_labels = Vec::new();
        for run in 0..self.config.n_init.max(1) {
            let seed = self.config.seed.wrapping_add(run as u64);
            let (centroids, labels, inertia) = self.single_run(points, seed);
            if inertia < best_inertia {
                best_inertia = inertia;
                self.centroids = centroids;
                best_labels = labels;
            }
        }
        self.inertia = best_inertia;
        debug!(
            k,
            inertia = self.inertia,
            "k-means fitted"
        );
        Ok(best_labels)
    }

    /// Assign rows to the nearest fitted centroid.
    pub fn predict(&self, points: &[Vec<f64>]) -> EngineResult<Vec<usize>> {
        if self.centroids.is_empty() {
            return Err(EngineError::NotFitted);
        }
        Ok(points
            .iter()
            .map(|p| nearest_centroid(p, &self.centroids).0)
            .collect())
    }

    fn single_run(&self, points: &[Vec<f64>], seed: u64) -> (Vec<Vec<f64>>, Vec<usize>, f64) {
        let k = self.config.n_clusters;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut centroids = plus_plus_init(points, k, &mut rng);
        let mut labels = vec![0usize; points.len()];

        for _ in 0..self.config.max_iter {
            let mut changed = false;
            for (i, point) in points.iter().enumerate() {
                let (best, _) = nearest_centroid(point, &centroids);
                if labels[i] != best {
                    labels[i] = best;
                    changed = true;
                }
            }

            // Recompute centroids; an emptied cluster is reseeded with the
            // point farthest from its centroid
            let dim = points[0].len();
            let mut sums = vec![vec![0.0; dim]; k];
            let mut counts = vec![0usize; k];
            for (point, &label) in points.iter().zip(labels.iter()) {
                counts[label] += 1;
                for (s, v) in sums[label].iter_mut().zip(point.iter()) {
                    *s += v;
                }
            }
            for c in 0..k {
                if counts[c] == 0 {
                    let far = points
                        .iter()
                        .max_by(|a, b| {
                            let da = nearest_centroid(a, &centroids).1;
                            let db = nearest_centroid(b, &centroids).1;
                            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .cloned();
                    if let Some(p) = far {
                        centroids[c] = p;
                    }
                } else {
                    for (j, s) in sums[c].iter().enumerate() {
                        centroids[c][j] = s / counts[c] as f64;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        let inertia = points
            .iter()
            .zip(labels.iter())
            .map(|(p, &l)| squared_distance(p, &centroids[l]))
            .sum();
        (centroids, labels, inertia)
    }
}

/// k-means++ initialization: later centroids are drawn proportionally to
/// squared distance from the nearest already-chosen one.
fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = points
            .iter()
            .map(|p| nearest_centroid(p, &centroids).1)
            .collect();
        let total: f64 = distances.iter().sum();
        if total <= 0.0 {
            // All points coincide with existing centroids
            centroids.push(points[rng.gen_range(0..points.len())].clone());
            continue;
        }
        match WeightedIndex::new(&distances) {
            Ok(dist) => centroids.push(points[dist.sample(rng)].clone()),
            Err(_) => centroids.push(points[rng.gen_range(0..points.len())].clone()),
        }
    }
    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    (best, best_dist)
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> Vec<Vec<f64>> {
        let mut points = Vec::new();
        for i in 0..10 {
            let jitter = i as f64 * 0.01;
            points.push(vec![0.0 + jitter, 0.0]);
            points.push(vec![10.0 + jitter, 10.0]);
            points.push(vec![-10.0 - jitter, 10.0]);
        }
        points
    }

    #[test]
    fn test_separates_blobs() {
        let mut model = KMeans::new(KMeansConfig::default());
        let labels = model.fit_predict(&three_blobs()).unwrap();

        // Points from the same blob share a label
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[1], labels[4]);
        assert_eq!(labels[2], labels[5]);
        // And the three blobs get three distinct labels
        let mut distinct = vec![labels[0], labels[1], labels[2]];
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let points = three_blobs();
        let mut a = KMeans::new(KMeansConfig::default());
        let mut b = KMeans::new(KMeansConfig::default());
        assert_eq!(
            a.fit_predict(&points).unwrap(),
            b.fit_predict(&points).unwrap()
        );
    }

    #[test]
    fn test_too_few_samples() {
        let mut model = KMeans::new(KMeansConfig {
            n_clusters: 5,
            ..Default::default()
        });
        let points = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            model.fit_predict(&points),
            Err(EngineError::InsufficientSamples { needed: 5, got: 2 })
        ));
    }

    #[test]
    fn test_refit_replaces_previous_state() {
        let mut model = KMeans::new(KMeansConfig::default());

        // Tight blob first, so the fitted inertia is tiny.
        let tight: Vec<Vec<f64>> = (0..9).map(|i| vec![i as f64 * 0.01, 0.0]).collect();
        model.fit_predict(&tight).unwrap();
        let tight_inertia = model.inertia;

        // Spread data has higher inertia; the refit must still accept it.
        let spread: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 * 50.0, 0.0]).collect();
        let labels = model.fit_predict(&spread).unwrap();
        assert_eq!(labels.len(), 30);
        assert!(model.inertia > tight_inertia);
        assert_eq!(model.predict(&spread).unwrap(), labels);
    }

    #[test]
    fn test_predict_after_fit() {
        let mut model = KMeans::new(KMeansConfig::default());
        let points = three_blobs();
        let labels = model.fit_predict(&points).unwrap();
        let assigned = model.predict(&[vec![0.1, 0.1]]).unwrap();
        assert_eq!(assigned[0], labels[0]);
    }
}
