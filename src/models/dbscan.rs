//! DBSCAN clustering
//!
//! Density-based alternative to k-means for irregular segment shapes.
//! Noise points get the label -1 and are excluded from cluster ranking.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kmeans::squared_distance;
use crate::error::{EngineError, EngineResult};

/// Noise label used for unassigned points.
pub const NOISE: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbscanConfig {
    /// Neighborhood radius.
    pub eps: f64,
    /// Minimum neighbors (self included) for a core point.
    pub min_samples: usize,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dbscan {
    config: DbscanConfig,
    pub n_clusters: usize,
}

impl Dbscan {
    pub fn new(config: DbscanConfig) -> Self {
        Self {
            config,
            n_clusters: 0,
        }
    }

    /// Cluster all points. Returns -1 for noise, 0.. for cluster ids.
    pub fn fit_predict(&mut self, points: &[Vec<f64>]) -> EngineResult<Vec<i64>> {
        if points.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let eps_sq = self.config.eps * self.config.eps;
        let n = points.len();
        let mut labels = vec![NOISE; n];
        let mut visited = vec![false; n];
        let mut cluster = 0i64;

        for i in 0..n {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            let neighbors = region_query(points, i, eps_sq);
            if neighbors.len() < self.config.min_samples {
                continue;
            }

            labels[i] = cluster;
            let mut queue = neighbors;
            let mut qi = 0;
            while qi < queue.len() {
                let j = queue[qi];
                qi += 1;
                if !visited[j] {
                    visited[j] = true;
                    let j_neighbors = region_query(points, j, eps_sq);
                    if j_neighbors.len() >= self.config.min_samples {
                        queue.extend(j_neighbors);
                    }
                }
                if labels[j] == NOISE {
                    labels[j] = cluster;
                }
            }
            cluster += 1;
        }

        self.n_clusters = cluster as usize;
        debug!(
            clusters = self.n_clusters,
            noise = labels.iter().filter(|&&l| l == NOISE).count(),
            "dbscan fitted"
        );
        Ok(labels)
    }
}

fn region_query(points: &[Vec<f64>], idx: usize, eps_sq: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| squared_distance(&points[idx], p) <= eps_sq)
        .map(|(i, _)| i)
        .collect()
}
