//! Dataset structure for model training

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Per-customer feature matrix with labels.
///
/// Rows are customers, not time-ordered samples; splits are always seeded
/// random shuffles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature matrix (n_samples x n_features)
    pub features: Vec<Vec<f64>>,
    /// Target labels
    pub labels: Vec<f64>,
    /// Feature names
    pub feature_names: Vec<String>,
    /// Customer id per row
    pub customer_ids: Vec<String>,
}

/// Train/test split result
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            features: Vec::new(),
            labels: Vec::new(),
            feature_names,
            customer_ids: Vec::new(),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Add a customer row.
    pub fn add_sample(&mut self, customer_id: String, features: Vec<f64>, label: f64) {
        debug_assert_eq!(features.len(), self.feature_names.len());
        self.customer_ids.push(customer_id);
        self.features.push(features);
        self.labels.push(label);
    }

    /// Feature matrix as ndarray.
    pub fn features_array(&self) -> Array2<f64> {
        let n_samples = self.n_samples();
        let n_features = self.n_features();
        if n_samples == 0 {
            return Array2::zeros((0, n_features));
        }
        Array2::from_shape_fn((n_samples, n_features), |(i, j)| self.features[i][j])
    }

    pub fn labels_array(&self) -> Array1<f64> {
        Array1::from_vec(self.labels.clone())
    }

    /// Seeded random shuffle split.
    pub fn random_split(&self, test_ratio: f64, seed: u64) -> Split {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = self.n_samples();

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let test_size = (test_ratio * n as f64) as usize;
        let (test_indices, train_indices) = indices.split_at(test_size);

        Split {
            train: self.subset(train_indices),
            test: self.subset(test_indices),
        }
    }

    /// Subset by row indices.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            feature_names: self.feature_names.clone(),
            customer_ids: indices
                .iter()
                .map(|&i| self.customer_ids[i].clone())
                .collect(),
        }
    }

    /// Bootstrap sample (with replacement, seeded).
    pub fn bootstrap_sample(&self, seed: u64) -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = self.n_samples();
        let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        self.subset(&indices)
    }

    /// Column index of a named feature.
    pub fn feature_index(&self, name: &str) -> EngineResult<usize> {
        self.feature_names
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| EngineError::UnknownFeature(name.to_string()))
    }

    /// Values of one feature column.
    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.features.iter().map(|row| row[idx]).collect()
    }
}
