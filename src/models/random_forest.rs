//! Random forest ensemble
//!
//! Bagged CART trees, fitted in parallel with per-tree seeds derived from the
//! base seed. Sample weights are carried into every bootstrap so balanced
//! class weights survive resampling.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::{DecisionTree, TaskType, TreeConfig};
use crate::data::Dataset;

/// Random Forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Max features per split (sqrt for classification, n/3 for regression
    /// when None)
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
    pub task: TaskType,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            bootstrap: true,
            seed: 42,
            task: TaskType::Classification,
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_names: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Fit with uniform sample weights.
    pub fn fit(&mut self, dataset: &Dataset) {
        let weights = vec![1.0; dataset.n_samples()];
        self.fit_weighted(dataset, &weights);
    }

    /// Fit with per-sample weights.
    pub fn fit_weighted(&mut self, dataset: &Dataset, weights: &[f64]) {
        self.feature_names = dataset.feature_names.clone();
        let n_features = dataset.n_features();

        let max_features = self.config.max_features.unwrap_or(match self.config.task {
            TaskType::Classification => (n_features as f64).sqrt().ceil() as usize,
            TaskType::Regression => (n_features / 3).max(1),
        });

        let trees: Vec<DecisionTree> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|i| {
                let tree_config = TreeConfig {
                    max_depth: self.config.max_depth,
                    min_samples_split: self.config.min_samples_split,
                    min_samples_leaf: self.config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed: self.config.seed.wrapping_add(i as u64),
                    task: self.config.task,
                };
                let mut tree = DecisionTree::new(tree_config);

                if self.config.bootstrap {
                    let seed = self.config.seed.wrapping_add(i as u64);
                    let indices = bootstrap_indices(dataset.n_samples(), seed);
                    let sample = dataset.subset(&indices);
                    let sample_weights: Vec<f64> =
                        indices.iter().map(|&idx| weights[idx]).collect();
                    tree.fit_weighted(&sample, &sample_weights);
                } else {
                    tree.fit_weighted(dataset, weights);
                }
                tree
            })
            .collect();

        self.trees = trees;

        self.feature_importances = vec![0.0; n_features];
        for tree in &self.trees {
            for (i, &imp) in tree.feature_importances().iter().enumerate() {
                self.feature_importances[i] += imp;
            }
        }
        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        match self.config.task {
            TaskType::Regression => {
                let sum: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
                sum / self.trees.len() as f64
            }
            TaskType::Classification => {
                if self.predict_proba_one(features) > 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Mean positive-class probability over trees.
    pub fn predict_proba_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self
            .trees
            .iter()
            .map(|t| t.predict_proba_one(features))
            .sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, dataset: &Dataset) -> Vec<f64> {
        dataset
            .features
            .par_iter()
            .map(|f| self.predict_one(f))
            .collect()
    }

    pub fn predict_proba(&self, dataset: &Dataset) -> Vec<f64> {
        dataset
            .features
            .par_iter()
            .map(|f| self.predict_proba_one(f))
            .collect()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// (name, importance) pairs sorted by importance descending.
    pub fn feature_importance_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .zip(self.feature_importances.iter())
            .map(|(n, &i)| (n.as_str(), i))
            .collect();
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranking
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn bootstrap_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_learns_step() {
        let mut dataset = Dataset::new(vec!["x".to_string()]);
        for i in 0..200 {
            let x = i as f64 / 20.0;
            let y = if x > 5.0 { 1.0 } else { 0.0 };
            dataset.add_sample(format!("C{i}"), vec![x], y);
        }

        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 20,
            max_depth: 5,
            ..Default::default()
        });
        forest.fit(&dataset);

        assert_eq!(forest.predict_one(&[2.0]), 0.0);
        assert_eq!(forest.predict_one(&[8.0]), 1.0);
        assert!(forest.predict_proba_one(&[9.0]) > 0.8);
    }

    #[test]
    fn test_regression_tracks_target() {
        let mut dataset = Dataset::new(vec!["x1".to_string(), "x2".to_string()]);
        for i in 0..200 {
            let x1 = (i as f64) / 20.0;
            let x2 = ((i as f64) / 10.0).sin();
            dataset.add_sample(format!("C{i}"), vec![x1, x2], x1 + 2.0 * x2);
        }

        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 10,
            max_depth: 6,
            task: TaskType::Regression,
            ..Default::default()
        });
        forest.fit(&dataset);

        assert_eq!(forest.n_trees(), 10);
        assert_eq!(forest.feature_importances().len(), 2);
        let pred = forest.predict_one(&[5.0, (100.0f64 / 10.0).sin()]);
        let truth = 5.0 + 2.0 * (100.0f64 / 10.0).sin();
        assert!((pred - truth).abs() < 2.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let mut dataset = Dataset::new(vec!["x".to_string()]);
        for i in 0..100 {
            let x = i as f64;
            dataset.add_sample(format!("C{i}"), vec![x], if x > 50.0 { 1.0 } else { 0.0 });
        }

        let config = ForestConfig {
            n_trees: 5,
            seed: 7,
            ..Default::default()
        };
        let mut a = RandomForest::new(config.clone());
        let mut b = RandomForest::new(config);
        a.fit(&dataset);
        b.fit(&dataset);
        assert_eq!(a.predict_proba(&dataset), b.predict_proba(&dataset));
    }
}
