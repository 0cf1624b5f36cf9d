//! CART decision tree
//!
//! Shared base for the churn classifier and CLV regressor forests. Supports
//! per-sample weights so class imbalance can be corrected at fit time.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;

/// Decision tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf node
    pub min_samples_leaf: usize,
    /// Maximum features to consider for split (None = all)
    pub max_features: Option<usize>,
    /// Random seed for reproducibility
    pub seed: u64,
    pub task: TaskType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TaskType {
    Regression,
    Classification,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
            task: TaskType::Classification,
        }
    }
}

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature_idx: Option<usize>,
    pub threshold: Option<f64>,
    /// Prediction value (regression mean or majority class)
    pub value: f64,
    /// Class probabilities (classification leaves)
    pub class_probs: Option<Vec<f64>>,
    pub n_samples: usize,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
    pub impurity: f64,
}

impl TreeNode {
    fn leaf(value: f64, n_samples: usize, impurity: f64) -> Self {
        Self {
            feature_idx: None,
            threshold: None,
            value,
            class_probs: None,
            n_samples,
            left: None,
            right: None,
            impurity,
        }
    }

    fn leaf_classification(class_probs: Vec<f64>, n_samples: usize, impurity: f64) -> Self {
        let value = if class_probs[1] > class_probs[0] { 1.0 } else { 0.0 };
        Self {
            feature_idx: None,
            threshold: None,
            value,
            class_probs: Some(class_probs),
            n_samples,
            left: None,
            right: None,
            impurity,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn depth(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            1 + self
                .left
                .as_ref()
                .map(|n| n.depth())
                .unwrap_or(0)
                .max(self.right.as_ref().map(|n| n.depth()).unwrap_or(0))
        }
    }

    pub fn n_leaves(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.left.as_ref().map(|n| n.n_leaves()).unwrap_or(0)
                + self.right.as_ref().map(|n| n.n_leaves()).unwrap_or(0)
        }
    }
}

/// Decision Tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            feature_names: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Fit with uniform sample weights.
    pub fn fit(&mut self, dataset: &Dataset) {
        let weights = vec![1.0; dataset.n_samples()];
        self.fit_weighted(dataset, &weights);
    }

    /// Fit with per-sample weights. Impurity and leaf values are computed on
    /// weighted counts, which is how balanced class weights enter the model.
    pub fn fit_weighted(&mut self, dataset: &Dataset, weights: &[f64]) {
        self.feature_names = dataset.feature_names.clone();
        let n_features = dataset.n_features();
        self.feature_importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..dataset.n_samples()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        self.root = Some(self.build_tree(dataset, weights, &indices, 0, &mut rng));

        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }
    }

    fn build_tree(
        &mut self,
        dataset: &Dataset,
        weights: &[f64],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n = indices.len();
        let impurity = self.node_impurity(dataset, weights, indices);

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || impurity < 1e-10
        {
            return self.create_leaf(dataset, weights, indices, impurity);
        }

        match self.find_best_split(dataset, weights, indices, rng) {
            Some((feature_idx, threshold, left_indices, right_indices, importance)) => {
                if left_indices.len() < self.config.min_samples_leaf
                    || right_indices.len() < self.config.min_samples_leaf
                {
                    return self.create_leaf(dataset, weights, indices, impurity);
                }

                self.feature_importances[feature_idx] += importance;

                let left = self.build_tree(dataset, weights, &left_indices, depth + 1, rng);
                let right = self.build_tree(dataset, weights, &right_indices, depth + 1, rng);

                TreeNode {
                    feature_idx: Some(feature_idx),
                    threshold: Some(threshold),
                    value: weighted_mean(dataset, weights, indices),
                    class_probs: None,
                    n_samples: n,
                    left: Some(Box::new(left)),
                    right: Some(Box::new(right)),
                    impurity,
                }
            }
            None => self.create_leaf(dataset, weights, indices, impurity),
        }
    }

    fn node_impurity(&self, dataset: &Dataset, weights: &[f64], indices: &[usize]) -> f64 {
        match self.config.task {
            TaskType::Regression => weighted_mse(dataset, weights, indices),
            TaskType::Classification => weighted_gini(dataset, weights, indices),
        }
    }

    fn create_leaf(
        &self,
        dataset: &Dataset,
        weights: &[f64],
        indices: &[usize],
        impurity: f64,
    ) -> TreeNode {
        match self.config.task {
            TaskType::Regression => TreeNode::leaf(
                weighted_mean(dataset, weights, indices),
                indices.len(),
                impurity,
            ),
            TaskType::Classification => {
                let probs = weighted_class_probs(dataset, weights, indices);
                TreeNode::leaf_classification(probs, indices.len(), impurity)
            }
        }
    }

    fn find_best_split(
        &self,
        dataset: &Dataset,
        weights: &[f64],
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> {
        let n_features = dataset.n_features();
        let max_features = self.config.max_features.unwrap_or(n_features);

        let mut feature_indices: Vec<usize> = (0..n_features).collect();
        feature_indices.shuffle(rng);
        feature_indices.truncate(max_features);

        let mut best_gain = 0.0;
        let mut best_split: Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> = None;
        let parent_impurity = self.node_impurity(dataset, weights, indices);

        for &feature_idx in &feature_indices {
            let mut values: Vec<f64> = indices
                .iter()
                .map(|&i| dataset.features[i][feature_idx])
                .collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();

            // Midpoints between consecutive unique values as candidates
            for window in values.windows(2) {
                let threshold = (window[0] + window[1]) / 2.0;

                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| dataset.features[i][feature_idx] <= threshold);

                if left_idx.is_empty() || right_idx.is_empty() {
                    continue;
                }

                let left_impurity = self.node_impurity(dataset, weights, &left_idx);
                let right_impurity = self.node_impurity(dataset, weights, &right_idx);

                let w_left: f64 = left_idx.iter().map(|&i| weights[i]).sum();
                let w_right: f64 = right_idx.iter().map(|&i| weights[i]).sum();
                let w_total = w_left + w_right;

                let weighted_impurity =
                    (w_left * left_impurity + w_right * right_impurity) / w_total;
                let gain = parent_impurity - weighted_impurity;

                if gain > best_gain {
                    best_gain = gain;
                    let importance = gain * w_total;
                    best_split = Some((feature_idx, threshold, left_idx, right_idx, importance));
                }
            }
        }

        best_split
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        match &self.root {
            Some(node) => self.traverse(node, features),
            None => 0.0,
        }
    }

    /// Probability of the positive class.
    pub fn predict_proba_one(&self, features: &[f64]) -> f64 {
        match &self.root {
            Some(node) => self.traverse_proba(node, features),
            None => 0.5,
        }
    }

    fn traverse(&self, node: &TreeNode, features: &[f64]) -> f64 {
        if node.is_leaf() {
            return node.value;
        }
        let feature_idx = node.feature_idx.unwrap_or(0);
        let threshold = node.threshold.unwrap_or(0.0);
        if features[feature_idx] <= threshold {
            node.left
                .as_ref()
                .map(|n| self.traverse(n, features))
                .unwrap_or(node.value)
        } else {
            node.right
                .as_ref()
                .map(|n| self.traverse(n, features))
                .unwrap_or(node.value)
        }
    }

    fn traverse_proba(&self, node: &TreeNode, features: &[f64]) -> f64 {
        if node.is_leaf() {
            return node
                .class_probs
                .as_ref()
                .map(|p| p[1])
                .unwrap_or(0.5);
        }
        let feature_idx = node.feature_idx.unwrap_or(0);
        let threshold = node.threshold.unwrap_or(0.0);
        if features[feature_idx] <= threshold {
            node.left
                .as_ref()
                .map(|n| self.traverse_proba(n, features))
                .unwrap_or(0.5)
        } else {
            node.right
                .as_ref()
                .map(|n| self.traverse_proba(n, features))
                .unwrap_or(0.5)
        }
    }

    pub fn predict(&self, dataset: &Dataset) -> Vec<f64> {
        dataset
            .features
            .iter()
            .map(|f| self.predict_one(f))
            .collect()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }
}

fn weighted_mean(dataset: &Dataset, weights: &[f64], indices: &[usize]) -> f64 {
    let w_sum: f64 = indices.iter().map(|&i| weights[i]).sum();
    if w_sum == 0.0 {
        return 0.0;
    }
    indices
        .iter()
        .map(|&i| weights[i] * dataset.labels[i])
        .sum::<f64>()
        / w_sum
}

fn weighted_mse(dataset: &Dataset, weights: &[f64], indices: &[usize]) -> f64 {
    let w_sum: f64 = indices.iter().map(|&i| weights[i]).sum();
    if w_sum == 0.0 {
        return 0.0;
    }
    let mean = weighted_mean(dataset, weights, indices);
    indices
        .iter()
        .map(|&i| weights[i] * (dataset.labels[i] - mean).powi(2))
        .sum::<f64>()
        / w_sum
}

fn weighted_gini(dataset: &Dataset, weights: &[f64], indices: &[usize]) -> f64 {
    let w_sum: f64 = indices.iter().map(|&i| weights[i]).sum();
    if w_sum == 0.0 {
        return 0.0;
    }
    let w_positive: f64 = indices
        .iter()
        .filter(|&&i| dataset.labels[i] > 0.0)
        .map(|&i| weights[i])
        .sum();
    let p = w_positive / w_sum;
    2.0 * p * (1.0 - p)
}

fn weighted_class_probs(dataset: &Dataset, weights: &[f64], indices: &[usize]) -> Vec<f64> {
    let w_sum: f64 = indices.iter().map(|&i| weights[i]).sum();
    if w_sum == 0.0 {
        return vec![0.5, 0.5];
    }
    let w_positive: f64 = indices
        .iter()
        .filter(|&&i| dataset.labels[i] > 0.0)
        .map(|&i| weights[i])
        .sum();
    vec![1.0 - w_positive / w_sum, w_positive / w_sum]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_dataset() -> Dataset {
        let mut dataset = Dataset::new(vec!["x".to_string()]);
        for i in 0..100 {
            let x = i as f64 / 10.0;
            let y = if x > 5.0 { 1.0 } else { 0.0 };
            dataset.add_sample(format!("C{i}"), vec![x], y);
        }
        dataset
    }

    #[test]
    fn test_classification_learns_step() {
        let mut tree = DecisionTree::new(TreeConfig::default());
        let dataset = step_dataset();
        tree.fit(&dataset);

        assert_eq!(tree.predict_one(&[2.0]), 0.0);
        assert_eq!(tree.predict_one(&[8.0]), 1.0);
        assert!(tree.predict_proba_one(&[8.0]) > 0.9);
    }

    #[test]
    fn test_regression_learns_means() {
        let mut dataset = Dataset::new(vec!["x".to_string()]);
        for i in 0..100 {
            let x = i as f64 / 10.0;
            dataset.add_sample(format!("C{i}"), vec![x], 2.0 * x + 1.0);
        }
        let mut tree = DecisionTree::new(TreeConfig {
            task: TaskType::Regression,
            ..TreeConfig::default()
        });
        tree.fit(&dataset);

        let pred = tree.predict_one(&[5.0]);
        assert!((pred - 11.0).abs() < 2.0);
    }

    #[test]
    fn test_sample_weights_shift_leaf_probs() {
        // 90/10 imbalance; upweighting the minority class pulls the root
        // probabilities toward 0.5
        let mut dataset = Dataset::new(vec!["x".to_string()]);
        for i in 0..100 {
            let y = if i < 90 { 0.0 } else { 1.0 };
            dataset.add_sample(format!("C{i}"), vec![0.0], y);
        }
        let weights: Vec<f64> = dataset
            .labels
            .iter()
            .map(|&y| if y > 0.0 { 9.0 } else { 1.0 })
            .collect();

        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit_weighted(&dataset, &weights);
        let proba = tree.predict_proba_one(&[0.0]);
        assert!((proba - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_feature_importances_normalized() {
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&step_dataset());
        let total: f64 = tree.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
