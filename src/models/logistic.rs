//! Logistic regression for churn classification
//!
//! Gradient-descent binary classifier over ndarray matrices. Supports
//! per-sample weights so the balanced class weighting used by the churn
//! model applies here as well as to the forest.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Logistic Regression classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    pub cost_history: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.05, 1000)
    }
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, max_iter: usize) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            learning_rate,
            max_iter,
            tolerance: 1e-6,
            cost_history: Vec::new(),
        }
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn sigmoid_array(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(Self::sigmoid)
    }

    /// Weighted binary cross-entropy.
    fn log_loss(y_true: &Array1<f64>, y_pred: &Array1<f64>, weights: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let w_sum: f64 = weights.sum();
        -y_true
            .iter()
            .zip(y_pred.iter())
            .zip(weights.iter())
            .map(|((&y, &p), &w)| {
                let p_clipped = p.clamp(eps, 1.0 - eps);
                w * (y * p_clipped.ln() + (1.0 - y) * (1.0 - p_clipped).ln())
            })
            .sum::<f64>()
            / w_sum
    }

    /// Fit with uniform sample weights.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> EngineResult<()> {
        let weights = Array1::ones(y.len());
        self.fit_weighted(x, y, &weights)
    }

    /// Fit by weighted gradient descent.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weights: &Array1<f64>,
    ) -> EngineResult<()> {
        if x.nrows() == 0 {
            return Err(EngineError::EmptyInput);
        }
        if x.nrows() != y.len() || x.nrows() != sample_weights.len() {
            return Err(EngineError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }

        let n_features = x.ncols();
        let w_sum: f64 = sample_weights.sum();
        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;
        self.cost_history.clear();

        for iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid_array(&linear);

            let errors = (&predictions - y) * sample_weights;
            let dw = x.t().dot(&errors) / w_sum;
            let db = errors.sum() / w_sum;

            weights = &weights - &(&dw * self.learning_rate);
            bias -= self.learning_rate * db;

            let cost = Self::log_loss(y, &predictions, sample_weights);
            self.cost_history.push(cost);

            if iter > 0 {
                let cost_diff = (self.cost_history[iter - 1] - cost).abs();
                if cost_diff < self.tolerance {
                    debug!(iter, cost, "gradient descent converged");
                    break;
                }
            }
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> EngineResult<Array1<f64>> {
        let weights = self.coefficients.as_ref().ok_or(EngineError::NotFitted)?;
        let bias = self.intercept.ok_or(EngineError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(EngineError::DimensionMismatch {
                expected: weights.len(),
                got: x.ncols(),
            });
        }
        let linear = x.dot(weights) + bias;
        Ok(Self::sigmoid_array(&linear))
    }

    pub fn predict_with_threshold(
        &self,
        x: &Array2<f64>,
        threshold: f64,
    ) -> EngineResult<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= threshold { 1.0 } else { 0.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64 / 4.0);
        let y = Array1::from_shape_fn(40, |i| if i >= 20 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_learns_separable_boundary() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(0.1, 2000);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&array![[0.5], [9.5]]).unwrap();
        assert!(proba[0] < 0.3);
        assert!(proba[1] > 0.7);
    }

    #[test]
    fn test_cost_decreases() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(0.05, 500);
        model.fit(&x, &y).unwrap();
        let first = model.cost_history.first().copied().unwrap();
        let last = model.cost_history.last().copied().unwrap();
        assert!(last < first);
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let model = LogisticRegression::default();
        assert!(matches!(
            model.predict_proba(&array![[1.0]]),
            Err(EngineError::NotFitted)
        ));
    }

    #[test]
    fn test_threshold_predictions() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(0.1, 2000);
        model.fit(&x, &y).unwrap();
        let labels = model
            .predict_with_threshold(&array![[0.0], [9.9]], 0.5)
            .unwrap();
        assert_eq!(labels[0], 0.0);
        assert_eq!(labels[1], 1.0);
    }
}
