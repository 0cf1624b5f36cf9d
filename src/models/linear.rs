//! Linear regression for CLV estimation
//!
//! Gradient-descent least squares over ndarray matrices. Expects
//! standardized inputs; the CLV model scales features before fitting.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    pub cost_history: Vec<f64>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(0.05, 2000)
    }
}

impl LinearRegression {
    pub fn new(learning_rate: f64, max_iter: usize) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            learning_rate,
            max_iter,
            tolerance: 1e-9,
            cost_history: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> EngineResult<()> {
        if x.nrows() == 0 {
            return Err(EngineError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(EngineError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }

        let n = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        self.cost_history.clear();

        for iter in 0..self.max_iter {
            let predictions = x.dot(&weights) + bias;
            let errors = &predictions - y;

            let dw = x.t().dot(&errors) / n;
            let db = errors.sum() / n;

            weights = &weights - &(&dw * self.learning_rate);
            bias -= self.learning_rate * db;

            let cost = errors.mapv(|e| e * e).sum() / (2.0 * n);
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

    pub fn predict(&self, x: &Array2<f64>) -> EngineResult<Array1<f64>> {
        let weights = self.coefficients.as_ref().ok_or(EngineError::NotFitted)?;
        let bias = self.intercept.ok_or(EngineError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(EngineError::DimensionMismatch {
                expected: weights.len(),
                got: x.ncols(),
            });
        }
        Ok(x.dot(weights) + bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_recovers_linear_relation() {
        // y = 3x + 2 on standardized-ish input
        let x = Array2::from_shape_fn((50, 1), |(i, _)| (i as f64 - 25.0) / 25.0);
        let y = x.column(0).mapv(|v| 3.0 * v + 2.0);

        let mut model = LinearRegression::new(0.1, 5000);
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 3.0).abs() < 0.05);
        assert!((model.intercept.unwrap() - 2.0).abs() < 0.05);

        let pred = model.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 3.5).abs() < 0.1);
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let model = LinearRegression::default();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(EngineError::NotFitted)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![1.0];
        let mut model = LinearRegression::default();
        assert!(matches!(
            model.fit(&x, &y),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }
}
