//! Regression metrics

use serde::Serialize;

/// Cap applied to the safe MAPE so a single near-zero truth cannot blow up
/// the average.
pub const MAPE_CAP: f64 = 1000.0;

#[derive(Debug, Clone, Serialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean absolute percentage error over nonzero ground truth, percent.
    pub mape: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        let mse = mse(y_true, y_pred);
        Self {
            mse,
            rmse: mse.sqrt(),
            mae: mae(y_true, y_pred),
            r2: r2(y_true, y_pred),
            mape: safe_mape(y_true, y_pred),
        }
    }
}

pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Coefficient of determination; 0 for a constant target.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// MAPE excluding zero ground truth; each term capped at [`MAPE_CAP`] percent.
/// Returns 0 when every truth value is zero.
pub fn safe_mape(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if t == 0.0 {
            continue;
        }
        sum += (((t - p) / t).abs() * 100.0).min(MAPE_CAP);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit() {
        let y = [1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute(&y, &y);
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mape, 0.0);
    }

    #[test]
    fn test_mape_skips_zero_truth() {
        let y_true = [0.0, 100.0];
        let y_pred = [50.0, 110.0];
        // Only the second pair counts: |100-110|/100 = 10%
        assert!((safe_mape(&y_true, &y_pred) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_mape_capped() {
        let y_true = [0.001];
        let y_pred = [100.0];
        assert_eq!(safe_mape(&y_true, &y_pred), MAPE_CAP);
    }

    #[test]
    fn test_mape_all_zero_truth() {
        assert_eq!(safe_mape(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_r2_constant_target() {
        assert_eq!(r2(&[5.0, 5.0, 5.0], &[4.0, 5.0, 6.0]), 0.0);
    }

    #[test]
    fn test_rmse_is_sqrt_mse() {
        let y_true = [0.0, 0.0];
        let y_pred = [3.0, 4.0];
        let m = RegressionMetrics::compute(&y_true, &y_pred);
        assert!((m.mse - 12.5).abs() < 1e-12);
        assert!((m.rmse - 12.5f64.sqrt()).abs() < 1e-12);
    }
}
