//! Customer lifetime value regression
//!
//! Predicts the monetary value of a customer over the coming period. Heavily
//! skewed targets are log-transformed before fitting and inverted at predict
//! time; predictions are clipped at zero. Alongside the learned model there is
//! a closed-form formula CLV and a Pareto view of revenue concentration.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::linear::LinearRegression;
use super::random_forest::{ForestConfig, RandomForest};
use crate::config::{ClvConfig, ClvModelFamily};
use crate::data::Dataset;
use crate::error::{EngineError, EngineResult};
use crate::metrics::RegressionMetrics;
use crate::models::decision_tree::TaskType;
use crate::preprocess::StandardScaler;
use crate::stats;

/// Absolute skewness above which the target is log-transformed.
const SKEW_THRESHOLD: f64 = 2.0;

/// Named value tiers, lowest quartile first.
const VALUE_TIERS: [&str; 4] = ["Bronze", "Silver", "Gold", "Platinum"];

/// How the target was transformed during fit.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TargetTransform {
    Identity,
    /// log(y + shift), inverted as exp(p) - shift.
    Log { shift: f64 },
}

impl TargetTransform {
    fn apply(&self, y: f64) -> f64 {
        match self {
            TargetTransform::Identity => y,
            TargetTransform::Log { shift } => (y + shift).ln(),
        }
    }

    fn invert(&self, p: f64) -> f64 {
        match self {
            TargetTransform::Identity => p,
            TargetTransform::Log { shift } => p.exp() - shift,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClvTrainingReport {
    pub metrics: RegressionMetrics,
    /// (feature, importance) sorted descending; empty for the linear family.
    pub feature_ranking: Vec<(String, f64)>,
    pub train_samples: usize,
    pub test_samples: usize,
    /// True when the skewed target was fitted in log space.
    pub log_transformed: bool,
    pub target_skewness: f64,
}

/// Predicted value with its batch-relative tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClvPrediction {
    pub customer_id: String,
    pub predicted_clv: f64,
    /// Percentile rank of the prediction within the batch.
    pub percentile_rank: f64,
    pub value_tier: String,
}

/// Revenue concentration over predicted values.
#[derive(Debug, Clone, Serialize)]
pub struct ParetoSummary {
    /// Fraction of customers treated as the top.
    pub top_fraction: f64,
    /// Revenue share held by that top fraction.
    pub top_revenue_share: f64,
    /// Smallest customer fraction whose revenue reaches the target share.
    pub fraction_for_target: f64,
    pub revenue_target: f64,
}

/// Distribution cut points of the predictions.
#[derive(Debug, Clone, Serialize)]
pub struct ClvDistribution {
    pub mean: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub total: f64,
}

enum FittedModel {
    Forest(RandomForest),
    Linear {
        scaler: StandardScaler,
        model: LinearRegression,
    },
}

pub struct ClvRegressor {
    config: ClvConfig,
    model: Option<FittedModel>,
    transform: TargetTransform,
}

impl ClvRegressor {
    pub fn new(config: ClvConfig) -> Self {
        Self {
            config,
            model: None,
            transform: TargetTransform::Identity,
        }
    }

    /// Train on a labeled dataset, evaluating on a held-out split in the
    /// original currency units.
    pub fn train(&mut self, dataset: &Dataset) -> EngineResult<ClvTrainingReport> {
        if dataset.n_samples() == 0 {
            return Err(EngineError::EmptyInput);
        }
        if dataset.n_samples() < 10 {
            return Err(EngineError::InsufficientSamples {
                needed: 10,
                got: dataset.n_samples(),
            });
        }

        let target_skewness = stats::skewness(&dataset.labels);
        self.transform = if target_skewness.abs() > SKEW_THRESHOLD {
            let min = dataset.labels.iter().copied().fold(f64::INFINITY, f64::min);
            let shift = (-min).max(0.0) + 1.0;
            info!(target_skewness, shift, "fitting target in log space");
            TargetTransform::Log { shift }
        } else {
            TargetTransform::Identity
        };

        let mut working = dataset.clone();
        for label in working.labels.iter_mut() {
            *label = self.transform.apply(*label);
        }
        let split = working.random_split(self.config.test_size, self.config.seed);

        let feature_ranking = match self.config.family {
            ClvModelFamily::RandomForest => {
                let mut forest = RandomForest::new(ForestConfig {
                    n_trees: self.config.rf_n_trees,
                    max_depth: self.config.rf_max_depth,
                    seed: self.config.seed,
                    task: TaskType::Regression,
                    ..ForestConfig::default()
                });
                forest.fit(&split.train);
                let ranking = forest
                    .feature_importance_ranking()
                    .into_iter()
                    .map(|(name, score)| (name.to_string(), score))
                    .collect();
                self.model = Some(FittedModel::Forest(forest));
                ranking
            }
            ClvModelFamily::Linear => {
                let mut scaler = StandardScaler::new();
                let scaled = scaler.fit_transform(&split.train)?;
                let mut model = LinearRegression::new(
                    self.config.lin_learning_rate,
                    self.config.lin_max_iter,
                );
                model.fit(&scaled.features_array(), &scaled.labels_array())?;
                self.model = Some(FittedModel::Linear { scaler, model });
                Vec::new()
            }
        };

        // Evaluate in original units so the metrics stay interpretable.
        let predictions = self.predict_values(&split.test)?;
        let y_true: Vec<f64> = split
            .test
            .labels
            .iter()
            .map(|&y| self.transform.invert(y))
            .collect();
        let metrics = RegressionMetrics::compute(&y_true, &predictions);

        Ok(ClvTrainingReport {
            metrics,
            feature_ranking,
            train_samples: split.train.n_samples(),
            test_samples: split.test.n_samples(),
            log_transformed: matches!(self.transform, TargetTransform::Log { .. }),
            target_skewness,
        })
    }

    /// Predicted values in currency units, clipped at zero.
    pub fn predict_values(&self, dataset: &Dataset) -> EngineResult<Vec<f64>> {
        let raw: Vec<f64> = match self.model.as_ref().ok_or(EngineError::NotFitted)? {
            FittedModel::Forest(forest) => forest.predict(dataset),
            FittedModel::Linear { scaler, model } => {
                let scaled = scaler.transform(dataset)?;
                model.predict(&scaled.features_array())?.to_vec()
            }
        };
        Ok(raw
            .into_iter()
            .map(|p| self.transform.invert(p).max(0.0))
            .collect())
    }

    /// Score customers and assign batch-relative quartile tiers.
    pub fn predict(&self, dataset: &Dataset) -> EngineResult<Vec<ClvPrediction>> {
        let values = self.predict_values(dataset)?;
        let tiers = stats::quantile_scores(&values, VALUE_TIERS.len(), false);
        let ranks = stats::percentile_ranks(&values);
        Ok(dataset
            .customer_ids
            .iter()
            .enumerate()
            .map(|(i, customer_id)| ClvPrediction {
                customer_id: customer_id.clone(),
                predicted_clv: values[i],
                percentile_rank: ranks[i],
                value_tier: VALUE_TIERS[(tiers[i] as usize).saturating_sub(1).min(3)].to_string(),
            })
            .collect())
    }

    /// Closed-form CLV: average order value times purchase frequency over the
    /// prediction horizon, discounted at the configured annual rate.
    pub fn formula_clv(&self, avg_order_value: f64, frequency: f64, lifespan_months: f64) -> f64 {
        let years = f64::from(self.config.prediction_period_months) / 12.0;
        let base = avg_order_value * frequency * (lifespan_months / 12.0) * years;
        base / (1.0 + self.config.discount_rate)
    }

    /// Revenue concentration of the predicted values.
    pub fn pareto_summary(&self, values: &[f64]) -> ParetoSummary {
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let total: f64 = sorted.iter().sum();

        let top_n = ((sorted.len() as f64 * self.config.pareto_top_fraction).ceil() as usize)
            .max(1)
            .min(sorted.len());
        let top_revenue: f64 = sorted.iter().take(top_n).sum();

        let target = self.config.pareto_revenue_target * total;
        let mut running = 0.0;
        let mut needed = sorted.len();
        for (i, v) in sorted.iter().enumerate() {
            running += v;
            if running >= target {
                needed = i + 1;
                break;
            }
        }

        ParetoSummary {
            top_fraction: self.config.pareto_top_fraction,
            top_revenue_share: stats::safe_divide(top_revenue, total, 0.0),
            fraction_for_target: stats::safe_divide(
                needed as f64,
                sorted.len() as f64,
                0.0,
            ),
            revenue_target: self.config.pareto_revenue_target,
        }
    }

    pub fn distribution(&self, values: &[f64]) -> ClvDistribution {
        ClvDistribution {
            mean: stats::mean(values),
            p25: stats::quantile(values, 0.25),
            median: stats::quantile(values, 0.5),
            p75: stats::quantile(values, 0.75),
            p90: stats::quantile(values, 0.9),
            total: values.iter().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn clv_dataset(n: usize) -> Dataset {
        let mut ds = Dataset::new(vec![
            "frequency".to_string(),
            "avg_order_value".to_string(),
        ]);
        for i in 0..n {
            let frequency = 1.0 + (i % 10) as f64;
            let aov = 20.0 + (i % 7) as f64 * 5.0;
            // Value grows with both drivers, plus a small wiggle.
            let value = frequency * aov + (i % 3) as f64;
            ds.add_sample(format!("C{i}"), vec![frequency, aov], value);
        }
        ds
    }

    fn test_config() -> ClvConfig {
        ClvConfig {
            rf_n_trees: 25,
            rf_max_depth: 8,
            ..ClvConfig::default()
        }
    }

    #[test]
    fn test_forest_learns_value_drivers() {
        let ds = clv_dataset(60);
        let mut reg = ClvRegressor::new(test_config());
        let report = reg.train(&ds).unwrap();
        assert!(report.metrics.r2 > 0.7);
        assert!(!report.log_transformed);
    }

    #[test]
    fn test_skewed_target_goes_through_log() {
        let mut ds = Dataset::new(vec!["frequency".to_string()]);
        for i in 0..40 {
            // A long right tail forces the log path.
            let value = if i < 36 { 10.0 + i as f64 } else { 50_000.0 };
            ds.add_sample(format!("C{i}"), vec![i as f64], value);
        }
        let mut reg = ClvRegressor::new(test_config());
        let report = reg.train(&ds).unwrap();
        assert!(report.log_transformed);
        assert!(report.target_skewness.abs() > 2.0);

        let values = reg.predict_values(&ds).unwrap();
        assert!(values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_predictions_carry_quartile_tiers() {
        let ds = clv_dataset(60);
        let mut reg = ClvRegressor::new(test_config());
        reg.train(&ds).unwrap();
        let predictions = reg.predict(&ds).unwrap();
        assert_eq!(predictions.len(), 60);
        assert!(predictions.iter().any(|p| p.value_tier == "Platinum"));
        assert!(predictions.iter().any(|p| p.value_tier == "Bronze"));
    }

    #[test]
    fn test_formula_clv_discounts() {
        let reg = ClvRegressor::new(test_config());
        // 50 AOV, 4 purchases, 12 month lifespan over a 12 month horizon.
        let clv = reg.formula_clv(50.0, 4.0, 12.0);
        assert_relative_eq!(clv, 200.0 / 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_pareto_share_grows_with_concentration() {
        let reg = ClvRegressor::new(test_config());
        let uniform = vec![100.0; 20];
        let power_law: Vec<f64> = (1..=20).map(|i: i32| 1000.0 / (i * i) as f64).collect();

        let u = reg.pareto_summary(&uniform);
        let p = reg.pareto_summary(&power_law);
        assert_relative_eq!(u.top_revenue_share, 0.2, epsilon = 1e-9);
        assert!(p.top_revenue_share > u.top_revenue_share);
    }

    #[test]
    fn test_pareto_concentration() {
        let reg = ClvRegressor::new(test_config());
        // One whale and nine small customers.
        let mut values = vec![10.0; 9];
        values.push(1000.0);
        let pareto = reg.pareto_summary(&values);
        assert!(pareto.top_revenue_share > 0.9);
        assert_relative_eq!(pareto.fraction_for_target, 0.1, epsilon = 1e-9);
    }
}
