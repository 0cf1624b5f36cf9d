//! Churn classification
//!
//! Predicts which customers are about to stop buying. Labels come from
//! recency against a configurable cutoff, with a synthetic fallback when the
//! data yields a single class. Training tunes the decision threshold over an
//! F1 grid and reports the full curve alongside the held-out metrics.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::logistic::LogisticRegression;
use super::random_forest::{ForestConfig, RandomForest};
use crate::config::{ChurnConfig, ChurnModelFamily, ThresholdMetric};
use crate::data::Dataset;
use crate::error::{EngineError, EngineResult};
use crate::metrics::ClassificationMetrics;
use crate::models::decision_tree::TaskType;
use crate::preprocess::StandardScaler;
use crate::stats;

/// Threshold grid swept during training.
const THRESHOLD_START: f64 = 0.10;
const THRESHOLD_STEP: f64 = 0.05;
const THRESHOLD_STEPS: usize = 16;

/// Probability cut points for the fixed risk buckets.
const RISK_BOUNDS: [f64; 3] = [0.3, 0.5, 0.7];
const RISK_BUCKETS: [&str; 4] = ["Low", "Medium", "High", "Critical"];

/// Recency percentile used to fabricate labels when only one class exists.
const SYNTHETIC_LABEL_PERCENTILE: f64 = 0.8;

/// One point of the threshold sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Everything the training run learned about itself.
#[derive(Debug, Clone, Serialize)]
pub struct ChurnTrainingReport {
    pub metrics: ClassificationMetrics,
    pub decision_threshold: f64,
    pub threshold_curve: Vec<ThresholdPoint>,
    /// (feature, importance) sorted descending.
    pub feature_ranking: Vec<(String, f64)>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub churn_rate: f64,
    /// True when labels had to be fabricated from the recency tail.
    pub synthetic_labels: bool,
}

impl ChurnTrainingReport {
    /// Top-k churn drivers as readable lines, strongest first. Ordering is
    /// deterministic because the ranking is.
    pub fn top_insights(&self, k: usize) -> Vec<String> {
        self.feature_ranking
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, (feature, importance))| {
                format!(
                    "#{rank} churn driver: {feature} (importance {importance:.3})",
                    rank = i + 1
                )
            })
            .collect()
    }
}

/// Scored customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnPrediction {
    pub customer_id: String,
    pub churn_probability: f64,
    pub churned: bool,
    pub risk_bucket: String,
}

enum FittedModel {
    Forest(RandomForest),
    Logistic {
        scaler: StandardScaler,
        model: LogisticRegression,
    },
}

pub struct ChurnClassifier {
    config: ChurnConfig,
    model: Option<FittedModel>,
    decision_threshold: f64,
}

/// Map a churn probability onto the fixed risk buckets.
pub fn risk_bucket(probability: f64) -> &'static str {
    for (i, &bound) in RISK_BOUNDS.iter().enumerate() {
        if probability < bound {
            return RISK_BUCKETS[i];
        }
    }
    RISK_BUCKETS[3]
}

/// Label customers churned when recency exceeds the cutoff. Returns the
/// number of positives.
pub fn label_by_recency(dataset: &mut Dataset, threshold_days: f64) -> EngineResult<usize> {
    let idx = dataset.feature_index("recency")?;
    let mut positives = 0;
    for i in 0..dataset.n_samples() {
        let churned = dataset.features[i][idx] > threshold_days;
        dataset.labels[i] = if churned { 1.0 } else { 0.0 };
        positives += churned as usize;
    }
    Ok(positives)
}

impl ChurnClassifier {
    pub fn new(config: ChurnConfig) -> Self {
        let decision_threshold = config.decision_threshold;
        Self {
            config,
            model: None,
            decision_threshold,
        }
    }

    /// Train on a labeled dataset and evaluate on a held-out split.
    pub fn train(&mut self, dataset: &Dataset) -> EngineResult<ChurnTrainingReport> {
        if dataset.n_samples() == 0 {
            return Err(EngineError::EmptyInput);
        }
        if dataset.n_samples() < 10 {
            return Err(EngineError::InsufficientSamples {
                needed: 10,
                got: dataset.n_samples(),
            });
        }

        let mut working = dataset.clone();
        let synthetic_labels = self.ensure_two_classes(&mut working)?;

        let split = working.random_split(self.config.test_size, self.config.seed);
        let churn_rate =
            working.labels.iter().sum::<f64>() / working.n_samples() as f64;
        info!(
            train = split.train.n_samples(),
            test = split.test.n_samples(),
            churn_rate,
            "training churn classifier"
        );

        let weights = self.sample_weights(&split.train);
        let feature_ranking = match self.config.family {
            ChurnModelFamily::RandomForest => {
                let mut forest = RandomForest::new(ForestConfig {
                    n_trees: self.config.rf_n_trees,
                    max_depth: self.config.rf_max_depth,
                    min_samples_split: self.config.rf_min_samples_split,
                    min_samples_leaf: self.config.rf_min_samples_leaf,
                    seed: self.config.seed,
                    task: TaskType::Classification,
                    ..ForestConfig::default()
                });
                forest.fit_weighted(&split.train, &weights);
                let ranking = forest
                    .feature_importance_ranking()
                    .into_iter()
                    .map(|(name, score)| (name.to_string(), score))
                    .collect();
                self.model = Some(FittedModel::Forest(forest));
                ranking
            }
            ChurnModelFamily::Logistic => {
                let mut scaler = StandardScaler::new();
                let scaled = scaler.fit_transform(&split.train)?;
                let mut model = LogisticRegression::new(
                    self.config.lr_learning_rate,
                    self.config.lr_max_iter,
                );
                model.fit_weighted(
                    &scaled.features_array(),
                    &scaled.labels_array(),
                    &Array1::from_vec(weights),
                )?;
                let ranking = coefficient_ranking(&model, &split.train.feature_names)?;
                self.model = Some(FittedModel::Logistic { scaler, model });
                ranking
            }
        };

        let test_proba = self.predict_proba(&split.test)?;
        let (threshold_curve, best) =
            tune_threshold(&split.test.labels, &test_proba, self.config.threshold_metric);
        self.decision_threshold = best;

        let test_pred: Vec<f64> = test_proba
            .iter()
            .map(|&p| if p >= best { 1.0 } else { 0.0 })
            .collect();
        let metrics = ClassificationMetrics::compute(&split.test.labels, &test_pred, &test_proba);

        Ok(ChurnTrainingReport {
            metrics,
            decision_threshold: best,
            threshold_curve,
            feature_ranking,
            train_samples: split.train.n_samples(),
            test_samples: split.test.n_samples(),
            churn_rate,
            synthetic_labels,
        })
    }

    /// Churn probabilities for every row.
    pub fn predict_proba(&self, dataset: &Dataset) -> EngineResult<Vec<f64>> {
        match self.model.as_ref().ok_or(EngineError::NotFitted)? {
            FittedModel::Forest(forest) => Ok(forest.predict_proba(dataset)),
            FittedModel::Logistic { scaler, model } => {
                let scaled = scaler.transform(dataset)?;
                Ok(model.predict_proba(&scaled.features_array())?.to_vec())
            }
        }
    }

    /// Score customers against the tuned threshold.
    pub fn predict(&self, dataset: &Dataset) -> EngineResult<Vec<ChurnPrediction>> {
        let probabilities = self.predict_proba(dataset)?;
        Ok(dataset
            .customer_ids
            .iter()
            .zip(probabilities.iter())
            .map(|(customer_id, &p)| ChurnPrediction {
                customer_id: customer_id.clone(),
                churn_probability: p,
                churned: p >= self.decision_threshold,
                risk_bucket: risk_bucket(p).to_string(),
            })
            .collect())
    }

    /// Customers at or past the 0.7 cut, most likely to churn first.
    pub fn high_risk<'a>(
        &self,
        predictions: &'a [ChurnPrediction],
    ) -> Vec<&'a ChurnPrediction> {
        let mut risky: Vec<&ChurnPrediction> = predictions
            .iter()
            .filter(|p| p.churn_probability >= RISK_BOUNDS[2])
            .collect();
        risky.sort_by(|a, b| {
            b.churn_probability
                .partial_cmp(&a.churn_probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        risky
    }

    pub fn decision_threshold(&self) -> f64 {
        self.decision_threshold
    }

    /// Balanced class weights, or uniform when disabled.
    fn sample_weights(&self, dataset: &Dataset) -> Vec<f64> {
        let n = dataset.n_samples() as f64;
        if !self.config.use_class_weight {
            return vec![1.0; dataset.n_samples()];
        }
        let positives = dataset.labels.iter().filter(|&&l| l >= 0.5).count() as f64;
        let negatives = n - positives;
        if positives == 0.0 || negatives == 0.0 {
            return vec![1.0; dataset.n_samples()];
        }
        dataset
            .labels
            .iter()
            .map(|&l| {
                if l >= 0.5 {
                    n / (2.0 * positives)
                } else {
                    n / (2.0 * negatives)
                }
            })
            .collect()
    }

    /// Relabel from the recency tail when the labels collapse to one class.
    /// Returns true when synthetic labels were used.
    fn ensure_two_classes(&self, dataset: &mut Dataset) -> EngineResult<bool> {
        let positives = dataset.labels.iter().filter(|&&l| l >= 0.5).count();
        if positives > 0 && positives < dataset.n_samples() {
            return Ok(false);
        }

        let idx = dataset.feature_index("recency")?;
        let recency = dataset.column(idx);
        let cutoff = stats::quantile(&recency, SYNTHETIC_LABEL_PERCENTILE);
        warn!(
            cutoff,
            "labels collapsed to one class, falling back to recency tail"
        );
        for i in 0..dataset.n_samples() {
            dataset.labels[i] = if dataset.features[i][idx] > cutoff {
                1.0
            } else {
                0.0
            };
        }
        Ok(true)
    }
}

/// Sweep the threshold grid; returns the full curve and the threshold
/// maximizing the chosen metric.
fn tune_threshold(
    y_true: &[f64],
    y_proba: &[f64],
    metric: ThresholdMetric,
) -> (Vec<ThresholdPoint>, f64) {
    let mut curve = Vec::with_capacity(THRESHOLD_STEPS);
    let mut best = (THRESHOLD_START, f64::NEG_INFINITY);

    for step in 0..THRESHOLD_STEPS {
        let threshold = THRESHOLD_START + THRESHOLD_STEP * step as f64;
        let y_pred: Vec<f64> = y_proba
            .iter()
            .map(|&p| if p >= threshold { 1.0 } else { 0.0 })
            .collect();
        let cm = crate::metrics::ConfusionMatrix::from_labels(y_true, &y_pred);
        let score = match metric {
            ThresholdMetric::F1 => cm.f1(),
            ThresholdMetric::Precision => cm.precision(),
            ThresholdMetric::Recall => cm.recall(),
            ThresholdMetric::Accuracy => cm.accuracy(),
        };
        if score > best.1 {
            best = (threshold, score);
        }
        curve.push(ThresholdPoint {
            threshold,
            precision: cm.precision(),
            recall: cm.recall(),
            f1: cm.f1(),
        });
    }
    (curve, best.0)
}

fn coefficient_ranking(
    model: &LogisticRegression,
    feature_names: &[String],
) -> EngineResult<Vec<(String, f64)>> {
    let coefficients = model.coefficients.as_ref().ok_or(EngineError::NotFitted)?;
    let mut ranking: Vec<(String, f64)> = feature_names
        .iter()
        .zip(coefficients.iter())
        .map(|(name, &c)| (name.clone(), c.abs()))
        .collect();
    ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranking)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn churn_dataset(n_per_class: usize) -> Dataset {
        let mut ds = Dataset::new(vec!["recency".to_string(), "frequency".to_string()]);
        for i in 0..n_per_class {
            let j = i as f64;
            ds.add_sample(format!("A{i}"), vec![10.0 + j, 12.0 - j * 0.1], 0.0);
            ds.add_sample(format!("C{i}"), vec![150.0 + j * 2.0, 1.0 + j * 0.05], 1.0);
        }
        ds
    }

    fn test_config() -> ChurnConfig {
        ChurnConfig {
            rf_n_trees: 25,
            rf_max_depth: 5,
            ..ChurnConfig::default()
        }
    }

    #[test]
    fn test_forest_separates_clear_classes() {
        let ds = churn_dataset(30);
        let mut clf = ChurnClassifier::new(test_config());
        let report = clf.train(&ds).unwrap();

        assert!(report.metrics.accuracy > 0.8);
        assert!(!report.synthetic_labels);
        assert_eq!(report.threshold_curve.len(), 16);
        assert!(!report.feature_ranking.is_empty());
        let insights = report.top_insights(1);
        assert!(insights[0].starts_with("#1 churn driver:"));
    }

    #[test]
    fn test_logistic_family() {
        let ds = churn_dataset(30);
        let mut clf = ChurnClassifier::new(ChurnConfig {
            family: ChurnModelFamily::Logistic,
            ..test_config()
        });
        let report = clf.train(&ds).unwrap();
        assert!(report.metrics.roc_auc > 0.8);
        assert_eq!(report.feature_ranking.len(), 2);
    }

    #[test]
    fn test_synthetic_fallback_on_single_class() {
        let mut ds = Dataset::new(vec!["recency".to_string(), "frequency".to_string()]);
        for i in 0..30 {
            ds.add_sample(format!("C{i}"), vec![i as f64 * 10.0, 2.0], 0.0);
        }
        let mut clf = ChurnClassifier::new(test_config());
        let report = clf.train(&ds).unwrap();
        assert!(report.synthetic_labels);
        assert!(report.churn_rate > 0.0 && report.churn_rate < 1.0);
    }

    #[test]
    fn test_risk_buckets() {
        assert_eq!(risk_bucket(0.1), "Low");
        assert_eq!(risk_bucket(0.3), "Medium");
        assert_eq!(risk_bucket(0.55), "High");
        assert_eq!(risk_bucket(0.9), "Critical");
    }

    #[test]
    fn test_label_by_recency() {
        let mut ds = churn_dataset(5);
        let positives = label_by_recency(&mut ds, 90.0).unwrap();
        assert_eq!(positives, 5);
    }

    #[test]
    fn test_high_risk_cuts_at_critical_boundary() {
        let predictions = vec![
            ChurnPrediction {
                customer_id: "a".to_string(),
                churn_probability: 0.6,
                churned: true,
                risk_bucket: "High".to_string(),
            },
            ChurnPrediction {
                customer_id: "b".to_string(),
                churn_probability: 0.7,
                churned: true,
                risk_bucket: "Critical".to_string(),
            },
            ChurnPrediction {
                customer_id: "c".to_string(),
                churn_probability: 0.8,
                churned: true,
                risk_bucket: "Critical".to_string(),
            },
        ];
        let clf = ChurnClassifier::new(test_config());
        let risky = clf.high_risk(&predictions);
        // 0.6 sits below the 0.7 cut and stays off the list.
        assert_eq!(risky.len(), 2);
        assert_eq!(risky[0].customer_id, "c");
        assert_eq!(risky[1].customer_id, "b");
    }
}
