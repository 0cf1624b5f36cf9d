//! Engine configuration
//!
//! Every tunable of the pipeline is an explicit structured input: quantile
//! count, the ordered segment rule table, clustering algorithm and cluster
//! count, churn/CLV model families, and the reference date for recency.
//! Defaults reproduce the shipped business parameters.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::segmentation::SegmentRule;

/// Clustering algorithm choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    KMeans,
    Dbscan,
}

/// Churn classifier family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnModelFamily {
    RandomForest,
    Logistic,
}

/// Metric maximized by the decision-threshold search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    F1,
    Precision,
    Recall,
    Accuracy,
}

/// CLV regressor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClvModelFamily {
    Linear,
    RandomForest,
}

/// Customer clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub algorithm: ClusterAlgorithm,
    /// Number of clusters for k-means (3 named value tiers by default).
    pub n_clusters: usize,
    pub max_iter: usize,
    /// Independent seeded restarts; the best inertia wins.
    pub n_init: usize,
    /// DBSCAN neighborhood radius (on standardized features).
    pub eps: f64,
    /// DBSCAN minimum neighborhood size.
    pub min_samples: usize,
    pub seed: u64,
    /// Features used for clustering, by name.
    pub features: Vec<String>,
    /// Feature whose per-cluster mean orders the semantic labels.
    pub order_by: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: ClusterAlgorithm::KMeans,
            n_clusters: 3,
            max_iter: 300,
            n_init: 10,
            eps: 0.5,
            min_samples: 5,
            seed: 42,
            features: vec![
                "recency".to_string(),
                "frequency".to_string(),
                "monetary".to_string(),
                "avg_order_value".to_string(),
                "purchase_consistency".to_string(),
            ],
            order_by: "monetary".to_string(),
        }
    }
}

/// Churn prediction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnConfig {
    pub family: ChurnModelFamily,
    /// Weight classes inversely to their frequency during training.
    pub use_class_weight: bool,
    /// Fraction of customers held out for evaluation.
    pub test_size: f64,
    pub seed: u64,
    /// Days since last purchase after which a customer counts as churned
    /// when no explicit labels are provided.
    pub churn_threshold_days: i64,
    /// Probability above which the default decision labels a customer churned.
    pub decision_threshold: f64,
    /// Metric the threshold search maximizes.
    pub threshold_metric: ThresholdMetric,
    pub rf_n_trees: usize,
    pub rf_max_depth: usize,
    pub rf_min_samples_split: usize,
    pub rf_min_samples_leaf: usize,
    pub lr_learning_rate: f64,
    pub lr_max_iter: usize,
    pub features: Vec<String>,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            family: ChurnModelFamily::RandomForest,
            use_class_weight: true,
            test_size: 0.2,
            seed: 42,
            churn_threshold_days: 90,
            decision_threshold: 0.5,
            threshold_metric: ThresholdMetric::F1,
            rf_n_trees: 100,
            rf_max_depth: 10,
            rf_min_samples_split: 5,
            rf_min_samples_leaf: 2,
            lr_learning_rate: 0.05,
            lr_max_iter: 1000,
            features: vec![
                "recency".to_string(),
                "frequency".to_string(),
                "monetary".to_string(),
                "avg_days_between_purchases".to_string(),
                "purchase_consistency".to_string(),
                "customer_tenure_days".to_string(),
                "engagement_score".to_string(),
                "spending_volatility".to_string(),
            ],
        }
    }
}

/// CLV prediction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClvConfig {
    pub family: ClvModelFamily,
    pub test_size: f64,
    pub seed: u64,
    pub rf_n_trees: usize,
    pub rf_max_depth: usize,
    pub lin_learning_rate: f64,
    pub lin_max_iter: usize,
    /// Horizon for the simple formula CLV, in months.
    pub prediction_period_months: u32,
    /// Annual discount rate applied to the simple formula CLV.
    pub discount_rate: f64,
    /// Customer fraction treated as the "top" in Pareto analysis.
    pub pareto_top_fraction: f64,
    /// Revenue share the Pareto analysis solves the customer fraction for.
    pub pareto_revenue_target: f64,
    pub features: Vec<String>,
}

impl Default for ClvConfig {
    fn default() -> Self {
        Self {
            family: ClvModelFamily::RandomForest,
            test_size: 0.2,
            seed: 42,
            rf_n_trees: 100,
            rf_max_depth: 15,
            lin_learning_rate: 0.05,
            lin_max_iter: 2000,
            prediction_period_months: 12,
            discount_rate: 0.1,
            pareto_top_fraction: 0.2,
            pareto_revenue_target: 0.8,
            features: vec![
                "recency".to_string(),
                "frequency".to_string(),
                "avg_order_value".to_string(),
                "purchase_consistency".to_string(),
                "customer_tenure_days".to_string(),
                "purchase_velocity".to_string(),
            ],
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reference date for recency; defaults to the latest transaction date
    /// in the input when absent.
    pub reference_date: Option<NaiveDate>,
    /// Quantile count for RFM scoring (quintiles by default).
    pub n_quantiles: usize,
    /// Ordered segment rules; first match wins.
    pub segment_rules: Vec<SegmentRule>,
    pub clustering: ClusteringConfig,
    pub churn: ChurnConfig,
    pub clv: ClvConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_date: None,
            n_quantiles: 5,
            segment_rules: SegmentRule::default_rules(),
            clustering: ClusteringConfig::default(),
            churn: ChurnConfig::default(),
            clv: ClvConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("failed to parse engine config")
    }

    /// Basic sanity checks on user-supplied values.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.n_quantiles < 2 {
            return Err(crate::error::EngineError::InvalidConfig(
                "n_quantiles must be at least 2".to_string(),
            ));
        }
        if self.clustering.n_clusters < 2 {
            return Err(crate::error::EngineError::InvalidConfig(
                "n_clusters must be at least 2".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.churn.test_size) || !(0.0..1.0).contains(&self.clv.test_size)
        {
            return Err(crate::error::EngineError::InvalidConfig(
                "test_size must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_quantiles, 5);
        assert_eq!(config.segment_rules.len(), 10);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clustering.n_clusters, 3);
        assert_eq!(back.churn.churn_threshold_days, 90);
    }

    #[test]
    fn test_invalid_quantiles_rejected() {
        let config = EngineConfig {
            n_quantiles: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
