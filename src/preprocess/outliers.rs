//! Outlier handling and skew correction
//!
//! Every operation returns a transformed copy of the dataset and records a
//! per-column audit entry (bounds, modified count) for the run report.

use serde::Serialize;
use tracing::{debug, info};

use crate::data::Dataset;
use crate::stats;

/// Clip strategy for `auto_handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipMethod {
    Iqr,
    Percentile,
    Winsorize,
}

/// Audit entry for one handled column.
#[derive(Debug, Clone, Serialize)]
pub struct OutlierAudit {
    pub feature: String,
    pub method: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub modified: usize,
    pub transformation: Option<String>,
}

/// Stateful handler accumulating audit entries across operations.
#[derive(Debug, Default)]
pub struct OutlierHandler {
    audits: Vec<OutlierAudit>,
}

impl OutlierHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audits(&self) -> &[OutlierAudit] {
        &self.audits
    }

    /// Clip each column to [Q1 - k*IQR, Q3 + k*IQR].
    pub fn clip_by_iqr(&mut self, dataset: &Dataset, iqr_multiplier: f64) -> Dataset {
        self.clip_with(dataset, "iqr", |values| {
            let q1 = stats::quantile(values, 0.25);
            let q3 = stats::quantile(values, 0.75);
            let iqr = q3 - q1;
            (q1 - iqr_multiplier * iqr, q3 + iqr_multiplier * iqr)
        })
    }

    /// Clip each column to [P{lower}, P{upper}].
    pub fn clip_by_percentile(
        &mut self,
        dataset: &Dataset,
        lower_percentile: f64,
        upper_percentile: f64,
    ) -> Dataset {
        self.clip_with(dataset, "percentile", |values| {
            (
                stats::quantile(values, lower_percentile / 100.0),
                stats::quantile(values, upper_percentile / 100.0),
            )
        })
    }

    /// Replace values past each tail limit with the boundary value.
    pub fn winsorize(&mut self, dataset: &Dataset, limits: (f64, f64)) -> Dataset {
        self.clip_with(dataset, "winsorize", |values| {
            (
                stats::quantile(values, limits.0),
                stats::quantile(values, 1.0 - limits.1),
            )
        })
    }

    fn clip_with<F>(&mut self, dataset: &Dataset, method: &str, bounds: F) -> Dataset
    where
        F: Fn(&[f64]) -> (f64, f64),
    {
        let mut out = dataset.clone();
        for j in 0..dataset.n_features() {
            let values = dataset.column(j);
            if values.is_empty() {
                continue;
            }
            let (lower, upper) = bounds(&values);
            let mut modified = 0usize;
            for row in out.features.iter_mut() {
                if row[j] < lower {
                    row[j] = lower;
                    modified += 1;
                } else if row[j] > upper {
                    row[j] = upper;
                    modified += 1;
                }
            }
            if modified > 0 {
                debug!(
                    feature = %dataset.feature_names[j],
                    method,
                    modified,
                    "clipped outliers"
                );
            }
            self.audits.push(OutlierAudit {
                feature: dataset.feature_names[j].clone(),
                method: method.to_string(),
                lower_bound: lower,
                upper_bound: upper,
                modified,
                transformation: None,
            });
        }
        out
    }

    /// Log-transform the named columns with a positivity shift.
    pub fn log_transform(&mut self, dataset: &Dataset, columns: &[String]) -> Dataset {
        let mut out = dataset.clone();
        for name in columns {
            let Some(j) = dataset.feature_names.iter().position(|f| f == name) else {
                continue;
            };
            let values = dataset.column(j);
            let min_val = values.iter().copied().fold(f64::INFINITY, f64::min);
            let shift = if min_val <= 0.0 { min_val.abs() + 1.0 } else { 1.0 };

            for row in out.features.iter_mut() {
                row[j] = (row[j] + shift).ln();
            }
            self.audits.push(OutlierAudit {
                feature: name.clone(),
                method: "log".to_string(),
                lower_bound: f64::NEG_INFINITY,
                upper_bound: f64::INFINITY,
                modified: values.len(),
                transformation: Some(format!("log(x + {shift})")),
            });
        }
        out
    }

    /// Log-transform heavily skewed non-negative columns, then clip the rest.
    pub fn auto_handle(
        &mut self,
        dataset: &Dataset,
        method: ClipMethod,
        skew_threshold: f64,
    ) -> Dataset {
        let skewed: Vec<String> = (0..dataset.n_features())
            .filter(|&j| {
                let values = dataset.column(j);
                let min_val = values.iter().copied().fold(f64::INFINITY, f64::min);
                stats::skewness(&values).abs() > skew_threshold && min_val >= 0.0
            })
            .map(|j| dataset.feature_names[j].clone())
            .collect();

        let transformed = if skewed.is_empty() {
            dataset.clone()
        } else {
            info!(columns = skewed.len(), "log-transforming skewed features");
            self.log_transform(dataset, &skewed)
        };

        match method {
            ClipMethod::Iqr => self.clip_by_iqr(&transformed, 1.5),
            ClipMethod::Percentile => self.clip_by_percentile(&transformed, 1.0, 99.0),
            ClipMethod::Winsorize => self.winsorize(&transformed, (0.05, 0.05)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_with(values: Vec<f64>) -> Dataset {
        let mut ds = Dataset::new(vec!["x".to_string()]);
        for (i, v) in values.into_iter().enumerate() {
            ds.add_sample(format!("C{i}"), vec![v], 0.0);
        }
        ds
    }

    #[test]
    fn test_iqr_clip_caps_extremes() {
        let mut values: Vec<f64> = (1..=9).map(|v| v as f64).collect();
        values.push(1000.0);
        let ds = dataset_with(values);

        let mut handler = OutlierHandler::new();
        let clipped = handler.clip_by_iqr(&ds, 1.5);

        let max = clipped.column(0).into_iter().fold(f64::NEG_INFINITY, f64::max);
        assert!(max < 1000.0);
        assert_eq!(handler.audits().len(), 1);
        assert!(handler.audits()[0].modified >= 1);
    }

    #[test]
    fn test_clean_column_untouched() {
        let ds = dataset_with(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut handler = OutlierHandler::new();
        let clipped = handler.clip_by_iqr(&ds, 1.5);
        assert_eq!(clipped.column(0), ds.column(0));
        assert_eq!(handler.audits()[0].modified, 0);
    }

    #[test]
    fn test_log_transform_shifts_nonpositive() {
        let ds = dataset_with(vec![-5.0, 0.0, 10.0]);
        let mut handler = OutlierHandler::new();
        let transformed = handler.log_transform(&ds, &["x".to_string()]);

        // shift = |-5| + 1 = 6, so the minimum becomes ln(1) = 0
        assert!((transformed.column(0)[0] - 0.0).abs() < 1e-12);
        assert!(transformed.column(0).iter().all(|v| v.is_finite()));
        assert_eq!(
            handler.audits()[0].transformation.as_deref(),
            Some("log(x + 6)")
        );
    }

    #[test]
    fn test_winsorize_counts_modified() {
        let values: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let ds = dataset_with(values);
        let mut handler = OutlierHandler::new();
        let result = handler.winsorize(&ds, (0.05, 0.05));
        let col = result.column(0);
        assert!(col[0] > 0.0 - 1e-12 && col[0] >= 0.0);
        assert!(handler.audits()[0].modified >= 2);
    }

    #[test]
    fn test_auto_handle_targets_skewed_columns() {
        // Heavy right skew, all non-negative
        let mut values = vec![1.0; 20];
        values.push(10000.0);
        let ds = dataset_with(values);

        let mut handler = OutlierHandler::new();
        let _ = handler.auto_handle(&ds, ClipMethod::Iqr, 2.0);
        assert!(handler
            .audits()
            .iter()
            .any(|a| a.method == "log" && a.feature == "x"));
    }
}
