//! Feature selection
//!
//! Variance and correlation filters applied before model fitting. Both
//! return the pruned dataset plus the names that were dropped.

use tracing::info;

use crate::data::Dataset;
use crate::stats;

/// Minimum variance a feature must carry to survive the filter.
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.01;

/// Absolute correlation above which the later feature of a pair is dropped.
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.9;

/// Drop features whose population variance is at or below `threshold`.
pub fn select_by_variance(dataset: &Dataset, threshold: f64) -> (Dataset, Vec<String>) {
    let n = dataset.n_samples() as f64;
    let mut kept = Vec::new();
    let mut removed = Vec::new();

    for j in 0..dataset.n_features() {
        let values = dataset.column(j);
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        if var > threshold {
            kept.push(j);
        } else {
            removed.push(dataset.feature_names[j].clone());
        }
    }
    if !removed.is_empty() {
        info!(removed = removed.len(), "variance filter dropped features");
    }
    (select_columns(dataset, &kept), removed)
}

/// Drop the second feature of every pair with |Pearson r| above `threshold`.
pub fn select_by_correlation(dataset: &Dataset, threshold: f64) -> (Dataset, Vec<String>) {
    let n_features = dataset.n_features();
    let columns: Vec<Vec<f64>> = (0..n_features).map(|j| dataset.column(j)).collect();

    let mut dropped = vec![false; n_features];
    for i in 0..n_features {
        if dropped[i] {
            continue;
        }
        for j in (i + 1)..n_features {
            if dropped[j] {
                continue;
            }
            if pearson(&columns[i], &columns[j]).abs() > threshold {
                dropped[j] = true;
            }
        }
    }

    let kept: Vec<usize> = (0..n_features).filter(|&j| !dropped[j]).collect();
    let removed: Vec<String> = (0..n_features)
        .filter(|&j| dropped[j])
        .map(|j| dataset.feature_names[j].clone())
        .collect();
    if !removed.is_empty() {
        info!(removed = removed.len(), "correlation filter dropped features");
    }
    (select_columns(dataset, &kept), removed)
}

/// Keep only the named features, in the order given.
pub fn select_by_list(dataset: &Dataset, names: &[String]) -> Dataset {
    let indices: Vec<usize> = names
        .iter()
        .filter_map(|name| dataset.feature_names.iter().position(|f| f == name))
        .collect();
    select_columns(dataset, &indices)
}

fn select_columns(dataset: &Dataset, indices: &[usize]) -> Dataset {
    Dataset {
        features: dataset
            .features
            .iter()
            .map(|row| indices.iter().map(|&j| row[j]).collect())
            .collect(),
        labels: dataset.labels.clone(),
        feature_names: indices
            .iter()
            .map(|&j| dataset.feature_names[j].clone())
            .collect(),
        customer_ids: dataset.customer_ids.clone(),
    }
}

/// Pearson correlation; 0 when either column is constant.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_a = stats::mean(a);
    let mean_b = stats::mean(b);
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < 1e-20 || var_b < 1e-20 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
