//! Feature standardization
//!
//! StandardScaler fitted once on training data; the same parameters are
//! reused for every later transform so train and score stay comparable.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Dataset;
use crate::error::{EngineError, EngineResult};

/// Z-score scaler. Constant columns pass through unscaled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
    feature_names: Vec<String>,
    fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn fit(&mut self, dataset: &Dataset) -> EngineResult<()> {
        if dataset.n_samples() == 0 {
            return Err(EngineError::EmptyInput);
        }
        let n = dataset.n_samples() as f64;
        self.feature_names = dataset.feature_names.clone();
        self.means.clear();
        self.stds.clear();

        for j in 0..dataset.n_features() {
            let values = dataset.column(j);
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            self.means.push(mean);
            self.stds.push(var.sqrt());
        }
        self.fitted = true;
        debug!(features = self.feature_names.len(), "scaler fitted");
        Ok(())
    }

    pub fn transform(&self, dataset: &Dataset) -> EngineResult<Dataset> {
        if !self.fitted {
            return Err(EngineError::NotFitted);
        }
        if dataset.n_features() != self.means.len() {
            return Err(EngineError::DimensionMismatch {
                expected: self.means.len(),
                got: dataset.n_features(),
            });
        }
        let mut out = dataset.clone();
        for row in out.features.iter_mut() {
            for j in 0..row.len() {
                if self.stds[j] > 1e-10 {
                    row[j] = (row[j] - self.means[j]) / self.stds[j];
                } else {
                    row[j] -= self.means[j];
                }
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, dataset: &Dataset) -> EngineResult<Dataset> {
        self.fit(dataset)?;
        self.transform(dataset)
    }

    pub fn inverse_transform(&self, dataset: &Dataset) -> EngineResult<Dataset> {
        if !self.fitted {
            return Err(EngineError::NotFitted);
        }
        if dataset.n_features() != self.means.len() {
            return Err(EngineError::DimensionMismatch {
                expected: self.means.len(),
                got: dataset.n_features(),
            });
        }
        let mut out = dataset.clone();
        for row in out.features.iter_mut() {
            for j in 0..row.len() {
                if self.stds[j] > 1e-10 {
                    row[j] = row[j] * self.stds[j] + self.means[j];
                } else {
                    row[j] += self.means[j];
                }
            }
        }
        Ok(out)
    }

    /// Per-feature (mean, std) pairs.
    pub fn params(&self) -> impl Iterator<Item = (&str, f64, f64)> {
        self.feature_names
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(name, (&mean, &std))| (name.as_str(), mean, std))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[[f64; 2]]) -> Dataset {
        let mut ds = Dataset::new(vec!["a".to_string(), "b".to_string()]);
        for (i, row) in rows.iter().enumerate() {
            ds.add_sample(format!("C{i}"), row.to_vec(), 0.0);
        }
        ds
    }

    #[test]
    fn test_fit_transform_centers_and_scales() {
        let ds = dataset(&[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&ds).unwrap();

        let col = scaled.column(0);
        let mean: f64 = col.iter().sum::<f64>() / col.len() as f64;
        assert!(mean.abs() < 1e-12);
        // Population std of the scaled column is 1
        let var: f64 = col.iter().map(|v| v * v).sum::<f64>() / col.len() as f64;
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_requires_fit() {
        let ds = dataset(&[[1.0, 2.0]]);
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&ds),
            Err(EngineError::NotFitted)
        ));
    }

    #[test]
    fn test_round_trip() {
        let ds = dataset(&[[1.0, -5.0], [4.0, 0.0], [7.0, 5.0]]);
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&ds).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (orig, back) in ds.features.iter().zip(restored.features.iter()) {
            for (a, b) in orig.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_constant_column_passes_through() {
        let ds = dataset(&[[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]]);
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&ds).unwrap();
        // Centered but not divided by a zero std
        assert!(scaled.column(0).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let ds = dataset(&[[1.0, 2.0], [3.0, 4.0]]);
        let mut scaler = StandardScaler::new();
        scaler.fit(&ds).unwrap();

        let mut other = Dataset::new(vec!["a".to_string()]);
        other.add_sample("C0".to_string(), vec![1.0], 0.0);
        assert!(matches!(
            scaler.transform(&other),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }
}
