//! Model evaluation metrics

mod classification;
mod regression;

pub use classification::{roc_auc, ClassificationMetrics, ConfusionMatrix};
pub use regression::{mae, mse, r2, safe_mape, RegressionMetrics, MAPE_CAP};
