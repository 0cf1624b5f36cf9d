//! Preprocessing: outlier handling, scaling and feature selection

mod outliers;
mod scaler;
mod select;

pub use outliers::{ClipMethod, OutlierAudit, OutlierHandler};
pub use scaler::StandardScaler;
pub use select::{
    select_by_correlation, select_by_list, select_by_variance, DEFAULT_CORRELATION_THRESHOLD,
    DEFAULT_VARIANCE_THRESHOLD,
};
