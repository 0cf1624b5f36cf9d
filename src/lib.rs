//! # Customer Value Analytics Engine
//!
//! Turns raw transaction logs into per-customer value intelligence: RFM
//! scores and segments, behavioral and temporal features, value-ranked
//! clusters, churn risk and predicted lifetime value.
//!
//! ## Modules
//!
//! - `data` - Transaction loading and model datasets
//! - `features` - RFM, behavioral and temporal feature extraction
//! - `segmentation` - Rule-based RFM segments
//! - `preprocess` - Scaling, outlier handling and feature selection
//! - `models` - Clustering, churn classification and CLV regression
//! - `metrics` - Classification and regression evaluation
//! - `pipeline` - End-to-end orchestration
//! - `export` - CSV, JSON and snapshot artifacts

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod segmentation;
pub mod stats;

pub use config::EngineConfig;
pub use data::{Dataset, Transaction, TransactionTable};
pub use error::{EngineError, EngineResult};
pub use pipeline::{AnalyticsPipeline, AnalyticsResults, RunReport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::data::{Dataset, Split, Transaction, TransactionTable};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::features::{BehavioralExtractor, RfmExtractor, TemporalExtractor};
    pub use crate::models::{ChurnClassifier, ClusteringModel, ClvRegressor, RandomForest};
    pub use crate::pipeline::{AnalyticsPipeline, AnalyticsResults, RunReport};
    pub use crate::segmentation::{assign_segment, SegmentRule};
}
