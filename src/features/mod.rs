//! Customer feature extraction
//!
//! Three extractors over the transaction table: RFM scoring, behavioral
//! patterns and temporal/lifecycle signals. All produce one record per
//! customer in first-seen order.

mod behavioral;
mod rfm;
mod temporal;

pub use behavioral::{BehavioralExtractor, BehavioralFeatures};
pub use rfm::{RfmExtractor, RfmFeatures};
pub use temporal::{churn_risk_bucket, lifecycle_stage, TemporalExtractor, TemporalFeatures};
