//! Temporal feature extraction
//!
//! Day-of-week and quarterly purchase patterns plus customer lifecycle
//! signals (tenure, velocity, overdue-based churn risk).

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::data::TransactionTable;
use crate::error::{EngineError, EngineResult};
use crate::stats;

/// Tenure cut-points in days for the lifecycle stage bins.
const LIFECYCLE_BOUNDS: [i64; 4] = [30, 90, 180, 365];
const LIFECYCLE_STAGES: [&str; 5] = ["New", "Developing", "Established", "Mature", "Veteran"];

/// Days-overdue cut-points for the churn-risk bucket.
const CHURN_RISK_BOUNDS: [f64; 3] = [0.0, 30.0, 60.0];
const CHURN_RISK_BUCKETS: [&str; 4] = ["Active", "At Risk", "Dormant", "Churned"];

/// Expected purchase gap assumed for single-purchase customers.
const DEFAULT_EXPECTED_GAP_DAYS: f64 = 365.0;

/// Per-customer temporal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub customer_id: String,
    pub preferred_day_of_week: String,
    pub weekend_purchase_ratio: f64,
    pub weekend_spending_ratio: f64,
    /// Transaction counts for Q1..Q4.
    pub quarter_counts: [u64; 4],
    pub preferred_quarter: u8,
    /// CV of quarterly counts.
    pub seasonal_variation: f64,
    pub first_purchase_date: NaiveDate,
    pub last_purchase_date: NaiveDate,
    pub total_transactions: u64,
    pub customer_tenure_days: i64,
    pub recency_days: i64,
    pub active_period_days: i64,
    /// Transactions per 30 days of tenure.
    pub purchase_velocity: f64,
    pub lifecycle_stage: String,
    pub expected_days_to_purchase: f64,
    pub days_overdue: f64,
    pub churn_risk: String,
}

/// Temporal extractor bound to a reference date.
pub struct TemporalExtractor {
    reference_date: Option<NaiveDate>,
}

impl TemporalExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            reference_date: config.reference_date,
        }
    }

    pub fn extract(&self, table: &TransactionTable) -> EngineResult<Vec<TemporalFeatures>> {
        if table.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let reference_date = self
            .reference_date
            .or_else(|| table.max_date())
            .ok_or(EngineError::EmptyInput)?;
        let by_customer = table.by_customer();
        info!(
            customers = by_customer.len(),
            %reference_date,
            "extracting temporal features"
        );

        let mut records = Vec::with_capacity(by_customer.len());
        for customer_id in table.customer_ids() {
            let txns = &by_customer[customer_id.as_str()];

            let mut day_counts = [0u64; 7];
            let mut quarter_counts = [0u64; 4];
            let mut weekend_count = 0u64;
            let mut weekend_spend = 0.0;
            let mut total_spend = 0.0;
            for t in txns {
                day_counts[t.date.weekday().num_days_from_monday() as usize] += 1;
                quarter_counts[(t.date.month0() / 3) as usize] += 1;
                total_spend += t.total_amount;
                if is_weekend(t.date.weekday()) {
                    weekend_count += 1;
                    weekend_spend += t.total_amount;
                }
            }

            let first_purchase = txns.iter().map(|t| t.date).min().unwrap_or(reference_date);
            let last_purchase = txns.iter().map(|t| t.date).max().unwrap_or(reference_date);
            let total = txns.len() as u64;
            let tenure = (reference_date - first_purchase).num_days();
            let recency = (reference_date - last_purchase).num_days();
            let active_period = (last_purchase - first_purchase).num_days();

            let expected_gap = stats::safe_divide(
                active_period as f64,
                (total as f64) - 1.0,
                DEFAULT_EXPECTED_GAP_DAYS,
            );
            let days_overdue = recency as f64 - expected_gap;

            let q_floats: Vec<f64> = quarter_counts.iter().map(|&c| c as f64).collect();
            let q_mean = stats::mean(&q_floats);
            let seasonal_variation = if q_mean == 0.0 {
                0.0
            } else {
                round3(population_std(&q_floats) / q_mean)
            };

            records.push(TemporalFeatures {
                customer_id,
                preferred_day_of_week: preferred_day(&day_counts).to_string(),
                weekend_purchase_ratio: round3(stats::safe_divide(
                    weekend_count as f64,
                    total as f64,
                    0.0,
                )),
                weekend_spending_ratio: round3(stats::safe_divide(
                    weekend_spend,
                    total_spend,
                    0.0,
                )),
                quarter_counts,
                preferred_quarter: preferred_quarter(&quarter_counts),
                seasonal_variation,
                first_purchase_date: first_purchase,
                last_purchase_date: last_purchase,
                total_transactions: total,
                customer_tenure_days: tenure,
                recency_days: recency,
                active_period_days: active_period,
                purchase_velocity: round3(stats::safe_divide(
                    total as f64,
                    tenure as f64 / 30.0,
                    0.0,
                )),
                lifecycle_stage: lifecycle_stage(tenure).to_string(),
                expected_days_to_purchase: expected_gap,
                days_overdue,
                churn_risk: churn_risk_bucket(days_overdue).to_string(),
            });
        }

        debug!(customers = records.len(), "temporal extraction complete");
        Ok(records)
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn preferred_day(day_counts: &[u64; 7]) -> &'static str {
    const NAMES: [&str; 7] = [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ];
    let best = day_counts
        .iter()
        .enumerate()
        .max_by_key(|&(i, &count)| (count, std::cmp::Reverse(i)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    NAMES[best]
}

/// 1-based quarter with most transactions; earlier quarter wins ties.
fn preferred_quarter(quarter_counts: &[u64; 4]) -> u8 {
    let best = quarter_counts
        .iter()
        .enumerate()
        .max_by_key(|&(i, &count)| (count, std::cmp::Reverse(i)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    best as u8 + 1
}

pub fn lifecycle_stage(tenure_days: i64) -> &'static str {
    for (i, &bound) in LIFECYCLE_BOUNDS.iter().enumerate() {
        if tenure_days <= bound {
            return LIFECYCLE_STAGES[i];
        }
    }
    LIFECYCLE_STAGES[LIFECYCLE_BOUNDS.len()]
}

pub fn churn_risk_bucket(days_overdue: f64) -> &'static str {
    for (i, &bound) in CHURN_RISK_BOUNDS.iter().enumerate() {
        if days_overdue <= bound {
            return CHURN_RISK_BUCKETS[i];
        }
    }
    CHURN_RISK_BUCKETS[CHURN_RISK_BOUNDS.len()]
}

/// Population std (ddof = 0), matching the quarterly variation definition.
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = stats::mean(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
