//! Behavioral feature extraction
//!
//! Purchase cadence, product diversity, spending patterns and composite
//! engagement/loyalty signals per customer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::TransactionTable;
use crate::error::{EngineError, EngineResult};
use crate::stats;

/// Product count bounds for the diversity level bins.
const LOW_DIVERSITY_THRESHOLD: usize = 3;
const HIGH_DIVERSITY_THRESHOLD: usize = 10;

/// Transactions required before consistency counts toward high loyalty.
const MIN_TRANSACTIONS_FOR_CONSISTENCY: u64 = 3;

/// Spending trend cut-points for the direction label.
const TREND_DECLINING_BOUND: f64 = -0.1;
const TREND_GROWING_BOUND: f64 = 0.1;

/// Per-customer behavioral record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralFeatures {
    pub customer_id: String,
    /// Mean gap between consecutive purchases; None with fewer than 2.
    pub avg_days_between_purchases: Option<f64>,
    /// 1 - min(CV of gaps, 1); None with fewer than 2 purchases.
    pub purchase_consistency: Option<f64>,
    pub purchase_span_days: i64,
    pub unique_products: usize,
    pub product_diversity_level: String,
    pub transaction_count: u64,
    pub total_spending: f64,
    pub avg_transaction_value: f64,
    pub transaction_value_std: f64,
    pub min_transaction_value: f64,
    pub max_transaction_value: f64,
    /// CV of transaction amounts.
    pub spending_volatility: f64,
    /// Relative change in mean spend, second half vs first half.
    pub spending_trend: f64,
    pub trend_direction: String,
    /// 0-100 composite of consistency, diversity rank and spending rank.
    pub engagement_score: f64,
    pub loyalty_indicator: String,
}

/// Extracts behavioral features from transaction history.
#[derive(Debug, Default)]
pub struct BehavioralExtractor;

impl BehavioralExtractor {
    pub fn extract(&self, table: &TransactionTable) -> EngineResult<Vec<BehavioralFeatures>> {
        if table.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let by_customer = table.by_customer();
        info!(customers = by_customer.len(), "extracting behavioral features");

        let mut records: Vec<BehavioralFeatures> = Vec::with_capacity(by_customer.len());
        for customer_id in table.customer_ids() {
            let mut txns = by_customer[customer_id.as_str()].clone();
            txns.sort_by_key(|t| t.date);

            let amounts: Vec<f64> = txns.iter().map(|t| t.total_amount).collect();
            let count = txns.len() as u64;
            let total: f64 = amounts.iter().sum();
            let mean = total / count as f64;
            let std = stats::std_dev(&amounts);

            let (avg_gap, consistency, span) = cadence(&txns);
            let unique_products = {
                let mut products: Vec<&str> =
                    txns.iter().map(|t| t.product_id.as_str()).collect();
                products.sort_unstable();
                products.dedup();
                products.len()
            };

            let trend = spending_trend(&amounts);
            records.push(BehavioralFeatures {
                customer_id,
                avg_days_between_purchases: avg_gap,
                purchase_consistency: consistency,
                purchase_span_days: span,
                unique_products,
                product_diversity_level: diversity_level(unique_products).to_string(),
                transaction_count: count,
                total_spending: total,
                avg_transaction_value: mean,
                transaction_value_std: std,
                min_transaction_value: amounts.iter().copied().fold(f64::INFINITY, f64::min),
                max_transaction_value: amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                spending_volatility: round3(stats::safe_divide(std, mean, 0.0)),
                spending_trend: round3(trend),
                trend_direction: trend_direction(trend).to_string(),
                engagement_score: 0.0,
                loyalty_indicator: String::new(),
            });
        }

        self.composite_scores(&mut records);
        debug!(customers = records.len(), "behavioral extraction complete");
        Ok(records)
    }

    /// Engagement score and loyalty level need batch-wide ranks, so they are
    /// filled in after the per-customer pass.
    fn composite_scores(&self, records: &mut [BehavioralFeatures]) {
        let diversity: Vec<f64> = records.iter().map(|r| r.unique_products as f64).collect();
        let spending: Vec<f64> = records.iter().map(|r| r.total_spending).collect();
        let diversity_ranks = stats::percentile_ranks(&diversity);
        let spending_ranks = stats::percentile_ranks(&spending);

        for (i, rec) in records.iter_mut().enumerate() {
            let consistency = rec.purchase_consistency.unwrap_or(0.0);
            let score = consistency * 30.0
                + diversity_ranks[i] / 100.0 * 30.0
                + spending_ranks[i] / 100.0 * 40.0;
            rec.engagement_score = (score * 100.0).round() / 100.0;

            rec.loyalty_indicator = if consistency > 0.5
                && rec.transaction_count >= MIN_TRANSACTIONS_FOR_CONSISTENCY
            {
                "High"
            } else if consistency > 0.3 || rec.transaction_count >= 2 {
                "Medium"
            } else {
                "Low"
            }
            .to_string();
        }
    }
}

/// Mean gap, consistency and span from date-sorted transactions.
fn cadence(
    txns: &[&crate::data::Transaction],
) -> (Option<f64>, Option<f64>, i64) {
    if txns.len() < 2 {
        return (None, None, 0);
    }
    let gaps: Vec<f64> = txns
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days() as f64)
        .collect();
    let avg = stats::mean(&gaps);
    let cv = stats::coefficient_of_variation(&gaps);
    let consistency = 1.0 - cv.min(1.0);
    let span = (txns[txns.len() - 1].date - txns[0].date).num_days();
    (
        Some((avg * 10.0).round() / 10.0),
        Some(round3(consistency)),
        span,
    )
}

/// Relative change in mean amount between the first and second half of the
/// purchase history.
fn spending_trend(amounts: &[f64]) -> f64 {
    if amounts.len() < 2 {
        return 0.0;
    }
    let mid = amounts.len() / 2;
    let first = stats::mean(&amounts[..mid]);
    let second = stats::mean(&amounts[mid..]);
    stats::safe_divide(second - first, first, 0.0)
}

fn diversity_level(unique_products: usize) -> &'static str {
    if unique_products <= LOW_DIVERSITY_THRESHOLD {
        "Low"
    } else if unique_products <= HIGH_DIVERSITY_THRESHOLD {
        "Medium"
    } else {
        "High"
    }
}

fn trend_direction(trend: f64) -> &'static str {
    if trend <= TREND_DECLINING_BOUND {
        "Declining"
    } else if trend <= TREND_GROWING_BOUND {
        "Stable"
    } else {
        "Growing"
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
