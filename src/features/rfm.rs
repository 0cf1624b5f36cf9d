//! RFM feature extraction
//!
//! Aggregates transactions to customer level, bins recency, frequency and
//! monetary into quintile scores, combines them into a weighted composite and
//! assigns a rule-based segment plus batch-relative value tier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::data::TransactionTable;
use crate::error::{EngineError, EngineResult};
use crate::segmentation::{assign_segment, SegmentRule};
use crate::stats;

/// Composite score weights. Monetary counts most, recency least.
const RECENCY_WEIGHT: f64 = 0.25;
const FREQUENCY_WEIGHT: f64 = 0.35;
const MONETARY_WEIGHT: f64 = 0.40;

/// Value tier labels, ordered Bronze -> Platinum.
const VALUE_TIERS: [&str; 4] = ["Bronze", "Silver", "Gold", "Platinum"];

/// Per-customer RFM record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfmFeatures {
    pub customer_id: String,
    pub last_purchase_date: NaiveDate,
    /// Days since last purchase, relative to the reference date.
    pub recency: i64,
    /// Transaction count.
    pub frequency: u64,
    /// Total spend.
    pub monetary: f64,
    pub avg_transaction_value: f64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// Concatenated digit form, e.g. "545".
    pub rfm_score_str: String,
    /// Weighted composite in [1, 5].
    pub rfm_score: f64,
    pub segment: String,
    pub avg_order_value: f64,
    /// Percentile ranks in [0, 100]; recency rank is inverted.
    pub monetary_rank: f64,
    pub frequency_rank: f64,
    pub recency_rank: f64,
    pub value_tier: String,
}

/// RFM extractor bound to a reference date and rule table.
pub struct RfmExtractor {
    reference_date: Option<NaiveDate>,
    n_quantiles: usize,
    rules: Vec<SegmentRule>,
}

impl RfmExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            reference_date: config.reference_date,
            n_quantiles: config.n_quantiles,
            rules: config.segment_rules.clone(),
        }
    }

    /// Reference date used for recency; defaults to the latest transaction
    /// date in the batch.
    fn resolve_reference_date(&self, table: &TransactionTable) -> EngineResult<NaiveDate> {
        self.reference_date
            .or_else(|| table.max_date())
            .ok_or(EngineError::EmptyInput)
    }

    pub fn extract(&self, table: &TransactionTable) -> EngineResult<Vec<RfmFeatures>> {
        if table.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let reference_date = self.resolve_reference_date(table)?;
        info!(
            customers = table.by_customer().len(),
            %reference_date,
            "extracting RFM features"
        );

        // Customer-level aggregates, first-seen order
        let by_customer = table.by_customer();
        let mut records: Vec<RfmFeatures> = Vec::with_capacity(by_customer.len());
        for customer_id in table.customer_ids() {
            let txns = &by_customer[customer_id.as_str()];
            let last_purchase = txns.iter().map(|t| t.date).max().unwrap_or(reference_date);
            let monetary: f64 = txns.iter().map(|t| t.total_amount).sum();
            let frequency = txns.len() as u64;
            let recency = (reference_date - last_purchase).num_days().max(0);

            records.push(RfmFeatures {
                customer_id,
                last_purchase_date: last_purchase,
                recency,
                frequency,
                monetary,
                avg_transaction_value: round2(monetary / frequency as f64),
                r_score: 0,
                f_score: 0,
                m_score: 0,
                rfm_score_str: String::new(),
                rfm_score: 0.0,
                segment: String::new(),
                avg_order_value: 0.0,
                monetary_rank: 0.0,
                frequency_rank: 0.0,
                recency_rank: 0.0,
                value_tier: String::new(),
            });
        }

        self.score(&mut records);
        debug!(customers = records.len(), "RFM extraction complete");
        Ok(records)
    }

    /// Fill in quintile scores, composite, segment and enhanced metrics.
    fn score(&self, records: &mut [RfmFeatures]) {
        let recency: Vec<f64> = records.iter().map(|r| r.recency as f64).collect();
        let frequency: Vec<f64> = records.iter().map(|r| r.frequency as f64).collect();
        let monetary: Vec<f64> = records.iter().map(|r| r.monetary).collect();

        // Lower recency is better, so the recency bins are reversed
        let r_scores = stats::quantile_scores(&recency, self.n_quantiles, true);
        let f_scores = stats::quantile_scores(&frequency, self.n_quantiles, false);
        let m_scores = stats::quantile_scores(&monetary, self.n_quantiles, false);

        let monetary_ranks = stats::percentile_ranks(&monetary);
        let frequency_ranks = stats::percentile_ranks(&frequency);
        let recency_ranks = stats::percentile_ranks(&recency);
        let tiers = stats::quantile_scores(&monetary_ranks, VALUE_TIERS.len(), false);

        for (i, rec) in records.iter_mut().enumerate() {
            rec.r_score = r_scores[i];
            rec.f_score = f_scores[i];
            rec.m_score = m_scores[i];
            rec.rfm_score_str = format!("{}{}{}", rec.r_score, rec.f_score, rec.m_score);
            rec.rfm_score = round2(
                rec.r_score as f64 * RECENCY_WEIGHT
                    + rec.f_score as f64 * FREQUENCY_WEIGHT
                    + rec.m_score as f64 * MONETARY_WEIGHT,
            );
            rec.segment = assign_segment(&self.rules, rec.r_score, rec.f_score, rec.m_score);

            rec.avg_order_value = round2(stats::safe_divide(
                rec.monetary,
                rec.frequency as f64,
                0.0,
            ));
            rec.monetary_rank = round2(monetary_ranks[i]);
            rec.frequency_rank = round2(frequency_ranks[i]);
            rec.recency_rank = round2(100.0 - recency_ranks[i]);
            rec.value_tier = VALUE_TIERS[(tiers[i] as usize).clamp(1, VALUE_TIERS.len()) - 1]
                .to_string();
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Transaction, TransactionTable};

    fn transaction(customer: &str, amount: f64, day: u32) -> Transaction {
        Transaction {
            customer_id: customer.to_string(),
            product_id: "P1".to_string(),
            invoice_id: None,
            quantity: 1.0,
            unit_price: amount,
            total_amount: amount,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day as i64),
        }
    }

    fn table_with_tiers() -> TransactionTable {
        // Five customers with strictly increasing spend and frequency,
        // strictly decreasing recency
        let mut rows = Vec::new();
        for (i, id) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            for k in 0..=i {
                rows.push(transaction(id, 100.0 * (i + 1) as f64, (i * 30 + k) as u32));
            }
        }
        TransactionTable::new(rows)
    }

    #[test]
    fn test_empty_input_rejected() {
        let extractor = RfmExtractor::new(&EngineConfig::default());
        let table = TransactionTable::new(Vec::new());
        assert!(matches!(
            extractor.extract(&table),
            Err(EngineError::EmptyInput)
        ));
    }

    #[test]
    fn test_scores_follow_rank_order() {
        let extractor = RfmExtractor::new(&EngineConfig::default());
        let records = extractor.extract(&table_with_tiers()).unwrap();
        assert_eq!(records.len(), 5);

        // Customer E has highest spend and frequency and most recent purchase
        let e = records.iter().find(|r| r.customer_id == "E").unwrap();
        assert_eq!(e.f_score, 5);
        assert_eq!(e.m_score, 5);
        assert_eq!(e.r_score, 5);
        assert_eq!(e.rfm_score_str, "555");
        assert_eq!(e.segment, "Champions");
        assert_eq!(e.value_tier, "Platinum");

        let a = records.iter().find(|r| r.customer_id == "A").unwrap();
        assert_eq!(a.f_score, 1);
        assert_eq!(a.m_score, 1);
        assert_eq!(a.r_score, 1);
        assert_eq!(a.value_tier, "Bronze");
    }

    #[test]
    fn test_composite_score_weights() {
        let extractor = RfmExtractor::new(&EngineConfig::default());
        let records = extractor.extract(&table_with_tiers()).unwrap();
        let e = records.iter().find(|r| r.customer_id == "E").unwrap();
        // 5*0.25 + 5*0.35 + 5*0.40 = 5.0
        assert!((e.rfm_score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_batch_gets_mid_scores() {
        // Identical customers cannot be binned, fallback is the mid score
        let rows = vec![transaction("X", 50.0, 0), transaction("Y", 50.0, 0)];
        let extractor = RfmExtractor::new(&EngineConfig::default());
        let records = extractor.extract(&TransactionTable::new(rows)).unwrap();
        for rec in &records {
            assert_eq!(rec.f_score, 3);
            assert_eq!(rec.m_score, 3);
            assert_eq!(rec.r_score, 3);
            assert_eq!(rec.segment, "Loyal Customers");
        }
    }

    #[test]
    fn test_avg_order_value() {
        let rows = vec![
            transaction("A", 100.0, 0),
            transaction("A", 200.0, 10),
            transaction("B", 50.0, 5),
        ];
        let extractor = RfmExtractor::new(&EngineConfig::default());
        let records = extractor.extract(&TransactionTable::new(rows)).unwrap();
        let a = records.iter().find(|r| r.customer_id == "A").unwrap();
        assert!((a.avg_order_value - 150.0).abs() < 1e-9);
        assert_eq!(a.frequency, 2);
    }
}
