//! End-to-end analysis pipeline
//!
//! Runs the full customer value workflow over a transaction table: feature
//! extraction, segmentation, clustering, churn classification and CLV
//! regression, then hands everything to the exporter. Model stages that need
//! more customers than the input provides are skipped with a warning instead
//! of failing the run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::data::{Dataset, TransactionTable};
use crate::error::{EngineError, EngineResult};
use crate::export::{build_master, Exporter, MasterRow};
use crate::features::{
    BehavioralExtractor, BehavioralFeatures, RfmExtractor, RfmFeatures, TemporalExtractor,
    TemporalFeatures,
};
use crate::models::churn::{label_by_recency, ChurnClassifier};
use crate::models::{
    ChurnPrediction, ChurnTrainingReport, ClusterAssignment, ClusterProfile, ClusterQuality,
    ClusteringModel, ClvPrediction, ClvRegressor, ClvTrainingReport,
};
use crate::segmentation::{segment_summaries, SegmentSummary};

/// Model stages refuse to train below this many customers.
const MIN_MODEL_CUSTOMERS: usize = 10;

/// Everything the run produced, grouped per stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsResults {
    pub rfm: Vec<RfmFeatures>,
    pub behavioral: Vec<BehavioralFeatures>,
    pub temporal: Vec<TemporalFeatures>,
    pub segments: Vec<SegmentSummary>,
    pub clusters: Vec<ClusterAssignment>,
    pub cluster_profiles: Vec<ClusterProfile>,
    pub churn: Vec<ChurnPrediction>,
    pub clv: Vec<ClvPrediction>,
}

impl AnalyticsResults {
    pub fn master(&self) -> Vec<MasterRow> {
        build_master(
            &self.rfm,
            &self.behavioral,
            &self.temporal,
            &self.clusters,
            &self.churn,
            &self.clv,
        )
    }
}

/// Model quality and run counts.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub transaction_count: usize,
    pub customer_count: usize,
    pub cluster_quality: Option<ClusterQuality>,
    pub churn: Option<ChurnTrainingReport>,
    pub clv: Option<ClvTrainingReport>,
}

pub struct AnalyticsPipeline {
    config: EngineConfig,
}

impl AnalyticsPipeline {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every stage over the table.
    pub fn run(&self, table: &TransactionTable) -> EngineResult<(AnalyticsResults, RunReport)> {
        if table.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let customer_count = table.customer_ids().len();
        info!(
            transactions = table.len(),
            customers = customer_count,
            "starting analytics run"
        );

        let rfm = RfmExtractor::new(&self.config).extract(table)?;
        let behavioral = BehavioralExtractor::default().extract(table)?;
        let temporal = TemporalExtractor::new(&self.config).extract(table)?;

        let segments = self.summarize_segments(&rfm);

        let mut results = AnalyticsResults {
            rfm,
            behavioral,
            temporal,
            segments,
            clusters: Vec::new(),
            cluster_profiles: Vec::new(),
            churn: Vec::new(),
            clv: Vec::new(),
        };
        let mut report = RunReport {
            transaction_count: table.len(),
            customer_count,
            cluster_quality: None,
            churn: None,
            clv: None,
        };

        if customer_count >= MIN_MODEL_CUSTOMERS {
            self.run_clustering(&mut results, &mut report)?;
            self.run_churn(&mut results, &mut report)?;
            self.run_clv(&mut results, &mut report)?;
        } else {
            warn!(
                customers = customer_count,
                "too few customers, skipping model stages"
            );
        }

        Ok((results, report))
    }

    /// Run over a CSV and write all artifacts to `out_dir`.
    pub fn run_csv(
        &self,
        input: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> EngineResult<RunReport> {
        let table = TransactionTable::from_csv(input.as_ref())?;
        let (results, report) = self.run(&table)?;
        self.export(&results, &report, out_dir)?;
        Ok(report)
    }

    /// Write per-stage CSVs, the master table, the report and the manifest.
    pub fn export(
        &self,
        results: &AnalyticsResults,
        report: &RunReport,
        out_dir: impl AsRef<Path>,
    ) -> EngineResult<()> {
        let mut exporter = Exporter::new(out_dir)?;
        exporter.write_rfm(&results.rfm)?;
        exporter.write_behavioral(&results.behavioral)?;
        exporter.write_temporal(&results.temporal)?;
        exporter.write_segments(&results.segments)?;
        if !results.clusters.is_empty() {
            exporter.write_clusters(&results.clusters)?;
        }
        if !results.churn.is_empty() {
            exporter.write_churn(&results.churn)?;
        }
        if !results.clv.is_empty() {
            exporter.write_clv(&results.clv)?;
        }
        exporter.write_master(&results.master())?;
        exporter.write_json("run_report.json", report)?;
        exporter.write_snapshot(results)?;
        exporter.write_manifest(results.rfm.len())?;
        Ok(())
    }

    fn summarize_segments(&self, rfm: &[RfmFeatures]) -> Vec<SegmentSummary> {
        let segments: Vec<String> = rfm.iter().map(|r| r.segment.clone()).collect();
        let recency: Vec<f64> = rfm.iter().map(|r| r.recency as f64).collect();
        let frequency: Vec<f64> = rfm.iter().map(|r| r.frequency as f64).collect();
        let monetary: Vec<f64> = rfm.iter().map(|r| r.monetary).collect();
        let scores: Vec<f64> = rfm.iter().map(|r| r.rfm_score).collect();
        segment_summaries(&segments, &recency, &frequency, &monetary, &scores)
    }

    fn run_clustering(
        &self,
        results: &mut AnalyticsResults,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        let dataset = self.build_dataset(results, &self.config.clustering.features, |_| 0.0)?;
        let mut model = ClusteringModel::new(self.config.clustering.clone());
        results.clusters = model.fit_predict(&dataset)?;
        results.cluster_profiles = model.cluster_profiles(&dataset, &results.clusters);
        report.cluster_quality = model.quality;
        Ok(())
    }

    fn run_churn(
        &self,
        results: &mut AnalyticsResults,
        report: &mut RunReport,
    ) -> EngineResult<()> {
        let mut dataset = self.build_dataset(results, &self.config.churn.features, |_| 0.0)?;
        label_by_recency(&mut dataset, self.config.churn.churn_threshold_days as f64)?;

        let mut classifier = ChurnClassifier::new(self.config.churn.clone());
        report.churn = Some(classifier.train(&dataset)?);
        results.churn = classifier.predict(&dataset)?;
        Ok(())
    }

    fn run_clv(&self, results: &mut AnalyticsResults, report: &mut RunReport) -> EngineResult<()> {
        let rfm = results.rfm.clone();
        let dataset = self.build_dataset(results, &self.config.clv.features, move |i| {
            rfm[i].monetary
        })?;

        let mut regressor = ClvRegressor::new(self.config.clv.clone());
        report.clv = Some(regressor.train(&dataset)?);
        results.clv = regressor.predict(&dataset)?;
        Ok(())
    }

    /// Assemble a model dataset from the extracted feature tables.
    fn build_dataset(
        &self,
        results: &AnalyticsResults,
        feature_names: &[String],
        label: impl Fn(usize) -> f64,
    ) -> EngineResult<Dataset> {
        let mut dataset = Dataset::new(feature_names.to_vec());
        for (i, rfm) in results.rfm.iter().enumerate() {
            let behavioral = &results.behavioral[i];
            let temporal = &results.temporal[i];
            let row = feature_names
                .iter()
                .map(|name| feature_value(name, rfm, behavioral, temporal))
                .collect::<EngineResult<Vec<f64>>>()?;
            dataset.add_sample(rfm.customer_id.clone(), row, label(i));
        }
        Ok(dataset)
    }
}

/// Look one named feature up across the three per-customer feature tables.
/// Missing per-customer values (single-purchase cadence) fall back to zero.
fn feature_value(
    name: &str,
    rfm: &RfmFeatures,
    behavioral: &BehavioralFeatures,
    temporal: &TemporalFeatures,
) -> EngineResult<f64> {
    let value = match name {
        "recency" => rfm.recency as f64,
        "frequency" => rfm.frequency as f64,
        "monetary" => rfm.monetary,
        "avg_order_value" => rfm.avg_order_value,
        "avg_transaction_value" => rfm.avg_transaction_value,
        "rfm_score" => rfm.rfm_score,
        "avg_days_between_purchases" => behavioral.avg_days_between_purchases.unwrap_or(0.0),
        "purchase_consistency" => behavioral.purchase_consistency.unwrap_or(0.0),
        "engagement_score" => behavioral.engagement_score,
        "spending_volatility" => behavioral.spending_volatility,
        "spending_trend" => behavioral.spending_trend,
        "total_spending" => behavioral.total_spending,
        "unique_products" => behavioral.unique_products as f64,
        "customer_tenure_days" => temporal.customer_tenure_days as f64,
        "purchase_velocity" => temporal.purchase_velocity,
        "weekend_purchase_ratio" => temporal.weekend_purchase_ratio,
        "seasonal_variation" => temporal.seasonal_variation,
        "days_overdue" => temporal.days_overdue,
        _ => return Err(EngineError::UnknownFeature(name.to_string())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transaction;
    use chrono::NaiveDate;

    fn day(offset: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset as i64)
    }

    fn transaction(customer: &str, amount: f64, offset: u32) -> Transaction {
        Transaction {
            customer_id: customer.to_string(),
            product_id: format!("P{}", offset % 5),
            invoice_id: None,
            quantity: 1.0,
            unit_price: amount,
            total_amount: amount,
            date: day(offset),
        }
    }

    fn small_table() -> TransactionTable {
        let mut rows = Vec::new();
        for c in 0..5 {
            for t in 0..3 {
                rows.push(transaction(&format!("C{c}"), 25.0 * (c + 1) as f64, c * 7 + t * 30));
            }
        }
        TransactionTable::new(rows)
    }

    #[test]
    fn test_small_run_skips_model_stages() {
        let pipeline = AnalyticsPipeline::new(EngineConfig::default()).unwrap();
        let (results, report) = pipeline.run(&small_table()).unwrap();

        assert_eq!(results.rfm.len(), 5);
        assert_eq!(results.behavioral.len(), 5);
        assert_eq!(results.temporal.len(), 5);
        assert!(!results.segments.is_empty());
        assert!(results.clusters.is_empty());
        assert!(report.churn.is_none());
        assert_eq!(report.customer_count, 5);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let pipeline = AnalyticsPipeline::new(EngineConfig::default()).unwrap();
        let err = pipeline.run(&TransactionTable::new(Vec::new())).unwrap_err();
        assert!(matches!(err, EngineError::EmptyInput));
    }

    #[test]
    fn test_feature_lookup_rejects_unknown_names() {
        let table = small_table();
        let config = EngineConfig::default();
        let rfm = RfmExtractor::new(&config).extract(&table).unwrap();
        let behavioral = BehavioralExtractor::default().extract(&table).unwrap();
        let temporal = TemporalExtractor::new(&config).extract(&table).unwrap();

        let err = feature_value("no_such_feature", &rfm[0], &behavioral[0], &temporal[0])
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownFeature(_)));

        let monetary = feature_value("monetary", &rfm[0], &behavioral[0], &temporal[0]).unwrap();
        assert!(monetary > 0.0);
    }
}
