//! Result export
//!
//! Writes each analysis stage to its own CSV, joins everything into a master
//! customer table, and drops a JSON manifest describing the run. A bincode
//! snapshot of the full result set is kept for fast reloading.

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::features::{BehavioralFeatures, RfmFeatures, TemporalFeatures};
use crate::models::{ChurnPrediction, ClusterAssignment, ClvPrediction};
use crate::segmentation::SegmentSummary;

pub const RFM_FILE: &str = "rfm_features.csv";
pub const BEHAVIORAL_FILE: &str = "behavioral_features.csv";
pub const TEMPORAL_FILE: &str = "temporal_features.csv";
pub const SEGMENT_FILE: &str = "segment_summary.csv";
pub const CLUSTER_FILE: &str = "cluster_assignments.csv";
pub const CHURN_FILE: &str = "churn_predictions.csv";
pub const CLV_FILE: &str = "clv_predictions.csv";
pub const MASTER_FILE: &str = "customer_master.csv";
pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

/// One fully joined customer row. Stages that did not run, or did not cover
/// a customer, leave their columns empty.
#[derive(Debug, Clone, Serialize)]
pub struct MasterRow {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: u64,
    pub monetary: f64,
    pub rfm_score: f64,
    pub segment: String,
    pub value_tier: String,
    pub engagement_score: Option<f64>,
    pub loyalty_indicator: Option<String>,
    pub lifecycle_stage: Option<String>,
    pub churn_risk: Option<String>,
    pub cluster_label: Option<String>,
    pub churn_probability: Option<f64>,
    pub churn_risk_bucket: Option<String>,
    pub predicted_clv: Option<f64>,
    pub clv_tier: Option<String>,
}

/// Counts and file listing written next to the CSVs.
#[derive(Debug, Clone, Serialize)]
pub struct ExportManifest {
    pub generated_at: DateTime<Utc>,
    pub customer_count: usize,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub rows: usize,
}

/// Left-join every stage onto the RFM base by customer id.
pub fn build_master(
    rfm: &[RfmFeatures],
    behavioral: &[BehavioralFeatures],
    temporal: &[TemporalFeatures],
    clusters: &[ClusterAssignment],
    churn: &[ChurnPrediction],
    clv: &[ClvPrediction],
) -> Vec<MasterRow> {
    let behavioral: BTreeMap<&str, &BehavioralFeatures> = behavioral
        .iter()
        .map(|b| (b.customer_id.as_str(), b))
        .collect();
    let temporal: BTreeMap<&str, &TemporalFeatures> = temporal
        .iter()
        .map(|t| (t.customer_id.as_str(), t))
        .collect();
    let clusters: BTreeMap<&str, &ClusterAssignment> = clusters
        .iter()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();
    let churn: BTreeMap<&str, &ChurnPrediction> =
        churn.iter().map(|c| (c.customer_id.as_str(), c)).collect();
    let clv: BTreeMap<&str, &ClvPrediction> =
        clv.iter().map(|c| (c.customer_id.as_str(), c)).collect();

    rfm.iter()
        .map(|r| {
            let id = r.customer_id.as_str();
            let b = behavioral.get(id);
            let t = temporal.get(id);
            MasterRow {
                customer_id: r.customer_id.clone(),
                recency: r.recency,
                frequency: r.frequency,
                monetary: r.monetary,
                rfm_score: r.rfm_score,
                segment: r.segment.clone(),
                value_tier: r.value_tier.clone(),
                engagement_score: b.map(|b| b.engagement_score),
                loyalty_indicator: b.map(|b| b.loyalty_indicator.clone()),
                lifecycle_stage: t.map(|t| t.lifecycle_stage.clone()),
                churn_risk: t.map(|t| t.churn_risk.clone()),
                cluster_label: clusters.get(id).map(|c| c.label.clone()),
                churn_probability: churn.get(id).map(|c| c.churn_probability),
                churn_risk_bucket: churn.get(id).map(|c| c.risk_bucket.clone()),
                predicted_clv: clv.get(id).map(|c| c.predicted_clv),
                clv_tier: clv.get(id).map(|c| c.value_tier.clone()),
            }
        })
        .collect()
}

/// Writes run artifacts into one output directory.
pub struct Exporter {
    out_dir: PathBuf,
    files: Vec<FileEntry>,
}

impl Exporter {
    pub fn new(out_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir)?;
        Ok(Self {
            out_dir,
            files: Vec::new(),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn track(&mut self, name: &str, rows: usize) -> PathBuf {
        info!(name, rows, "wrote export file");
        self.files.push(FileEntry {
            name: name.to_string(),
            rows,
        });
        self.out_dir.join(name)
    }

    pub fn write_rfm(&mut self, rows: &[RfmFeatures]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(RFM_FILE))?;
        writer.write_record([
            "customer_id",
            "last_purchase_date",
            "recency",
            "frequency",
            "monetary",
            "avg_transaction_value",
            "avg_order_value",
            "r_score",
            "f_score",
            "m_score",
            "rfm_score_str",
            "rfm_score",
            "segment",
            "monetary_rank",
            "frequency_rank",
            "recency_rank",
            "value_tier",
        ])?;
        for r in rows {
            writer.write_record([
                r.customer_id.clone(),
                r.last_purchase_date.to_string(),
                r.recency.to_string(),
                r.frequency.to_string(),
                r.monetary.to_string(),
                r.avg_transaction_value.to_string(),
                r.avg_order_value.to_string(),
                r.r_score.to_string(),
                r.f_score.to_string(),
                r.m_score.to_string(),
                r.rfm_score_str.clone(),
                r.rfm_score.to_string(),
                r.segment.clone(),
                r.monetary_rank.to_string(),
                r.frequency_rank.to_string(),
                r.recency_rank.to_string(),
                r.value_tier.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(RFM_FILE, rows.len()))
    }

    pub fn write_behavioral(&mut self, rows: &[BehavioralFeatures]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(BEHAVIORAL_FILE))?;
        writer.write_record([
            "customer_id",
            "avg_days_between_purchases",
            "purchase_consistency",
            "purchase_span_days",
            "unique_products",
            "product_diversity_level",
            "transaction_count",
            "total_spending",
            "avg_transaction_value",
            "transaction_value_std",
            "min_transaction_value",
            "max_transaction_value",
            "spending_volatility",
            "spending_trend",
            "trend_direction",
            "engagement_score",
            "loyalty_indicator",
        ])?;
        for b in rows {
            writer.write_record([
                b.customer_id.clone(),
                opt_string(b.avg_days_between_purchases),
                opt_string(b.purchase_consistency),
                b.purchase_span_days.to_string(),
                b.unique_products.to_string(),
                b.product_diversity_level.clone(),
                b.transaction_count.to_string(),
                b.total_spending.to_string(),
                b.avg_transaction_value.to_string(),
                b.transaction_value_std.to_string(),
                b.min_transaction_value.to_string(),
                b.max_transaction_value.to_string(),
                b.spending_volatility.to_string(),
                b.spending_trend.to_string(),
                b.trend_direction.clone(),
                b.engagement_score.to_string(),
                b.loyalty_indicator.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(BEHAVIORAL_FILE, rows.len()))
    }

    pub fn write_temporal(&mut self, rows: &[TemporalFeatures]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(TEMPORAL_FILE))?;
        writer.write_record([
            "customer_id",
            "preferred_day_of_week",
            "weekend_purchase_ratio",
            "weekend_spending_ratio",
            "q1_purchases",
            "q2_purchases",
            "q3_purchases",
            "q4_purchases",
            "preferred_quarter",
            "seasonal_variation",
            "first_purchase_date",
            "last_purchase_date",
            "total_transactions",
            "customer_tenure_days",
            "recency_days",
            "active_period_days",
            "purchase_velocity",
            "lifecycle_stage",
            "expected_days_to_purchase",
            "days_overdue",
            "churn_risk",
        ])?;
        for t in rows {
            writer.write_record([
                t.customer_id.clone(),
                t.preferred_day_of_week.clone(),
                t.weekend_purchase_ratio.to_string(),
                t.weekend_spending_ratio.to_string(),
                t.quarter_counts[0].to_string(),
                t.quarter_counts[1].to_string(),
                t.quarter_counts[2].to_string(),
                t.quarter_counts[3].to_string(),
                t.preferred_quarter.to_string(),
                t.seasonal_variation.to_string(),
                t.first_purchase_date.to_string(),
                t.last_purchase_date.to_string(),
                t.total_transactions.to_string(),
                t.customer_tenure_days.to_string(),
                t.recency_days.to_string(),
                t.active_period_days.to_string(),
                t.purchase_velocity.to_string(),
                t.lifecycle_stage.clone(),
                t.expected_days_to_purchase.to_string(),
                t.days_overdue.to_string(),
                t.churn_risk.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(TEMPORAL_FILE, rows.len()))
    }

    pub fn write_segments(&mut self, rows: &[SegmentSummary]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(SEGMENT_FILE))?;
        writer.write_record([
            "segment",
            "customer_count",
            "customer_share",
            "revenue_share",
            "avg_recency_days",
            "avg_frequency",
            "avg_monetary",
            "avg_rfm_score",
        ])?;
        for s in rows {
            writer.write_record([
                s.segment.clone(),
                s.customer_count.to_string(),
                s.customer_share.to_string(),
                s.revenue_share.to_string(),
                s.avg_recency_days.to_string(),
                s.avg_frequency.to_string(),
                s.avg_monetary.to_string(),
                s.avg_rfm_score.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(SEGMENT_FILE, rows.len()))
    }

    pub fn write_clusters(&mut self, rows: &[ClusterAssignment]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(CLUSTER_FILE))?;
        writer.write_record(["customer_id", "cluster_id", "cluster_label"])?;
        for c in rows {
            writer.write_record([
                c.customer_id.clone(),
                c.cluster_id.to_string(),
                c.label.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(CLUSTER_FILE, rows.len()))
    }

    pub fn write_churn(&mut self, rows: &[ChurnPrediction]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(CHURN_FILE))?;
        writer.write_record([
            "customer_id",
            "churn_probability",
            "churned",
            "risk_bucket",
        ])?;
        for c in rows {
            writer.write_record([
                c.customer_id.clone(),
                c.churn_probability.to_string(),
                c.churned.to_string(),
                c.risk_bucket.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(CHURN_FILE, rows.len()))
    }

    pub fn write_clv(&mut self, rows: &[ClvPrediction]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(CLV_FILE))?;
        writer.write_record(["customer_id", "predicted_clv", "percentile_rank", "value_tier"])?;
        for c in rows {
            writer.write_record([
                c.customer_id.clone(),
                c.predicted_clv.to_string(),
                c.percentile_rank.to_string(),
                c.value_tier.clone(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(CLV_FILE, rows.len()))
    }

    pub fn write_master(&mut self, rows: &[MasterRow]) -> EngineResult<PathBuf> {
        let mut writer = csv::Writer::from_path(self.out_dir.join(MASTER_FILE))?;
        writer.write_record([
            "customer_id",
            "recency",
            "frequency",
            "monetary",
            "rfm_score",
            "segment",
            "value_tier",
            "engagement_score",
            "loyalty_indicator",
            "lifecycle_stage",
            "churn_risk",
            "cluster_label",
            "churn_probability",
            "churn_risk_bucket",
            "predicted_clv",
            "clv_tier",
        ])?;
        for m in rows {
            writer.write_record([
                m.customer_id.clone(),
                m.recency.to_string(),
                m.frequency.to_string(),
                m.monetary.to_string(),
                m.rfm_score.to_string(),
                m.segment.clone(),
                m.value_tier.clone(),
                opt_string(m.engagement_score),
                m.loyalty_indicator.clone().unwrap_or_default(),
                m.lifecycle_stage.clone().unwrap_or_default(),
                m.churn_risk.clone().unwrap_or_default(),
                m.cluster_label.clone().unwrap_or_default(),
                opt_string(m.churn_probability),
                m.churn_risk_bucket.clone().unwrap_or_default(),
                opt_string(m.predicted_clv),
                m.clv_tier.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(self.track(MASTER_FILE, rows.len()))
    }

    /// Write any serializable report to a pretty-printed JSON file.
    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> EngineResult<PathBuf> {
        let path = self.out_dir.join(name);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, value)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(self.track(name, 1))
    }

    /// Binary snapshot for fast reloads.
    pub fn write_snapshot<T: Serialize>(&mut self, value: &T) -> EngineResult<PathBuf> {
        let bytes = bincode::serialize(value)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        fs::write(self.out_dir.join(SNAPSHOT_FILE), bytes)?;
        Ok(self.track(SNAPSHOT_FILE, 1))
    }

    /// Finish the run with a manifest listing everything written so far.
    pub fn write_manifest(&mut self, customer_count: usize) -> EngineResult<PathBuf> {
        let manifest = ExportManifest {
            generated_at: Utc::now(),
            customer_count,
            files: self.files.clone(),
        };
        let path = self.out_dir.join(MANIFEST_FILE);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, &manifest)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(path)
    }
}

fn opt_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Reload a binary snapshot written by [`Exporter::write_snapshot`].
pub fn read_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> EngineResult<T> {
    let bytes = fs::read(path.as_ref())?;
    bincode::deserialize(&bytes).map_err(|e| EngineError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rfm_row(id: &str) -> RfmFeatures {
        RfmFeatures {
            customer_id: id.to_string(),
            last_purchase_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            recency: 10,
            frequency: 5,
            monetary: 500.0,
            avg_transaction_value: 100.0,
            r_score: 5,
            f_score: 4,
            m_score: 4,
            rfm_score_str: "544".to_string(),
            rfm_score: 4.25,
            segment: "Champions".to_string(),
            avg_order_value: 100.0,
            monetary_rank: 90.0,
            frequency_rank: 85.0,
            recency_rank: 95.0,
            value_tier: "Platinum".to_string(),
        }
    }

    #[test]
    fn test_rfm_csv_has_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(dir.path()).unwrap();
        let path = exporter.write_rfm(&[rfm_row("C1"), rfm_row("C2")]).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("customer_id,last_purchase_date"));
        assert!(lines[1].starts_with("C1,2024-03-01,10,5,500"));
    }

    #[test]
    fn test_master_join_is_left_outer() {
        let rfm = vec![rfm_row("C1"), rfm_row("C2")];
        let clv = vec![ClvPrediction {
            customer_id: "C1".to_string(),
            predicted_clv: 1234.5,
            percentile_rank: 100.0,
            value_tier: "Gold".to_string(),
        }];
        let master = build_master(&rfm, &[], &[], &[], &[], &clv);

        assert_eq!(master.len(), 2);
        assert_eq!(master[0].predicted_clv, Some(1234.5));
        assert_eq!(master[1].predicted_clv, None);
        assert!(master[1].cluster_label.is_none());
    }

    #[test]
    fn test_snapshot_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(dir.path()).unwrap();
        let rows = vec![rfm_row("C1"), rfm_row("C2")];
        let path = exporter.write_snapshot(&rows).unwrap();

        let reloaded: Vec<RfmFeatures> = read_snapshot(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].customer_id, "C1");
        assert_eq!(reloaded[1].monetary, 500.0);
        assert_eq!(reloaded[0].segment, "Champions");
    }

    #[test]
    fn test_manifest_lists_written_files() {
        let dir = TempDir::new().unwrap();
        let mut exporter = Exporter::new(dir.path()).unwrap();
        exporter.write_rfm(&[rfm_row("C1")]).unwrap();
        exporter
            .write_clv(&[ClvPrediction {
                customer_id: "C1".to_string(),
                predicted_clv: 10.0,
                percentile_rank: 100.0,
                value_tier: "Bronze".to_string(),
            }])
            .unwrap();
        let path = exporter.write_manifest(1).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        let files = manifest["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["name"], RFM_FILE);
        assert_eq!(manifest["customer_count"], 1);
    }
}
