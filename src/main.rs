//! CLI for the customer value analytics engine
//!
//! Provides commands for running the full pipeline, extracting RFM features,
//! inspecting segments and sweeping the cluster count.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use customer_analytics::config::EngineConfig;
use customer_analytics::data::TransactionTable;
use customer_analytics::export::Exporter;
use customer_analytics::features::RfmExtractor;
use customer_analytics::models::{ClusteringModel, ClusterQuality};
use customer_analytics::pipeline::AnalyticsPipeline;

#[derive(Parser)]
#[command(name = "customer-analytics")]
#[command(about = "Customer value analytics engine", long_about = None)]
struct Cli {
    /// Optional engine configuration as JSON
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and export all artifacts
    Analyze {
        /// Transaction CSV to analyze
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for CSVs, report and snapshot
        #[arg(short, long, default_value = "analytics_out")]
        out_dir: PathBuf,
    },

    /// Extract RFM features and segments only
    Rfm {
        /// Transaction CSV to analyze
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for the RFM CSV
        #[arg(short, long, default_value = "analytics_out")]
        out_dir: PathBuf,
    },

    /// Print the segment summary table
    Segments {
        /// Transaction CSV to analyze
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Sweep the cluster count and report the silhouette-optimal k
    OptimalK {
        /// Transaction CSV to analyze
        #[arg(short, long)]
        input: PathBuf,

        /// Largest cluster count to try
        #[arg(long, default_value = "10")]
        max_k: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("customer_analytics=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Analyze { input, out_dir } => analyze(config, &input, &out_dir),
        Commands::Rfm { input, out_dir } => rfm(config, &input, &out_dir),
        Commands::Segments { input } => segments(config, &input),
        Commands::OptimalK { input, max_k } => optimal_k(config, &input, max_k),
    }
}

fn analyze(config: EngineConfig, input: &PathBuf, out_dir: &PathBuf) -> Result<()> {
    let pipeline = AnalyticsPipeline::new(config)?;
    let report = pipeline.run_csv(input, out_dir)?;

    println!("Analyzed {} customers ({} transactions)", report.customer_count, report.transaction_count);
    match report.cluster_quality {
        Some(ClusterQuality::Scored {
            n_clusters,
            silhouette,
            ..
        }) => println!("Clusters: {n_clusters} (silhouette {silhouette:.3})"),
        Some(ClusterQuality::Degenerate { n_clusters }) => {
            println!("Clustering degenerate: {n_clusters} cluster(s)")
        }
        None => println!("Clustering skipped"),
    }
    if let Some(churn) = &report.churn {
        println!(
            "Churn model: F1 {:.3}, AUC {:.3}, threshold {:.2}",
            churn.metrics.f1, churn.metrics.roc_auc, churn.decision_threshold
        );
    }
    if let Some(clv) = &report.clv {
        println!(
            "CLV model: R2 {:.3}, RMSE {:.2}{}",
            clv.metrics.r2,
            clv.metrics.rmse,
            if clv.log_transformed { " (log target)" } else { "" }
        );
    }
    println!("Artifacts written to {}", out_dir.display());
    Ok(())
}

fn rfm(config: EngineConfig, input: &PathBuf, out_dir: &PathBuf) -> Result<()> {
    let table = TransactionTable::from_csv(input)?;
    let features = RfmExtractor::new(&config).extract(&table)?;
    let mut exporter = Exporter::new(out_dir)?;
    let path = exporter.write_rfm(&features)?;
    println!("Wrote {} customers to {}", features.len(), path.display());
    Ok(())
}

fn segments(config: EngineConfig, input: &PathBuf) -> Result<()> {
    let table = TransactionTable::from_csv(input)?;
    let pipeline = AnalyticsPipeline::new(config)?;
    let (results, _) = pipeline.run(&table)?;

    println!(
        "{:<20} {:>9} {:>8} {:>9} {:>10}",
        "segment", "customers", "share", "revenue", "avg spend"
    );
    for s in &results.segments {
        println!(
            "{:<20} {:>9} {:>7.1}% {:>8.1}% {:>10.2}",
            s.segment,
            s.customer_count,
            s.customer_share * 100.0,
            s.revenue_share * 100.0,
            s.avg_monetary
        );
    }
    Ok(())
}

fn optimal_k(config: EngineConfig, input: &PathBuf, max_k: usize) -> Result<()> {
    let table = TransactionTable::from_csv(input)?;
    let pipeline = AnalyticsPipeline::new(config.clone())?;
    let (results, _) = pipeline.run(&table)?;

    let mut dataset = customer_analytics::data::Dataset::new(config.clustering.features.clone());
    for (i, r) in results.rfm.iter().enumerate() {
        let row: Vec<f64> = config
            .clustering
            .features
            .iter()
            .map(|name| match name.as_str() {
                "recency" => r.recency as f64,
                "frequency" => r.frequency as f64,
                "monetary" => r.monetary,
                "avg_order_value" => r.avg_order_value,
                "purchase_consistency" => {
                    results.behavioral[i].purchase_consistency.unwrap_or(0.0)
                }
                _ => 0.0,
            })
            .collect();
        dataset.add_sample(r.customer_id.clone(), row, 0.0);
    }

    let model = ClusteringModel::new(config.clustering.clone());
    let sweep = model.find_optimal_k(&dataset, 2..=max_k)?;
    println!("{:>3} {:>12} {:>12}", "k", "inertia", "silhouette");
    for entry in &sweep.entries {
        println!(
            "{:>3} {:>12.2} {:>12.4}",
            entry.k, entry.inertia, entry.silhouette
        );
    }
    println!("Optimal k by silhouette: {}", sweep.optimal_k);
    Ok(())
}
