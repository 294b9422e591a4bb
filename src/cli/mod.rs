//! memboost CLI Module
//!
//! Command-line interface for training on parquet files and inspecting
//! the chunk plan a dataset would get.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{AnalysisRequest, TrainerConfig};
use crate::data::DatasetHandle;
use crate::explain::Artifact;
use crate::planner::{ChunkPlanner, Estimate};
use crate::service::AnalysisService;
use crate::store::DirectoryStore;
use crate::trainer::{ProcessingType, TrainingReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn row(key: &str, value: impl std::fmt::Display) {
    println!("  {:<20} {}", muted(key), value.to_string().white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "memboost")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Memory-bounded gradient boosting for regression on parquet data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model and write the analysis report
    Train {
        /// Input parquet file
        #[arg(short, long)]
        data: PathBuf,

        /// Date column (dropped before training)
        #[arg(long)]
        date_column: String,

        /// Target column
        #[arg(short, long)]
        target_column: String,

        /// Columns to leave out of the feature set
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Share of rows held out for testing
        #[arg(long, default_value = "0.2")]
        test_size: f64,

        /// Memory budget in MB
        #[arg(long, default_value = "256")]
        max_memory_mb: usize,

        /// Skip the low/medium/high breakdown plots
        #[arg(long)]
        no_waterfalls: bool,

        /// Boosting threads
        #[arg(long, default_value = "1")]
        threads: usize,

        /// Write the full JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write decoded SVG plots into this directory
        #[arg(long)]
        plots_dir: Option<PathBuf>,
    },

    /// Show the schema and the chunk plan for a dataset
    Inspect {
        /// Input parquet file
        #[arg(short, long)]
        data: PathBuf,

        /// Memory budget in MB
        #[arg(long, default_value = "256")]
        max_memory_mb: usize,

        /// Share of rows held out for testing
        #[arg(long, default_value = "0.2")]
        test_size: f64,
    },
}

/// Split a parquet path into the directory store root and dataset id
fn dataset_location(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
        anyhow::bail!("Unsupported file format: {} (expected .parquet)", path.display());
    }
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((root, id.to_string()))
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub struct TrainArgs {
    pub data: PathBuf,
    pub date_column: String,
    pub target_column: String,
    pub exclude: Vec<String>,
    pub test_size: f64,
    pub max_memory_mb: usize,
    pub multiple_waterfall_plots: bool,
    pub threads: usize,
    pub output: Option<PathBuf>,
    pub plots_dir: Option<PathBuf>,
}

pub async fn cmd_train(args: TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let (root, dataset_id) = dataset_location(&args.data)?;
    let service = AnalysisService::new(Arc::new(DirectoryStore::new(root))).with_n_threads(args.threads);

    let mut request = AnalysisRequest::new(dataset_id, args.date_column, args.target_column);
    request.exclude_columns = Some(args.exclude);
    request.test_size = args.test_size;
    request.max_memory_mb = args.max_memory_mb;
    request.multiple_waterfall_plots = args.multiple_waterfall_plots;
    request.delete_after_analysis = false;

    step_run(&format!("Training on {}", args.data.display().to_string().cyan()));
    let start = Instant::now();
    let report = service.analyze(request).await?;
    step_done(&format!("{:?}", start.elapsed()));

    print_report(&report);

    if let Some(path) = &args.output {
        step_run(&format!("Saving report → {}", path.display()));
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        step_done("json");
    }

    if let Some(dir) = &args.plots_dir {
        step_run(&format!("Writing plots → {}", dir.display()));
        let written = write_plots(&report, dir)?;
        step_done(&format!("{} files", written));
    }

    println!();
    Ok(())
}

fn print_report(report: &TrainingReport) {
    let metrics = &report.metrics;
    println!();
    let mode = match report.processing_type {
        ProcessingType::Full => "full".to_string(),
        ProcessingType::Chunked => format!(
            "chunked ({} chunks × {} rows)",
            report.chunks_processed.unwrap_or(0),
            report.rows_per_chunk.unwrap_or(0)
        ),
    };
    row("Processing", mode);
    row("Rows", report.total_rows);
    row("Train RMSE", format!("{:.4}", metrics.train_rmse));
    row("Test RMSE", format!("{:.4}", metrics.test_rmse).bold());
    row("Train R²", format!("{:.4}", metrics.train_r2));
    row("Test R²", format!("{:.4}", metrics.test_r2).bold());
    row("Peak memory", format!("{:.1} MB", report.resource_usage.peak_memory_mb));
    row("Time", format!("{:.3}s", report.resource_usage.processing_time_seconds));

    if !report.feature_importance.is_empty() {
        section("Top features");
        for entry in report.feature_importance.iter().take(10) {
            let bar = "█".repeat((entry.importance * 40.0).round() as usize);
            println!("  {:<28} {:>7.4} {}", entry.feature, entry.importance, accent(&bar));
        }
    }

    let plots = &report.shap_plots;
    if let Some(error) = &plots.error {
        println!();
        println!("  {} {}", "explanations failed:".yellow(), error);
    }
    for (key, error) in &plots.errors {
        println!("  {} {}: {}", "plot failed".yellow(), key, error);
    }
}

fn write_plots(report: &TrainingReport, dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir)?;
    let mut written = 0;
    for artifact in Artifact::ALL {
        if let Some(encoded) = report.shap_plots.get(artifact) {
            let svg = STANDARD.decode(encoded)?;
            std::fs::write(dir.join(format!("{}.svg", artifact.key())), svg)?;
            written += 1;
        }
    }
    Ok(written)
}

pub fn cmd_inspect(data_path: &Path, max_memory_mb: usize, test_size: f64) -> anyhow::Result<()> {
    section("Dataset");

    let handle = DatasetHandle::from_path(data_path)?;
    let columns = handle.column_names().to_vec();
    let preview = handle.read_rows(&columns, 0..1)?;

    row("File", data_path.display());
    row("Size", format!("{:.2} MB", handle.size_bytes() as f64 / 1024.0 / 1024.0));
    row("Columns", columns.len());
    println!();
    println!("  {:<28} {}", muted("Column"), muted("Type"));
    println!("  {}", dim(&"─".repeat(40)));
    for column in preview.get_columns() {
        println!(
            "  {:<28} {}",
            column.name().as_str(),
            format!("{:?}", column.dtype()).truecolor(140, 140, 140)
        );
    }

    section("Chunk plan");
    let config = TrainerConfig::default()
        .with_max_memory_mb(max_memory_mb)
        .with_test_size(test_size)
        .from_env_overrides();
    let outcome = ChunkPlanner::new(&config).plan(&handle, &columns);
    let plan = &outcome.plan;

    row("Total rows", describe(&outcome.total_rows));
    row("Rows per chunk", describe(&outcome.rows_per_chunk));
    row("Train rows", plan.train_rows);
    row("Test rows", plan.test_rows);
    if plan.use_chunking {
        row("Mode", format!("chunked, {} chunks", plan.num_chunks).cyan());
        for (k, range) in plan.chunk_ranges().iter().enumerate() {
            println!("    {} {:>3}  {:?}", dim("chunk"), k, range);
        }
        println!("    {} {:?}", dim("test "), plan.test_range());
    } else {
        row("Mode", "full batch".green());
    }

    println!();
    Ok(())
}

fn describe(estimate: &Estimate<usize>) -> String {
    match estimate {
        Estimate::Measured(v) => v.to_string(),
        Estimate::Degraded { value, reason } => format!("{} {}", value, dim(&format!("(fallback: {})", reason))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_location_splits_path() {
        let (root, id) = dataset_location(Path::new("/data/sales.parquet")).unwrap();
        assert_eq!(root, PathBuf::from("/data"));
        assert_eq!(id, "sales");

        let (root, id) = dataset_location(Path::new("sales.parquet")).unwrap();
        assert_eq!(root, PathBuf::from("."));
        assert_eq!(id, "sales");
    }

    #[test]
    fn test_dataset_location_rejects_csv() {
        assert!(dataset_location(Path::new("sales.csv")).is_err());
    }

    #[test]
    fn test_cli_parses_train() {
        let cli = Cli::try_parse_from([
            "memboost",
            "train",
            "--data",
            "d.parquet",
            "--date-column",
            "Date",
            "--target-column",
            "Sales",
            "--exclude",
            "a,b",
            "--no-waterfalls",
        ])
        .unwrap();
        match cli.command {
            Commands::Train { exclude, no_waterfalls, test_size, .. } => {
                assert_eq!(exclude, vec!["a", "b"]);
                assert!(no_waterfalls);
                assert!((test_size - 0.2).abs() < 1e-12);
            }
            _ => panic!("expected train"),
        }
    }
}
