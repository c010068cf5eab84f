//! Examforge pipeline CLI

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use examforge::config::PipelineConfig;
use examforge::ocr::volc::VolcOcrClient;
use examforge::pipeline::{PipelineContext, detect, ingest, merge, tables};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "examforge")]
#[command(about = "Digitize scanned exam booklets into a structured question corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "examforge.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipeline phases
    Run {
        /// Phases to run: a single phase ("2") or an inclusive range ("1-4")
        #[arg(short, long, default_value = "1-4")]
        phase: String,

        /// First page to ingest (inclusive)
        #[arg(long)]
        start: Option<u32>,

        /// Last page to ingest (inclusive)
        #[arg(long)]
        end: Option<u32>,

        /// List planned work without calling the OCR service
        #[arg(long)]
        dry_run: bool,
    },

    /// Render the distribution markdown from the final corpus
    Render,

    /// Print the final corpus metadata and validation warnings
    Status,
}

/// Parse "2" or "1-4" into an inclusive phase range.
fn parse_phase_range(arg: &str) -> anyhow::Result<(u8, u8)> {
    let parse_one = |s: &str| -> anyhow::Result<u8> {
        let n: u8 = s.trim().parse().with_context(|| format!("invalid phase '{s}'"))?;
        if !(1..=4).contains(&n) {
            bail!("phase must be between 1 and 4, got {n}");
        }
        Ok(n)
    };
    match arg.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (parse_one(lo)?, parse_one(hi)?);
            if lo > hi {
                bail!("invalid phase range '{arg}'");
            }
            Ok((lo, hi))
        }
        None => {
            let n = parse_one(arg)?;
            Ok((n, n))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_toml_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { phase, start, end, dry_run } => {
            let (first, last) = parse_phase_range(&phase)?;
            let client = Arc::new(VolcOcrClient::new(&config)?);
            let ctx = PipelineContext::new(config, client)?;

            for phase in first..=last {
                match phase {
                    1 => {
                        info!("phase 1: batch OCR ingestion");
                        let options = ingest::IngestOptions { start_page: start, end_page: end, dry_run };
                        let report = ingest::run_ingest(&ctx, options).await?;
                        println!(
                            "phase 1: {} ok, {} failed of {} pages",
                            report.success_count, report.fail_count, report.total_items
                        );
                    }
                    2 => {
                        info!("phase 2: table detection");
                        let report = detect::run_detection(&ctx)?;
                        println!(
                            "phase 2: {} table pages in {} groups",
                            report.table_page_count, report.table_group_count
                        );
                    }
                    3 => {
                        info!("phase 3: structured table parsing");
                        let report = tables::run_table_parse(&ctx).await?;
                        println!(
                            "phase 3: {} ok, {} failed of {} groups",
                            report.success_count, report.fail_count, report.total_items
                        );
                    }
                    4 => {
                        info!("phase 4: reconciliation and corpus assembly");
                        let corpus = merge::run_merge(&ctx)?;
                        println!(
                            "phase 4: {} pages, {} exams, {} warnings",
                            corpus.metadata.total_pages,
                            corpus.metadata.exam_count,
                            corpus.validation_warnings.len()
                        );
                    }
                    _ => unreachable!(),
                }
            }
        }

        Commands::Render => {
            let client = Arc::new(VolcOcrClient::new(&config)?);
            let ctx = PipelineContext::new(config, client)?;
            merge::run_render(&ctx)?;
            println!(
                "standard markdown written to {}",
                ctx.config.paths.standard_markdown_file().display()
            );
        }

        Commands::Status => {
            let path = config.paths.final_output_file();
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("no final corpus at {}; run the pipeline first", path.display()))?;
            let corpus: examforge::Corpus = serde_json::from_str(&content)?;
            println!("source:       {}", corpus.metadata.source);
            println!("created:      {}", corpus.metadata.created_at);
            println!("pages:        {}", corpus.metadata.total_pages);
            println!(
                "table pages:  {} ({} detected)",
                corpus.metadata.table_pages, corpus.metadata.detected_table_pages
            );
            println!("exams:        {}", corpus.metadata.exam_count);
            for exam in &corpus.exams {
                println!("  {} — {} ({} sections)", exam.exam_id, exam.title, exam.sections.len());
            }
            if corpus.validation_warnings.is_empty() {
                println!("warnings:     none");
            } else {
                println!("warnings:     {}", corpus.validation_warnings.len());
                for w in &corpus.validation_warnings {
                    println!("  page {}: {}", w.page, w.warning);
                }
            }
        }
    }

    Ok(())
}
