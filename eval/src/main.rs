// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Annotation agreement CLI
//!
//! Usage:
//!   eval-annotations --gold human.jsonl --pred model.jsonl
//!   eval-annotations --gold human.jsonl --pred model.jsonl --iou 0.3 --per_code --bootstrap 1000

use anyhow::{Context, Result};
use annotation_eval::bootstrap::BootstrapConfig;
use annotation_eval::pipeline::{EvaluationConfig, EvaluationPipeline};
use annotation_eval::spans::MatchStrategy;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eval-annotations")]
#[command(about = "Score model annotations against a human gold standard")]
#[command(version)]
struct Args {
    /// Gold (human) annotations, one JSON record per line
    #[arg(long)]
    gold: PathBuf,

    /// Predicted (model) annotations, one JSON record per line
    #[arg(long)]
    pred: PathBuf,

    /// Minimum IoU for a predicted span to match a gold span
    #[arg(long, default_value_t = 0.5)]
    iou: f64,

    /// Output path for the JSON result
    #[arg(long = "out_json", default_value = "eval_result.json")]
    out_json: PathBuf,

    /// Output path for the text report
    #[arg(long = "out_txt", default_value = "eval_report.txt")]
    out_txt: PathBuf,

    /// Also write the stage-2 confusion matrix as CSV
    #[arg(long = "out_csv")]
    out_csv: Option<PathBuf>,

    /// Span matching strategy (greedy, optimal)
    #[arg(long, default_value = "greedy")]
    matching: MatchStrategy,

    /// Break stage-1 scores down by category code
    #[arg(long = "per_code")]
    per_code: bool,

    /// Number of bootstrap resamples for confidence intervals (off when absent)
    #[arg(long)]
    bootstrap: Option<usize>,

    /// Random seed for bootstrap resampling
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("Annotation Agreement Evaluation");
    tracing::info!("Gold: {}", args.gold.display());
    tracing::info!("Pred: {}", args.pred.display());
    let config = EvaluationConfig {
        iou_threshold: args.iou,
        gold_path: args.gold,
        pred_path: args.pred,
        out_json_path: args.out_json,
        out_txt_path: args.out_txt,
        out_csv_path: args.out_csv,
        matching: args.matching,
        per_code: args.per_code,
        bootstrap: args.bootstrap.map(|resamples| BootstrapConfig {
            resamples,
            seed: args.seed,
        }),
    };

    let pipeline = EvaluationPipeline::new(config);
    tracing::info!(
        "IoU threshold: {} ({} matching)",
        pipeline.config().iou_threshold,
        pipeline.config().matching
    );
    let result = pipeline.run().context("evaluation failed")?;

    println!(
        "Docs: {} | Stage 0 kappa {:.2} | Stage 1 F1 {:.2} | Stage 2 kappa {:.2}",
        result.n_docs, result.stage0.cohen_kappa, result.stage1.f1, result.stage2.cohen_kappa
    );

    let saved = pipeline
        .save_results(&result)
        .context("failed to write evaluation outputs")?;
    for path in saved {
        println!("Saved: {}", path.display());
    }

    Ok(())
}
