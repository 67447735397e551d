// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible evaluation pipeline for three-stage annotations
//!
//! Orchestrates:
//! - Loading gold and predicted record sets
//! - Aligning documents by `doc_id` (sorted intersection)
//! - Stage 0 relevance agreement
//! - Stage 1 span matching, micro-averaged
//! - Stage 2 classification agreement and confusion matrix
//! - Optional bootstrap intervals
//! - Results serialization
//!
//! Outputs are only written after every stage has been scored, so a fatal
//! error leaves no partial files behind.

use crate::agreement::{cohen_kappa, percent_agreement};
use crate::bootstrap::{bootstrap_intervals, BootstrapConfig, BootstrapSummary, DocumentOutcome};
use crate::classification::{score_labels, ClassificationScore};
use crate::error::{EvalError, Result};
use crate::records::DocumentRecordSet;
use crate::report;
use crate::spans::{align_spans, per_code_counts, MatchStrategy, SpanCounts, DEFAULT_IOU_THRESHOLD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Configuration for the evaluation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Minimum IoU for a span pair to match
    pub iou_threshold: f64,
    /// Gold (human) annotations, NDJSON
    pub gold_path: PathBuf,
    /// Predicted (model) annotations, NDJSON
    pub pred_path: PathBuf,
    /// Structured result
    pub out_json_path: PathBuf,
    /// Plain-text report
    pub out_txt_path: PathBuf,
    /// Stage-2 confusion matrix as CSV
    pub out_csv_path: Option<PathBuf>,
    /// Span pairing strategy
    pub matching: MatchStrategy,
    /// Report stage-1 counts per category code
    pub per_code: bool,
    /// Bootstrap confidence intervals
    pub bootstrap: Option<BootstrapConfig>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            gold_path: PathBuf::from("gold.jsonl"),
            pred_path: PathBuf::from("pred.jsonl"),
            out_json_path: PathBuf::from("eval_result.json"),
            out_txt_path: PathBuf::from("eval_report.txt"),
            out_csv_path: None,
            matching: MatchStrategy::Greedy,
            per_code: false,
            bootstrap: None,
        }
    }
}

impl EvaluationConfig {
    /// Reject settings no evaluation can run with.
    pub fn validate(&self) -> Result<()> {
        if !self.iou_threshold.is_finite() || !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(EvalError::InvalidConfig(format!(
                "IoU threshold must lie in [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.resamples == 0 {
                return Err(EvalError::InvalidConfig("bootstrap resamples must be positive".to_string()));
            }
        }
        Ok(())
    }
}

/// Stage 0: relevance agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub n: usize,
    pub percent_agreement: f64,
    pub cohen_kappa: f64,
}

/// Precision / recall / F1 with the raw counts behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl From<SpanCounts> for CodeScore {
    fn from(counts: SpanCounts) -> Self {
        Self {
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1_score(),
            tp: counts.tp,
            fp: counts.fp,
            fn_: counts.fn_,
        }
    }
}

/// Stage 1: micro-averaged span extraction scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub iou_thresh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_code: Option<BTreeMap<String, CodeScore>>,
}

impl SpanScore {
    fn from_counts(counts: SpanCounts, iou_thresh: f64) -> Self {
        Self {
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1_score(),
            tp: counts.tp,
            fp: counts.fp,
            fn_: counts.fn_,
            iou_thresh,
            per_code: None,
        }
    }

    pub fn counts(&self) -> SpanCounts {
        SpanCounts {
            tp: self.tp,
            fp: self.fp,
            fn_: self.fn_,
        }
    }
}

/// Complete evaluation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub n_docs: usize,
    pub stage0: RelevanceScore,
    pub stage1: SpanScore,
    pub stage2: ClassificationScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapSummary>,
}

/// Score `pred` against `gold` over their shared documents.
pub fn evaluate(gold: &DocumentRecordSet, pred: &DocumentRecordSet, config: &EvaluationConfig) -> Result<EvaluationResult> {
    let keys = gold.shared_ids(pred);
    if keys.is_empty() {
        return Err(EvalError::EmptyIntersection {
            gold: gold.len(),
            pred: pred.len(),
        });
    }

    let gold_only = gold.len() - keys.len();
    let pred_only = pred.len() - keys.len();
    tracing::info!("Joined {} documents ({} gold-only, {} prediction-only)", keys.len(), gold_only, pred_only);

    // Every key came from the intersection.
    let pairs: Vec<_> = keys
        .iter()
        .filter_map(|k| Some((*k, gold.get(k)?, pred.get(k)?)))
        .collect();

    // Stage 0
    let relevance = pairs
        .iter()
        .map(|(_, g, p)| -> Result<(bool, bool)> { Ok((g.relevant()?, p.relevant()?)) })
        .collect::<Result<Vec<_>>>()?;
    let (y0_true, y0_pred): (Vec<bool>, Vec<bool>) = relevance.iter().copied().unzip();
    let stage0 = RelevanceScore {
        n: keys.len(),
        percent_agreement: percent_agreement(&y0_true, &y0_pred)?,
        cohen_kappa: cohen_kappa(&y0_true, &y0_pred)?,
    };
    tracing::info!(
        "  Stage 0 - Agreement: {:.4}, Kappa: {:.4}",
        stage0.percent_agreement,
        stage0.cohen_kappa
    );

    // Stage 1
    let mut total = SpanCounts::default();
    let mut by_code: BTreeMap<String, SpanCounts> = BTreeMap::new();
    let mut doc_counts = Vec::with_capacity(pairs.len());
    for (doc_id, g, p) in &pairs {
        let (gold_spans, pred_spans) = (g.spans(), p.spans());
        let aligned = align_spans(gold_spans, pred_spans, config.iou_threshold, config.matching);
        let counts = SpanCounts::from_totals(aligned.len(), pred_spans.len(), gold_spans.len());
        tracing::trace!("{}: tp={} fp={} fn={}", doc_id, counts.tp, counts.fp, counts.fn_);

        if config.per_code {
            for (code, c) in per_code_counts(gold_spans, pred_spans, &aligned) {
                *by_code.entry(code).or_default() += c;
            }
        }
        total += counts;
        doc_counts.push(counts);
    }
    let mut stage1 = SpanScore::from_counts(total, config.iou_threshold);
    if config.per_code {
        stage1.per_code = Some(by_code.into_iter().map(|(code, c)| (code, c.into())).collect());
    }
    tracing::info!(
        "  Stage 1 - P: {:.4}, R: {:.4}, F1: {:.4} ({} matching)",
        stage1.precision,
        stage1.recall,
        stage1.f1,
        config.matching
    );

    // Stage 2
    let labels = pairs
        .iter()
        .map(|(_, g, p)| -> Result<(String, String)> { Ok((g.label()?.to_string(), p.label()?.to_string())) })
        .collect::<Result<Vec<_>>>()?;
    let (y2_true, y2_pred): (Vec<String>, Vec<String>) = labels.iter().cloned().unzip();
    let stage2 = score_labels(&y2_true, &y2_pred)?;
    tracing::info!(
        "  Stage 2 - Agreement: {:.4}, Kappa: {:.4}, {} labels",
        stage2.percent_agreement,
        stage2.cohen_kappa,
        stage2.confusion_matrix.labels.len()
    );

    let bootstrap = match &config.bootstrap {
        Some(bootstrap_config) => {
            let outcomes: Vec<DocumentOutcome> = keys
                .iter()
                .zip(relevance)
                .zip(doc_counts)
                .zip(labels)
                .map(|(((doc_id, relevant), spans), label)| DocumentOutcome {
                    doc_id: doc_id.to_string(),
                    relevant,
                    spans,
                    label,
                })
                .collect();
            Some(bootstrap_intervals(&outcomes, bootstrap_config)?)
        }
        None => None,
    };

    Ok(EvaluationResult {
        n_docs: keys.len(),
        stage0,
        stage1,
        stage2,
        bootstrap,
    })
}

/// SHA-256 of a file's contents, hex encoded.
pub fn fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| EvalError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Main evaluation pipeline
pub struct EvaluationPipeline {
    config: EvaluationConfig,
}

impl EvaluationPipeline {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Load both record sets and score them.
    pub fn run(&self) -> Result<EvaluationResult> {
        self.config.validate()?;

        let gold = DocumentRecordSet::load(&self.config.gold_path)?;
        let pred = DocumentRecordSet::load(&self.config.pred_path)?;
        tracing::info!("{} sha256: {}", gold.source(), fingerprint(&self.config.gold_path)?);
        tracing::info!("{} sha256: {}", pred.source(), fingerprint(&self.config.pred_path)?);

        evaluate(&gold, &pred, &self.config)
    }

    /// Write the JSON result, text report and optional CSV.
    ///
    /// Everything is rendered before the first file is created.
    pub fn save_results(&self, result: &EvaluationResult) -> Result<Vec<PathBuf>> {
        let mut outputs = vec![
            (self.config.out_json_path.clone(), report::to_json(result)?),
            (self.config.out_txt_path.clone(), report::render_text(result)),
        ];
        if let Some(csv_path) = &self.config.out_csv_path {
            outputs.push((csv_path.clone(), report::confusion_csv(&result.stage2.confusion_matrix)?));
        }

        let mut saved = Vec::with_capacity(outputs.len());
        for (path, contents) in outputs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
            std::fs::write(&path, contents).map_err(|e| EvalError::io(&path, e))?;
            tracing::info!("Saved {}", path.display());
            saved.push(path);
        }
        Ok(saved)
    }
}
