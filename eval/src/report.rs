// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Report rendering
//!
//! The text report has a fixed block layout (document count, one block per
//! stage, then the stage-2 confusion matrix). Optional per-code and
//! bootstrap blocks are appended only when those sections are present in
//! the result, so the default report never changes shape.

use crate::classification::ConfusionMatrix;
use crate::error::Result;
use crate::pipeline::EvaluationResult;

/// Minimum confusion-matrix column width.
const MIN_COL_WIDTH: usize = 10;

/// Pretty JSON (two-space indent) of the full result.
pub fn to_json(result: &EvaluationResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Shortest round-trip form, always with a fractional part ("0.5", "1.0").
/// Magnitudes below 1e-4 or from 1e16 up switch to scientific notation with a
/// signed two-digit exponent ("1e-05", "2.5e+16").
pub fn format_threshold(value: f64) -> String {
    let sci = format!("{:e}", value);
    if let Some((mantissa, exp)) = sci.split_once('e') {
        if let Ok(exp) = exp.parse::<i32>() {
            if value != 0.0 && !(-4..16).contains(&exp) {
                let sign = if exp < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exp.abs());
            }
        }
    }

    let s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

fn column_width(labels: &[String]) -> usize {
    labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_COL_WIDTH)
}

/// Fixed-width confusion matrix: a header line followed by one line per gold label.
pub fn confusion_table(cm: &ConfusionMatrix) -> Vec<String> {
    let w = column_width(&cm.labels);
    let mut lines = Vec::with_capacity(cm.labels.len() + 1);

    let header_cells: Vec<String> = cm.labels.iter().map(|l| format!("{:>w$}", l)).collect();
    lines.push(format!("{} | {} |", " ".repeat(w + 2), header_cells.join(" | ")));

    for (label, row) in cm.labels.iter().zip(&cm.matrix) {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>w$}", v)).collect();
        let row_total: usize = row.iter().sum();
        lines.push(format!("{:>w$}  | {} |   (n={})", label, cells.join(" | "), row_total));
    }

    lines
}

/// Render the plain-text report.
pub fn render_text(result: &EvaluationResult) -> String {
    let s0 = &result.stage0;
    let s1 = &result.stage1;
    let s2 = &result.stage2;

    let mut lines = vec![
        format!("Docs: {}", result.n_docs),
        String::new(),
        "Stage 0 — Relevance".to_string(),
        format!("  Percent agreement: {:.2}", s0.percent_agreement),
        format!("  Cohen's kappa:    {:.2}", s0.cohen_kappa),
        String::new(),
        "Stage 1 — Feature extraction (span, micro-avg)".to_string(),
        format!("  Precision: {:.2}", s1.precision),
        format!("  Recall:    {:.2}", s1.recall),
        format!("  F1:        {:.2}", s1.f1),
        format!(
            "  (tp={}, fp={}, fn={}, IoU≥{})",
            s1.tp,
            s1.fp,
            s1.fn_,
            format_threshold(s1.iou_thresh)
        ),
        String::new(),
        "Stage 2 — Final classification".to_string(),
        format!("  Percent agreement: {:.2}", s2.percent_agreement),
        format!("  Cohen's kappa:     {:.2}", s2.cohen_kappa),
        String::new(),
        "  Confusion matrix (rows=human, cols=LLM)".to_string(),
    ];
    lines.extend(confusion_table(&s2.confusion_matrix).into_iter().map(|l| format!("  {}", l)));

    if let Some(per_code) = &s1.per_code {
        let codes: Vec<String> = per_code.keys().cloned().collect();
        let w = column_width(&codes);
        lines.push(String::new());
        lines.push("Stage 1 — Per-code breakdown".to_string());
        for (code, score) in per_code {
            lines.push(format!(
                "  {:>w$}  P={:.2} R={:.2} F1={:.2}  (tp={}, fp={}, fn={})",
                code, score.precision, score.recall, score.f1, score.tp, score.fp, score.fn_
            ));
        }
    }

    if let Some(boot) = &result.bootstrap {
        lines.push(String::new());
        lines.push(format!(
            "Bootstrap 95% intervals ({} resamples, seed {})",
            boot.resamples, boot.seed
        ));
        lines.push(format!("  Stage 0 kappa:             {}", boot.stage0_kappa.format(2)));
        lines.push(format!("  Stage 1 F1:                {}", boot.stage1_f1.format(2)));
        lines.push(format!("  Stage 2 percent agreement: {}", boot.stage2_percent_agreement.format(2)));
        lines.push(format!("  Stage 2 kappa:             {}", boot.stage2_kappa.format(2)));
    }

    lines.join("\n")
}

/// Confusion matrix as CSV: a `gold\pred` corner cell, predicted labels
/// across, one row per gold label.
pub fn confusion_csv(cm: &ConfusionMatrix) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["gold\\pred".to_string()];
    header.extend(cm.labels.iter().cloned());
    writer.write_record(&header)?;

    for (label, row) in cm.labels.iter().zip(&cm.matrix) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
