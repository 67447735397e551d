// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Bootstrap confidence intervals over joined documents
//!
//! Documents are resampled with replacement and every headline statistic is
//! recomputed on each resample. Bounds are the 2.5th and 97.5th percentiles.
//! The generator is seeded, so a given seed always reproduces the same
//! intervals.

use crate::agreement::{cohen_kappa, percent_agreement};
use crate::error::{EvalError, Result};
use crate::spans::SpanCounts;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Everything scored for one joined document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub doc_id: String,
    /// (gold, predicted) stage-0 relevance
    pub relevant: (bool, bool),
    /// Stage-1 span counts for this document
    pub spans: SpanCounts,
    /// (gold, predicted) stage-2 label
    pub label: (String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub resamples: usize,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resamples: 1000,
            seed: 42,
        }
    }
}

/// Point estimate with a 95% percentile interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    /// Formats as "estimate [lower, upper]".
    pub fn format(&self, precision: usize) -> String {
        format!(
            "{:.prec$} [{:.prec$}, {:.prec$}]",
            self.estimate,
            self.lower,
            self.upper,
            prec = precision
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub resamples: usize,
    pub seed: u64,
    pub stage0_kappa: Interval,
    pub stage1_f1: Interval,
    pub stage2_percent_agreement: Interval,
    pub stage2_kappa: Interval,
}

struct Statistics {
    stage0_kappa: f64,
    stage1_f1: f64,
    stage2_agreement: f64,
    stage2_kappa: f64,
}

fn statistics<'a>(docs: impl Iterator<Item = &'a DocumentOutcome>) -> Result<Statistics> {
    let mut gold0 = Vec::new();
    let mut pred0 = Vec::new();
    let mut gold2 = Vec::new();
    let mut pred2 = Vec::new();
    let mut counts = SpanCounts::default();

    for doc in docs {
        gold0.push(doc.relevant.0);
        pred0.push(doc.relevant.1);
        gold2.push(doc.label.0.as_str());
        pred2.push(doc.label.1.as_str());
        counts += doc.spans;
    }

    Ok(Statistics {
        stage0_kappa: cohen_kappa(&gold0, &pred0)?,
        stage1_f1: counts.f1_score(),
        stage2_agreement: percent_agreement(&gold2, &pred2)?,
        stage2_kappa: cohen_kappa(&gold2, &pred2)?,
    })
}

fn interval(estimate: f64, mut samples: Vec<f64>) -> Interval {
    samples.sort_by(f64::total_cmp);
    let n = samples.len();
    let lower_idx = ((n as f64) * 0.025) as usize;
    let upper_idx = ((n as f64) * 0.975) as usize;
    Interval {
        estimate,
        lower: samples[lower_idx.min(n - 1)],
        upper: samples[upper_idx.min(n - 1)],
    }
}

/// Resample `outcomes` and report intervals for the headline statistics.
pub fn bootstrap_intervals(outcomes: &[DocumentOutcome], config: &BootstrapConfig) -> Result<BootstrapSummary> {
    if config.resamples == 0 {
        return Err(EvalError::InvalidConfig("bootstrap needs at least one resample".to_string()));
    }
    if outcomes.is_empty() {
        return Err(EvalError::InvalidConfig("bootstrap needs at least one document".to_string()));
    }

    let point = statistics(outcomes.iter())?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let n = outcomes.len();

    let mut stage0_kappa = Vec::with_capacity(config.resamples);
    let mut stage1_f1 = Vec::with_capacity(config.resamples);
    let mut stage2_agreement = Vec::with_capacity(config.resamples);
    let mut stage2_kappa = Vec::with_capacity(config.resamples);

    for _ in 0..config.resamples {
        let picks: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let stats = statistics(picks.iter().map(|&i| &outcomes[i]))?;
        stage0_kappa.push(stats.stage0_kappa);
        stage1_f1.push(stats.stage1_f1);
        stage2_agreement.push(stats.stage2_agreement);
        stage2_kappa.push(stats.stage2_kappa);
    }

    tracing::debug!("Bootstrap: {} resamples of {} documents (seed {})", config.resamples, n, config.seed);

    Ok(BootstrapSummary {
        resamples: config.resamples,
        seed: config.seed,
        stage0_kappa: interval(point.stage0_kappa, stage0_kappa),
        stage1_f1: interval(point.stage1_f1, stage1_f1),
        stage2_percent_agreement: interval(point.stage2_agreement, stage2_agreement),
        stage2_kappa: interval(point.stage2_kappa, stage2_kappa),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: usize, relevant: (bool, bool), tp: usize, label: (&str, &str)) -> DocumentOutcome {
        DocumentOutcome {
            doc_id: format!("d{id}"),
            relevant,
            spans: SpanCounts { tp, fp: 1 - tp.min(1), fn_: 0 },
            label: (label.0.to_string(), label.1.to_string()),
        }
    }

    fn sample() -> Vec<DocumentOutcome> {
        (0..20)
            .map(|i| {
                let agree = i % 4 != 0;
                let gold_label = if i % 2 == 0 { "A" } else { "B" };
                let pred_label = if agree { gold_label } else { "C" };
                outcome(i, (i % 3 == 0, agree == (i % 3 == 0)), usize::from(agree), (gold_label, pred_label))
            })
            .collect()
    }

    #[test]
    fn test_same_seed_reproducible() {
        let docs = sample();
        let config = BootstrapConfig { resamples: 200, seed: 7 };
        let a = bootstrap_intervals(&docs, &config).unwrap();
        let b = bootstrap_intervals(&docs, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bounds_ordered() {
        let summary = bootstrap_intervals(&sample(), &BootstrapConfig::default()).unwrap();
        for iv in [
            summary.stage0_kappa,
            summary.stage1_f1,
            summary.stage2_percent_agreement,
            summary.stage2_kappa,
        ] {
            assert!(iv.lower <= iv.upper, "{iv:?}");
        }
        assert!((summary.stage2_percent_agreement.estimate - 0.75).abs() < 1e-12);
        assert!(summary.stage2_percent_agreement.lower <= 0.75);
        assert!(summary.stage2_percent_agreement.upper >= 0.75);
    }

    #[test]
    fn test_zero_resamples_rejected() {
        let config = BootstrapConfig { resamples: 0, seed: 1 };
        assert!(matches!(bootstrap_intervals(&sample(), &config), Err(EvalError::InvalidConfig(_))));
    }

    #[test]
    fn test_interval_format() {
        let iv = Interval { estimate: 0.5, lower: 0.25, upper: 0.75 };
        assert_eq!(iv.format(2), "0.50 [0.25, 0.75]");
    }
}
