// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stage-2 document classification scoring

use crate::agreement::{percent_agreement, LabelConfusion};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Label x label counts, rows = gold (human), columns = predicted (model).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn row_total(&self, row: usize) -> usize {
        self.matrix.get(row).map_or(0, |r| r.iter().sum())
    }

    pub fn col_total(&self, col: usize) -> usize {
        self.matrix.iter().filter_map(|r| r.get(col)).sum()
    }

    pub fn trace(&self) -> usize {
        self.matrix.iter().enumerate().filter_map(|(i, r)| r.get(i)).sum()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }
}

/// Agreement summary for the final classification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationScore {
    pub n: usize,
    pub percent_agreement: f64,
    pub cohen_kappa: f64,
    pub confusion_matrix: ConfusionMatrix,
}

/// Score parallel gold and predicted class labels.
pub fn score_labels(gold: &[String], pred: &[String]) -> Result<ClassificationScore> {
    let cm = LabelConfusion::from_pairs(gold, pred)?;
    let cohen_kappa = cm.kappa();
    let (labels, matrix) = cm.into_parts();

    Ok(ClassificationScore {
        n: gold.len(),
        percent_agreement: percent_agreement(gold, pred)?,
        cohen_kappa,
        confusion_matrix: ConfusionMatrix { labels, matrix },
    })
}
