// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Two-rater agreement statistics
//!
//! Implements:
//! - Percent agreement
//! - Multiclass Cohen's kappa
//! - Label x label confusion counts shared by kappa and stage-2 reporting
//!
//! All functions work over parallel sequences of any ordered label type, so
//! stage-0 booleans and stage-2 class strings go through the same code.

use crate::error::{EvalError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Denominator substituted when `1 - pe == 0`.
///
/// Kappa is then `(po - pe) / 1e-12`: large but finite when the raters do
/// not fully agree, and exactly zero when they do.
pub const KAPPA_EPSILON: f64 = 1e-12;

fn check_lengths<A, B>(y_true: &[A], y_pred: &[B]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(EvalError::LengthMismatch {
            left: y_true.len(),
            right: y_pred.len(),
        });
    }
    Ok(())
}

/// Fraction of positions where both raters chose the same label.
///
/// Empty input yields `0.0`.
pub fn percent_agreement<T: PartialEq>(y_true: &[T], y_pred: &[T]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    if y_true.is_empty() {
        return Ok(0.0);
    }
    let agree = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    Ok(agree as f64 / y_true.len() as f64)
}

/// Multiclass Cohen's kappa over the labels observed in either sequence.
pub fn cohen_kappa<T: Ord + Clone>(y_true: &[T], y_pred: &[T]) -> Result<f64> {
    let cm = LabelConfusion::from_pairs(y_true, y_pred)?;
    Ok(cm.kappa())
}

/// Confusion counts indexed by the sorted union of observed labels.
///
/// Rows are the gold rater, columns the predicted rater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConfusion<T> {
    labels: Vec<T>,
    matrix: Vec<Vec<usize>>,
}

impl<T: Ord + Clone> LabelConfusion<T> {
    /// Count label pairs position by position.
    pub fn from_pairs(y_true: &[T], y_pred: &[T]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let labels: Vec<T> = y_true
            .iter()
            .chain(y_pred)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&T, usize> = labels.iter().enumerate().map(|(i, l)| (l, i)).collect();

        let n = labels.len();
        let mut matrix = vec![vec![0usize; n]; n];
        for (a, b) in y_true.iter().zip(y_pred) {
            // Both labels were inserted above.
            matrix[index[a]][index[b]] += 1;
        }

        Ok(Self { labels, matrix })
    }
}

impl<T> LabelConfusion<T> {
    pub fn labels(&self) -> &[T] {
        &self.labels
    }

    pub fn matrix(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<Vec<usize>>) {
        (self.labels, self.matrix)
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn trace(&self) -> usize {
        (0..self.labels.len()).map(|i| self.matrix[i][i]).sum()
    }

    /// Per-label gold counts.
    pub fn row_totals(&self) -> Vec<usize> {
        self.matrix.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-label predicted counts.
    pub fn col_totals(&self) -> Vec<usize> {
        let n = self.labels.len();
        (0..n).map(|j| self.matrix.iter().map(|row| row[j]).sum()).collect()
    }

    /// Observed agreement `po`; a zero total counts as one observation.
    pub fn observed_agreement(&self) -> f64 {
        self.trace() as f64 / self.total().max(1) as f64
    }

    /// Chance agreement `pe` from the row and column marginals.
    pub fn expected_agreement(&self) -> f64 {
        let total = self.total().max(1) as f64;
        let chance: f64 = self
            .row_totals()
            .iter()
            .zip(self.col_totals())
            .map(|(r, c)| (*r as f64) * (c as f64))
            .sum();
        chance / (total * total)
    }

    /// Cohen's kappa `(po - pe) / (1 - pe)`, with [`KAPPA_EPSILON`] as the
    /// denominator when `1 - pe` is exactly zero.
    pub fn kappa(&self) -> f64 {
        let po = self.observed_agreement();
        let pe = self.expected_agreement();
        let denom = if 1.0 - pe != 0.0 { 1.0 - pe } else { KAPPA_EPSILON };
        (po - pe) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_agreement_basic() {
        let a = vec!["x", "y", "x", "z"];
        let b = vec!["x", "y", "y", "z"];
        assert!((percent_agreement(&a, &b).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_percent_agreement_empty() {
        let empty: Vec<bool> = vec![];
        assert_eq!(percent_agreement(&empty, &empty).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = percent_agreement(&[true], &[true, false]).unwrap_err();
        assert!(matches!(err, EvalError::LengthMismatch { left: 1, right: 2 }));
        assert!(cohen_kappa(&[1, 2, 3], &[1]).is_err());
    }

    #[test]
    fn test_kappa_perfect_agreement_two_classes() {
        let a = vec![true, false, true, false];
        assert!((cohen_kappa(&a, &a).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kappa_known_value() {
        // po = 0.7, pe = (5*6 + 5*4)/100 = 0.5, kappa = 0.4
        let gold = vec![1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
        let pred = vec![1, 1, 1, 1, 0, 1, 1, 0, 0, 0];
        let cm = LabelConfusion::from_pairs(&gold, &pred).unwrap();
        assert!((cm.observed_agreement() - 0.7).abs() < 1e-12);
        assert!((cm.expected_agreement() - 0.5).abs() < 1e-12);
        assert!((cm.kappa() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_kappa_single_label_uses_epsilon() {
        // pe == 1 and po == 1: numerator is exactly zero.
        let a = vec!["A", "A", "A"];
        assert_eq!(cohen_kappa(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_kappa_empty_is_zero() {
        let empty: Vec<String> = vec![];
        assert_eq!(cohen_kappa(&empty, &empty).unwrap(), 0.0);
    }

    #[test]
    fn test_kappa_systematic_disagreement_is_negative() {
        let gold = vec![true, true, false, false];
        let pred = vec![false, false, true, true];
        assert!((cohen_kappa(&gold, &pred).unwrap() - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_labels_sorted_union() {
        let gold = vec!["b", "a", "b"];
        let pred = vec!["c", "a", "b"];
        let cm = LabelConfusion::from_pairs(&gold, &pred).unwrap();
        assert_eq!(cm.labels(), &["a", "b", "c"]);
        assert_eq!(cm.matrix(), &[vec![1, 0, 0], vec![0, 1, 1], vec![0, 0, 0]]);
        assert_eq!(cm.row_totals(), vec![1, 2, 0]);
        assert_eq!(cm.col_totals(), vec![1, 1, 1]);
        assert_eq!(cm.trace(), 2);
        assert_eq!(cm.total(), 3);
    }
}
