// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stage-1 span matching
//!
//! A predicted span counts as a true positive when it is paired with a gold
//! span of the same code whose IoU reaches the threshold. Each gold span can
//! be claimed at most once. Leftover predictions are false positives and
//! leftover gold spans false negatives.
//!
//! Two pairing strategies:
//! - [`MatchStrategy::Greedy`] (default): predictions in input order, each
//!   claiming its best unclaimed candidate. Order dependent.
//! - [`MatchStrategy::Optimal`]: Hungarian assignment maximising the number
//!   of pairs, then their total IoU.

use crate::records::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

/// Default IoU a pair must reach to count as a match.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Intersection-over-Union of two half-open intervals.
///
/// Disjoint or touching intervals give `0.0`, as does a zero-length union.
/// Offsets are widened to `i128`, so any pair of `i64` bounds is safe.
pub fn iou(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> f64 {
    let (a_start, a_end, b_start, b_end) = (a_start as i128, a_end as i128, b_start as i128, b_end as i128);
    let inter = (a_end.min(b_end) - a_start.max(b_start)).max(0);
    let union = a_end.max(b_end) - a_start.min(b_start);
    if union == 0 {
        return 0.0;
    }
    inter as f64 / union as f64
}

/// IoU between two spans, ignoring their codes.
pub fn span_iou(a: &Span, b: &Span) -> f64 {
    iou(a.start, a.end, b.start, b.end)
}

/// How predicted spans are paired with gold spans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    #[default]
    Greedy,
    Optimal,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Greedy => write!(f, "greedy"),
            MatchStrategy::Optimal => write!(f, "optimal"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greedy" => Ok(MatchStrategy::Greedy),
            "optimal" | "hungarian" => Ok(MatchStrategy::Optimal),
            other => Err(format!("unknown matching strategy '{}' (expected greedy or optimal)", other)),
        }
    }
}

/// True positive / false positive / false negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanCounts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl SpanCounts {
    /// Counts for `matched` pairs out of the given span totals.
    pub fn from_totals(matched: usize, n_pred: usize, n_gold: usize) -> Self {
        Self {
            tp: matched,
            fp: n_pred.saturating_sub(matched),
            fn_: n_gold.saturating_sub(matched),
        }
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denom = self.tp + self.fp;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let denom = self.tp + self.fn_;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

impl AddAssign for SpanCounts {
    fn add_assign(&mut self, other: Self) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }
}

/// Whether `pred` may be paired with `gold`, and with what IoU.
///
/// Code mismatch always disqualifies. An IoU of zero never qualifies, even
/// with a zero threshold.
fn qualifying_iou(pred: &Span, gold: &Span, iou_threshold: f64) -> Option<f64> {
    if pred.code != gold.code {
        return None;
    }
    let score = span_iou(pred, gold);
    (score >= iou_threshold && score > 0.0).then_some(score)
}

/// Pair predicted and gold spans, returning `(pred_index, gold_index)` pairs
/// in ascending prediction order.
pub fn align_spans(gold: &[Span], pred: &[Span], iou_threshold: f64, strategy: MatchStrategy) -> Vec<(usize, usize)> {
    match strategy {
        MatchStrategy::Greedy => greedy_alignment(gold, pred, iou_threshold),
        MatchStrategy::Optimal => optimal_alignment(gold, pred, iou_threshold),
    }
}

/// Count matches for one document.
pub fn match_spans(gold: &[Span], pred: &[Span], iou_threshold: f64, strategy: MatchStrategy) -> SpanCounts {
    let pairs = align_spans(gold, pred, iou_threshold, strategy);
    SpanCounts::from_totals(pairs.len(), pred.len(), gold.len())
}

/// Split one document's alignment into counts per category code.
///
/// A matched pair always shares its code. Unmatched spans are charged to
/// their own code.
pub fn per_code_counts(gold: &[Span], pred: &[Span], pairs: &[(usize, usize)]) -> BTreeMap<String, SpanCounts> {
    let mut counts: BTreeMap<String, SpanCounts> = BTreeMap::new();
    let mut pred_matched = vec![false; pred.len()];
    let mut gold_matched = vec![false; gold.len()];

    for &(pi, gi) in pairs {
        pred_matched[pi] = true;
        gold_matched[gi] = true;
        counts.entry(pred[pi].code.clone()).or_default().tp += 1;
    }
    for (span, _) in pred.iter().zip(&pred_matched).filter(|(_, m)| !**m) {
        counts.entry(span.code.clone()).or_default().fp += 1;
    }
    for (span, _) in gold.iter().zip(&gold_matched).filter(|(_, m)| !**m) {
        counts.entry(span.code.clone()).or_default().fn_ += 1;
    }

    counts
}

fn greedy_alignment(gold: &[Span], pred: &[Span], iou_threshold: f64) -> Vec<(usize, usize)> {
    let mut gold_claimed = vec![false; gold.len()];
    let mut pairs = Vec::new();

    for (pi, p) in pred.iter().enumerate() {
        let mut best: Option<usize> = None;
        let mut best_iou = 0.0;

        for (gi, g) in gold.iter().enumerate() {
            if gold_claimed[gi] {
                continue;
            }
            if let Some(score) = qualifying_iou(p, g, iou_threshold) {
                // Strict improvement only: earlier gold spans win ties.
                if score > best_iou {
                    best_iou = score;
                    best = Some(gi);
                }
            }
        }

        if let Some(gi) = best {
            gold_claimed[gi] = true;
            pairs.push((pi, gi));
        }
    }

    pairs
}

fn optimal_alignment(gold: &[Span], pred: &[Span], iou_threshold: f64) -> Vec<(usize, usize)> {
    if gold.is_empty() || pred.is_empty() {
        return Vec::new();
    }

    // Every qualifying pair is worth more than any IoU surplus, so the
    // assignment first maximises the number of pairs and then total IoU.
    let bonus = (pred.len().min(gold.len()) + 1) as f64;
    let weights: Vec<Vec<Option<f64>>> = pred
        .iter()
        .map(|p| gold.iter().map(|g| qualifying_iou(p, g, iou_threshold).map(|s| bonus + s)).collect())
        .collect();

    let transposed = pred.len() > gold.len();
    let (rows, cols) = if transposed {
        (gold.len(), pred.len())
    } else {
        (pred.len(), gold.len())
    };
    let cost: Vec<Vec<f64>> = (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let (pi, gi) = if transposed { (c, r) } else { (r, c) };
                    -weights[pi][gi].unwrap_or(0.0)
                })
                .collect()
        })
        .collect();

    let mut pairs: Vec<(usize, usize)> = hungarian(&cost)
        .into_iter()
        .enumerate()
        .map(|(r, c)| if transposed { (c, r) } else { (r, c) })
        .filter(|&(pi, gi)| weights[pi][gi].is_some())
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Minimum-cost assignment for a `rows x cols` matrix with `rows <= cols`.
///
/// Returns the column assigned to each row. Shortest augmenting path
/// formulation with row and column potentials, O(rows^2 * cols).
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    let m = cost.first().map_or(0, Vec::len);
    debug_assert!(n <= m);

    // 1-based internally; index 0 is the virtual root.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut j0 = 0usize;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }

            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=m {
        if owner[j] != 0 {
            assignment[owner[j] - 1] = j - 1;
        }
    }
    assignment
}
