// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Property tests for agreement statistics and span matching.

use annotation_eval::agreement::percent_agreement;
use annotation_eval::classification::score_labels;
use annotation_eval::records::Span;
use annotation_eval::spans::{align_spans, iou, match_spans, per_code_counts, MatchStrategy, SpanCounts};
use proptest::prelude::*;

fn span_strategy() -> impl Strategy<Value = Span> {
    (0i64..60, 0i64..20, prop::sample::select(vec!["A", "B", "C"]))
        .prop_map(|(start, len, code)| Span::new(start, start + len, code))
}

fn label_pairs() -> impl Strategy<Value = Vec<(String, String)>> {
    let label = prop::sample::select(vec!["red", "green", "blue", "other"]).prop_map(String::from);
    prop::collection::vec((label.clone(), label), 0..40)
}

proptest! {
    #[test]
    fn test_percent_agreement_symmetric(pairs in label_pairs()) {
        let (a, b): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        prop_assert_eq!(percent_agreement(&a, &b).unwrap(), percent_agreement(&b, &a).unwrap());
    }

    #[test]
    fn test_iou_bounded_and_symmetric(a in span_strategy(), b in span_strategy()) {
        let forward = iou(a.start, a.end, b.start, b.end);
        prop_assert!((0.0..=1.0).contains(&forward));
        prop_assert_eq!(forward, iou(b.start, b.end, a.start, a.end));
    }

    #[test]
    fn test_identical_spans_fully_matched(
        spans in prop::collection::vec(span_strategy(), 0..12),
        threshold in 0.0f64..=1.0,
    ) {
        // Degenerate spans have IoU 0 with themselves and never match.
        let gold: Vec<Span> = spans.into_iter().filter(|s| !s.is_empty()).collect();
        for strategy in [MatchStrategy::Greedy, MatchStrategy::Optimal] {
            let counts = match_spans(&gold, &gold, threshold, strategy);
            prop_assert_eq!(counts, SpanCounts { tp: gold.len(), fp: 0, fn_: 0 });
            if !gold.is_empty() {
                prop_assert_eq!(counts.f1_score(), 1.0);
            }
        }
    }

    #[test]
    fn test_foreign_code_never_matches(
        gold in prop::collection::vec(span_strategy(), 0..8),
        start in 0i64..60,
        len in 1i64..20,
    ) {
        let pred = vec![Span::new(start, start + len, "UNSEEN")];
        for strategy in [MatchStrategy::Greedy, MatchStrategy::Optimal] {
            prop_assert_eq!(match_spans(&gold, &pred, 0.0, strategy).tp, 0);
        }
    }

    #[test]
    fn test_optimal_never_below_greedy(
        gold in prop::collection::vec(span_strategy(), 0..8),
        pred in prop::collection::vec(span_strategy(), 0..8),
        threshold in 0.0f64..=1.0,
    ) {
        let greedy = match_spans(&gold, &pred, threshold, MatchStrategy::Greedy);
        let optimal = match_spans(&gold, &pred, threshold, MatchStrategy::Optimal);
        prop_assert!(optimal.tp >= greedy.tp);
    }

    #[test]
    fn test_alignment_is_one_to_one(
        gold in prop::collection::vec(span_strategy(), 0..8),
        pred in prop::collection::vec(span_strategy(), 0..8),
    ) {
        for strategy in [MatchStrategy::Greedy, MatchStrategy::Optimal] {
            let pairs = align_spans(&gold, &pred, 0.5, strategy);
            let mut golds: Vec<usize> = pairs.iter().map(|p| p.1).collect();
            golds.sort_unstable();
            golds.dedup();
            prop_assert_eq!(golds.len(), pairs.len());
            for (pi, gi) in pairs {
                prop_assert_eq!(&pred[pi].code, &gold[gi].code);
                prop_assert!(iou(pred[pi].start, pred[pi].end, gold[gi].start, gold[gi].end) >= 0.5);
            }
        }
    }

    #[test]
    fn test_per_code_sums_to_total(
        gold in prop::collection::vec(span_strategy(), 0..8),
        pred in prop::collection::vec(span_strategy(), 0..8),
    ) {
        let pairs = align_spans(&gold, &pred, 0.5, MatchStrategy::Greedy);
        let mut sum = SpanCounts::default();
        for counts in per_code_counts(&gold, &pred, &pairs).into_values() {
            sum += counts;
        }
        prop_assert_eq!(sum, match_spans(&gold, &pred, 0.5, MatchStrategy::Greedy));
    }

    #[test]
    fn test_confusion_marginals(pairs in label_pairs()) {
        let (gold, pred): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        let score = score_labels(&gold, &pred).unwrap();
        let cm = &score.confusion_matrix;
        for (i, label) in cm.labels.iter().enumerate() {
            prop_assert_eq!(cm.row_total(i), gold.iter().filter(|g| *g == label).count());
            prop_assert_eq!(cm.col_total(i), pred.iter().filter(|p| *p == label).count());
        }
        if score.n > 0 {
            prop_assert!((cm.trace() as f64 / score.n as f64 - score.percent_agreement).abs() < 1e-12);
        }
    }
}
