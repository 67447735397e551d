// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Agreement scoring for three-stage document annotation
//!
//! Compares a model-produced annotation against a human gold standard:
//! - Stage 0: binary relevance (percent agreement, Cohen's kappa)
//! - Stage 1: span extraction with category codes (IoU matching, micro P/R/F1)
//! - Stage 2: multi-class document label (agreement, kappa, confusion matrix)
//!
//! This crate provides:
//! - NDJSON record loading with validated record types
//! - Two-rater agreement statistics over any ordered label type
//! - Greedy and optimal span matching
//! - A deterministic evaluation pipeline with JSON, text and CSV reports
//! - Seeded bootstrap confidence intervals

pub mod agreement;
pub mod bootstrap;
pub mod classification;
pub mod error;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod spans;

pub use agreement::{cohen_kappa, percent_agreement, LabelConfusion};
pub use bootstrap::{BootstrapConfig, BootstrapSummary, Interval};
pub use classification::{ClassificationScore, ConfusionMatrix};
pub use error::{EvalError, Result};
pub use pipeline::{evaluate, EvaluationConfig, EvaluationPipeline, EvaluationResult};
pub use records::{AnnotatedDocument, DocumentRecordSet, Span};
pub use spans::{iou, match_spans, MatchStrategy, SpanCounts};
