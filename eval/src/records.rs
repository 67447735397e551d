// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Annotation record loading
//!
//! Input files are newline-delimited JSON, one annotated document per line:
//!
//! ```text
//! {"doc_id": "a1", "stage0": {"relevant": true},
//!  "stage1": {"spans": [{"start": 0, "end": 5, "code": "X"}]},
//!  "stage2": {"label": "A"}}
//! ```
//!
//! Records are validated once here. Structural problems (bad JSON, missing
//! `doc_id`, wrongly typed fields) become [`EvalError::InputFormat`] at the
//! load boundary. Absent `stage0.relevant` / `stage2.label` are tolerated at
//! load time and only rejected for documents that are actually scored.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A half-open character interval `[start, end)` tagged with a category code.
///
/// Degenerate spans (`end <= start`) are accepted and behave as empty
/// intervals during matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: i64,
    pub end: i64,
    pub code: String,
}

impl Span {
    pub fn new(start: i64, end: i64, code: impl Into<String>) -> Self {
        Self {
            start,
            end,
            code: code.into(),
        }
    }

    /// Length of the interval, zero for degenerate spans.
    pub fn len(&self) -> u64 {
        (self.end as i128 - self.start as i128).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stage 0: binary relevance decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceAnnotation {
    #[serde(default)]
    pub relevant: Option<bool>,
}

/// Stage 1: extracted feature spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanAnnotation {
    #[serde(default)]
    pub spans: Option<Vec<Span>>,
}

/// Stage 2: final document class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAnnotation {
    #[serde(default)]
    pub label: Option<String>,
}

/// One document annotated through all three stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub doc_id: String,
    #[serde(default)]
    pub stage0: Option<RelevanceAnnotation>,
    #[serde(default)]
    pub stage1: Option<SpanAnnotation>,
    #[serde(default)]
    pub stage2: Option<ClassAnnotation>,
}

impl AnnotatedDocument {
    /// Stage-0 relevance, required for every scored document.
    pub fn relevant(&self) -> Result<bool> {
        self.stage0
            .as_ref()
            .and_then(|s| s.relevant)
            .ok_or_else(|| EvalError::MissingField {
                doc_id: self.doc_id.clone(),
                field: "stage0.relevant",
            })
    }

    /// Stage-1 spans; an absent stage or spans list reads as empty.
    pub fn spans(&self) -> &[Span] {
        self.stage1
            .as_ref()
            .and_then(|s| s.spans.as_deref())
            .unwrap_or(&[])
    }

    /// Stage-2 label, required for every scored document.
    pub fn label(&self) -> Result<&str> {
        self.stage2
            .as_ref()
            .and_then(|s| s.label.as_deref())
            .ok_or_else(|| EvalError::MissingField {
                doc_id: self.doc_id.clone(),
                field: "stage2.label",
            })
    }
}

/// All documents from one annotation source, keyed by `doc_id`.
///
/// A repeated `doc_id` replaces the earlier record (last seen wins).
#[derive(Debug, Clone, Default)]
pub struct DocumentRecordSet {
    source: String,
    documents: BTreeMap<String, AnnotatedDocument>,
}

impl DocumentRecordSet {
    /// Load a record set from an NDJSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
        let source = path.display().to_string();
        tracing::info!("Loading annotations from {}", source);
        Self::from_reader(BufReader::new(file), &source)
    }

    /// Parse NDJSON records from any buffered reader.
    ///
    /// `source_name` labels error messages and log lines.
    pub fn from_reader<R: BufRead>(reader: R, source_name: &str) -> Result<Self> {
        let mut documents = BTreeMap::new();
        let mut replaced = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| EvalError::io(source_name, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let doc: AnnotatedDocument = serde_json::from_str(&line)
                .map_err(|e| EvalError::input_format(source_name, line_no, e.to_string()))?;

            if let Some(previous) = documents.insert(doc.doc_id.clone(), doc) {
                tracing::debug!("{}:{}: doc_id {:?} replaces earlier record", source_name, line_no, previous.doc_id);
                replaced += 1;
            }
        }

        if replaced > 0 {
            tracing::warn!("{}: {} repeated doc_id(s), last record kept", source_name, replaced);
        }
        tracing::info!("{}: {} documents", source_name, documents.len());

        Ok(Self {
            source: source_name.to_string(),
            documents,
        })
    }

    /// Build a record set directly from documents, applying last-seen-wins.
    pub fn from_documents(source: impl Into<String>, docs: impl IntoIterator<Item = AnnotatedDocument>) -> Self {
        let documents = docs.into_iter().map(|d| (d.doc_id.clone(), d)).collect();
        Self {
            source: source.into(),
            documents,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, doc_id: &str) -> Option<&AnnotatedDocument> {
        self.documents.get(doc_id)
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.documents.contains_key(doc_id)
    }

    /// Document ids in lexicographic order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Ids present in both sets, in lexicographic order.
    pub fn shared_ids<'a>(&'a self, other: &DocumentRecordSet) -> Vec<&'a str> {
        self.ids().filter(|id| other.contains(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(input: &str) -> Result<DocumentRecordSet> {
        DocumentRecordSet::from_reader(Cursor::new(input), "test.jsonl")
    }

    #[test]
    fn test_load_full_record() {
        let set = parse(
            r#"{"doc_id":"d1","stage0":{"relevant":true},"stage1":{"spans":[{"start":0,"end":5,"code":"X"}]},"stage2":{"label":"A"}}"#,
        )
        .unwrap();

        assert_eq!(set.source(), "test.jsonl");
        let doc = set.get("d1").unwrap();
        assert!(doc.relevant().unwrap());
        assert_eq!(doc.spans(), &[Span::new(0, 5, "X")]);
        assert_eq!(doc.label().unwrap(), "A");
    }

    #[test]
    fn test_blank_lines_ignored() {
        let set = parse("\n{\"doc_id\":\"a\"}\n   \n{\"doc_id\":\"b\"}\n\n").unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_last_seen_wins() {
        let set = parse(
            "{\"doc_id\":\"a\",\"stage2\":{\"label\":\"old\"}}\n{\"doc_id\":\"a\",\"stage2\":{\"label\":\"new\"}}",
        )
        .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().label().unwrap(), "new");
    }

    #[test]
    fn test_missing_stage1_reads_as_empty() {
        let set = parse("{\"doc_id\":\"a\"}\n{\"doc_id\":\"b\",\"stage1\":{}}\n{\"doc_id\":\"c\",\"stage1\":{\"spans\":null}}").unwrap();
        for id in ["a", "b", "c"] {
            assert!(set.get(id).unwrap().spans().is_empty());
        }
    }

    #[test]
    fn test_missing_stage_fields_are_lazy_errors() {
        let set = parse("{\"doc_id\":\"a\",\"stage0\":{}}").unwrap();
        let doc = set.get("a").unwrap();
        assert!(matches!(doc.relevant(), Err(EvalError::MissingField { field: "stage0.relevant", .. })));
        assert!(matches!(doc.label(), Err(EvalError::MissingField { field: "stage2.label", .. })));
    }

    #[test]
    fn test_invalid_json_reports_line() {
        let err = parse("{\"doc_id\":\"a\"}\n\nnot json").unwrap_err();
        match err {
            EvalError::InputFormat { line, source_name, .. } => {
                assert_eq!(line, 3);
                assert_eq!(source_name, "test.jsonl");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_doc_id_is_format_error() {
        assert!(matches!(parse("{\"stage0\":{\"relevant\":true}}"), Err(EvalError::InputFormat { .. })));
    }

    #[test]
    fn test_non_bool_relevance_is_format_error() {
        assert!(matches!(
            parse("{\"doc_id\":\"a\",\"stage0\":{\"relevant\":\"yes\"}}"),
            Err(EvalError::InputFormat { .. })
        ));
    }

    #[test]
    fn test_span_without_code_is_format_error() {
        assert!(matches!(
            parse("{\"doc_id\":\"a\",\"stage1\":{\"spans\":[{\"start\":0,\"end\":3}]}}"),
            Err(EvalError::InputFormat { .. })
        ));
    }

    #[test]
    fn test_shared_ids_sorted() {
        let gold = parse("{\"doc_id\":\"c\"}\n{\"doc_id\":\"a\"}\n{\"doc_id\":\"b\"}").unwrap();
        let pred = parse("{\"doc_id\":\"b\"}\n{\"doc_id\":\"z\"}\n{\"doc_id\":\"a\"}").unwrap();
        assert_eq!(gold.shared_ids(&pred), vec!["a", "b"]);
    }

    #[test]
    fn test_degenerate_span_len() {
        assert_eq!(Span::new(5, 3, "X").len(), 0);
        assert!(Span::new(4, 4, "X").is_empty());
        assert_eq!(Span::new(2, 9, "X").len(), 7);
        assert_eq!(Span::new(i64::MIN, i64::MAX, "X").len(), u64::MAX);
    }
}
