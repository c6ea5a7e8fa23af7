//! # Enrichment Orchestration Module
//!
//! ## Purpose
//! Sequences field resolution, citation normalization, and structural
//! analysis into one per-document pass, assembles the merged "comprehensive
//! metadata" record, and computes batch-level completeness and quality
//! scores.
//!
//! ## Input/Output Specification
//! - **Input**: Raw documents with sparse, origin-specific metadata
//! - **Output**: One merged record per document plus batch diagnostics
//! - **Guarantee**: Original source fields are preserved under their own
//!   keys; resolved values are added under new keys
//!
//! ## Architecture
//! - `pipeline`: batch orchestrator with bounded concurrency and stats
//! - `validation`: non-fatal record sanity checks
//! - this module: structural scan, metadata assembly, batch verification

pub mod pipeline;
pub mod validation;

pub use pipeline::{BatchResult, DocumentOutcome, EnrichmentPipeline, PipelineStats, SkipReason};
pub use validation::{RecordValidator, ValidationResult};

use crate::citations::ExtractedCitation;
use crate::fields::{CourtResolution, JudgeResolution};
use crate::{Metadata, RawDocument};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Enrichment categories counted by the completeness score.
pub const ENHANCEMENT_CATEGORIES: usize = 5;

/// Maximum quality points one document can earn.
pub const MAX_QUALITY_POINTS: usize = 8;

/// A structural marker detected in document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralElement {
    pub kind: StructuralKind,
    /// The matched line, trimmed
    pub text: String,
    /// Zero-based line index
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralKind {
    Heading,
    SectionNumber,
    OpinionMarker,
}

fn section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[IVXLC]+|[A-Z]|\d{1,2})\.$").unwrap())
}

fn opinion_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:opinion|dissent(?:ing opinion)?|concurr(?:ence|ing opinion)|syllabus|order|per curiam)\b")
            .unwrap()
    })
}

/// Line-level scan for headings, section numbers, and opinion markers.
pub fn detect_structure(text: &str) -> Vec<StructuralElement> {
    let mut elements = Vec::new();

    for (line_index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.len() > 120 {
            continue;
        }

        if section_regex().is_match(line) {
            elements.push(StructuralElement {
                kind: StructuralKind::SectionNumber,
                text: line.to_string(),
                line: line_index,
            });
        } else if opinion_marker_regex().is_match(line) {
            elements.push(StructuralElement {
                kind: StructuralKind::OpinionMarker,
                text: line.to_string(),
                line: line_index,
            });
        } else if is_heading_line(line) {
            elements.push(StructuralElement {
                kind: StructuralKind::Heading,
                text: line.to_string(),
                line: line_index,
            });
        }
    }

    elements
}

/// All-caps short lines with at least two words read as headings.
fn is_heading_line(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 2 || line.len() > 80 {
        return false;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

/// Assemble the merged metadata record for one document.
///
/// Original metadata keys survive untouched; resolved values land under
/// their own keys, and unresolved values are simply absent rather than null.
pub fn assemble_comprehensive_metadata(
    doc: &RawDocument,
    judge: &JudgeResolution,
    court: &CourtResolution,
    citations: &[ExtractedCitation],
    structure: &[StructuralElement],
) -> Metadata {
    let mut assembled = doc.metadata.clone();

    promote_identity_fields(&mut assembled);

    if let Some(judge_name) = &judge.primary_judge {
        assembled.insert("judge_name".into(), json!(judge_name));
        if let Some(method) = &judge.extraction_method {
            assembled.insert("judge_source_field".into(), json!(method));
        }
        assembled.insert("judge_confidence".into(), json!(judge.confidence));
    }
    if !judge.all_judges.is_empty() {
        assembled.insert("judge_candidates".into(), json!(judge.all_judges));
    }

    if let Some(court_id) = &court.court_id {
        assembled.insert("court_id".into(), json!(court_id));
        if let Some(name) = &court.court_name {
            assembled.insert("court_name".into(), json!(name));
        }
        if let Some(method) = &court.method {
            assembled.insert("court_resolution_method".into(), json!(method));
        }
        assembled.insert("court_confidence".into(), json!(court.confidence));
    }

    assembled.insert(
        "citations".into(),
        Value::Array(
            citations
                .iter()
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                .collect(),
        ),
    );

    if !structure.is_empty() {
        assembled.insert(
            "structural_elements".into(),
            Value::Array(
                structure
                    .iter()
                    .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                    .collect(),
            ),
        );
    }

    assembled.insert("has_content".into(), json!(doc.has_content()));

    assembled
}

/// Copy camelCase source spellings into the canonical snake_case identity
/// keys when those are not already set.
fn promote_identity_fields(metadata: &mut Metadata) {
    const PROMOTIONS: &[(&str, &[&str])] = &[
        ("case_name", &["caseName", "case_name_full", "caption"]),
        ("docket_number", &["docketNumber", "docket_num"]),
        ("date_filed", &["dateFiled", "date_created"]),
        ("date_argued", &["dateArgued"]),
        ("date_terminated", &["dateTerminated"]),
    ];

    for (canonical, variants) in PROMOTIONS {
        let already = metadata
            .get(*canonical)
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if already {
            continue;
        }
        let found = variants
            .iter()
            .find_map(|v| metadata.get(*v).filter(|val| !val.is_null()).cloned());
        if let Some(value) = found {
            metadata.insert(canonical.to_string(), value);
        }
    }
}

/// Batch-level diagnostics; never a gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchVerification {
    /// Fraction of possible enhancement categories attached, 0-100
    pub completeness_score: f64,
    /// Weighted validated-enrichment points, 0-100
    pub quality_score: f64,
    pub documents: usize,
}

/// Per-document enrichment snapshot consumed by batch verification.
#[derive(Debug, Clone)]
pub struct EnrichmentSummary {
    pub judge_present: bool,
    pub judge_validated: bool,
    pub court_present: bool,
    pub court_validated: bool,
    pub citations_present: bool,
    pub citations_validated: bool,
    pub structure_present: bool,
    pub content_present: bool,
}

impl EnrichmentSummary {
    pub fn new(
        judge: &JudgeResolution,
        court: &CourtResolution,
        citations: &[ExtractedCitation],
        structure: &[StructuralElement],
        has_content: bool,
    ) -> Self {
        Self {
            judge_present: judge.primary_judge.is_some(),
            judge_validated: judge.primary_judge.is_some() && judge.confidence >= 0.8,
            court_present: court.court_id.is_some(),
            court_validated: court.court_id.is_some() && court.confidence >= 0.8,
            citations_present: !citations.is_empty(),
            citations_validated: citations.iter().any(|c| c.valid_reporter),
            structure_present: !structure.is_empty(),
            content_present: has_content,
        }
    }

    fn categories_present(&self) -> usize {
        [
            self.judge_present,
            self.court_present,
            self.citations_present,
            self.structure_present,
            self.content_present,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }

    fn quality_points(&self) -> usize {
        let mut points = 0;
        points += graded(self.judge_present, self.judge_validated);
        points += graded(self.court_present, self.court_validated);
        points += graded(self.citations_present, self.citations_validated);
        points += usize::from(self.structure_present);
        points += usize::from(self.content_present);
        points
    }
}

fn graded(present: bool, validated: bool) -> usize {
    match (present, validated) {
        (true, true) => 2,
        (true, false) => 1,
        _ => 0,
    }
}

/// Compute batch completeness and quality scores over per-document
/// summaries.
pub fn verify_batch(summaries: &[EnrichmentSummary]) -> BatchVerification {
    if summaries.is_empty() {
        return BatchVerification::default();
    }

    let n = summaries.len();
    let present: usize = summaries.iter().map(|s| s.categories_present()).sum();
    let points: usize = summaries.iter().map(|s| s.quality_points()).sum();

    BatchVerification {
        completeness_score: present as f64 / (n * ENHANCEMENT_CATEGORIES) as f64 * 100.0,
        quality_score: points as f64 / (n * MAX_QUALITY_POINTS) as f64 * 100.0,
        documents: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldResolver;

    #[test]
    fn test_structure_detection() {
        let text = "SUPREME COURT OF THE UNITED STATES\n\nSyllabus\n\nI.\n\nThe facts are these.";
        let elements = detect_structure(text);

        assert!(elements
            .iter()
            .any(|e| e.kind == StructuralKind::Heading && e.line == 0));
        assert!(elements.iter().any(|e| e.kind == StructuralKind::OpinionMarker));
        assert!(elements
            .iter()
            .any(|e| e.kind == StructuralKind::SectionNumber && e.text == "I."));
    }

    #[test]
    fn test_assembly_preserves_original_fields() {
        let mut doc = RawDocument::new("X1");
        doc.metadata.insert("caseName".into(), json!("Brown v. Board"));
        doc.metadata.insert("assigned_to".into(), json!("Jane Roe"));
        doc.content = Some("Some opinion text".into());

        let resolver = FieldResolver::new();
        let judge = resolver.resolve_judge(&doc.metadata, None);
        let court = resolver.resolve_court(&doc.metadata);
        let assembled = assemble_comprehensive_metadata(&doc, &judge, &court, &[], &[]);

        // Raw source field intact, resolved + promoted keys added.
        assert_eq!(assembled["caseName"], json!("Brown v. Board"));
        assert_eq!(assembled["case_name"], json!("Brown v. Board"));
        assert_eq!(assembled["judge_name"], json!("Jane Roe"));
        assert_eq!(assembled["has_content"], json!(true));
        // No court resolved: key absent, never null.
        assert!(!assembled.contains_key("court_id"));
    }

    #[test]
    fn test_batch_scores() {
        let full = EnrichmentSummary {
            judge_present: true,
            judge_validated: true,
            court_present: true,
            court_validated: true,
            citations_present: true,
            citations_validated: true,
            structure_present: true,
            content_present: true,
        };
        let empty = EnrichmentSummary {
            judge_present: false,
            judge_validated: false,
            court_present: false,
            court_validated: false,
            citations_present: false,
            citations_validated: false,
            structure_present: false,
            content_present: false,
        };

        let verification = verify_batch(&[full, empty]);
        assert_eq!(verification.documents, 2);
        assert!((verification.completeness_score - 50.0).abs() < f64::EPSILON);
        assert!((verification.quality_score - 50.0).abs() < f64::EPSILON);

        assert_eq!(verify_batch(&[]).documents, 0);
    }
}
