//! # Record Validation Module
//!
//! ## Purpose
//! Sanity-checks assembled records before storage. Validation failures are
//! recorded on the result and never block storage; "validation failed" and
//! "could not be stored" are independent outcomes.
//!
//! ## Input/Output Specification
//! - **Input**: An assembled `DocumentRecord`
//! - **Output**: ValidationResult with pass/fail status and detailed feedback
//!
//! ## Key Features
//! - Extensible rule system behind a trait
//! - Severity levels for triage
//! - No rule may panic or error; rules report, the pipeline decides

use crate::DocumentRecord;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record validator over a fixed rule set.
pub struct RecordValidator {
    rules: Vec<Box<dyn ValidationRule + Send + Sync>>,
}

/// Trait for validation rules
pub trait ValidationRule {
    fn name(&self) -> &str;
    fn validate(&self, record: &DocumentRecord) -> Vec<ValidationIssue>;
}

/// Result of validation check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
}

/// A single validation finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: String,
    pub field: String,
    pub message: String,
    pub severity: ValidationSeverity,
}

/// Severity levels for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl RecordValidator {
    pub fn new() -> Self {
        let rules: Vec<Box<dyn ValidationRule + Send + Sync>> = vec![
            Box::new(CaseIdentityRule),
            Box::new(DateSanityRule),
            Box::new(CitationShapeRule),
            Box::new(ContentConsistencyRule),
        ];
        Self { rules }
    }

    /// Validate a record against all rules. Never errors; a failed record
    /// still proceeds to storage.
    pub fn validate(&self, record: &DocumentRecord) -> ValidationResult {
        let mut issues = Vec::new();
        for rule in &self.rules {
            issues.extend(rule.validate(record));
        }

        let passed = !issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error);
        ValidationResult { passed, issues }
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn issue(
    rule: &str,
    field: &str,
    message: impl Into<String>,
    severity: ValidationSeverity,
) -> ValidationIssue {
    ValidationIssue {
        rule: rule.to_string(),
        field: field.to_string(),
        message: message.into(),
        severity,
    }
}

/// A record should identify its case somehow.
struct CaseIdentityRule;

impl ValidationRule for CaseIdentityRule {
    fn name(&self) -> &str {
        "case_identity"
    }

    fn validate(&self, record: &DocumentRecord) -> Vec<ValidationIssue> {
        let has_identity = ["case_name", "docket_number", "court_id"]
            .iter()
            .any(|key| {
                record
                    .metadata
                    .get(*key)
                    .and_then(|v| v.as_str())
                    .map(|s| !s.trim().is_empty())
                    .unwrap_or(false)
            });

        if has_identity {
            Vec::new()
        } else {
            vec![issue(
                self.name(),
                "case_name",
                "no case name, docket number, or court resolved",
                ValidationSeverity::Warning,
            )]
        }
    }
}

/// Dates must parse and not sit in the future.
struct DateSanityRule;

impl ValidationRule for DateSanityRule {
    fn name(&self) -> &str {
        "date_sanity"
    }

    fn validate(&self, record: &DocumentRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for field in ["date_filed", "date_argued", "date_terminated"] {
            if let Some(raw) = record.metadata.get(field).and_then(|v| v.as_str()) {
                match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => {
                        if date > Utc::now().date_naive() {
                            issues.push(issue(
                                self.name(),
                                field,
                                format!("date {} is in the future", raw),
                                ValidationSeverity::Warning,
                            ));
                        }
                    }
                    Err(_) => issues.push(issue(
                        self.name(),
                        field,
                        format!("unparseable date '{}'", raw),
                        ValidationSeverity::Error,
                    )),
                }
            }
        }
        issues
    }
}

/// Citation entries must carry a reporter and a volume.
struct CitationShapeRule;

impl ValidationRule for CitationShapeRule {
    fn name(&self) -> &str {
        "citation_shape"
    }

    fn validate(&self, record: &DocumentRecord) -> Vec<ValidationIssue> {
        let citations = match record.metadata.get("citations") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };

        citations
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                let has_reporter = c
                    .get("normalized_reporter")
                    .and_then(|v| v.as_str())
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                let has_volume = c.get("volume").map(|v| !v.is_null()).unwrap_or(false);
                !(has_reporter && has_volume)
            })
            .map(|(index, _)| {
                issue(
                    self.name(),
                    "citations",
                    format!("citation {} missing reporter or volume", index),
                    ValidationSeverity::Error,
                )
            })
            .collect()
    }
}

/// `has_content` must agree with the stored content.
struct ContentConsistencyRule;

impl ValidationRule for ContentConsistencyRule {
    fn name(&self) -> &str {
        "content_consistency"
    }

    fn validate(&self, record: &DocumentRecord) -> Vec<ValidationIssue> {
        let flagged = record
            .metadata
            .get("has_content")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let actual = !record.content.trim().is_empty()
            && !record.content.trim_start().starts_with(crate::PDF_PENDING_PREFIX);

        if flagged != actual {
            vec![issue(
                self.name(),
                "has_content",
                format!("has_content={} but content says {}", flagged, actual),
                ValidationSeverity::Warning,
            )]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metadata;
    use serde_json::json;

    fn record(metadata: serde_json::Value, content: &str) -> DocumentRecord {
        let metadata = match metadata {
            Value::Object(m) => m,
            _ => Metadata::new(),
        };
        DocumentRecord {
            source_id: "X1".into(),
            doc_type: "opinion".into(),
            content: content.into(),
            metadata,
            content_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_well_formed_record_passes() {
        let r = record(
            json!({
                "case_name": "Brown v. Board",
                "date_filed": "1954-05-17",
                "has_content": true,
                "citations": [{"normalized_reporter": "U.S.", "volume": "347"}]
            }),
            "some opinion text",
        );
        let result = RecordValidator::new().validate(&r);
        assert!(result.passed, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_bad_date_is_error_but_missing_identity_is_warning() {
        let r = record(json!({"date_filed": "May 17 1954", "has_content": false}), "");
        let result = RecordValidator::new().validate(&r);

        assert!(!result.passed);
        assert!(result
            .issues
            .iter()
            .any(|i| i.rule == "date_sanity" && i.severity == ValidationSeverity::Error));
        assert!(result
            .issues
            .iter()
            .any(|i| i.rule == "case_identity" && i.severity == ValidationSeverity::Warning));
    }

    #[test]
    fn test_content_flag_mismatch_flagged() {
        let r = record(json!({"case_name": "A v. B", "has_content": true}), "   ");
        let result = RecordValidator::new().validate(&r);
        assert!(result
            .issues
            .iter()
            .any(|i| i.rule == "content_consistency"));
    }
}
