//! # Field Resolution Module
//!
//! ## Purpose
//! Resolves judge names and court identifiers from heterogeneous document
//! shapes (search hits, opinions, dockets, clusters), trying known field
//! names in priority order and tracking provenance for every value inspected.
//!
//! ## Input/Output Specification
//! - **Input**: A loosely-typed document mapping, optional origin hint
//! - **Output**: Resolution results carrying the value, the source field it
//!   came from, a confidence score, and the full audit set of fields checked
//! - **Guarantee**: Resolution never fails; an unresolvable document yields
//!   `None` with empty provenance
//!
//! ## Key Features
//! - Origin detection from origin-specific marker fields
//! - Centralized per-origin field-priority tables
//! - Value coercion for strings, nested name objects, and lists
//! - Court extraction from direct fields, nested objects, and URL patterns

use crate::Metadata;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// The closed set of document shapes the source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentOrigin {
    SearchResult,
    Opinion,
    Docket,
    Cluster,
    Unknown,
}

/// How a court identifier was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourtResolutionMethod {
    DirectField,
    NestedObject,
    UrlPattern,
}

/// Judge resolution result with full provenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeResolution {
    /// Best-available judge name
    pub primary_judge: Option<String>,
    /// All distinct names found across every checked field
    pub all_judges: Vec<String>,
    /// Field that produced the primary value, e.g. `document.assigned_to`
    pub extraction_method: Option<String>,
    /// Confidence in the primary value (0.0 - 1.0)
    pub confidence: f64,
    /// Raw values of every field that was present, for audit
    pub inspected_fields: Metadata,
}

/// Court resolution result with full provenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourtResolution {
    /// Resolved court identifier
    pub court_id: Option<String>,
    /// Human-readable court name, when available
    pub court_name: Option<String>,
    /// How the identifier was obtained
    pub method: Option<CourtResolutionMethod>,
    /// Confidence in the resolved identifier (0.0 - 1.0)
    pub confidence: f64,
    /// Raw values of every field that was present, for audit
    pub inspected_fields: Metadata,
}

// Judge field priority tables, most reliable first.
const DOCKET_JUDGE_FIELDS: &[&str] = &[
    "assigned_to_str",
    "assigned_to",
    "referred_to_str",
    "referred_to",
];
const OPINION_JUDGE_FIELDS: &[&str] = &["author_str", "author", "joined_by_str"];
const CLUSTER_JUDGE_FIELDS: &[&str] = &["judges", "panel", "panel_names"];
const SEARCH_JUDGE_FIELDS: &[&str] = &["judge", "assignedTo", "caseNameJudge"];
const GENERIC_JUDGE_FIELDS: &[&str] = &["judge_name", "judge", "judges", "assigned_to", "author_str"];

// Court field tiers.
const COURT_DIRECT_FIELDS: &[&str] = &["court_id", "court_exact", "court"];
const COURT_NESTED_FIELDS: &[&str] = &["court", "court_object"];
const COURT_URL_FIELDS: &[&str] = &["court", "court_url", "absolute_url", "resource_uri", "docket"];

fn court_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/courts?/([a-z0-9][a-z0-9._-]*)/").unwrap())
}

/// Infer the document shape from origin-specific marker fields.
pub fn detect_origin(doc: &Metadata) -> DocumentOrigin {
    if doc.contains_key("assigned_to") || doc.contains_key("assigned_to_str") {
        return DocumentOrigin::Docket;
    }
    if doc.contains_key("author_str") || doc.contains_key("plain_text") {
        return DocumentOrigin::Opinion;
    }
    if doc.contains_key("sub_opinions") || doc.contains_key("panel") {
        return DocumentOrigin::Cluster;
    }
    if doc.contains_key("absolute_url") && doc.contains_key("caseName") {
        return DocumentOrigin::SearchResult;
    }
    DocumentOrigin::Unknown
}

/// Field resolver over the centralized priority tables.
pub struct FieldResolver;

impl FieldResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the best-available judge name for a document.
    pub fn resolve_judge(&self, doc: &Metadata, origin: Option<DocumentOrigin>) -> JudgeResolution {
        let origin = origin.unwrap_or_else(|| detect_origin(doc));
        let origin_fields = judge_fields_for(origin);

        let mut result = JudgeResolution::default();
        let mut origin_field_count = origin_fields.len();
        if origin == DocumentOrigin::Unknown {
            origin_field_count = 0;
        }

        for (rank, field) in origin_fields
            .iter()
            .chain(GENERIC_JUDGE_FIELDS.iter())
            .enumerate()
        {
            for (location, value) in lookup_field(doc, field) {
                result
                    .inspected_fields
                    .insert(format!("{}.{}", location, field), value.clone());

                let names = coerce_all_names(&value);
                for name in &names {
                    if !result.all_judges.contains(name) {
                        result.all_judges.push(name.clone());
                    }
                }

                if result.primary_judge.is_none() {
                    if let Some(primary) = names.first() {
                        result.primary_judge = Some(primary.clone());
                        result.extraction_method = Some(format!("{}.{}", location, field));
                        result.confidence = if rank < origin_field_count { 0.9 } else { 0.6 };
                    }
                }
            }
        }

        result
    }

    /// Resolve a court identifier, trying direct fields, nested objects, and
    /// URL patterns in that order.
    pub fn resolve_court(&self, doc: &Metadata) -> CourtResolution {
        let mut result = CourtResolution::default();

        // Tier 1: direct scalar fields
        for field in COURT_DIRECT_FIELDS {
            for (location, value) in lookup_field(doc, field) {
                result
                    .inspected_fields
                    .insert(format!("{}.{}", location, field), value.clone());
                if result.court_id.is_none() {
                    if let Some(id) = coerce_scalar_id(&value) {
                        result.court_id = Some(id);
                        result.method = Some(CourtResolutionMethod::DirectField);
                        result.confidence = 0.9;
                    }
                }
            }
        }

        // Tier 2: nested objects with an id/name shape
        if result.court_id.is_none() {
            for field in COURT_NESTED_FIELDS {
                for (location, value) in lookup_field(doc, field) {
                    let key = format!("{}.{}", location, field);
                    if !result.inspected_fields.contains_key(&key) {
                        result.inspected_fields.insert(key, value.clone());
                    }
                    if result.court_id.is_some() {
                        continue;
                    }
                    if let Value::Object(obj) = &value {
                        let id = obj
                            .get("id")
                            .and_then(|v| coerce_scalar_id(v))
                            .or_else(|| obj.get("slug").and_then(|v| coerce_scalar_id(v)));
                        if let Some(id) = id {
                            result.court_id = Some(id);
                            result.court_name = obj
                                .get("name")
                                .or_else(|| obj.get("full_name"))
                                .and_then(|v| v.as_str())
                                .map(str::to_string);
                            result.method = Some(CourtResolutionMethod::NestedObject);
                            result.confidence = 0.8;
                        }
                    }
                }
            }
        }

        // Tier 3: URL-bearing fields with a /courts/{id}/ path segment
        if result.court_id.is_none() {
            for field in COURT_URL_FIELDS {
                for (location, value) in lookup_field(doc, field) {
                    let key = format!("{}.{}", location, field);
                    if !result.inspected_fields.contains_key(&key) {
                        result.inspected_fields.insert(key, value.clone());
                    }
                    if result.court_id.is_some() {
                        continue;
                    }
                    if let Some(url) = value.as_str() {
                        if let Some(captures) = court_url_regex().captures(url) {
                            result.court_id = Some(captures[1].to_string());
                            result.method = Some(CourtResolutionMethod::UrlPattern);
                            result.confidence = 0.6;
                        }
                    }
                }
            }
        }

        result
    }
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn judge_fields_for(origin: DocumentOrigin) -> &'static [&'static str] {
    match origin {
        DocumentOrigin::Docket => DOCKET_JUDGE_FIELDS,
        DocumentOrigin::Opinion => OPINION_JUDGE_FIELDS,
        DocumentOrigin::Cluster => CLUSTER_JUDGE_FIELDS,
        DocumentOrigin::SearchResult => SEARCH_JUDGE_FIELDS,
        DocumentOrigin::Unknown => &[],
    }
}

/// Look a field up at the document top level and inside its nested
/// `metadata` mapping. Returns (location, value) pairs for everything found.
fn lookup_field(doc: &Metadata, field: &str) -> Vec<(&'static str, Value)> {
    let mut found = Vec::new();
    if let Some(value) = doc.get(field) {
        found.push(("document", value.clone()));
    }
    if let Some(Value::Object(nested)) = doc.get("metadata") {
        if let Some(value) = nested.get(field) {
            found.push(("metadata", value.clone()));
        }
    }
    found
}

/// Coerce a field value into a person name, per the priority rules:
/// plain usable string as-is; objects via their name-ish keys; lists via the
/// first element that yields a name.
pub fn coerce_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.starts_with("http://")
                || trimmed.starts_with("https://")
                || trimmed.starts_with('/')
                || trimmed.chars().all(|c| c.is_ascii_digit())
            {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Object(obj) => ["name", "full_name", "name_full", "display_name"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(coerce_name)),
        Value::Array(items) => items.iter().find_map(coerce_name),
        _ => None,
    }
}

/// Coerce every name a field value yields. Lists contribute each element;
/// semicolon- and comma-joined strings stay whole (splitting names is the
/// attribution service's job, not ours).
fn coerce_all_names(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => {
            let mut names = Vec::new();
            for item in items {
                if let Some(name) = coerce_name(item) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            names
        }
        other => coerce_name(other).into_iter().collect(),
    }
}

/// Coerce a scalar court identifier: short non-URL strings or integers.
fn coerce_scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(' ') {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> Metadata {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_origin_detection() {
        assert_eq!(
            detect_origin(&map(json!({"assigned_to": "Jane Roe"}))),
            DocumentOrigin::Docket
        );
        assert_eq!(
            detect_origin(&map(json!({"author_str": "Judge Smith"}))),
            DocumentOrigin::Opinion
        );
        assert_eq!(
            detect_origin(&map(json!({"panel": ["A", "B"]}))),
            DocumentOrigin::Cluster
        );
        assert_eq!(detect_origin(&map(json!({"foo": 1}))), DocumentOrigin::Unknown);
    }

    #[test]
    fn test_docket_assigned_to_wins() {
        let doc = map(json!({"assigned_to": "Jane Roe", "judge": "Other Judge"}));
        let result = FieldResolver::new().resolve_judge(&doc, None);

        assert_eq!(result.primary_judge.as_deref(), Some("Jane Roe"));
        assert_eq!(result.extraction_method.as_deref(), Some("document.assigned_to"));
        assert!(result.confidence > 0.8);
        assert!(result.all_judges.contains(&"Other Judge".to_string()));
    }

    #[test]
    fn test_nested_metadata_field() {
        let doc = map(json!({"metadata": {"author_str": "Judge Nested"}, "plain_text": ""}));
        let result = FieldResolver::new().resolve_judge(&doc, None);

        assert_eq!(result.primary_judge.as_deref(), Some("Judge Nested"));
        assert_eq!(result.extraction_method.as_deref(), Some("metadata.author_str"));
    }

    #[test]
    fn test_object_and_list_coercion() {
        let doc = map(json!({
            "panel": [{"name_full": "Hon. Maria Chavez"}, "Robert Oak"],
            "sub_opinions": []
        }));
        let result = FieldResolver::new().resolve_judge(&doc, None);

        assert_eq!(result.primary_judge.as_deref(), Some("Hon. Maria Chavez"));
        assert_eq!(result.all_judges.len(), 2);
    }

    #[test]
    fn test_numeric_and_url_strings_rejected() {
        let doc = map(json!({"assigned_to": "12345", "referred_to": "https://example.com/judge/1/"}));
        let result = FieldResolver::new().resolve_judge(&doc, None);

        assert_eq!(result.primary_judge, None);
        assert_eq!(result.extraction_method, None);
        // Both fields were still inspected for the audit trail.
        assert_eq!(result.inspected_fields.len(), 2);
    }

    #[test]
    fn test_missing_everything_yields_none() {
        let result = FieldResolver::new().resolve_judge(&map(json!({})), None);
        assert_eq!(result.primary_judge, None);
        assert!(result.all_judges.is_empty());
        assert!(result.inspected_fields.is_empty());
    }

    #[test]
    fn test_court_direct_field() {
        let doc = map(json!({"court_id": "scotus"}));
        let result = FieldResolver::new().resolve_court(&doc);

        assert_eq!(result.court_id.as_deref(), Some("scotus"));
        assert_eq!(result.method, Some(CourtResolutionMethod::DirectField));
    }

    #[test]
    fn test_court_nested_object() {
        let doc = map(json!({"court": {"id": "ca9", "name": "Ninth Circuit"}}));
        let result = FieldResolver::new().resolve_court(&doc);

        assert_eq!(result.court_id.as_deref(), Some("ca9"));
        assert_eq!(result.court_name.as_deref(), Some("Ninth Circuit"));
        assert_eq!(result.method, Some(CourtResolutionMethod::NestedObject));
    }

    #[test]
    fn test_court_from_url_pattern() {
        let doc = map(json!({
            "absolute_url": "https://www.courtlistener.com/api/rest/v4/courts/cand/"
        }));
        let result = FieldResolver::new().resolve_court(&doc);

        assert_eq!(result.court_id.as_deref(), Some("cand"));
        assert_eq!(result.method, Some(CourtResolutionMethod::UrlPattern));
        assert!(result.confidence < 0.7);
    }

    #[test]
    fn test_court_string_field_doubles_as_direct_id() {
        // `court` as a bare slug string resolves at tier 1, not tier 3.
        let doc = map(json!({"court": "nysd"}));
        let result = FieldResolver::new().resolve_court(&doc);

        assert_eq!(result.court_id.as_deref(), Some("nysd"));
        assert_eq!(result.method, Some(CourtResolutionMethod::DirectField));
    }
}
