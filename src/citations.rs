//! # Citation Extraction and Normalization Module
//!
//! ## Purpose
//! Extracts legal citations (volume/reporter/page triples) from raw opinion
//! text and maps reporter abbreviations to canonical forms using a
//! normalization table with an in-process cache.
//!
//! ## Input/Output Specification
//! - **Input**: Plain opinion text (may be empty)
//! - **Output**: Ordered citations with original text, normalized reporter,
//!   reporter full name, volume, page, year, and kind tag
//! - **Fallback**: An unrecognized reporter is preserved verbatim, never
//!   dropped
//!
//! ## Key Features
//! - Pattern set covering case, statute, and regulation citations
//! - Duplicate suppression by normalized form, position order preserved
//! - O(1) repeat lookups through a shared reporter cache

use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Citation kind, best-effort from the reporter token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Case,
    Statute,
    Regulation,
    Constitutional,
    Unknown,
}

/// A citation extracted from document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedCitation {
    /// Full matched text span
    pub full_text: String,
    /// Reporter abbreviation as written
    pub reporter: String,
    /// Canonical reporter abbreviation (equals `reporter` when unrecognized)
    pub normalized_reporter: String,
    /// Reporter full name, when the abbreviation is recognized
    pub reporter_full_name: Option<String>,
    /// Volume number
    pub volume: Option<String>,
    /// Page or section number
    pub page: Option<String>,
    /// Decision year, when present in the citation
    pub year: Option<u32>,
    /// Citation kind tag
    pub kind: CitationKind,
    /// Whether the reporter abbreviation matched the normalization table
    pub valid_reporter: bool,
    /// Byte position of the match in the source text
    pub position: usize,
}

/// Reporter normalization table: canonical abbreviation, full name, variants.
const REPORTERS: &[(&str, &str, &[&str])] = &[
    ("U.S.", "United States Reports", &["U. S.", "US"]),
    ("S. Ct.", "Supreme Court Reporter", &["S.Ct.", "Sup. Ct."]),
    ("L. Ed.", "United States Supreme Court Reports, Lawyers' Edition", &["L.Ed."]),
    ("L. Ed. 2d", "Lawyers' Edition, Second Series", &["L.Ed.2d", "L. Ed.2d"]),
    ("F.", "Federal Reporter", &["Fed."]),
    ("F.2d", "Federal Reporter, Second Series", &["F. 2d"]),
    ("F.3d", "Federal Reporter, Third Series", &["F. 3d"]),
    ("F.4th", "Federal Reporter, Fourth Series", &["F. 4th"]),
    ("F. Supp.", "Federal Supplement", &["F.Supp."]),
    ("F. Supp. 2d", "Federal Supplement, Second Series", &["F.Supp.2d"]),
    ("F. Supp. 3d", "Federal Supplement, Third Series", &["F.Supp.3d"]),
    ("F.R.D.", "Federal Rules Decisions", &["F. R. D."]),
    ("B.R.", "Bankruptcy Reporter", &["Bankr."]),
    ("A.2d", "Atlantic Reporter, Second Series", &["A. 2d"]),
    ("A.3d", "Atlantic Reporter, Third Series", &["A. 3d"]),
    ("N.E.2d", "North Eastern Reporter, Second Series", &["N.E. 2d"]),
    ("N.E.3d", "North Eastern Reporter, Third Series", &["N.E. 3d"]),
    ("N.W.2d", "North Western Reporter, Second Series", &["N.W. 2d"]),
    ("P.2d", "Pacific Reporter, Second Series", &["P. 2d"]),
    ("P.3d", "Pacific Reporter, Third Series", &["P. 3d"]),
    ("S.E.2d", "South Eastern Reporter, Second Series", &["S.E. 2d"]),
    ("S.W.3d", "South Western Reporter, Third Series", &["S.W. 3d"]),
    ("So. 2d", "Southern Reporter, Second Series", &["So.2d"]),
    ("So. 3d", "Southern Reporter, Third Series", &["So.3d"]),
    ("Cal. Rptr. 3d", "California Reporter, Third Series", &["Cal.Rptr.3d"]),
    ("N.Y.S.2d", "New York Supplement, Second Series", &["N.Y.S. 2d"]),
    ("U.S.C.", "United States Code", &["USC", "U. S. C."]),
    ("C.F.R.", "Code of Federal Regulations", &["CFR"]),
];

#[derive(Debug, Clone)]
struct CachedReporter {
    normalized: String,
    full_name: Option<String>,
    valid: bool,
}

/// Citation extractor and reporter normalizer.
///
/// The reporter cache is part of the constructed state so callers can share
/// one normalizer across batches; `reset()` clears it.
pub struct CitationNormalizer {
    citation_regex: Vec<(Regex, CitationKind)>,
    reporter_cache: DashMap<String, CachedReporter>,
}

impl CitationNormalizer {
    pub fn new() -> Self {
        // Statute and regulation patterns run first so their reporter tokens
        // are not consumed by the general case pattern.
        let patterns = vec![
            (
                r"\b(\d{1,3})\s+(U\.\s?S\.\s?C\.)\s*§{1,2}\s*([\dA-Za-z().-]+)",
                CitationKind::Statute,
            ),
            (
                r"\b(\d{1,3})\s+(C\.\s?F\.\s?R\.)\s*§{0,2}\s*([\d.]+)",
                CitationKind::Regulation,
            ),
            // Volume Reporter Page (Year): reporter is one or more
            // period-terminated tokens, optionally ending in 2d/3d/4th.
            (
                r"\b(\d{1,4})\s+((?:[A-Z][A-Za-z']{0,10}\.\s?)+(?:[234](?:d|th))?)\s*(\d{1,5})(?:\s*\((\d{4})\))?",
                CitationKind::Case,
            ),
        ];

        let citation_regex = patterns
            .into_iter()
            .map(|(pattern, kind)| (Regex::new(pattern).expect("citation pattern"), kind))
            .collect();

        Self {
            citation_regex,
            reporter_cache: DashMap::new(),
        }
    }

    /// Extract citations from text. Empty or whitespace-only text yields an
    /// empty list, not an error.
    pub fn extract(&self, text: &str) -> Vec<ExtractedCitation> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut citations: Vec<ExtractedCitation> = Vec::new();

        for (regex, kind) in &self.citation_regex {
            for captures in regex.captures_iter(text) {
                let full_match = match captures.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                let raw_reporter = captures
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                if raw_reporter.is_empty() {
                    continue;
                }

                let (normalized, full_name, valid) = self.normalize_reporter(&raw_reporter);
                let kind = refine_kind(*kind, &normalized);

                citations.push(ExtractedCitation {
                    full_text: full_match.as_str().trim().to_string(),
                    reporter: raw_reporter,
                    normalized_reporter: normalized,
                    reporter_full_name: full_name,
                    volume: captures.get(1).map(|m| m.as_str().to_string()),
                    page: captures.get(3).map(|m| m.as_str().to_string()),
                    year: captures.get(4).and_then(|m| m.as_str().parse().ok()),
                    kind,
                    valid_reporter: valid,
                    position: full_match.start(),
                });
            }
        }

        // Suppress cross-pattern duplicates of the same cite, keep position order.
        citations.sort_by_key(|c| c.position);
        citations.dedup_by_key(|c| {
            (
                c.normalized_reporter.clone(),
                c.volume.clone(),
                c.page.clone(),
            )
        });

        citations
    }

    /// Map a reporter abbreviation to its canonical form.
    ///
    /// Returns (normalized, full name, valid). An unrecognized abbreviation
    /// comes back verbatim with `valid == false` (lossless fallback).
    pub fn normalize_reporter(&self, raw: &str) -> (String, Option<String>, bool) {
        let collapsed = collapse_whitespace(raw);

        if let Some(cached) = self.reporter_cache.get(&collapsed) {
            return (
                cached.normalized.clone(),
                cached.full_name.clone(),
                cached.valid,
            );
        }

        let squashed = squash(&collapsed);
        let mut hit: Option<(&str, &str)> = None;
        for &(canonical, full_name, variants) in REPORTERS {
            if squash(canonical) == squashed
                || variants.iter().any(|v| squash(v) == squashed)
            {
                hit = Some((canonical, full_name));
                break;
            }
        }

        let entry = match hit {
            Some((canonical, full_name)) => CachedReporter {
                normalized: canonical.to_string(),
                full_name: Some(full_name.to_string()),
                valid: true,
            },
            None => CachedReporter {
                normalized: collapsed.clone(),
                full_name: None,
                valid: false,
            },
        };

        let result = (
            entry.normalized.clone(),
            entry.full_name.clone(),
            entry.valid,
        );
        self.reporter_cache.insert(collapsed, entry);
        result
    }

    /// Clear the reporter cache.
    pub fn reset(&self) {
        self.reporter_cache.clear();
    }

    /// Number of cached reporter lookups.
    pub fn cache_len(&self) -> usize {
        self.reporter_cache.len()
    }
}

impl Default for CitationNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn refine_kind(kind: CitationKind, normalized_reporter: &str) -> CitationKind {
    match kind {
        CitationKind::Case => {
            if normalized_reporter == "U.S.C." {
                CitationKind::Statute
            } else if normalized_reporter == "C.F.R." {
                CitationKind::Regulation
            } else if normalized_reporter.to_lowercase().contains("const") {
                CitationKind::Constitutional
            } else {
                CitationKind::Case
            }
        }
        other => other,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key: case-folded with all whitespace removed, so "U. S."
/// and "U.S." collide.
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_us_reports_citation() {
        let normalizer = CitationNormalizer::new();
        let citations =
            normalizer.extract("See Brown v. Board of Education, 347 U.S. 483 (1954).");

        assert_eq!(citations.len(), 1);
        let cite = &citations[0];
        assert_eq!(cite.normalized_reporter, "U.S.");
        assert_eq!(cite.volume.as_deref(), Some("347"));
        assert_eq!(cite.page.as_deref(), Some("483"));
        assert_eq!(cite.year, Some(1954));
        assert_eq!(cite.kind, CitationKind::Case);
        assert!(cite.valid_reporter);
    }

    #[test]
    fn test_variant_spelling_maps_to_canonical() {
        let normalizer = CitationNormalizer::new();
        let (normalized, full_name, valid) = normalizer.normalize_reporter("U. S.");

        assert_eq!(normalized, "U.S.");
        assert_eq!(full_name.as_deref(), Some("United States Reports"));
        assert!(valid);
    }

    #[test]
    fn test_unknown_reporter_preserved_verbatim() {
        let normalizer = CitationNormalizer::new();
        let citations = normalizer.extract("12 Xyz. Rptr. 345");

        assert_eq!(citations.len(), 1);
        let cite = &citations[0];
        assert_eq!(cite.normalized_reporter, cite.reporter);
        assert!(!cite.valid_reporter);
        assert_eq!(cite.reporter_full_name, None);
    }

    #[test]
    fn test_statute_citation_kind() {
        let normalizer = CitationNormalizer::new();
        let citations = normalizer.extract("under 42 U.S.C. § 1983 the plaintiff");

        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].kind, CitationKind::Statute);
        assert_eq!(citations[0].normalized_reporter, "U.S.C.");
        assert_eq!(citations[0].page.as_deref(), Some("1983"));
    }

    #[test]
    fn test_federal_supplement_series() {
        let normalizer = CitationNormalizer::new();
        let citations = normalizer.extract("see 998 F. Supp. 2d 1034, aff'd 750 F.3d 776 (2014)");

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].normalized_reporter, "F. Supp. 2d");
        assert_eq!(citations[1].normalized_reporter, "F.3d");
    }

    #[test]
    fn test_empty_text_returns_empty() {
        let normalizer = CitationNormalizer::new();
        assert!(normalizer.extract("").is_empty());
        assert!(normalizer.extract("   \n  ").is_empty());
    }

    #[test]
    fn test_duplicate_cites_suppressed() {
        let normalizer = CitationNormalizer::new();
        let citations = normalizer.extract("347 U.S. 483, and again at 347 U.S. 483 (1954)");

        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].position, 0);
    }

    #[test]
    fn test_reporter_cache_reuse() {
        let normalizer = CitationNormalizer::new();
        normalizer.normalize_reporter("U.S.");
        normalizer.normalize_reporter("U.S.");
        normalizer.normalize_reporter("F.3d");

        assert_eq!(normalizer.cache_len(), 2);
        normalizer.reset();
        assert_eq!(normalizer.cache_len(), 0);
    }
}
