//! # Metadata Merge Module
//!
//! ## Purpose
//! A single, explicit merge operation for document metadata with documented
//! semantics: enhancement output is additive and never replaces an existing
//! non-null field with null.
//!
//! ## Input/Output Specification
//! - **Input**: An existing metadata mapping and an incoming mapping
//! - **Output**: The existing mapping mutated in place with incoming values
//! - **Semantics**: Null/absent incoming values never clobber non-null
//!   existing values; nested objects merge recursively; everything else is
//!   last-writer-wins for genuinely new values

use crate::Metadata;
use serde_json::Value;

/// Merge `incoming` into `existing`.
///
/// Rules, in order:
/// - incoming `null` never overwrites a non-null existing value
/// - two objects under the same key merge recursively
/// - any other incoming non-null value replaces the existing value
/// - keys only present in `existing` are left untouched
pub fn merge_preserving(existing: &mut Metadata, incoming: Metadata) {
    for (key, new_value) in incoming {
        match existing.get_mut(&key) {
            None => {
                existing.insert(key, new_value);
            }
            Some(current) => {
                if new_value.is_null() && !current.is_null() {
                    continue;
                }
                match (current, new_value) {
                    (Value::Object(current_map), Value::Object(new_map)) => {
                        merge_preserving(current_map, new_map);
                    }
                    (current, new_value) => {
                        *current = new_value;
                    }
                }
            }
        }
    }
}

/// Merge returning a new mapping, leaving `existing` untouched.
pub fn merged(existing: &Metadata, incoming: Metadata) -> Metadata {
    let mut out = existing.clone();
    merge_preserving(&mut out, incoming);
    out
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
    fn test_null_never_clobbers() {
        let mut existing = map(json!({"court_id": "scotus", "judge_name": null}));
        let incoming = map(json!({"court_id": null, "judge_name": "Jane Roe"}));
        merge_preserving(&mut existing, incoming);

        assert_eq!(existing["court_id"], json!("scotus"));
        assert_eq!(existing["judge_name"], json!("Jane Roe"));
    }

    #[test]
    fn test_new_keys_are_added() {
        let mut existing = map(json!({"case_name": "Brown v. Board"}));
        let incoming = map(json!({"date_filed": "1954-05-17"}));
        merge_preserving(&mut existing, incoming);

        assert_eq!(existing["case_name"], json!("Brown v. Board"));
        assert_eq!(existing["date_filed"], json!("1954-05-17"));
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let mut existing = map(json!({
            "court": {"id": "ca9", "name": null}
        }));
        let incoming = map(json!({
            "court": {"id": null, "name": "Ninth Circuit"}
        }));
        merge_preserving(&mut existing, incoming);

        assert_eq!(existing["court"]["id"], json!("ca9"));
        assert_eq!(existing["court"]["name"], json!("Ninth Circuit"));
    }

    #[test]
    fn test_non_null_replacement_wins() {
        let mut existing = map(json!({"judge_confidence": 0.4}));
        let incoming = map(json!({"judge_confidence": 0.9}));
        merge_preserving(&mut existing, incoming);

        assert_eq!(existing["judge_confidence"], json!(0.9));
    }

    #[test]
    fn test_merged_leaves_input_untouched() {
        let existing = map(json!({"a": 1}));
        let out = merged(&existing, map(json!({"b": 2})));

        assert_eq!(existing.len(), 1);
        assert_eq!(out["a"], json!(1));
        assert_eq!(out["b"], json!(2));
    }
}
