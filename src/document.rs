//! Walks the structured quiz document: collects markup-bearing text leaves
//! and substitutes rendered fragments back in place.
//!
//! The quiz is a YAML tree (sequences, mappings, scalars). A string leaf is
//! markup-bearing unless it sits under a structural key: the `type`
//! discriminant or any key with the reserved `pre_` prefix. Structural
//! subtrees are skipped wholesale; numeric and boolean scalars are never
//! snippets.

use std::collections::HashMap;

use serde_yaml::Value;

/// Reserved prefix for machine-consumed fields that must never be transcoded.
pub const PRIVATE_KEY_PREFIX: &str = "pre_";

/// The entry-kind discriminant key.
pub const TYPE_KEY: &str = "type";

fn is_structural_key(key: &Value) -> bool {
    match key.as_str() {
        Some(key) => key == TYPE_KEY || key.starts_with(PRIVATE_KEY_PREFIX),
        None => false,
    }
}

/// Collect the ordered, deduplicated list of markup text leaves.
///
/// Traversal is document order (YAML mappings preserve insertion order);
/// deduplication is by exact text equality, first occurrence wins. Pure
/// function of its input.
pub fn collect_snippets(doc: &Value) -> Vec<String> {
    let mut snippets = Vec::new();
    let mut seen = std::collections::HashSet::new();
    collect_into(doc, &mut snippets, &mut seen);
    snippets
}

fn collect_into(
    value: &Value,
    snippets: &mut Vec<String>,
    seen: &mut std::collections::HashSet<String>,
) {
    match value {
        Value::Sequence(items) => {
            for item in items {
                collect_into(item, snippets, seen);
            }
        }
        Value::Mapping(map) => {
            for (key, val) in map {
                if !is_structural_key(key) {
                    collect_into(val, snippets, seen);
                }
            }
        }
        Value::String(text) => {
            if seen.insert(text.clone()) {
                snippets.push(text.clone());
            }
        }
        _ => {}
    }
}

/// Rebuild the document with every markup leaf replaced by its rendered
/// fragment.
///
/// Structural keys and non-string leaves are copied unchanged. A string leaf
/// with no entry in the map passes through as-is rather than failing, so a
/// partially-built map still yields a usable document. Idempotent for a
/// stable map; the input is never mutated.
pub fn substitute_fragments(doc: &Value, fragments: &HashMap<String, String>) -> Value {
    match doc {
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| substitute_fragments(item, fragments))
                .collect(),
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, val) in map {
                let new_val = if is_structural_key(key) {
                    val.clone()
                } else {
                    substitute_fragments(val, fragments)
                };
                out.insert(key.clone(), new_val);
            }
            Value::Mapping(out)
        }
        Value::String(text) => match fragments.get(text) {
            Some(fragment) => Value::String(fragment.clone()),
            None => doc.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("fixture should parse")
    }

    #[test]
    fn collects_in_document_order() {
        let doc = quiz(
            "- type: mc\n  question: What is $x$?\n  answers:\n    - answer: one\n    - answer: two\n",
        );
        let snippets = collect_snippets(&doc);
        assert_eq!(snippets, vec!["What is $x$?", "one", "two"]);
    }

    #[test]
    fn skips_type_and_private_keys() {
        let doc = quiz(
            "- type: header\n  title: The Quiz\n  pre_latexpreamble: \\usepackage{bm}\n",
        );
        let snippets = collect_snippets(&doc);
        assert_eq!(snippets, vec!["The Quiz"]);
    }

    #[test]
    fn numeric_fields_are_not_snippets() {
        let doc = quiz("- type: mc\n  marks: 2.5\n  question: Q\n");
        assert_eq!(collect_snippets(&doc), vec!["Q"]);
    }

    #[test]
    fn duplicate_text_collapses_to_one_snippet() {
        let doc = quiz("- question: What is 2+2?\n- question: What is 2+2?\n");
        assert_eq!(collect_snippets(&doc), vec!["What is 2+2?"]);
    }

    #[test]
    fn collection_is_deterministic() {
        let doc = quiz("- question: a\n  hint: b\n- question: c\n");
        assert_eq!(collect_snippets(&doc), collect_snippets(&doc));
    }

    #[test]
    fn substitutes_all_occurrences_of_a_snippet() {
        let doc = quiz("- question: What is 2+2?\n- question: What is 2+2?\n");
        let mut map = HashMap::new();
        map.insert("What is 2+2?".to_string(), "<p>What is 2+2?</p>".to_string());
        let out = substitute_fragments(&doc, &map);
        let seq = out.as_sequence().unwrap();
        for entry in seq {
            assert_eq!(
                entry["question"].as_str(),
                Some("<p>What is 2+2?</p>")
            );
        }
    }

    #[test]
    fn structural_fields_survive_substitution() {
        let doc = quiz("- type: mc\n  marks: 3\n  question: Q\n");
        let mut map = HashMap::new();
        map.insert("Q".to_string(), "rendered".to_string());
        map.insert("mc".to_string(), "should not apply".to_string());
        let out = substitute_fragments(&doc, &map);
        assert_eq!(out[0]["type"].as_str(), Some("mc"));
        assert_eq!(out[0]["marks"].as_u64(), Some(3));
        assert_eq!(out[0]["question"].as_str(), Some("rendered"));
    }

    #[test]
    fn missing_fragment_passes_through() {
        let doc = quiz("- question: unmapped\n");
        let out = substitute_fragments(&doc, &HashMap::new());
        assert_eq!(out[0]["question"].as_str(), Some("unmapped"));
    }

    #[test]
    fn substitution_is_idempotent() {
        let doc = quiz("- question: Q\n");
        let mut map = HashMap::new();
        map.insert("Q".to_string(), "R".to_string());
        let once = substitute_fragments(&doc, &map);
        let twice = substitute_fragments(&once, &map);
        assert_eq!(once, twice);
    }
}
