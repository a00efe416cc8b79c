//! Combining extractions from several chunks and passes
//!
//! Duplicates share a key: `(class, interval)` when aligned, otherwise
//! `(class, normalized text)`. The first occurrence is kept and later
//! duplicates only contribute attributes, overwriting on key collision.
//! The set of kept keys does not depend on input order; the winning
//! attribute values do.

use std::collections::HashMap;
use textanchor_domain::{CharInterval, GroundedExtraction};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    Aligned(String, CharInterval),
    Unaligned(String, String),
}

impl MergeKey {
    fn of(extraction: &GroundedExtraction) -> Self {
        match extraction.interval {
            Some(interval) => MergeKey::Aligned(extraction.class_name.clone(), interval),
            None => MergeKey::Unaligned(
                extraction.class_name.clone(),
                normalize(&extraction.extraction_text),
            ),
        }
    }
}

/// Merge batches (outer = pass-major, inner = discovery order) into one ordered set
///
/// Aligned extractions come first by ascending start offset, ties in
/// discovery order; unaligned ones follow in discovery order.
pub fn merge(batches: Vec<Vec<GroundedExtraction>>) -> Vec<GroundedExtraction> {
    let mut kept: Vec<GroundedExtraction> = Vec::new();
    let mut seen: HashMap<MergeKey, usize> = HashMap::new();

    for extraction in batches.into_iter().flatten() {
        let key = MergeKey::of(&extraction);
        match seen.get(&key) {
            Some(&index) => kept[index].attributes.merge_from(&extraction.attributes),
            None => {
                seen.insert(key, kept.len());
                kept.push(extraction);
            }
        }
    }

    let (mut aligned, unaligned): (Vec<_>, Vec<_>) =
        kept.into_iter().partition(GroundedExtraction::is_aligned);
    aligned.sort_by_key(|e| e.interval.map(|i| i.start_offset));
    aligned.extend(unaligned);
    aligned
}

/// Lowercase, trim, and collapse whitespace runs
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use textanchor_domain::{AlignmentStatus, Attributes, Candidate};

    fn aligned(class: &str, text: &str, start: usize, attrs: &[(&str, &str)]) -> GroundedExtraction {
        GroundedExtraction {
            class_name: class.to_string(),
            extraction_text: text.to_string(),
            attributes: attrs.iter().copied().collect::<Attributes>(),
            interval: Some(CharInterval::new(start, start + text.len())),
            alignment_status: AlignmentStatus::Exact,
            extraction_index: 0,
            group_index: None,
            chunk_index: 0,
            pass_index: 0,
        }
    }

    fn unaligned(class: &str, text: &str) -> GroundedExtraction {
        GroundedExtraction::unaligned(Candidate::new(class, text), 0)
    }

    fn texts(merged: &[GroundedExtraction]) -> Vec<&str> {
        merged.iter().map(|e| e.extraction_text.as_str()).collect()
    }

    #[test]
    fn test_same_span_across_passes_merges() {
        let first = aligned("character", "ROMEO", 0, &[("mood", "wonder")]);
        let second = aligned("character", "ROMEO", 0, &[("mood", "awe"), ("age", "young")]).in_pass(1);

        let merged = merge(vec![vec![first], vec![second]]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pass_index, 0);
        assert_eq!(merged[0].attributes.get("mood"), Some("awe"));
        assert_eq!(merged[0].attributes.get("age"), Some("young"));
    }

    #[test]
    fn test_different_class_same_span_kept() {
        let merged = merge(vec![vec![
            aligned("character", "ROMEO", 0, &[]),
            aligned("speaker", "ROMEO", 0, &[]),
        ]]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].class_name, "character");
    }

    #[test]
    fn test_ordering_by_start_then_discovery_unaligned_last() {
        let merged = merge(vec![
            vec![
                unaligned("character", "Mercutio"),
                aligned("emotion", "But soft!", 7, &[]),
            ],
            vec![
                aligned("character", "ROMEO", 0, &[]),
                unaligned("character", "Tybalt"),
                aligned("line", "But", 7, &[]),
            ],
        ]);

        assert_eq!(texts(&merged), vec!["ROMEO", "But soft!", "But", "Mercutio", "Tybalt"]);
    }

    #[test]
    fn test_unaligned_dedup_by_normalized_text() {
        let merged = merge(vec![
            vec![unaligned("character", "Friar  Laurence")],
            vec![unaligned("character", " friar laurence\n")],
            vec![unaligned("location", "friar laurence")],
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].extraction_text, "Friar  Laurence");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batches = vec![
            vec![aligned("a", "x", 4, &[("k", "1")]), unaligned("b", "y")],
            vec![aligned("a", "x", 4, &[("k", "2")]), aligned("a", "z", 1, &[])],
        ];

        let once = merge(batches);
        let twice = merge(vec![once.clone()]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_key_set_independent_of_pass_order() {
        let a = vec![aligned("c", "ROMEO", 0, &[("v", "a")]), unaligned("c", "Paris")];
        let b = vec![aligned("c", "ROMEO", 0, &[("v", "b")]), aligned("c", "soft", 11, &[])];

        let ab = merge(vec![a.clone(), b.clone()]);
        let ba = merge(vec![b, a]);

        assert_eq!(texts(&ab), texts(&ba));
        // Later batch wins the attribute collision
        assert_eq!(ab[0].attributes.get("v"), Some("b"));
        assert_eq!(ba[0].attributes.get("v"), Some("a"));
    }

    #[test]
    fn test_empty_input() {
        assert!(merge(Vec::new()).is_empty());
        assert!(merge(vec![Vec::new(), Vec::new()]).is_empty());
    }
}
