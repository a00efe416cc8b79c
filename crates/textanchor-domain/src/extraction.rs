//! Extraction module - candidates claimed by the model and their grounded form

use crate::CharInterval;

/// Insertion-ordered string-to-string attribute map
///
/// Inserting an existing key replaces its value in place, keeping the
/// original position. Attribute maps are small, so a vector is enough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Create an empty attribute map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Union `other` into `self`; values from `other` win on key collision
    pub fn merge_from(&mut self, other: &Attributes) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}

/// How confidently a candidate was relocated in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentStatus {
    /// Byte-identical substring found
    Exact,
    /// Near match accepted within the similarity threshold
    Fuzzy,
    /// No acceptable match; the extraction carries no interval
    Unaligned,
}

impl AlignmentStatus {
    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentStatus::Exact => "exact",
            AlignmentStatus::Fuzzy => "fuzzy",
            AlignmentStatus::Unaligned => "unaligned",
        }
    }

    /// Parse a status from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(AlignmentStatus::Exact),
            "fuzzy" => Some(AlignmentStatus::Fuzzy),
            "unaligned" => Some(AlignmentStatus::Unaligned),
            _ => None,
        }
    }

    /// Whether the status carries an interval
    pub fn is_aligned(&self) -> bool {
        !matches!(self, AlignmentStatus::Unaligned)
    }
}

/// The model's unverified claim, scoped to one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Extraction class (e.g. "character", "medication")
    pub class_name: String,

    /// Text the model claims to have found, verbatim from its answer
    pub claimed_text: String,

    /// Attributes attached by the model
    pub attributes: Attributes,

    /// Emission order within the chunk response
    pub extraction_index: usize,

    /// Index of the response record the candidate came from
    pub group_index: Option<usize>,
}

impl Candidate {
    /// Create a candidate with no attributes
    pub fn new(class_name: impl Into<String>, claimed_text: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            claimed_text: claimed_text.into(),
            attributes: Attributes::new(),
            extraction_index: 0,
            group_index: None,
        }
    }

    /// Attach attributes
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the emission index
    pub fn with_index(mut self, extraction_index: usize) -> Self {
        self.extraction_index = extraction_index;
        self
    }
}

/// A candidate anchored (or not) to the source document
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedExtraction {
    /// Extraction class
    pub class_name: String,

    /// Document text at `interval`, or the claimed text when unaligned
    pub extraction_text: String,

    /// Attributes carried over from the candidate
    pub attributes: Attributes,

    /// Global interval in the document; absent when unaligned
    pub interval: Option<CharInterval>,

    /// Alignment outcome
    pub alignment_status: AlignmentStatus,

    /// Emission order within the chunk response
    pub extraction_index: usize,

    /// Index of the response record the candidate came from
    pub group_index: Option<usize>,

    /// Chunk the extraction came from
    pub chunk_index: usize,

    /// Extraction pass the extraction came from
    pub pass_index: usize,
}

impl GroundedExtraction {
    /// Build an unaligned extraction that keeps the claimed text
    pub fn unaligned(candidate: Candidate, chunk_index: usize) -> Self {
        Self {
            class_name: candidate.class_name,
            extraction_text: candidate.claimed_text,
            attributes: candidate.attributes,
            interval: None,
            alignment_status: AlignmentStatus::Unaligned,
            extraction_index: candidate.extraction_index,
            group_index: candidate.group_index,
            chunk_index,
            pass_index: 0,
        }
    }

    /// Whether the extraction is anchored to the document
    pub fn is_aligned(&self) -> bool {
        self.interval.is_some()
    }

    /// Tag the extraction with the pass that produced it
    pub fn in_pass(mut self, pass_index: usize) -> Self {
        self.pass_index = pass_index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_preserve_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.insert("state", "wonder");
        attrs.insert("age", "young");
        attrs.insert("state", "awe");

        let entries: Vec<_> = attrs.iter().collect();
        assert_eq!(entries, vec![("state", "awe"), ("age", "young")]);
    }

    #[test]
    fn test_attributes_merge_later_wins() {
        let mut first: Attributes = [("feeling", "awe"), ("tone", "soft")].into_iter().collect();
        let second: Attributes = [("feeling", "longing"), ("speaker", "Romeo")].into_iter().collect();

        first.merge_from(&second);

        assert_eq!(first.get("feeling"), Some("longing"));
        assert_eq!(first.get("tone"), Some("soft"));
        assert_eq!(first.get("speaker"), Some("Romeo"));
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_alignment_status_round_trip_names() {
        for status in [AlignmentStatus::Exact, AlignmentStatus::Fuzzy, AlignmentStatus::Unaligned] {
            assert_eq!(AlignmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AlignmentStatus::parse("EXACT"), Some(AlignmentStatus::Exact));
        assert_eq!(AlignmentStatus::parse("match_lesser"), None);
    }

    #[test]
    fn test_unaligned_keeps_claimed_text() {
        let candidate = Candidate::new("character", "Juliet").with_index(3);
        let extraction = GroundedExtraction::unaligned(candidate, 2);

        assert_eq!(extraction.extraction_text, "Juliet");
        assert_eq!(extraction.interval, None);
        assert_eq!(extraction.alignment_status, AlignmentStatus::Unaligned);
        assert_eq!(extraction.extraction_index, 3);
        assert_eq!(extraction.chunk_index, 2);
        assert!(!extraction.is_aligned());
    }
}
