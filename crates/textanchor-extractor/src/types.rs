//! Serializable records for writing results out
//!
//! These mirror the in-memory result with plain serde types so callers can
//! emit JSON lines (or any serde format) without touching the domain model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use textanchor_domain::{AnnotatedDocument, CharInterval, GroundedExtraction};

/// Half-open offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// Start offset (inclusive)
    pub start_pos: usize,
    /// End offset (exclusive)
    pub end_pos: usize,
}

/// One extraction as written to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Extraction class
    pub class_name: String,

    /// Grounded text, or the claimed text when unaligned
    pub extraction_text: String,

    /// Attributes in insertion order
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// `exact`, `fuzzy` or `unaligned`
    pub alignment_status: String,

    /// UTF-8 byte offsets into the document text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_interval: Option<IntervalRecord>,

    /// Character (Unicode scalar) offsets into the document text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_interval: Option<IntervalRecord>,

    /// Emission order within the chunk response
    pub extraction_index: usize,

    /// Response record the extraction came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<usize>,
}

impl ExtractionRecord {
    /// Build a record, resolving character offsets against `text`
    pub fn from_extraction(extraction: &GroundedExtraction, text: &str) -> Self {
        let attributes = extraction
            .attributes
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        Self {
            class_name: extraction.class_name.clone(),
            extraction_text: extraction.extraction_text.clone(),
            attributes,
            alignment_status: extraction.alignment_status.as_str().to_string(),
            byte_interval: extraction.interval.map(|i| IntervalRecord {
                start_pos: i.start_offset,
                end_pos: i.end_offset,
            }),
            char_interval: extraction.interval.and_then(|i| char_interval(text, i)),
            extraction_index: extraction.extraction_index,
            group_index: extraction.group_index,
        }
    }
}

/// One annotated document as written to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Source document id
    pub document_id: String,

    /// Source text the offsets refer to
    pub text: String,

    /// Extractions in result order
    pub extractions: Vec<ExtractionRecord>,
}

impl From<&AnnotatedDocument> for DocumentRecord {
    fn from(document: &AnnotatedDocument) -> Self {
        Self {
            document_id: document.document_id.clone(),
            text: document.text.clone(),
            extractions: document
                .extractions
                .iter()
                .map(|e| ExtractionRecord::from_extraction(e, &document.text))
                .collect(),
        }
    }
}

fn char_interval(text: &str, interval: CharInterval) -> Option<IntervalRecord> {
    let span = interval.slice(text)?;
    let start_pos = text[..interval.start_offset].chars().count();
    Some(IntervalRecord {
        start_pos,
        end_pos: start_pos + span.chars().count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use textanchor_domain::{AlignmentStatus, Attributes, Candidate, RunMetadata};

    fn annotated() -> AnnotatedDocument {
        let text = "Le café. Juliet speaks.".to_string();
        let grounded = GroundedExtraction {
            class_name: "character".to_string(),
            extraction_text: "Juliet".to_string(),
            attributes: [("mood", "calm"), ("age", "13")].into_iter().collect::<Attributes>(),
            interval: Some(CharInterval::new(10, 16)),
            alignment_status: AlignmentStatus::Exact,
            extraction_index: 0,
            group_index: Some(0),
            chunk_index: 0,
            pass_index: 0,
        };
        let missing = GroundedExtraction::unaligned(Candidate::new("character", "Paris").with_index(1), 0);

        AnnotatedDocument {
            document_id: "doc_1".to_string(),
            text,
            extractions: vec![grounded, missing],
            metadata: RunMetadata::default(),
        }
    }

    #[test]
    fn test_record_carries_byte_and_char_offsets() {
        let record = DocumentRecord::from(&annotated());
        let juliet = &record.extractions[0];

        assert_eq!(juliet.byte_interval, Some(IntervalRecord { start_pos: 10, end_pos: 16 }));
        assert_eq!(juliet.char_interval, Some(IntervalRecord { start_pos: 9, end_pos: 15 }));
        assert_eq!(juliet.alignment_status, "exact");
    }

    #[test]
    fn test_json_shape() {
        let record = DocumentRecord::from(&annotated());
        let json = serde_json::to_string(&record.extractions[0]).unwrap();

        assert!(json.contains(r#""attributes":{"mood":"calm","age":"13"}"#));
        assert!(json.contains(r#""char_interval":{"start_pos":9,"end_pos":15}"#));

        let unaligned = serde_json::to_value(&record.extractions[1]).unwrap();
        assert_eq!(unaligned["alignment_status"], "unaligned");
        assert!(unaligned.get("byte_interval").is_none());
        assert!(unaligned.get("group_index").is_none());
    }

    #[test]
    fn test_record_deserializes_back() {
        let record = DocumentRecord::from(&annotated());
        let line = serde_json::to_string(&record).unwrap();
        let parsed: DocumentRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }
}
