//! Document module - source text, its chunks, and the annotated result

use crate::{CharInterval, GroundedExtraction};

/// An immutable source document
///
/// The document text is the source of truth for every interval produced by
/// the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    text: String,
    additional_context: Option<String>,
}

impl Document {
    /// Create a document with a generated identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use textanchor_domain::Document;
    ///
    /// let doc = Document::new("ROMEO. But soft!");
    /// assert!(doc.id().starts_with("doc_"));
    /// ```
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: generate_document_id(),
            text: text.into(),
            additional_context: None,
        }
    }

    /// Create a document with a caller-supplied identifier
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            additional_context: None,
        }
    }

    /// Attach free-form context handed to the prompt builder
    pub fn with_additional_context(mut self, context: impl Into<String>) -> Self {
        self.additional_context = Some(context.into());
        self
    }

    /// Document identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full document text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Optional context for prompt construction
    pub fn additional_context(&self) -> Option<&str> {
        self.additional_context.as_deref()
    }

    /// Length of the text in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the document has no text
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Convert a byte interval into Unicode scalar (character) offsets
    ///
    /// Returns `None` when the interval is out of range or not on `char`
    /// boundaries.
    pub fn char_offsets(&self, interval: &CharInterval) -> Option<(usize, usize)> {
        interval.slice(&self.text)?;
        let start = self.text[..interval.start_offset].chars().count();
        let len = self.text[interval.start_offset..interval.end_offset].chars().count();
        Some((start, start + len))
    }
}

fn generate_document_id() -> String {
    format!("doc_{}", uuid::Uuid::now_v7().simple())
}

/// A contiguous slice of a document handled by one model call
///
/// Chunks borrow the document text; they never copy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    /// Position of the chunk in document order
    pub chunk_index: usize,

    /// Global interval of the chunk in the document
    pub interval: CharInterval,

    /// The chunk text, equal to `document.text()[interval]`
    pub text: &'a str,
}

impl<'a> TextChunk<'a> {
    /// Create a chunk over `document_text[interval]`
    ///
    /// # Panics
    /// Panics if the interval is not a valid slice of `document_text`
    pub fn new(chunk_index: usize, interval: CharInterval, document_text: &'a str) -> Self {
        let text = interval
            .slice(document_text)
            .expect("chunk interval must lie on char boundaries of the document");
        Self {
            chunk_index,
            interval,
            text,
        }
    }
}

/// Category of a non-fatal event recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Model output could not be parsed; the chunk contributed nothing
    ParseFailure,
    /// A record in otherwise valid output was rejected
    RejectedRecord,
    /// The model call failed and the chunk was skipped
    ModelCallFailed,
    /// The run stopped early and the result is partial
    Incomplete,
}

impl WarningKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::ParseFailure => "parse_failure",
            WarningKind::RejectedRecord => "rejected_record",
            WarningKind::ModelCallFailed => "model_call_failed",
            WarningKind::Incomplete => "incomplete",
        }
    }
}

/// A warning recorded against a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunWarning {
    /// Pass the warning belongs to, if chunk-scoped
    pub pass_index: Option<usize>,
    /// Chunk the warning belongs to, if chunk-scoped
    pub chunk_index: Option<usize>,
    /// Warning category
    pub kind: WarningKind,
    /// Human-readable detail
    pub message: String,
}

impl RunWarning {
    /// Create a warning scoped to one chunk of one pass
    pub fn for_chunk(
        pass_index: usize,
        chunk_index: usize,
        kind: WarningKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pass_index: Some(pass_index),
            chunk_index: Some(chunk_index),
            kind,
            message: message.into(),
        }
    }

    /// Create a document-scoped warning
    pub fn for_run(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            pass_index: None,
            chunk_index: None,
            kind,
            message: message.into(),
        }
    }
}

/// Metadata recorded alongside a run's output for reproducibility
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    /// Identifier of the model that produced the output
    pub model_id: String,
    /// Similarity threshold applied by the fuzzy alignment pass
    pub fuzzy_threshold: f64,
    /// Window margin ratio applied by the fuzzy alignment pass
    pub fuzzy_margin_ratio: f64,
    /// Target chunk size in characters
    pub max_chars: usize,
    /// Number of extraction passes
    pub extraction_passes: usize,
    /// Number of chunks per pass
    pub chunk_count: usize,
    /// Number of (pass, chunk) jobs that contributed nothing due to a failure
    pub failed_chunks: usize,
    /// Extractions aligned exactly (before merging)
    pub exact_count: usize,
    /// Extractions aligned fuzzily (before merging)
    pub fuzzy_count: usize,
    /// Extractions left unaligned (before merging)
    pub unaligned_count: usize,
    /// Non-fatal events recorded during the run
    pub warnings: Vec<RunWarning>,
    /// Whether the run stopped early and the result is best-effort
    pub partial: bool,
    /// Wall-clock processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Final artifact of a pipeline run over one document
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedDocument {
    /// Identifier of the source document
    pub document_id: String,

    /// Source text the intervals refer to
    pub text: String,

    /// Extractions ordered by start offset, unaligned last
    pub extractions: Vec<GroundedExtraction>,

    /// Run metadata
    pub metadata: RunMetadata,
}

impl AnnotatedDocument {
    /// Aligned extractions only
    pub fn aligned(&self) -> impl Iterator<Item = &GroundedExtraction> {
        self.extractions.iter().filter(|e| e.is_aligned())
    }

    /// Extractions of one class
    pub fn of_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a GroundedExtraction> {
        self.extractions
            .iter()
            .filter(move |e| e.class_name == class_name)
    }
}
