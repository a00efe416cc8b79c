//! textanchor Extractor
//!
//! Turns unstructured text into source-grounded extractions using a language
//! model, then anchors every extraction back to exact offsets in the text.
//!
//! # Overview
//!
//! Models paraphrase, reorder and occasionally invent. The pipeline treats
//! their answers as claims: each claimed span is searched for in the chunk it
//! came from, and only what can be found is given an interval. Everything else
//! is kept but marked unaligned.
//!
//! # Architecture
//!
//! ```text
//! Document → Chunker → [TextChunk] → (bounded pool) → ModelProvider
//!          → Resolver → [Candidate] → Aligner → [GroundedExtraction]
//!          → Merger → AnnotatedDocument
//! ```
//!
//! # Key Features
//!
//! - **Chunking**: Boundary-aware splitting that covers the document exactly
//! - **Tolerant Parsing**: Fenced or bare JSON/YAML, several record shapes
//! - **Alignment**: Exact, then token-level fuzzy matching
//! - **Multi-pass Merging**: Deduplicated, position-ordered results
//! - **Failure Policy**: Recoverable or fatal model failures, partial results, cancellation
//!
//! # Example Usage
//!
//! ```no_run
//! use textanchor_extractor::{Annotator, ExtractorConfig};
//! use textanchor_domain::Document;
//! use textanchor_llm::MockProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = MockProvider::new(
//!     r#"[{"extraction_class": "character", "extraction_text": "ROMEO"}]"#,
//! );
//!
//! let annotator = Annotator::new(provider, ExtractorConfig::default())?
//!     .with_instructions("Extract characters in order of appearance.");
//!
//! let document = Document::new("ROMEO. But soft! What light through yonder window breaks?");
//! let result = annotator.annotate(&document).await?;
//!
//! for extraction in result.aligned() {
//!     println!("{} {:?}", extraction.class_name, extraction.interval);
//! }
//! println!("{}", annotator.metrics().summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod alignment;
mod annotator;
mod chunking;
mod config;
mod error;
mod merger;
mod metrics;
mod prompt;
mod resolver;
mod sanitize;
mod stage;
mod types;


pub use alignment::{Aligner, ChunkAligner};
pub use annotator::Annotator;
pub use chunking::{split, TextChunker};
pub use config::{ChunkStrategy, ExtractorConfig, FailureMode, FormatType};
pub use error::{ChunkingError, ExtractorError, ResolveError};
pub use merger::merge;
pub use metrics::AnnotatorMetrics;
pub use prompt::SimplePromptBuilder;
pub use resolver::{resolve, ResolveOutput, Resolver};
pub use sanitize::strip_control_chars;
pub use stage::PipelineStage;
pub use types::{DocumentRecord, ExtractionRecord, IntervalRecord};

// Cancellation handle accepted by `Annotator::annotate_with_cancellation`
pub use tokio_util::sync::CancellationToken;
