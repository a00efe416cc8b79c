//! textanchor Domain Layer
//!
//! This crate contains the shared vocabulary of the extraction pipeline.
//! It has no external dependencies beyond `uuid` and defines the value
//! objects and trait interfaces that all other layers depend upon.
//!
//! ## Key Concepts
//!
//! - **Document**: Immutable source text; every offset refers to it
//! - **CharInterval**: Half-open range anchoring an extraction to its document
//! - **TextChunk**: Borrowed slice of a document processed by one model call
//! - **Candidate**: The model's unverified claim
//! - **GroundedExtraction**: A candidate relocated in the source text
//! - **AnnotatedDocument**: The merged, ordered result of a run
//!
//! ## Architecture
//!
//! - Pure data and small invariants only
//! - Model access and prompt rendering are trait boundaries (`traits`)
//! - Infrastructure implementations live in other crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod extraction;
pub mod interval;
pub mod traits;

// Re-exports for convenience
pub use document::{AnnotatedDocument, Document, RunMetadata, RunWarning, TextChunk, WarningKind};
pub use extraction::{AlignmentStatus, Attributes, Candidate, GroundedExtraction};
pub use interval::CharInterval;
pub use traits::{
    ExampleData, ModelProvider, PromptBuilder, PromptContext, ResponseFormat,
    ResponseFormatHint, SchemaConstraint,
};
