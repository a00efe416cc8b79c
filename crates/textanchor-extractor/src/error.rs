//! Error types for the extraction pipeline

use textanchor_llm::RegistryError;
use thiserror::Error;

/// Errors that can occur during an annotation run
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// The document cannot be chunked; raised before any model call
    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Text exceeds maximum length
    #[error("Text too long: {0} chars (max: {1})")]
    TextTooLong(usize, usize),

    /// Model output could not be parsed and parse errors are not suppressed
    #[error("Resolve error in pass {pass_index}, chunk {chunk_index}: {source}")]
    Resolve {
        /// Pass of the failing chunk
        pass_index: usize,
        /// Failing chunk
        chunk_index: usize,
        /// Underlying parse failure
        #[source]
        source: ResolveError,
    },

    /// The model call failed and failures are configured as fatal
    #[error("Model call failed in pass {pass_index}, chunk {chunk_index}: {message}")]
    ModelCall {
        /// Pass of the failing chunk
        pass_index: usize,
        /// Failing chunk
        chunk_index: usize,
        /// Provider error message
        message: String,
    },

    /// The run was cancelled by the caller
    #[error("Annotation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted by the runtime
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No provider could be built for the requested model
    #[error("Provider error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors raised while splitting a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    /// The document has no text to extract from
    #[error("document '{0}' is empty")]
    EmptyDocument(String),

    /// Chunks must hold at least one character
    #[error("max_chars must be greater than 0")]
    ZeroMaxChars,
}

/// Errors raised while parsing model output
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The answer contained nothing to parse
    #[error("empty model output")]
    EmptyOutput,

    /// A code fence was opened but never closed
    #[error("unterminated code fence")]
    UnterminatedFence,

    /// JSON payload failed to parse
    #[error("JSON parse error: {0}")]
    Json(String),

    /// YAML payload failed to parse
    #[error("YAML parse error: {0}")]
    Yaml(String),

    /// Payload parsed but is not a list of extraction records
    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        ResolveError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for ResolveError {
    fn from(e: serde_yaml::Error) -> Self {
        ResolveError::Yaml(e.to_string())
    }
}
