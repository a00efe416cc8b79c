//! Trait definitions for external collaborators
//!
//! These traits define the boundaries between the extraction pipeline and the
//! code that talks to language models or renders prompts. Implementations live
//! in other crates or in the embedding application.

use crate::{Candidate, TextChunk};
use std::sync::Arc;

/// Structured format the model is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseFormat {
    /// JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl ResponseFormat {
    /// Get the format name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Yaml => "yaml",
        }
    }

    /// Parse a format from a string (accepts `yml`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ResponseFormat::Json),
            "yaml" | "yml" => Some(ResponseFormat::Yaml),
            _ => None,
        }
    }
}

/// Hint passed to the model alongside each prompt
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseFormatHint {
    /// Expected answer format
    pub format: ResponseFormat,

    /// Optional structural constraint (e.g. a JSON schema) for constrained decoding
    pub schema: Option<String>,

    /// Whether the answer is expected inside a fenced code block
    pub fenced: bool,
}

/// Trait for language model providers
///
/// Implemented by the provider layer (textanchor-llm). Calls are blocking;
/// the pipeline runs them on a blocking thread pool. Timeouts and retries are
/// the implementation's responsibility.
pub trait ModelProvider {
    /// Error type for model calls
    type Error;

    /// Generate a completion for `prompt`
    fn generate(&self, prompt: &str, hint: &ResponseFormatHint) -> Result<String, Self::Error>;

    /// Approximate token count of `text`
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Identifier of the underlying model
    fn model_id(&self) -> &str;
}

impl<T: ModelProvider + ?Sized> ModelProvider for Arc<T> {
    type Error = T::Error;

    fn generate(&self, prompt: &str, hint: &ResponseFormatHint) -> Result<String, Self::Error> {
        (**self).generate(prompt, hint)
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

impl<T: ModelProvider + ?Sized> ModelProvider for Box<T> {
    type Error = T::Error;

    fn generate(&self, prompt: &str, hint: &ResponseFormatHint) -> Result<String, Self::Error> {
        (**self).generate(prompt, hint)
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// A worked example shown to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleData {
    /// Example source text
    pub text: String,
    /// Extractions expected from `text`
    pub extractions: Vec<Candidate>,
}

impl ExampleData {
    /// Create an example
    pub fn new(text: impl Into<String>, extractions: Vec<Candidate>) -> Self {
        Self {
            text: text.into(),
            extractions,
        }
    }
}

/// Everything a prompt builder may use for one chunk
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// The chunk to extract from
    pub chunk: &'a TextChunk<'a>,
    /// Task description
    pub instructions: &'a str,
    /// Worked examples
    pub examples: &'a [ExampleData],
    /// Free-form document context, if any
    pub additional_context: Option<&'a str>,
    /// Tail of the preceding chunk, if context windows are enabled
    pub previous_text: Option<&'a str>,
}

/// Trait for turning a chunk into a prompt
///
/// Must be a pure function of its input.
pub trait PromptBuilder {
    /// Build the prompt text
    fn build(&self, context: &PromptContext<'_>) -> String;
}

impl<F> PromptBuilder for F
where
    F: Fn(&PromptContext<'_>) -> String,
{
    fn build(&self, context: &PromptContext<'_>) -> String {
        self(context)
    }
}

/// Trait for providers of decoding constraints
pub trait SchemaConstraint {
    /// Produce a constraint for the given examples, or `None` if unsupported
    fn constraint(&self, examples: &[ExampleData], format: ResponseFormat) -> Option<String>;
}
