//! Configuration for the annotation pipeline

use serde::{Deserialize, Serialize};
use textanchor_domain::ResponseFormat;

/// Boundary preference used when splitting documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Prefer paragraph breaks, then sentence ends, then whitespace
    #[default]
    ByParagraph,
    /// Prefer sentence ends, then whitespace
    BySentence,
    /// Cut every `max_chars` characters
    Hard,
}

/// How a failed model call affects the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Skip the chunk, record a warning, keep going
    #[default]
    Recoverable,
    /// Stop dispatching and fail the run
    Fatal,
}

/// Answer format requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    /// JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl From<FormatType> for ResponseFormat {
    fn from(format: FormatType) -> Self {
        match format {
            FormatType::Json => ResponseFormat::Json,
            FormatType::Yaml => ResponseFormat::Yaml,
        }
    }
}

/// Configuration for the Annotator
///
/// Every field falls back to its default when omitted from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Maximum input text length (characters)
    pub max_text_length: usize,

    /// Target chunk size (characters)
    pub max_chars: usize,

    /// Boundary preference for chunking
    pub chunk_strategy: ChunkStrategy,

    /// How far back from the target size to look for a boundary (characters)
    pub boundary_lookback: usize,

    /// Maximum concurrent model calls
    pub max_workers: usize,

    /// Independent extraction passes over the document
    pub extraction_passes: usize,

    /// Turn unparseable chunk output into a warning instead of failing the run
    pub suppress_parse_errors: bool,

    /// Minimum similarity for a fuzzy alignment, in [0.0, 1.0]
    pub fuzzy_threshold: f64,

    /// Fuzzy window size tolerance as a fraction of the claim's token count
    pub fuzzy_margin_ratio: f64,

    /// Effect of a failed model call
    pub failure_mode: FailureMode,

    /// Return merged results from completed chunks when a run fails or is cancelled
    pub return_partial_results: bool,

    /// Answer format requested from the model
    pub format_type: FormatType,

    /// Ask the model to wrap its answer in a fenced code block
    pub fence_output: bool,

    /// Key suffix marking attribute objects in keyed records
    pub attribute_suffix: String,

    /// Characters of the previous chunk passed to the prompt builder (0 disables)
    pub context_window_chars: usize,
}

impl ExtractorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_text_length == 0 {
            return Err("max_text_length must be greater than 0".to_string());
        }
        if self.max_chars == 0 {
            return Err("max_chars must be greater than 0".to_string());
        }
        if self.max_chars > self.max_text_length {
            return Err("max_chars cannot exceed max_text_length".to_string());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".to_string());
        }
        if self.extraction_passes == 0 {
            return Err("extraction_passes must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(format!(
                "fuzzy_threshold {} out of range [0.0, 1.0]",
                self.fuzzy_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_margin_ratio) {
            return Err(format!(
                "fuzzy_margin_ratio {} out of range [0.0, 1.0]",
                self.fuzzy_margin_ratio
            ));
        }
        if self.attribute_suffix.is_empty() {
            return Err("attribute_suffix must not be empty".to_string());
        }
        Ok(())
    }

    /// Response format as seen by model providers
    pub fn response_format(&self) -> ResponseFormat {
        self.format_type.into()
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            max_text_length: 1_000_000,
            max_chars: 1_000,
            chunk_strategy: ChunkStrategy::ByParagraph,
            boundary_lookback: 200,
            max_workers: 10,
            extraction_passes: 1,
            suppress_parse_errors: true,
            fuzzy_threshold: 0.75,
            fuzzy_margin_ratio: 0.25,
            failure_mode: FailureMode::Recoverable,
            return_partial_results: false,
            format_type: FormatType::Json,
            fence_output: true,
            attribute_suffix: "_attributes".to_string(),
            context_window_chars: 0,
        }
    }
}

impl ExtractorConfig {
    /// High-recall preset: smaller chunks, several passes, more parallelism
    pub fn high_recall() -> Self {
        Self {
            max_chars: 500,
            extraction_passes: 3,
            max_workers: 20,
            fuzzy_threshold: 0.7,
            context_window_chars: 200,
            ..Self::default()
        }
    }

    /// Strict preset: parse and model failures abort the run, tighter fuzzy matching
    pub fn strict() -> Self {
        Self {
            suppress_parse_errors: false,
            failure_mode: FailureMode::Fatal,
            fuzzy_threshold: 0.9,
            fuzzy_margin_ratio: 0.1,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str)
            .map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
