//! Parse raw model output into extraction candidates
//!
//! Models wrap their answer in markdown fences, surround it with narrative,
//! and drift between record shapes. The resolver accepts:
//!
//! - top level: `{"extractions": [...]}`, a bare array, or a single record
//! - flat records: `{"extraction_class": "..", "extraction_text": "..", "attributes": {..}}`
//!   (`class`/`class_name` and `text` are accepted aliases)
//! - keyed records: `{"character": "ROMEO", "character_attributes": {..}}`,
//!   possibly with several class keys per record; a shared `attributes`
//!   object applies to classes without their own
//!
//! A lone keyed object is only taken from inside a fence. Unfenced, prose
//! such as `Sorry: nothing found` and error envelopes parse to that shape.
//!
//! A bad record is rejected on its own; only an unparseable payload or a
//! wrong top-level shape fails the chunk.

use crate::config::ExtractorConfig;
use crate::error::ResolveError;
use crate::sanitize::strip_control_chars;
use serde_json::{Map, Value};
use textanchor_domain::{Attributes, Candidate, ResponseFormat};
use tracing::{debug, warn};

const CLASS_KEYS: [&str; 3] = ["extraction_class", "class", "class_name"];
const TEXT_KEYS: [&str; 2] = ["extraction_text", "text"];
const INDEX_KEYS: [&str; 2] = ["extraction_index", "index"];
const ATTRIBUTES_KEY: &str = "attributes";
const WRAPPER_KEY: &str = "extractions";

/// Candidates parsed from one model answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveOutput {
    /// Accepted candidates, ordered by extraction index
    pub candidates: Vec<Candidate>,
    /// Reasons for records that were dropped
    pub rejected: Vec<String>,
}

/// Parse an answer with the default attribute suffix
pub fn resolve(raw: &str, format: ResponseFormat) -> Result<ResolveOutput, ResolveError> {
    Resolver::new(format).resolve(raw)
}

/// Tolerant parser for model answers
#[derive(Debug, Clone)]
pub struct Resolver {
    format: ResponseFormat,
    attribute_suffix: String,
}

/// A fenced block found in the answer
struct Fenced<'a> {
    language: Option<ResponseFormat>,
    body: &'a str,
}

impl Resolver {
    /// Create a resolver expecting `format` when the answer doesn't say otherwise
    pub fn new(format: ResponseFormat) -> Self {
        Self {
            format,
            attribute_suffix: "_attributes".to_string(),
        }
    }

    /// Create a resolver from pipeline configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.response_format()).with_attribute_suffix(config.attribute_suffix.clone())
    }

    /// Use a different key suffix for attribute objects in keyed records
    pub fn with_attribute_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.attribute_suffix = suffix.into();
        self
    }

    /// Parse a raw model answer
    pub fn resolve(&self, raw: &str) -> Result<ResolveOutput, ResolveError> {
        let sanitized = strip_control_chars(raw);
        let text = sanitized.trim();
        if text.is_empty() {
            return Err(ResolveError::EmptyOutput);
        }

        let (value, fenced) = match extract_fence(text)? {
            Some(fenced) => {
                let format = fenced.language.unwrap_or(self.format);
                (parse_payload(fenced.body, format, false)?, true)
            }
            None => (parse_payload(text, self.format, true)?, false),
        };

        let records = top_level_records(value, fenced)?;
        let output = self.collect_candidates(records);

        debug!(
            "Resolved {} candidates ({} rejected)",
            output.candidates.len(),
            output.rejected.len()
        );
        Ok(output)
    }

    fn collect_candidates(&self, records: Vec<Value>) -> ResolveOutput {
        let mut output = ResolveOutput::default();

        for (group_index, record) in records.into_iter().enumerate() {
            let parsed = match record {
                Value::Object(map) => self.parse_record(&map),
                other => Err(format!("expected an object, found {}", type_name(&other))),
            };

            match parsed {
                Ok(candidates) => {
                    for mut candidate in candidates {
                        candidate.group_index = Some(group_index);
                        output.candidates.push(candidate);
                    }
                }
                Err(reason) => {
                    let reason = format!("record {}: {}", group_index, reason);
                    warn!("Rejected extraction {}", reason);
                    output.rejected.push(reason);
                }
            }
        }

        // Emission order unless the model numbered its records
        let mut emitted = 0;
        for candidate in &mut output.candidates {
            if candidate.extraction_index == usize::MAX {
                candidate.extraction_index = emitted;
            }
            emitted += 1;
        }
        output.candidates.sort_by_key(|c| c.extraction_index);

        output
    }

    /// Parse one record; explicit indices are stored, others left at `usize::MAX`
    fn parse_record(&self, map: &Map<String, Value>) -> Result<Vec<Candidate>, String> {
        let explicit_index = INDEX_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .map(|value| {
                value
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| format!("index {} is not a non-negative integer", value))
            })
            .transpose()?;
        let index = explicit_index.unwrap_or(usize::MAX);

        if is_flat(map) {
            self.parse_flat(map).map(|c| vec![c.with_index(index)])
        } else {
            let candidates = self.parse_keyed(map)?;
            Ok(candidates.into_iter().map(|c| c.with_index(index)).collect())
        }
    }

    fn parse_flat(&self, map: &Map<String, Value>) -> Result<Candidate, String> {
        let class_name = CLASS_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(scalar_text)
            .filter(|class| !class.trim().is_empty())
            .ok_or_else(|| "missing extraction class".to_string())?;

        let claimed_text = TEXT_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(scalar_text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| format!("missing extraction text for class '{}'", class_name))?;

        let attributes = match map.get(ATTRIBUTES_KEY) {
            None | Some(Value::Null) => Attributes::new(),
            Some(Value::Object(attrs)) => coerce_attributes(attrs),
            Some(other) => {
                return Err(format!("attributes must be an object, found {}", type_name(other)))
            }
        };

        Ok(Candidate::new(class_name, claimed_text).with_attributes(attributes))
    }

    fn parse_keyed(&self, map: &Map<String, Value>) -> Result<Vec<Candidate>, String> {
        let mut candidates = Vec::new();

        for (key, value) in map {
            if key == ATTRIBUTES_KEY
                || key.ends_with(&self.attribute_suffix)
                || INDEX_KEYS.contains(&key.as_str())
            {
                continue;
            }

            let claimed_text = scalar_text(value)
                .ok_or_else(|| format!("class '{}' has {} text", key, type_name(value)))?;
            if claimed_text.trim().is_empty() {
                return Err(format!("empty extraction text for class '{}'", key));
            }

            let attributes_key = format!("{}{}", key, self.attribute_suffix);
            let attributes = match map.get(&attributes_key).or_else(|| map.get(ATTRIBUTES_KEY)) {
                Some(Value::Object(attrs)) => coerce_attributes(attrs),
                _ => Attributes::new(),
            };

            candidates.push(Candidate::new(key.clone(), claimed_text).with_attributes(attributes));
        }

        if candidates.is_empty() {
            return Err("no extraction class found".to_string());
        }
        Ok(candidates)
    }
}

/// Find the first fenced block; `None` when the answer has no fence
fn extract_fence(text: &str) -> Result<Option<Fenced<'_>>, ResolveError> {
    let Some(open) = text.find("```") else {
        return Ok(None);
    };
    let after = &text[open + 3..];

    let (info, body) = match after.find('\n') {
        Some(newline) if !after[..newline].contains("```") => (&after[..newline], &after[newline + 1..]),
        // Single-line block: ```[...]```
        _ => ("", after),
    };
    let close = body.find("```").ok_or(ResolveError::UnterminatedFence)?;

    Ok(Some(Fenced {
        language: ResponseFormat::parse(info.trim()),
        body: &body[..close],
    }))
}

fn parse_payload(body: &str, format: ResponseFormat, retry_span: bool) -> Result<Value, ResolveError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ResolveError::EmptyOutput);
    }

    match format {
        ResponseFormat::Json => match serde_json::from_str::<Value>(body) {
            Ok(value) => Ok(value),
            Err(e) if retry_span => bracketed_span(body)
                .and_then(|span| serde_json::from_str::<Value>(span).ok())
                .ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        },
        ResponseFormat::Yaml => Ok(serde_yaml::from_str(body)?),
    }
}

/// Span from the first opening bracket to the last matching closer
fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// A record naming its class or text explicitly
fn is_flat(map: &Map<String, Value>) -> bool {
    CLASS_KEYS
        .iter()
        .chain(TEXT_KEYS.iter())
        .any(|key| map.contains_key(*key))
}

fn top_level_records(value: Value, fenced: bool) -> Result<Vec<Value>, ResolveError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove(WRAPPER_KEY) {
            Some(Value::Array(records)) => Ok(records),
            Some(other) => Err(ResolveError::Shape(format!(
                "'{}' must be an array, found {}",
                WRAPPER_KEY,
                type_name(&other)
            ))),
            None if fenced || is_flat(&map) => Ok(vec![Value::Object(map)]),
            None => Err(ResolveError::Shape(
                "an unfenced single object must be a flat record or an extractions wrapper".to_string(),
            )),
        },
        other => Err(ResolveError::Shape(format!(
            "expected an array or object, found {}",
            type_name(&other)
        ))),
    }
}

/// Text form of a scalar; `None` for null, arrays and objects
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_attributes(map: &Map<String, Value>) -> Attributes {
    map.iter()
        .filter_map(|(key, value)| coerce_attribute(value).map(|v| (key.clone(), v)))
        .collect()
}

fn coerce_attribute(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| scalar_text(item).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
        scalar => scalar_text(scalar),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
