//! Minimal prompt builder for extraction
//!
//! Renders sectioned plain text: instructions, optional context, worked
//! examples, the chunk, and an output format reminder. Callers with their own
//! templates implement [`PromptBuilder`] or pass a closure instead.

use serde_json::{json, Map, Value};
use textanchor_domain::{Candidate, ExampleData, PromptBuilder, PromptContext, ResponseFormat};

/// Sectioned plain-text prompt builder
#[derive(Debug, Clone)]
pub struct SimplePromptBuilder {
    format: ResponseFormat,
    fenced: bool,
}

impl SimplePromptBuilder {
    /// Create a builder asking for `format`, fenced or bare
    pub fn new(format: ResponseFormat, fenced: bool) -> Self {
        Self { format, fenced }
    }

    fn render_answer(&self, extractions: &[Candidate]) -> String {
        let records: Vec<Value> = extractions.iter().map(record_value).collect();
        let payload = json!({ "extractions": records });

        let body = match self.format {
            ResponseFormat::Json => {
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
            }
            ResponseFormat::Yaml => {
                serde_yaml::to_string(&payload).unwrap_or_else(|_| payload.to_string())
            }
        };

        if self.fenced {
            format!("```{}\n{}\n```", self.format.as_str(), body.trim_end())
        } else {
            body.trim_end().to_string()
        }
    }
}

impl Default for SimplePromptBuilder {
    fn default() -> Self {
        Self::new(ResponseFormat::Json, true)
    }
}

impl PromptBuilder for SimplePromptBuilder {
    fn build(&self, context: &PromptContext<'_>) -> String {
        let mut prompt = String::new();

        // 1. Task description
        prompt.push_str(context.instructions.trim());
        prompt.push_str("\n\n");
        prompt.push_str(EXTRACTION_RULES);
        prompt.push_str("\n\n");

        // 2. Document context
        if let Some(additional) = context.additional_context {
            prompt.push_str("Additional context:\n");
            prompt.push_str(additional);
            prompt.push_str("\n\n");
        }

        // 3. Worked examples
        if !context.examples.is_empty() {
            prompt.push_str("Examples:\n\n");
            for example in context.examples {
                push_example(&mut prompt, example, self);
            }
        }

        // 4. Tail of the previous chunk, for continuity only
        if let Some(previous) = context.previous_text {
            prompt.push_str("Preceding text (context only, do not extract from it):\n---\n");
            prompt.push_str(previous);
            prompt.push_str("\n---\n\n");
        }

        // 5. The chunk to analyze
        prompt.push_str("Text to analyze:\n---\n");
        prompt.push_str(context.chunk.text);
        prompt.push_str("\n---\n\n");

        // 6. Output format reminder
        prompt.push_str(&format!(
            "Answer with {} only{}.",
            self.format.as_str().to_uppercase(),
            if self.fenced { ", inside a single fenced code block" } else { ", without code fences" }
        ));

        prompt
    }
}

fn push_example(prompt: &mut String, example: &ExampleData, builder: &SimplePromptBuilder) {
    prompt.push_str("Text:\n");
    prompt.push_str(&example.text);
    prompt.push_str("\nAnswer:\n");
    prompt.push_str(&builder.render_answer(&example.extractions));
    prompt.push_str("\n\n");
}

fn record_value(candidate: &Candidate) -> Value {
    let attributes: Map<String, Value> = candidate
        .attributes
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();

    json!({
        "extraction_class": candidate.class_name,
        "extraction_text": candidate.claimed_text,
        "attributes": attributes,
    })
}

const EXTRACTION_RULES: &str = r#"Rules:
- Copy extraction_text verbatim from the text, in order of appearance
- Do not paraphrase or merge separate mentions
- Use an empty attributes object when there is nothing to add
- Return an object with an "extractions" array; return an empty array if nothing matches"#;
