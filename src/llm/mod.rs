//! LLM classification fallback.
//!
//! Each provider is asked to pick one category id out of a finite list and
//! to answer with `{"id": string|null, "confidence": number}`. Replies are
//! reduced to an [`Outcome`]; the [`LlmCascade`] walks providers in order
//! until one produces a known id.

pub mod cascade;
pub mod gemini;
pub mod openai;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::providers::ProviderError;

pub use cascade::LlmCascade;
pub use gemini::GeminiChat;
pub use openai::OpenAiChat;

/// Used when a provider picks an id but omits its confidence.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:json|JSON)?\s*(.*?)\s*```$").expect("Failed to compile fence regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOption {
    pub id: String,
    pub name: String,
}

/// Result of one provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Choice { id: String, confidence: f32 },
    NoChoice,
    ParseError(String),
    ProviderError(String),
}

pub trait LlmProvider: Send + Sync {
    fn vendor(&self) -> &'static str;
    fn model(&self) -> &str;

    /// Raw text reply of the provider.
    fn complete(&self, text: &str, categories: &[CategoryOption]) -> Result<String, ProviderError>;

    fn parse(&self, content: &str) -> Outcome {
        parse_strict(content)
    }

    fn ask(&self, text: &str, categories: &[CategoryOption]) -> Outcome {
        match self.complete(text, categories) {
            Ok(content) => self.parse(&content),
            Err(err) => Outcome::ProviderError(err.to_string()),
        }
    }
}

/// Instruction plus the pretty-printed `{text, categories}` payload.
pub fn build_prompt(text: &str, categories: &[CategoryOption]) -> String {
    let payload = json!({ "text": text, "categories": categories });
    let payload = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());

    format!(
        "Given categories (id,name) and text, respond ONLY with a compact JSON: {{\n  \"id\": <string|null>,\n  \"confidence\": <number between 0 and 1>\n}}.\nPick the most suitable category id or null if unsure. Here is the payload:\n\n{payload}"
    )
}

/// Whole reply must be a JSON object.
pub fn parse_strict(content: &str) -> Outcome {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(value) => outcome_from_value(&value),
        Err(err) => Outcome::ParseError(err.to_string()),
    }
}

/// Strips a code fence, or else digs out the first balanced `{...}`.
pub fn parse_lenient(content: &str) -> Outcome {
    parse_strict(&extract_json(content))
}

fn outcome_from_value(value: &Value) -> Outcome {
    let Some(object) = value.as_object() else {
        return Outcome::ParseError("reply is not a JSON object".to_string());
    };

    match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Outcome::Choice {
            id: id.to_string(),
            confidence: object
                .get("confidence")
                .and_then(Value::as_f64)
                .map(|c| c as f32)
                .unwrap_or(DEFAULT_CONFIDENCE),
        },
        _ => Outcome::NoChoice,
    }
}

pub fn extract_json(content: &str) -> String {
    let body = content.trim();

    if let Some(inner) = FENCE_REGEX.captures(body).and_then(|caps| caps.get(1)) {
        return inner.as_str().to_string();
    }

    first_balanced_object(body).unwrap_or(body).to_string()
}

/// First `{...}` whose braces balance, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
