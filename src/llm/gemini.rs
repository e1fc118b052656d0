use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use super::{build_prompt, parse_lenient, CategoryOption, LlmProvider, Outcome};
use crate::providers::{self, ProviderError};

/// Gemini `generateContent` client.
///
/// Gemini tends to wrap JSON in fences or prose, so replies go through the
/// lenient parser.
pub struct GeminiChat {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

impl GeminiChat {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: providers::http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        let model: String = url::form_urlencoded::byte_serialize(self.model.as_bytes()).collect();
        format!("{}/models/{model}:generateContent", self.base_url)
    }
}

impl LlmProvider for GeminiChat {
    fn vendor(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, text: &str, categories: &[CategoryOption]) -> Result<String, ProviderError> {
        let api_key = providers::require_key(&self.api_key, "GOOGLE_API_KEY")?;

        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(text, categories) }] }],
        });

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()?;

        let body: GenerateResponse = providers::error_for_status(resp)?.json()?;
        Ok(body.first_text().unwrap_or_default())
    }

    fn parse(&self, content: &str) -> Outcome {
        parse_lenient(content)
    }
}
