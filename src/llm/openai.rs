use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{build_prompt, CategoryOption, LlmProvider};
use crate::providers::{self, ProviderError};

const SYSTEM_PROMPT: &str = "You are a strict classifier. Choose the best category id given the input text. If none fits, return null.";
const MAX_TOKENS: u32 = 100;

/// Model families that reject `temperature` and `max_tokens`.
const REASONING_FAMILIES: [&str; 4] = ["gpt-5", "o1", "o3", "o4"];

pub fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_lowercase();
    REASONING_FAMILIES.iter().any(|family| model.starts_with(family))
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChat {
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

    pub fn payload(&self, text: &str, categories: &[CategoryOption]) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(text, categories) },
            ],
            "response_format": { "type": "json_object" },
        });

        if is_reasoning_model(&self.model) {
            payload["max_completion_tokens"] = json!(MAX_TOKENS);
        } else {
            payload["max_tokens"] = json!(MAX_TOKENS);
            payload["temperature"] = json!(0);
        }

        payload
    }
}

impl LlmProvider for OpenAiChat {
    fn vendor(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, text: &str, categories: &[CategoryOption]) -> Result<String, ProviderError> {
        let api_key = providers::require_key(&self.api_key, "OPENAI_API_KEY")?;

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&self.payload(text, categories))
            .send()?;

        let body: ChatResponse = providers::error_for_status(resp)?.json()?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
