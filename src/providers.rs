//! Shared plumbing for outbound HTTP calls to embedding and LLM vendors.

use std::{error::Error, time::Duration};

use reqwest::blocking::{Client, Response};

/// How much of an error body is kept for logs and error messages.
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("reqwest error: {}", describe(.0))]
    Reqwest(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[cfg(feature = "local-embeddings")]
    #[error("model error: {0}")]
    Model(String),
}

fn describe(error: &reqwest::Error) -> String {
    match error.source() {
        Some(source) => format!("{error}: {source}"),
        None => error.to_string(),
    }
}

pub fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()?)
}

/// Turns a non-2xx response into `ProviderError::Http` with a body preview.
pub fn error_for_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body: preview(&body, ERROR_BODY_PREVIEW),
    })
}

/// Char-boundary safe truncation.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn require_key<'a>(
    key: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, ProviderError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::MissingApiKey(name))
}
