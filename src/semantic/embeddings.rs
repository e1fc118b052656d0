//! Embedding providers.
//!
//! - `OpenAiEmbeddings`: OpenAI-compatible `/embeddings` endpoint over HTTP
//! - `LocalEmbeddings`: in-process fastembed model (`local-embeddings` feature)

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use crate::providers::{self, ProviderError};

/// Turns text into fixed-length float vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Model id, used to tag cached vectors.
    fn model(&self) -> &str;

    /// One vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("no embedding returned".to_string()))
    }
}

pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbeddings {
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
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let api_key = providers::require_key(&self.api_key, "OPENAI_API_KEY")?;

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()?;

        let mut body: EmbeddingsResponse = providers::error_for_status(resp)?.json()?;
        if body.data.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddings;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use fastembed::{InitOptions, TextEmbedding};

    use super::EmbeddingProvider;
    use crate::providers::ProviderError;

    /// Wrapper around fastembed's TextEmbedding model.
    /// Uses a Mutex because fastembed's embed() requires &mut self.
    pub struct LocalEmbeddings {
        model: Mutex<TextEmbedding>,
        model_name: String,
    }

    impl LocalEmbeddings {
        /// Loads the model, downloading it into `cache_dir/models` on first use.
        pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, ProviderError> {
            let model_enum = parse_model_name(model_name)?;

            let models_dir = cache_dir.join("models");
            std::fs::create_dir_all(&models_dir).map_err(|e| {
                ProviderError::Model(format!("failed to create models directory: {e}"))
            })?;

            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(false);

            let model = TextEmbedding::try_new(options)
                .map_err(|e| ProviderError::Model(e.to_string()))?;

            Ok(Self {
                model: Mutex::new(model),
                model_name: model_name.to_string(),
            })
        }
    }

    impl EmbeddingProvider for LocalEmbeddings {
        fn model(&self) -> &str {
            &self.model_name
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if texts.is_empty() {
                return Ok(vec![]);
            }

            let mut model = self.model.lock().map_err(|e| {
                ProviderError::Model(format!("failed to acquire model lock: {e}"))
            })?;

            model
                .embed(texts.to_vec(), None)
                .map_err(|e| ProviderError::Model(e.to_string()))
        }
    }

    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, ProviderError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            _ => Err(ProviderError::Model(format!(
                "unknown local model {name}, supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5"
            ))),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_fails_before_request() {
        let embedder = OpenAiEmbeddings::new(
            "http://127.0.0.1:9",
            None,
            "text-embedding-3-small",
            Duration::from_secs(1),
        )
        .unwrap();

        let result = embedder.embed_batch(&["hello".to_string()]);
        assert!(matches!(result, Err(ProviderError::MissingApiKey("OPENAI_API_KEY"))));
    }

    #[test]
    fn test_empty_batch_is_free() {
        let embedder =
            OpenAiEmbeddings::new("http://127.0.0.1:9/", None, "m", Duration::from_secs(1)).unwrap();
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
        assert_eq!(embedder.model(), "m");
    }

    #[test]
    fn test_response_is_reordered_by_index() {
        let mut body: EmbeddingsResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#,
        )
        .unwrap();
        body.data.sort_by_key(|item| item.index);
        assert_eq!(body.data[0].embedding, vec![1.0]);
    }
}
