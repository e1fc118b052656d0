use std::collections::BTreeMap;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::storage::{self, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// Minimum cosine similarity for an embedding decision to stick
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-5-mini";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_SAMPLE_SIZE: usize = 10;
const MAX_SAMPLE_SIZE: usize = 50;
const DEFAULT_EXAMPLE_MAX_CHARS: usize = 2000;
const MIN_EXAMPLE_MAX_CHARS: usize = 500;
const MAX_EXAMPLE_MAX_CHARS: usize = 4000;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 8;
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizeMode {
    #[default]
    EmbeddingFirst,
    LlmOnly,
}

/// Member-link samples appended to a category's embedding text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryExamplesConfig {
    pub enabled: bool,
    /// How many of the most recent member links are sampled, [0, 50]
    pub sample_size: usize,
    /// Character cap of the joined sample text, [500, 4000]
    pub max_chars: usize,
}

impl Default for CategoryExamplesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_chars: DEFAULT_EXAMPLE_MAX_CHARS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCategoryConfig {
    pub enabled: bool,
    pub llm_enabled: bool,
    /// Similarity threshold [0.0, 1.0], inclusive
    pub threshold: f32,
    pub mode: CategorizeMode,
    pub category_examples: CategoryExamplesConfig,
}

impl Default for AutoCategoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            llm_enabled: true,
            threshold: DEFAULT_THRESHOLD,
            mode: CategorizeMode::EmbeddingFirst,
            category_examples: CategoryExamplesConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Openai,
    Local,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Remote model id, or a fastembed model name for the local backend
    pub model: String,
    pub base_url: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Openai,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub model: String,
    pub base_url: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions
    #[serde(default = "default_primary")]
    pub primary: LlmProviderConfig,
    /// Gemini generateContent
    #[serde(default = "default_secondary")]
    pub secondary: LlmProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
        }
    }
}

fn default_primary() -> LlmProviderConfig {
    LlmProviderConfig {
        model: DEFAULT_LLM_MODEL.to_string(),
        base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        api_key: None,
    }
}

fn default_secondary() -> LlmProviderConfig {
    LlmProviderConfig {
        model: DEFAULT_GEMINI_MODEL.to_string(),
        base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        api_key: None,
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Bearer token -> user id
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub auto_category: AutoCategoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    /// Directory the config was read from.
    #[serde(skip_serializing, skip_deserializing)]
    pub base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tokens: BTreeMap::new(),
            auto_category: AutoCategoryConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            metadata_timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
            base_path: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_metadata_timeout_secs() -> u64 {
    DEFAULT_METADATA_TIMEOUT_SECS
}

impl Config {
    pub fn validate(&mut self) -> anyhow::Result<()> {
        let auto = &mut self.auto_category;
        if !(0.0..=1.0).contains(&auto.threshold) {
            bail!(
                "auto_category.threshold must be between 0.0 and 1.0, got {}",
                auto.threshold
            );
        }

        let examples = &mut auto.category_examples;
        examples.sample_size = examples.sample_size.min(MAX_SAMPLE_SIZE);
        examples.max_chars = examples
            .max_chars
            .clamp(MIN_EXAMPLE_MAX_CHARS, MAX_EXAMPLE_MAX_CHARS);

        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }

        if self.provider_timeout_secs == 0 || self.metadata_timeout_secs == 0 {
            bail!("timeouts must be greater than 0");
        }

        for (token, uid) in &self.tokens {
            if token.trim().is_empty() || uid.trim().is_empty() {
                bail!("tokens must map a non-empty token to a non-empty user id");
            }
        }

        Ok(())
    }

    /// Applies environment overrides and reads provider secrets.
    ///
    /// Only called after the file has been re-saved, so nothing read here is
    /// ever written back to disk.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(threshold) = var("AUTO_CATEGORY_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.auto_category.threshold = threshold;
        }
        if let Some(model) = var("AUTO_CATEGORY_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(model) = var("AUTO_CATEGORY_LLM_MODEL") {
            self.llm.primary.model = model;
        }
        if let Some(base_url) = var("OPENAI_BASE_URL") {
            self.embedding.base_url = base_url.clone();
            self.llm.primary.base_url = base_url;
        }
        if let Some(model) = var("GEMINI_MODEL") {
            self.llm.secondary.model = model;
        }
        if let Some(base_url) = var("GEMINI_BASE_URL") {
            self.llm.secondary.base_url = base_url;
        }
        if let Some(size) = var("CAT_EXAMPLE_SAMPLE_SIZE").and_then(|v| v.parse().ok()) {
            self.auto_category.category_examples.sample_size = size;
        }
        if let Some(max) = var("CAT_EXAMPLE_TEXT_MAX").and_then(|v| v.parse().ok()) {
            self.auto_category.category_examples.max_chars = max;
        }

        let openai_key = var("OPENAI_API_KEY");
        self.embedding.api_key = openai_key.clone();
        self.llm.primary.api_key = openai_key;
        self.llm.secondary.api_key = var("GOOGLE_API_KEY");
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let mut config = Self::read_file(base_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reads `config.yaml`, creating it with defaults when missing.
    fn read_file(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)
            .with_context(|| format!("failed to open config dir {base_path}"))?;

        if !store.exists(CONFIG_FILE) {
            log::info!("creating default config at {base_path}/{CONFIG_FILE}");
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::read_file(base).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.auto_category, AutoCategoryConfig::default());
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.llm.primary.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.secondary.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.base_path, base);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "auto_category:\n  threshold: 0.7\n  mode: llm_only\n",
        )
        .unwrap();

        let config = Config::read_file(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.auto_category.threshold, 0.7);
        assert_eq!(config.auto_category.mode, CategorizeMode::LlmOnly);
        assert!(config.auto_category.llm_enabled);
        assert_eq!(config.auto_category.category_examples.sample_size, DEFAULT_SAMPLE_SIZE);

        // upgraded file now carries every field
        let saved = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("llm_enabled"));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.auto_category.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_clamps_examples() {
        let mut config = Config::default();
        config.auto_category.category_examples.sample_size = 500;
        config.auto_category.category_examples.max_chars = 10;
        config.validate().unwrap();
        assert_eq!(config.auto_category.category_examples.sample_size, MAX_SAMPLE_SIZE);
        assert_eq!(config.auto_category.category_examples.max_chars, MIN_EXAMPLE_MAX_CHARS);
    }

    #[test]
    fn test_env_overrides_and_secrets() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AUTO_CATEGORY_THRESHOLD", "0.8"),
            ("AUTO_CATEGORY_LLM_MODEL", "gpt-4o-mini"),
            ("GEMINI_MODEL", "gemini-pro"),
            ("CAT_EXAMPLE_SAMPLE_SIZE", "3"),
            ("OPENAI_API_KEY", "sk-test"),
            ("GOOGLE_API_KEY", "  "),
        ]);

        let mut config = Config::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.auto_category.threshold, 0.8);
        assert_eq!(config.llm.primary.model, "gpt-4o-mini");
        assert_eq!(config.llm.secondary.model, "gemini-pro");
        assert_eq!(config.auto_category.category_examples.sample_size, 3);
        assert_eq!(config.llm.primary.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.secondary.api_key, None);
    }

    #[test]
    fn test_secrets_are_never_serialized() {
        let mut config = Config::default();
        config.llm.primary.api_key = Some("sk-secret".to_string());
        config.embedding.api_key = Some("sk-secret".to_string());

        let yaml = serde_yml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }
}
