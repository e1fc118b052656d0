use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use homedir::my_home;

use super::App;
use crate::{
    auth::TokenVerifier,
    classifier::Classifier,
    config::{Config, EmbeddingBackend},
    llm::{GeminiChat, LlmCascade, LlmProvider, OpenAiChat},
    metadata::{HttpMetadataFetcher, MetadataFetcher},
    semantic::{CategoryEmbeddingCache, EmbeddingProvider, OpenAiEmbeddings},
    side_effects::SideEffects,
    store::{BackendJson, DocumentStore},
};

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Get application paths, creating the base directory
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        let store_path = format!("{base_path}/users");

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths {
            base_path,
            store_path,
        })
    }

    fn get_base_path() -> Result<String> {
        if let Ok(base_path) = std::env::var("LINKSHELF_BASE_PATH") {
            return Ok(base_path);
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(format!("{}/.local/share/linkshelf", home.to_string_lossy()))
    }

    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path)
    }

    pub fn create_store(paths: &AppPaths) -> Result<Arc<dyn DocumentStore>> {
        let store = BackendJson::load(&paths.store_path)
            .with_context(|| format!("Failed to load store at {}", paths.store_path))?;
        Ok(Arc::new(store))
    }

    /// `None` when the configured backend can't be used; similarity is then
    /// skipped and the LLM cascade does all the work.
    pub fn create_embedder(config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        let embedding = &config.embedding;

        match embedding.backend {
            EmbeddingBackend::Openai => {
                if embedding.api_key.is_none() {
                    log::warn!("OPENAI_API_KEY not set; embedding similarity disabled");
                    return Ok(None);
                }

                let embedder = OpenAiEmbeddings::new(
                    &embedding.base_url,
                    embedding.api_key.clone(),
                    &embedding.model,
                    Duration::from_secs(config.provider_timeout_secs),
                )?;
                Ok(Some(Arc::new(embedder)))
            }
            EmbeddingBackend::Local => Self::create_local_embedder(config),
        }
    }

    #[cfg(feature = "local-embeddings")]
    fn create_local_embedder(config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        let embedder = crate::semantic::embeddings::LocalEmbeddings::new(
            &config.embedding.model,
            std::path::PathBuf::from(&config.base_path),
        )?;
        Ok(Some(Arc::new(embedder)))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn create_local_embedder(_config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        log::warn!("built without local-embeddings; embedding similarity disabled");
        Ok(None)
    }

    /// Providers without an API key are left out of the cascade.
    pub fn create_cascade(config: &Config) -> Result<LlmCascade> {
        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let (primary, secondary) = (&config.llm.primary, &config.llm.secondary);

        let primary: Option<Arc<dyn LlmProvider>> = match &primary.api_key {
            Some(key) => Some(Arc::new(OpenAiChat::new(
                &primary.base_url,
                Some(key.clone()),
                &primary.model,
                timeout,
            )?)),
            None => None,
        };

        let secondary: Option<Arc<dyn LlmProvider>> = match &secondary.api_key {
            Some(key) => Some(Arc::new(GeminiChat::new(
                &secondary.base_url,
                Some(key.clone()),
                &secondary.model,
                timeout,
            )?)),
            None => None,
        };

        let cascade = LlmCascade::new(primary, secondary);
        if cascade.is_empty() {
            log::warn!("no LLM provider configured; fallback classification disabled");
        }

        Ok(cascade)
    }

    pub fn create_fetcher(config: &Config) -> Result<Arc<dyn MetadataFetcher>> {
        let fetcher = HttpMetadataFetcher::new(Duration::from_secs(config.metadata_timeout_secs))?;
        Ok(Arc::new(fetcher))
    }

    pub fn create_app(config: &Config, store: Arc<dyn DocumentStore>) -> Result<App> {
        let side_effects = Arc::new(SideEffects::new(store.clone()));

        let cache = Self::create_embedder(config)?.map(|embedder| {
            CategoryEmbeddingCache::new(
                embedder,
                config.auto_category.category_examples.clone(),
                store.clone(),
                side_effects.clone(),
            )
        });

        let classifier = Classifier::new(
            config.auto_category.clone(),
            store.clone(),
            cache,
            Self::create_cascade(config)?,
        );

        Ok(App::new(
            store,
            Self::create_fetcher(config)?,
            classifier,
            side_effects,
        ))
    }

    pub fn create_verifier(config: &Config) -> TokenVerifier {
        if config.tokens.is_empty() {
            log::warn!("no tokens configured; every API request will be rejected");
        }
        TokenVerifier::new(&config.tokens)
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub store_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_without_keys_still_builds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.validate().unwrap();

        let store: Arc<dyn DocumentStore> =
            Arc::new(BackendJson::load(dir.path().to_str().unwrap()).unwrap());

        assert!(AppFactory::create_embedder(&config).unwrap().is_none());
        assert!(AppFactory::create_cascade(&config).unwrap().is_empty());
        assert!(AppFactory::create_app(&config, store).is_ok());
    }

    #[test]
    fn test_cascade_with_keys() {
        let mut config = Config::default();
        config.llm.primary.api_key = Some("sk".into());
        config.llm.secondary.api_key = Some("g".into());

        assert!(!AppFactory::create_cascade(&config).unwrap().is_empty());
    }
}
