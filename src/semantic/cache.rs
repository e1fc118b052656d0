//! Per-category feature vectors, recomputed when their model tag goes stale.

use std::sync::Arc;

use chrono::Utc;

use super::embeddings::EmbeddingProvider;
use crate::{
    categories::Category,
    config::CategoryExamplesConfig,
    links::ListOptions,
    providers::ProviderError,
    side_effects::{SideEffect, SideEffects},
    store::DocumentStore,
};

/// Appended to the model id when vectors include member-link samples.
pub const EXAMPLES_TAG_SUFFIX: &str = "+cat_examples";

pub struct CategoryEmbeddingCache {
    embedder: Arc<dyn EmbeddingProvider>,
    examples: CategoryExamplesConfig,
    store: Arc<dyn DocumentStore>,
    side_effects: Arc<SideEffects>,
}

impl CategoryEmbeddingCache {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        examples: CategoryExamplesConfig,
        store: Arc<dyn DocumentStore>,
        side_effects: Arc<SideEffects>,
    ) -> Self {
        Self {
            embedder,
            examples,
            store,
            side_effects,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Tag a fresh vector must carry.
    pub fn expected_model(&self) -> String {
        if self.examples.enabled {
            format!("{}{EXAMPLES_TAG_SUFFIX}", self.embedder.model())
        } else {
            self.embedder.model().to_string()
        }
    }

    pub fn is_stale(&self, category: &Category) -> bool {
        !category.has_embedding()
            || category.embedding_model.as_deref() != Some(self.expected_model().as_str())
    }

    /// Name, optionally followed by titles and descriptions of the most
    /// recent member links.
    pub fn category_text(&self, uid: &str, category: &Category) -> String {
        if !self.examples.enabled || self.examples.sample_size == 0 {
            return category.name.clone();
        }

        let opts = ListOptions::in_category(&category.id).with_limit(self.examples.sample_size);
        let sample = match self.store.list_links(uid, &opts) {
            Ok(sample) => sample,
            Err(err) => {
                log::debug!("category {}: no example sample: {err}", category.id);
                return category.name.clone();
            }
        };

        let parts: Vec<&str> = sample
            .iter()
            .flat_map(|link| [link.title.as_deref(), link.description.as_deref()])
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if parts.is_empty() {
            return category.name.clone();
        }

        let examples: String = parts.join("\n").chars().take(self.examples.max_chars).collect();
        format!("{}\n{examples}", category.name)
    }

    /// Returns `categories` with every stale vector recomputed.
    ///
    /// All stale categories are embedded in one batched call. Persisting the
    /// new vectors is best-effort; a failed write only means the next call
    /// recomputes them again.
    pub fn ensure(
        &self,
        uid: &str,
        mut categories: Vec<Category>,
    ) -> Result<Vec<Category>, ProviderError> {
        let stale: Vec<usize> = categories
            .iter()
            .enumerate()
            .filter(|(_, c)| self.is_stale(c))
            .map(|(idx, _)| idx)
            .collect();

        if stale.is_empty() {
            return Ok(categories);
        }

        let texts: Vec<String> = stale
            .iter()
            .map(|&idx| self.category_text(uid, &categories[idx]))
            .collect();

        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "asked for {} category embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let model = self.expected_model();
        let now = Utc::now();
        log::debug!("recomputed {} category embeddings with {model}", stale.len());

        for (idx, vector) in stale.into_iter().zip(vectors) {
            let category = &mut categories[idx];
            category.embedding = Some(vector.clone());
            category.embedding_model = Some(model.clone());
            category.embedding_updated_at = Some(now);

            let _ = self.side_effects.run(SideEffect::CategoryEmbedding {
                uid: uid.to_string(),
                category_id: category.id.clone(),
                embedding: vector,
                model: model.clone(),
                at: now,
            });
        }

        Ok(categories)
    }
}
