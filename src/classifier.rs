use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    categories::Category,
    config::{AutoCategoryConfig, CategorizeMode},
    links::{AutoCategory, Link, Method},
    llm::{CategoryOption, LlmCascade},
    semantic::{best_match, CategoryEmbeddingCache},
    store::{DocumentStore, StoreError},
};

/// Outcome of classifying one link. Only ever persisted as audit metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub category_id: Option<String>,
    pub confidence: f32,
    pub method: Method,
    pub model: Option<String>,
}

impl Decision {
    pub fn none() -> Self {
        Self {
            category_id: None,
            confidence: 0.0,
            method: Method::None,
            model: None,
        }
    }

    pub fn embedding(category_id: String, score: f32, model: &str) -> Self {
        Self {
            category_id: Some(category_id),
            confidence: score.clamp(0.0, 1.0),
            method: Method::Embedding,
            model: Some(model.to_string()),
        }
    }

    pub fn llm(category_id: String, confidence: f32, model: &str) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            category_id: Some(category_id),
            confidence,
            method: Method::Llm,
            model: Some(model.to_string()),
        }
    }

    pub fn audit(&self, at: DateTime<Utc>) -> AutoCategory {
        AutoCategory {
            method: self.method,
            confidence: self.confidence,
            model: self.model.clone(),
            decided_at: at,
        }
    }
}

/// Text a link is classified by: title, description and hostname.
pub fn feature_text(link: &Link) -> String {
    [link.title.clone(), link.description.clone(), link.hostname()]
        .into_iter()
        .flatten()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Embedding similarity first, LLM cascade as fallback.
pub struct Classifier {
    settings: AutoCategoryConfig,
    store: Arc<dyn DocumentStore>,
    cache: Option<CategoryEmbeddingCache>,
    cascade: LlmCascade,
}

impl Classifier {
    pub fn new(
        settings: AutoCategoryConfig,
        store: Arc<dyn DocumentStore>,
        cache: Option<CategoryEmbeddingCache>,
        cascade: LlmCascade,
    ) -> Self {
        Self {
            settings,
            store,
            cache,
            cascade,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Picks a category for `link` among the user's categories.
    ///
    /// Provider failures are absorbed and end up as `Method::None`; only a
    /// failure to read the categories is returned.
    pub fn classify(&self, uid: &str, link: &Link) -> Result<Decision, StoreError> {
        if !self.settings.enabled {
            return Ok(Decision::none());
        }

        let text = feature_text(link);
        if text.is_empty() {
            log::debug!("link {}: nothing to classify by", link.id);
            return Ok(Decision::none());
        }

        let categories = self.store.list_categories(uid)?;
        if categories.is_empty() {
            return Ok(Decision::none());
        }

        let options: Vec<CategoryOption> = categories
            .iter()
            .map(|c| CategoryOption {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect();

        if self.settings.mode == CategorizeMode::LlmOnly {
            return Ok(self.cascade.choose(&text, &options));
        }

        if let Some(decision) = self.by_similarity(uid, &link.id, &text, categories) {
            return Ok(decision);
        }

        if self.settings.llm_enabled {
            return Ok(self.cascade.choose(&text, &options));
        }

        Ok(Decision::none())
    }

    /// `None` means inconclusive: no vectors, provider failure or a best
    /// score under the threshold.
    fn by_similarity(
        &self,
        uid: &str,
        link_id: &str,
        text: &str,
        categories: Vec<Category>,
    ) -> Option<Decision> {
        let cache = self.cache.as_ref()?;

        let categories = match cache.ensure(uid, categories) {
            Ok(categories) => categories,
            Err(err) => {
                log::warn!("link {link_id}: category embeddings unavailable: {err}");
                return None;
            }
        };

        if !categories.iter().any(Category::has_embedding) {
            return None;
        }

        let vector = match cache.embedder().embed(text) {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => return None,
            Err(err) => {
                log::warn!("link {link_id}: embedding failed: {err}");
                return None;
            }
        };

        let best = best_match(&vector, &categories)?;
        if best.score >= self.settings.threshold {
            log::info!(
                "link {link_id}: category {} by similarity {:.3}",
                best.category_id,
                best.score
            );
            Some(Decision::embedding(
                best.category_id,
                best.score,
                cache.embedder().model(),
            ))
        } else {
            log::info!(
                "link {link_id}: best similarity {:.3} under threshold {}",
                best.score,
                self.settings.threshold
            );
            None
        }
    }
}
