use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    links::AutoCategory,
    store::{DocumentStore, StoreError},
};

const DEFAULT_ATTEMPTS: u32 = 2;

/// A best-effort write that must never fail the operation that issued it.
#[derive(Debug, Clone)]
pub enum SideEffect {
    CategoryEmbedding {
        uid: String,
        category_id: String,
        embedding: Vec<f32>,
        model: String,
        at: DateTime<Utc>,
    },
    LinkAudit {
        uid: String,
        link_id: String,
        audit: AutoCategory,
    },
}

impl SideEffect {
    fn describe(&self) -> String {
        match self {
            SideEffect::CategoryEmbedding { category_id, .. } => {
                format!("category {category_id} embedding")
            }
            SideEffect::LinkAudit { link_id, .. } => format!("link {link_id} audit"),
        }
    }
}

pub struct SideEffects {
    store: Arc<dyn DocumentStore>,
    attempts: u32,
}

impl SideEffects {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Runs the effect with a bounded number of attempts.
    ///
    /// Failures are logged and handed back so the caller can tell whether
    /// the write landed, but they are never meant to be propagated.
    pub fn run(&self, effect: SideEffect) -> Result<(), SideEffect> {
        for attempt in 1..=self.attempts {
            match self.apply(&effect) {
                Ok(()) => return Ok(()),
                Err(err @ StoreError::NotFound { .. }) => {
                    log::warn!("{}: giving up: {err}", effect.describe());
                    break;
                }
                Err(err) => {
                    log::warn!(
                        "{}: attempt {attempt}/{} failed: {err}",
                        effect.describe(),
                        self.attempts
                    );
                }
            }
        }

        Err(effect)
    }

    fn apply(&self, effect: &SideEffect) -> Result<(), StoreError> {
        match effect {
            SideEffect::CategoryEmbedding {
                uid,
                category_id,
                embedding,
                model,
                at,
            } => self
                .store
                .set_category_embedding(uid, category_id, embedding.clone(), model, *at),
            SideEffect::LinkAudit {
                uid,
                link_id,
                audit,
            } => self.store.set_link_audit(uid, link_id, audit.clone()),
        }
    }
}
