use std::sync::Arc;

use super::{CategoryOption, LlmProvider, Outcome};
use crate::classifier::Decision;

/// Providers consulted in order until one names a known category.
#[derive(Clone, Default)]
pub struct LlmCascade {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl LlmCascade {
    pub fn new(
        primary: Option<Arc<dyn LlmProvider>>,
        secondary: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            providers: primary.into_iter().chain(secondary).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Never fails: exhausting every provider yields `Decision::none()`.
    pub fn choose(&self, text: &str, categories: &[CategoryOption]) -> Decision {
        if categories.is_empty() {
            return Decision::none();
        }

        for provider in &self.providers {
            let vendor = provider.vendor();

            match provider.ask(text, categories) {
                Outcome::Choice { id, confidence } => {
                    if categories.iter().any(|c| c.id == id) {
                        log::info!("{vendor} picked category {id} ({confidence})");
                        return Decision::llm(id, confidence, provider.model());
                    }
                    log::warn!("{vendor} picked unknown category {id:?}, discarding");
                }
                Outcome::NoChoice => log::info!("{vendor} found no fitting category"),
                Outcome::ParseError(err) => log::warn!("{vendor} reply unparseable: {err}"),
                Outcome::ProviderError(err) => log::error!("{vendor} request failed: {err}"),
            }
        }

        Decision::none()
    }
}
