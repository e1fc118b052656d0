pub mod errors;
pub mod factory;
mod ingest;

use std::sync::Arc;

use chrono::Utc;

pub use errors::AppError;
pub use factory::AppFactory;

use crate::{
    categories::{Category, CategorySummary},
    classifier::Classifier,
    counters::{CounterManager, ReconcileReport},
    links::{Link, ListOptions, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    metadata::MetadataFetcher,
    normalize::normalize_category_name,
    side_effects::SideEffects,
    store::DocumentStore,
};

/// Use cases over one document store, scoped per user id.
pub struct App {
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn MetadataFetcher>,
    classifier: Classifier,
    counters: CounterManager,
    side_effects: Arc<SideEffects>,
}

impl App {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        fetcher: Arc<dyn MetadataFetcher>,
        classifier: Classifier,
        side_effects: Arc<SideEffects>,
    ) -> Self {
        Self {
            counters: CounterManager::new(store.clone()),
            store,
            fetcher,
            classifier,
            side_effects,
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn MetadataFetcher> {
        &self.fetcher
    }

    pub fn get_link(&self, uid: &str, link_id: &str) -> Result<Link, AppError> {
        self.store
            .get_link(uid, link_id)?
            .ok_or_else(|| AppError::NotFound(format!("link {link_id}")))
    }

    pub fn list_links(&self, uid: &str, mut opts: ListOptions) -> Result<Vec<Link>, AppError> {
        opts.limit = Some(page_size(opts.limit)?);
        Ok(self.store.list_links(uid, &opts)?)
    }

    pub fn search_links(
        &self,
        uid: &str,
        query: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<Vec<Link>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("search query is empty".to_string()));
        }

        Ok(self
            .store
            .search_links_by_title_prefix(uid, query, page_size(limit)?, cursor)?)
    }

    /// Manual move; `None` sends the link back to the inbox.
    pub fn move_category(
        &self,
        uid: &str,
        link_id: &str,
        category_id: Option<&str>,
    ) -> Result<Link, AppError> {
        self.counters.move_category(uid, link_id, category_id)
    }

    pub fn create_category(
        &self,
        uid: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<CategorySummary, AppError> {
        let name = normalize_category_name(name);
        if name.name.is_empty() {
            return Err(AppError::Validation("category name is empty".to_string()));
        }

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let category = Category::new(name, description, Utc::now());
        let summary = CategorySummary::from(&category);

        self.store.create_category(uid, category)?;
        log::info!("{uid}: created category {} ({})", summary.name, summary.id);

        Ok(summary)
    }

    /// Inbox pseudo-category first, then every category in creation order.
    pub fn list_categories(&self, uid: &str) -> Result<Vec<CategorySummary>, AppError> {
        let counts = self.store.counts(uid)?;

        Ok(std::iter::once(CategorySummary::inbox(counts.inbox_count))
            .chain(self.store.list_categories(uid)?.iter().map(CategorySummary::from))
            .collect())
    }

    pub fn delete_category(&self, uid: &str, category_id: &str) -> Result<usize, AppError> {
        self.counters.delete_category(uid, category_id)
    }

    pub fn reconcile(&self, uid: &str) -> Result<ReconcileReport, AppError> {
        self.counters.reconcile(uid)
    }

    pub fn reconcile_all(&self) -> Result<Vec<(String, ReconcileReport)>, AppError> {
        self.counters.reconcile_all()
    }
}

fn page_size(limit: Option<usize>) -> Result<usize, AppError> {
    match limit {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => Ok(limit),
        Some(limit) => Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}, got {limit}"
        ))),
    }
}
