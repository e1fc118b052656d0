mod store;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};

use crate::{
    app::App,
    categories::{Category, Counts},
    classifier::Classifier,
    config::{AutoCategoryConfig, CategoryExamplesConfig},
    eid::Eid,
    links::{AutoCategory, Link, ListOptions, Provider},
    llm::{parse_lenient, CategoryOption, LlmCascade, LlmProvider, Outcome},
    metadata::{detect_provider, MetadataFetcher, PageMetadata},
    normalize::normalize_category_name,
    providers::ProviderError,
    semantic::{CategoryEmbeddingCache, EmbeddingProvider},
    side_effects::SideEffects,
    store::{BackendJson, DocumentStore, StoreError, WriteBatch, WriteOp},
};

pub const UID: &str = "alice";

/// Serves canned metadata; unknown urls come back as failed fetches.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, PageMetadata>,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, title: &str, description: Option<&str>) -> Self {
        let meta = PageMetadata::from_fields(
            detect_provider(url),
            Some(title.to_string()),
            description.map(str::to_string),
            None,
        );
        self.pages.insert(url.to_string(), meta);
        self
    }
}

impl MetadataFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> PageMetadata {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| PageMetadata::failed(detect_provider(url)))
    }
}

/// Maps texts to vectors by prefix, first matching rule wins.
pub struct FakeEmbedder {
    model: String,
    rules: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    pub fail: AtomicBool,
    pub batch_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(rules: &[(&str, &[f32])]) -> Self {
        Self {
            model: "fake-embed".to_string(),
            rules: rules
                .iter()
                .map(|(prefix, vector)| (prefix.to_string(), vector.to_vec()))
                .collect(),
            fallback: vec![0.0, 0.0, 1.0],
            fail: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        self.rules
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix.as_str()))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Decode("injected".to_string()));
        }
        Ok(())
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.vector(text))
    }
}

/// Replies with a fixed text, or fails every request.
pub struct ScriptedLlm {
    vendor: &'static str,
    model: String,
    reply: Result<String, String>,
    lenient: bool,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn replying(vendor: &'static str, reply: &str) -> Self {
        Self {
            vendor,
            model: format!("{vendor}-model"),
            reply: Ok(reply.to_string()),
            lenient: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(vendor: &'static str) -> Self {
        Self {
            reply: Err("connection reset".to_string()),
            ..Self::replying(vendor, "")
        }
    }

    pub fn choosing(vendor: &'static str, id: &str, confidence: f32) -> Self {
        Self::replying(
            vendor,
            &serde_json::json!({ "id": id, "confidence": confidence }).to_string(),
        )
    }

    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for ScriptedLlm {
    fn vendor(&self) -> &'static str {
        self.vendor
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, _text: &str, _categories: &[CategoryOption]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(ProviderError::Decode)
    }

    fn parse(&self, content: &str) -> Outcome {
        if self.lenient {
            parse_lenient(content)
        } else {
            crate::llm::parse_strict(content)
        }
    }
}

/// In-memory store that can be told to fail commits or best-effort writes.
#[derive(Default)]
pub struct FlakyStore {
    inner: BackendJson,
    /// Commits still allowed to succeed, negative means unlimited.
    commits_left: AtomicI64,
    pub fail_side_writes: AtomicBool,
    pub commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            commits_left: AtomicI64::new(-1),
            ..Default::default()
        }
    }

    /// Lets `n` more commits through, then fails every following one.
    pub fn allow_commits(&self, n: i64) {
        self.commits_left.store(n, Ordering::SeqCst);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn side_write(&self) -> Result<(), StoreError> {
        if self.fail_side_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        Ok(())
    }
}

impl DocumentStore for FlakyStore {
    fn get_link(&self, uid: &str, link_id: &str) -> Result<Option<Link>, StoreError> {
        self.inner.get_link(uid, link_id)
    }

    fn find_link_by_url(&self, uid: &str, url: &str) -> Result<Option<Link>, StoreError> {
        self.inner.find_link_by_url(uid, url)
    }

    fn list_links(&self, uid: &str, opts: &ListOptions) -> Result<Vec<Link>, StoreError> {
        self.inner.list_links(uid, opts)
    }

    fn search_links_by_title_prefix(
        &self,
        uid: &str,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Link>, StoreError> {
        self.inner
            .search_links_by_title_prefix(uid, prefix, limit, cursor)
    }

    fn set_link_audit(
        &self,
        uid: &str,
        link_id: &str,
        audit: AutoCategory,
    ) -> Result<(), StoreError> {
        self.side_write()?;
        self.inner.set_link_audit(uid, link_id, audit)
    }

    fn get_category(&self, uid: &str, category_id: &str) -> Result<Option<Category>, StoreError> {
        self.inner.get_category(uid, category_id)
    }

    fn list_categories(&self, uid: &str) -> Result<Vec<Category>, StoreError> {
        self.inner.list_categories(uid)
    }

    fn create_category(&self, uid: &str, category: Category) -> Result<(), StoreError> {
        self.inner.create_category(uid, category)
    }

    fn set_category_embedding(
        &self,
        uid: &str,
        category_id: &str,
        embedding: Vec<f32>,
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.side_write()?;
        self.inner
            .set_category_embedding(uid, category_id, embedding, model, at)
    }

    fn counts(&self, uid: &str) -> Result<Counts, StoreError> {
        self.inner.counts(uid)
    }

    fn users(&self) -> Result<Vec<String>, StoreError> {
        self.inner.users()
    }

    fn commit(&self, uid: &str, batch: WriteBatch) -> Result<(), StoreError> {
        let left = self.commits_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        if left > 0 {
            self.commits_left.fetch_sub(1, Ordering::SeqCst);
        }

        self.inner.commit(uid, batch)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Auto-categorization on, member-link examples off.
pub fn settings() -> AutoCategoryConfig {
    AutoCategoryConfig {
        category_examples: CategoryExamplesConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn cascade(llms: &[Arc<ScriptedLlm>]) -> LlmCascade {
    let mut llms = llms
        .iter()
        .map(|llm| llm.clone() as Arc<dyn LlmProvider>);
    LlmCascade::new(llms.next(), llms.next())
}

pub fn build_classifier(
    store: Arc<dyn DocumentStore>,
    settings: AutoCategoryConfig,
    embedder: Option<Arc<FakeEmbedder>>,
    llms: &[Arc<ScriptedLlm>],
) -> Classifier {
    let side_effects = Arc::new(SideEffects::new(store.clone()));
    let cache = embedder.map(|embedder| {
        CategoryEmbeddingCache::new(
            embedder,
            settings.category_examples.clone(),
            store.clone(),
            side_effects,
        )
    });

    Classifier::new(settings, store, cache, cascade(llms))
}

pub fn build_app(
    store: Arc<dyn DocumentStore>,
    fetcher: StaticFetcher,
    settings: AutoCategoryConfig,
    embedder: Option<Arc<FakeEmbedder>>,
    llms: &[Arc<ScriptedLlm>],
) -> App {
    let classifier = build_classifier(store.clone(), settings, embedder, llms);
    let side_effects = Arc::new(SideEffects::new(store.clone()));

    App::new(store, Arc::new(fetcher), classifier, side_effects)
}

pub fn add_category(store: &dyn DocumentStore, uid: &str, name: &str) -> String {
    let category = Category::new(normalize_category_name(name), None, Utc::now());
    let id = category.id.clone();
    store.create_category(uid, category).unwrap();
    id
}

/// Creates a link directly in the store, keeping the counters in step.
pub fn insert_link(
    store: &dyn DocumentStore,
    uid: &str,
    url: &str,
    title: &str,
    category_id: Option<&str>,
) -> Link {
    let meta = PageMetadata::from_fields(Provider::Generic, Some(title.to_string()), None, None);
    let mut link = Link::new(Eid::link_key(uid, url), url.to_string(), meta, Utc::now());
    link.category_id = category_id.map(str::to_string);

    let counter = match category_id {
        None => WriteOp::IncrementInbox(1),
        Some(id) => WriteOp::IncrementLinkCount {
            category_id: id.to_string(),
            delta: 1,
        },
    };

    store
        .commit(uid, vec![WriteOp::CreateLink(link.clone()), counter].into())
        .unwrap();
    link
}

/// Every counter equals the number of links it stands for.
pub fn assert_counters_consistent(store: &dyn DocumentStore, uid: &str) {
    let links = store.list_links(uid, &ListOptions::default()).unwrap();

    let inbox = links.iter().filter(|l| l.is_inbox()).count() as i64;
    assert_eq!(store.counts(uid).unwrap().inbox_count, inbox, "inbox count");

    for category in store.list_categories(uid).unwrap() {
        let members = links
            .iter()
            .filter(|l| l.category_id.as_deref() == Some(category.id.as_str()))
            .count() as i64;
        assert_eq!(category.link_count, members, "count of {}", category.name);
    }
}
