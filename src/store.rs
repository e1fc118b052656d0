use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    categories::{Category, Counts},
    links::{AutoCategory, Link, ListOptions, SortOrder},
    storage::{self, StorageManager},
};

/// Upper bound of writes a single batch may carry.
pub const MAX_BATCH_WRITES: usize = 500;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("batch of {0} writes exceeds the per-batch limit")]
    BatchTooLarge(usize),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("serde error: {0:?}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Fails with `AlreadyExists` when the id or the url is taken.
    CreateLink(Link),
    SetLinkCategory {
        link_id: String,
        category_id: Option<String>,
    },
    /// Read precondition, not counted as a write.
    ExpectLinkCategory {
        link_id: String,
        category_id: Option<String>,
    },
    IncrementInbox(i64),
    IncrementLinkCount {
        category_id: String,
        delta: i64,
    },
    SetInboxCount(i64),
    SetLinkCount {
        category_id: String,
        value: i64,
    },
    DeleteCategory(String),
}

impl WriteOp {
    fn is_write(&self) -> bool {
        !matches!(self, WriteOp::ExpectLinkCategory { .. })
    }
}

/// Ordered group of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Number of writes, preconditions excluded.
    pub fn writes(&self) -> usize {
        self.ops.iter().filter(|op| op.is_write()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[cfg(test)]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }
}

pub trait DocumentStore: Send + Sync {
    fn get_link(&self, uid: &str, link_id: &str) -> Result<Option<Link>, StoreError>;
    fn find_link_by_url(&self, uid: &str, url: &str) -> Result<Option<Link>, StoreError>;
    /// Ordered by `created_at` (then id) in the requested direction.
    fn list_links(&self, uid: &str, opts: &ListOptions) -> Result<Vec<Link>, StoreError>;
    /// Case-sensitive title prefix match ordered by title.
    fn search_links_by_title_prefix(
        &self,
        uid: &str,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Link>, StoreError>;
    fn set_link_audit(&self, uid: &str, link_id: &str, audit: AutoCategory)
        -> Result<(), StoreError>;

    fn get_category(&self, uid: &str, category_id: &str) -> Result<Option<Category>, StoreError>;
    /// Ordered by creation, which is the order classification ties resolve in.
    fn list_categories(&self, uid: &str) -> Result<Vec<Category>, StoreError>;
    /// Fails with `AlreadyExists` when `name_lower` is taken.
    fn create_category(&self, uid: &str, category: Category) -> Result<(), StoreError>;
    fn set_category_embedding(
        &self,
        uid: &str,
        category_id: &str,
        embedding: Vec<f32>,
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn counts(&self, uid: &str) -> Result<Counts, StoreError>;
    fn users(&self) -> Result<Vec<String>, StoreError>;

    /// Applies every op of the batch or none of them.
    fn commit(&self, uid: &str, batch: WriteBatch) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    uid: String,
    #[serde(default)]
    links: BTreeMap<String, Link>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    counts: Counts,
}

impl UserData {
    fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            ..Default::default()
        }
    }

    fn link_mut(&mut self, link_id: &str) -> Result<&mut Link, StoreError> {
        self.links
            .get_mut(link_id)
            .ok_or_else(|| StoreError::not_found("link", link_id))
    }

    fn category_mut(&mut self, category_id: &str) -> Result<&mut Category, StoreError> {
        self.categories
            .iter_mut()
            .find(|c| c.id == category_id)
            .ok_or_else(|| StoreError::not_found("category", category_id))
    }

    fn apply(&mut self, op: WriteOp, now: DateTime<Utc>) -> Result<(), StoreError> {
        match op {
            WriteOp::CreateLink(link) => {
                if self.links.contains_key(&link.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: "link",
                        id: link.id,
                    });
                }
                if self.links.values().any(|l| l.url == link.url) {
                    return Err(StoreError::AlreadyExists {
                        kind: "link",
                        id: link.url,
                    });
                }
                self.links.insert(link.id.clone(), link);
            }
            WriteOp::SetLinkCategory {
                link_id,
                category_id,
            } => {
                let link = self.link_mut(&link_id)?;
                link.category_id = category_id;
                link.updated_at = now;
            }
            WriteOp::ExpectLinkCategory {
                link_id,
                category_id,
            } => {
                let link = self.link_mut(&link_id)?;
                if link.category_id != category_id {
                    return Err(StoreError::PreconditionFailed(format!(
                        "link {link_id} is in {:?}, expected {:?}",
                        link.category_id, category_id
                    )));
                }
            }
            WriteOp::IncrementInbox(delta) => self.counts.inbox_count += delta,
            WriteOp::IncrementLinkCount { category_id, delta } => {
                self.category_mut(&category_id)?.link_count += delta;
            }
            WriteOp::SetInboxCount(value) => self.counts.inbox_count = value,
            WriteOp::SetLinkCount { category_id, value } => {
                self.category_mut(&category_id)?.link_count = value;
            }
            WriteOp::DeleteCategory(category_id) => {
                let idx = self
                    .categories
                    .iter()
                    .position(|c| c.id == category_id)
                    .ok_or_else(|| StoreError::not_found("category", &category_id))?;
                self.categories.remove(idx);
            }
        }

        Ok(())
    }
}

/// Document store kept in memory and mirrored to one JSON file per user.
///
/// Every mutation is applied to a copy of the user's dataset, persisted, and
/// only then swapped in, so a failed op or a failed write leaves the
/// previous state untouched.
#[derive(Clone, Default)]
pub struct BackendJson {
    users: Arc<RwLock<HashMap<String, UserData>>>,
    storage: Option<Arc<dyn StorageManager>>,
}

impl BackendJson {
    pub fn load(dir: &str) -> Result<Self, StoreError> {
        let now = Instant::now();
        let storage = storage::BackendLocal::new(dir)?;

        let mut users = HashMap::new();
        for name in storage.list() {
            if !name.ends_with(".json") {
                continue;
            }

            let data: UserData = serde_json::from_slice(&storage.read(&name)?)?;
            users.insert(data.uid.clone(), data);
        }

        log::debug!(
            "took {}ms to load {} user datasets from {dir}",
            now.elapsed().as_micros() as f64 / 1000.0,
            users.len()
        );

        Ok(Self {
            users: Arc::new(RwLock::new(users)),
            storage: Some(Arc::new(storage)),
        })
    }

    fn file_name(uid: &str) -> String {
        let digest = Sha256::digest(uid.as_bytes());
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        format!("{}.json", &hex[..16])
    }

    fn read<T>(&self, uid: &str, f: impl FnOnce(Option<&UserData>) -> T) -> Result<T, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(f(users.get(uid)))
    }

    fn write<T>(
        &self,
        uid: &str,
        f: impl FnOnce(&mut UserData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let mut data = users
            .get(uid)
            .cloned()
            .unwrap_or_else(|| UserData::new(uid));

        let result = f(&mut data)?;

        if let Some(storage) = &self.storage {
            storage.write(&Self::file_name(uid), &serde_json::to_vec(&data)?)?;
        }

        users.insert(uid.to_string(), data);

        Ok(result)
    }
}

impl DocumentStore for BackendJson {
    fn get_link(&self, uid: &str, link_id: &str) -> Result<Option<Link>, StoreError> {
        self.read(uid, |data| data.and_then(|d| d.links.get(link_id).cloned()))
    }

    fn find_link_by_url(&self, uid: &str, url: &str) -> Result<Option<Link>, StoreError> {
        self.read(uid, |data| {
            data.and_then(|d| d.links.values().find(|l| l.url == url).cloned())
        })
    }

    fn list_links(&self, uid: &str, opts: &ListOptions) -> Result<Vec<Link>, StoreError> {
        let mut links = self.read(uid, |data| {
            data.map(|d| {
                d.links
                    .values()
                    .filter(|l| opts.matches(l))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
        })?;

        links.sort_by(|a, b| {
            let ord = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
            match opts.sort {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        Ok(page(links, opts.cursor.as_deref(), opts.limit))
    }

    fn search_links_by_title_prefix(
        &self,
        uid: &str,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Vec<Link>, StoreError> {
        let mut links = self.read(uid, |data| {
            data.map(|d| {
                d.links
                    .values()
                    .filter(|l| l.title.as_deref().is_some_and(|t| t.starts_with(prefix)))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
        })?;

        links.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));

        Ok(page(links, cursor, Some(limit)))
    }

    fn set_link_audit(
        &self,
        uid: &str,
        link_id: &str,
        audit: AutoCategory,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(uid, |data| {
            let link = data.link_mut(link_id)?;
            link.auto_category = Some(audit);
            link.updated_at = now;
            Ok(())
        })
    }

    fn get_category(&self, uid: &str, category_id: &str) -> Result<Option<Category>, StoreError> {
        self.read(uid, |data| {
            data.and_then(|d| d.categories.iter().find(|c| c.id == category_id).cloned())
        })
    }

    fn list_categories(&self, uid: &str) -> Result<Vec<Category>, StoreError> {
        self.read(uid, |data| {
            data.map(|d| d.categories.clone()).unwrap_or_default()
        })
    }

    fn create_category(&self, uid: &str, category: Category) -> Result<(), StoreError> {
        self.write(uid, |data| {
            let taken = data
                .categories
                .iter()
                .any(|c| c.id == category.id || c.name_lower == category.name_lower);
            if taken {
                return Err(StoreError::AlreadyExists {
                    kind: "category",
                    id: category.name,
                });
            }

            data.categories.push(category);
            Ok(())
        })
    }

    fn set_category_embedding(
        &self,
        uid: &str,
        category_id: &str,
        embedding: Vec<f32>,
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.write(uid, |data| {
            let category = data.category_mut(category_id)?;
            category.embedding = Some(embedding);
            category.embedding_model = Some(model.to_string());
            category.embedding_updated_at = Some(at);
            Ok(())
        })
    }

    fn counts(&self, uid: &str) -> Result<Counts, StoreError> {
        self.read(uid, |data| data.map(|d| d.counts.clone()).unwrap_or_default())
    }

    fn users(&self) -> Result<Vec<String>, StoreError> {
        let mut uids = self
            .users
            .read()
            .map(|users| users.keys().cloned().collect::<Vec<_>>())
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        uids.sort();
        Ok(uids)
    }

    fn commit(&self, uid: &str, batch: WriteBatch) -> Result<(), StoreError> {
        let writes = batch.writes();
        if writes > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge(writes));
        }
        if batch.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        self.write(uid, |data| {
            for op in batch.ops {
                data.apply(op, now)?;
            }
            Ok(())
        })
    }
}

fn page(links: Vec<Link>, cursor: Option<&str>, limit: Option<usize>) -> Vec<Link> {
    let start = cursor
        .and_then(|id| links.iter().position(|l| l.id == id))
        .map(|idx| idx + 1)
        .unwrap_or(0);

    links
        .into_iter()
        .skip(start)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
