use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::{
    app::AppError,
    links::{Link, ListOptions},
    store::{DocumentStore, StoreError, WriteBatch, WriteOp},
};

/// Member links moved per commit when a category is deleted.
pub const CASCADE_CHUNK: usize = 400;
/// Writes per commit during reconciliation.
pub const RECONCILE_CHUNK: usize = 450;
const MOVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub id: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub inbox: i64,
    pub categories: Vec<CategoryCount>,
    /// Links that pointed at a missing category and were put back in the inbox.
    pub orphans: usize,
}

/// Keeps `inboxCount` and every `linkCount` in step with link membership.
pub struct CounterManager {
    store: Arc<dyn DocumentStore>,
}

impl CounterManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Ops moving a link between buckets. `None` is the inbox.
    ///
    /// A self-move still emits the decrement and the increment.
    pub fn move_ops(link_id: &str, prev: Option<&str>, next: Option<&str>) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::ExpectLinkCategory {
                link_id: link_id.to_string(),
                category_id: prev.map(str::to_string),
            })
            .push(WriteOp::SetLinkCategory {
                link_id: link_id.to_string(),
                category_id: next.map(str::to_string),
            })
            .push(counter_op(prev, -1))
            .push(counter_op(next, 1));
        batch
    }

    /// Moves a link into `category_id` (or the inbox) in one atomic batch.
    ///
    /// Retries when a concurrent move changed the link in between.
    pub fn move_category(
        &self,
        uid: &str,
        link_id: &str,
        category_id: Option<&str>,
    ) -> Result<Link, AppError> {
        for attempt in 1..=MOVE_ATTEMPTS {
            let link = self.require_link(uid, link_id)?;

            if let Some(category_id) = category_id {
                if self.store.get_category(uid, category_id)?.is_none() {
                    return Err(AppError::NotFound(format!("category {category_id}")));
                }
            }

            let batch = Self::move_ops(&link.id, link.category_id.as_deref(), category_id);
            match self.store.commit(uid, batch) {
                Ok(()) => {
                    log::debug!(
                        "link {link_id}: {:?} -> {:?}",
                        link.category_id,
                        category_id
                    );
                    return self.require_link(uid, link_id);
                }
                Err(StoreError::PreconditionFailed(reason)) => {
                    log::warn!("link {link_id}: move attempt {attempt} lost a race: {reason}");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "link {link_id} kept changing, gave up after {MOVE_ATTEMPTS} attempts"
        )))
    }

    /// Moves every member to the inbox and removes the category.
    ///
    /// Members are moved in chunks; the last commit also bumps the inbox by
    /// the total and deletes the category, so a small category goes away in
    /// a single atomic batch. Returns the number of links moved.
    pub fn delete_category(&self, uid: &str, category_id: &str) -> Result<usize, AppError> {
        if self.store.get_category(uid, category_id)?.is_none() {
            return Err(AppError::NotFound(format!("category {category_id}")));
        }

        let members: Vec<String> = self
            .store
            .list_links(uid, &ListOptions::in_category(category_id))?
            .into_iter()
            .map(|link| link.id)
            .collect();
        let total = members.len();

        let mut chunks: Vec<&[String]> = members.chunks(CASCADE_CHUNK).collect();
        let last = chunks.pop().unwrap_or(&[]);

        for chunk in chunks {
            self.store.commit(uid, to_inbox(chunk))?;
        }

        let mut batch = to_inbox(last);
        batch
            .push(WriteOp::IncrementInbox(total as i64))
            .push(WriteOp::DeleteCategory(category_id.to_string()));
        self.store.commit(uid, batch)?;

        log::info!("deleted category {category_id}, moved {total} links to inbox");
        Ok(total)
    }

    /// Recomputes every counter from a full scan of the user's links.
    pub fn reconcile(&self, uid: &str) -> Result<ReconcileReport, AppError> {
        let categories = self.store.list_categories(uid)?;
        let links = self.store.list_links(uid, &ListOptions::default())?;

        let mut counts: HashMap<&str, i64> =
            categories.iter().map(|c| (c.id.as_str(), 0)).collect();
        let mut inbox = 0;
        let mut ops = vec![];

        for link in &links {
            match link.category_id.as_deref() {
                None => inbox += 1,
                Some(id) => match counts.get_mut(id) {
                    Some(count) => *count += 1,
                    None => {
                        inbox += 1;
                        ops.push(WriteOp::SetLinkCategory {
                            link_id: link.id.clone(),
                            category_id: None,
                        });
                    }
                },
            }
        }

        let orphans = ops.len();
        if orphans > 0 {
            log::warn!("{uid}: {orphans} links pointed at missing categories");
        }

        let report = ReconcileReport {
            inbox,
            categories: categories
                .iter()
                .map(|c| CategoryCount {
                    id: c.id.clone(),
                    count: counts.get(c.id.as_str()).copied().unwrap_or_default(),
                })
                .collect(),
            orphans,
        };

        ops.extend(report.categories.iter().map(|c| WriteOp::SetLinkCount {
            category_id: c.id.clone(),
            value: c.count,
        }));
        ops.push(WriteOp::SetInboxCount(inbox));

        for chunk in ops.chunks(RECONCILE_CHUNK) {
            self.store.commit(uid, WriteBatch::from(chunk.to_vec()))?;
        }

        log::info!(
            "{uid}: reconciled inbox={} categories={}",
            report.inbox,
            report.categories.len()
        );
        Ok(report)
    }

    pub fn reconcile_all(&self) -> Result<Vec<(String, ReconcileReport)>, AppError> {
        self.store
            .users()?
            .into_iter()
            .map(|uid| {
                let report = self.reconcile(&uid)?;
                Ok((uid, report))
            })
            .collect()
    }

    fn require_link(&self, uid: &str, link_id: &str) -> Result<Link, AppError> {
        self.store
            .get_link(uid, link_id)?
            .ok_or_else(|| AppError::NotFound(format!("link {link_id}")))
    }
}

fn counter_op(category_id: Option<&str>, delta: i64) -> WriteOp {
    match category_id {
        None => WriteOp::IncrementInbox(delta),
        Some(id) => WriteOp::IncrementLinkCount {
            category_id: id.to_string(),
            delta,
        },
    }
}

fn to_inbox(link_ids: &[String]) -> WriteBatch {
    link_ids
        .iter()
        .map(|id| WriteOp::SetLinkCategory {
            link_id: id.clone(),
            category_id: None,
        })
        .collect::<Vec<_>>()
        .into()
}
