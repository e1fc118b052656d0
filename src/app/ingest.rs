use chrono::Utc;
use serde::Serialize;

use super::{App, AppError};
use crate::{
    classifier::Decision,
    eid::Eid,
    links::{Link, LinkCreated, ListOptions},
    normalize::normalize_url,
    side_effects::SideEffect,
    store::{StoreError, WriteBatch, WriteOp},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub tried: usize,
    pub updated: usize,
}

impl App {
    /// Saves a url, enriches it and files it into a category.
    ///
    /// The link always lands in the inbox first. Classification problems
    /// only leave it there; a failed counter update fails the call.
    pub fn create_link(&self, uid: &str, raw_url: &str) -> Result<LinkCreated, AppError> {
        let url = normalize_url(raw_url.trim());
        if url.trim().is_empty() {
            return Err(AppError::Validation("url is empty".to_string()));
        }
        match url::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(AppError::Validation(format!("not an http(s) url: {url}"))),
        }

        if let Some(link) = self.store.find_link_by_url(uid, &url)? {
            log::debug!("{uid}: {url} already saved as {}", link.id);
            return Ok(LinkCreated {
                link,
                created: false,
            });
        }

        let meta = self.fetcher.fetch(&url);
        let link = Link::new(Eid::link_key(uid, &url), url, meta, Utc::now());

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::CreateLink(link.clone()))
            .push(WriteOp::IncrementInbox(1));

        match self.store.commit(uid, batch) {
            Ok(()) => log::info!("{uid}: saved {} as {}", link.url, link.id),
            Err(StoreError::AlreadyExists { .. }) => {
                let existing = match self.store.get_link(uid, &link.id)? {
                    Some(existing) => existing,
                    None => self
                        .store
                        .find_link_by_url(uid, &link.url)?
                        .ok_or_else(|| AppError::Conflict(format!("link {} vanished", link.id)))?,
                };
                return Ok(LinkCreated {
                    link: existing,
                    created: false,
                });
            }
            Err(err) => return Err(err.into()),
        }

        if !self.classifier.is_enabled() {
            return Ok(LinkCreated {
                link,
                created: true,
            });
        }

        let decision = self.decide(uid, &link);
        let link = self.apply_decision(uid, link, decision)?;

        Ok(LinkCreated {
            link,
            created: true,
        })
    }

    /// Re-runs classification over links still sitting in the inbox.
    pub fn backfill_categories(&self, uid: &str, limit: usize) -> Result<BackfillReport, AppError> {
        let links = self.store.list_links(uid, &ListOptions::inbox().with_limit(limit))?;
        let mut report = BackfillReport::default();

        for link in links {
            report.tried += 1;

            let decision = self.decide(uid, &link);
            if decision.category_id.is_none() {
                continue;
            }

            let link = self.apply_decision(uid, link, decision)?;
            if link.category_id.is_some() {
                report.updated += 1;
            }
        }

        log::info!("{uid}: backfill tried={} updated={}", report.tried, report.updated);
        Ok(report)
    }

    fn decide(&self, uid: &str, link: &Link) -> Decision {
        match self.classifier.classify(uid, link) {
            Ok(decision) => decision,
            Err(err) => {
                log::warn!("link {}: classification skipped: {err}", link.id);
                Decision::none()
            }
        }
    }

    /// Moves the link per `decision`, then records the audit best-effort.
    fn apply_decision(&self, uid: &str, link: Link, decision: Decision) -> Result<Link, AppError> {
        let mut link = link;
        let mut decision = decision;

        if let Some(category_id) = decision.category_id.clone() {
            if self.store.get_category(uid, &category_id)?.is_some() {
                link = self.counters.move_category(uid, &link.id, Some(&category_id))?;
            } else {
                log::warn!("link {}: category {category_id} is gone, keeping inbox", link.id);
                decision = Decision::none();
            }
        }

        let audit = decision.audit(Utc::now());
        let effect = SideEffect::LinkAudit {
            uid: uid.to_string(),
            link_id: link.id.clone(),
            audit: audit.clone(),
        };
        if self.side_effects.run(effect).is_ok() {
            link.auto_category = Some(audit);
        }

        Ok(link)
    }
}
