use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{eid::Eid, metadata::PageMetadata};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Youtube,
    X,
    Instagram,
    #[default]
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Partial,
    Failed,
}

/// How a classification decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Embedding,
    Llm,
    None,
}

/// Audit record of the automatic classification, written once after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCategory {
    pub method: Method,
    pub confidence: f32,
    pub model: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// `None` means the link sits in the inbox.
    pub category_id: Option<String>,
    pub provider: Provider,
    pub fetch_status: FetchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_category: Option<AutoCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    pub fn new(id: Eid, url: String, meta: PageMetadata, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            url,
            title: meta.title,
            description: meta.description,
            image_url: meta.image_url,
            category_id: None,
            provider: meta.provider,
            fetch_status: meta.fetch_status,
            auto_category: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_inbox(&self) -> bool {
        self.category_id.is_none()
    }

    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct LinkCreated {
    pub link: Link,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter and page options for listing links.
///
/// `inbox` wins over `category_id` when both are set. With neither set every
/// link of the user is listed. `cursor` is the id of the last link of the
/// previous page; an unknown cursor is ignored.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub category_id: Option<String>,
    pub inbox: bool,
    pub sort: SortOrder,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn in_category(category_id: &str) -> Self {
        Self {
            category_id: Some(category_id.to_string()),
            ..Default::default()
        }
    }

    pub fn inbox() -> Self {
        Self {
            inbox: true,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, link: &Link) -> bool {
        match (self.inbox, &self.category_id) {
            (true, _) => link.is_inbox(),
            (false, Some(category_id)) => link.category_id.as_deref() == Some(category_id.as_str()),
            (false, None) => true,
        }
    }
}
