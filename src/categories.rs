use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{eid::Eid, normalize::CategoryName};

/// Id of the pseudo-category that stands for uncategorized links.
pub const INBOX_ID: &str = "inbox";
pub const INBOX_NAME: &str = "Inbox";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub name_lower: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Cached feature vector, recomputed when `embedding_model` goes stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: CategoryName, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Eid::new().into(),
            name: name.name,
            name_lower: name.name_lower,
            description,
            embedding: None,
            embedding_model: None,
            embedding_updated_at: None,
            link_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Public shape of a category, as listed to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub count: i64,
}

impl CategorySummary {
    pub fn inbox(count: i64) -> Self {
        Self {
            id: INBOX_ID.to_string(),
            name: INBOX_NAME.to_string(),
            count,
        }
    }
}

impl From<&Category> for CategorySummary {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            name: category.name.clone(),
            count: category.link_count,
        }
    }
}

/// Per-user aggregate counters that are not attached to a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    #[serde(default)]
    pub inbox_count: i64,
}
