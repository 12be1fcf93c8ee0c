//! Content records and their status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of publishable content. Each kind lives in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Social,
    Blog,
    Email,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Social, ContentKind::Blog, ContentKind::Email];

    /// Parse the `{type}` segment of `/publish/{type}`.
    pub fn from_route(segment: &str) -> Option<Self> {
        match segment {
            "social" | "social_post" | "social-post" => Some(ContentKind::Social),
            "blog" | "blog_post" | "blog-post" => Some(ContentKind::Blog),
            "email" | "email_campaign" | "email-campaign" => Some(ContentKind::Email),
            _ => None,
        }
    }

    /// Resolve an allow-listed table name. Anything else is rejected.
    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table() == table)
    }

    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Social => "social_posts",
            ContentKind::Blog => "blog_posts",
            ContentKind::Email => "email_campaigns",
        }
    }

    /// Denormalized image url column on this kind's table.
    pub fn image_column(&self) -> &'static str {
        match self {
            ContentKind::Social => "image_url",
            ContentKind::Blog => "featured_image_url",
            ContentKind::Email => "header_image_url",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Social => "social",
            ContentKind::Blog => "blog",
            ContentKind::Email => "email",
        }
    }
}

/// Content status. Only `Approved` and `Scheduled` may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    PendingReview,
    Approved,
    Scheduled,
    Publishing,
    Published,
    Failed,
    Archived,
}

impl ContentStatus {
    pub const DISPATCHABLE: [ContentStatus; 2] = [ContentStatus::Approved, ContentStatus::Scheduled];

    pub fn is_dispatchable(&self) -> bool {
        Self::DISPATCHABLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::PendingReview => "pending_review",
            ContentStatus::Approved => "approved",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Publishing => "publishing",
            ContentStatus::Published => "published",
            ContentStatus::Failed => "failed",
            ContentStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "pending_review" => Ok(ContentStatus::PendingReview),
            "approved" => Ok(ContentStatus::Approved),
            "scheduled" => Ok(ContentStatus::Scheduled),
            "publishing" => Ok(ContentStatus::Publishing),
            "published" => Ok(ContentStatus::Published),
            "failed" => Ok(ContentStatus::Failed),
            "archived" => Ok(ContentStatus::Archived),
            other => Err(format!("unknown content status: {other}")),
        }
    }
}

/// A social post, blog post, or email campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub kind: ContentKind,
    pub tenant_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub platform: Option<String>,
    pub status: ContentStatus,
    /// Value of the kind's image column.
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Attributes written by automation that have no dedicated column.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(kind: ContentKind, tenant_id: impl Into<String>, status: ContentStatus) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            tenant_id: tenant_id.into(),
            title: None,
            body: None,
            platform: None,
            status,
            image_url: None,
            published_at: None,
            fields: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Serialize with the image url under the table's own column name,
    /// which is the shape the automation system expects.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let serde_json::Value::Object(ref mut map) = value {
            if let Some(url) = map.remove("image_url") {
                map.insert(self.kind.image_column().to_string(), url);
            }
            map.insert("table".into(), self.kind.table().into());
        }
        value
    }
}

/// Media asset created by automation callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub tenant_id: Option<String>,
    pub url: String,
    pub media_type: String,
    pub reference_table: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
