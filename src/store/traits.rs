//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::publish::model::{ContentKind, ContentRecord, ContentStatus, MediaAsset};
use crate::tenant::TenantIntegrationConfig;

/// Thread between a tenant and one external address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: String,
    pub address: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Customer,
    Agent,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Customer => "customer",
            MessageRole::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "agent" => MessageRole::Agent,
            _ => MessageRole::Customer,
        }
    }
}

/// A persisted transcript entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Platform message id for inbound messages.
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new media asset.
#[derive(Debug, Clone, Default)]
pub struct NewMediaAsset {
    pub tenant_id: Option<String>,
    pub url: String,
    pub media_type: String,
    pub reference_table: Option<String>,
    pub reference_id: Option<String>,
}

/// Backend-agnostic database trait covering tenants, conversations and content.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Tenants ─────────────────────────────────────────────────────

    /// Insert or replace a tenant's integration config.
    ///
    /// Also refreshes the indexed lookup columns (channel id, verify token).
    async fn save_tenant_config(
        &self,
        tenant_id: &str,
        config: &TenantIntegrationConfig,
    ) -> Result<(), DatabaseError>;

    async fn get_tenant_config(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantIntegrationConfig>, DatabaseError>;

    /// Tenant ids whose stored verify token equals `token`.
    async fn find_tenants_by_verify_token(&self, token: &str)
    -> Result<Vec<String>, DatabaseError>;

    /// Tenant ids whose messaging channel id equals `phone_number_id`.
    async fn find_tenants_by_channel_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Vec<String>, DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Atomic upsert on (tenant, address). Touches `last_activity` and
    /// keeps the existing display name when `display_name` is `None`.
    async fn upsert_conversation(
        &self,
        tenant_id: &str,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<Conversation, DatabaseError>;

    async fn get_conversation(
        &self,
        tenant_id: &str,
        address: &str,
    ) -> Result<Option<Conversation>, DatabaseError>;

    async fn count_conversations(&self, tenant_id: &str) -> Result<usize, DatabaseError>;

    /// Append a message and touch the conversation's `last_activity`.
    ///
    /// Returns `None` when `provider_message_id` was already stored
    /// (a redelivered inbound message).
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        provider_message_id: Option<&str>,
    ) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Whether an agent message was stored after the inbound message
    /// carrying `provider_message_id`.
    async fn reply_follows(&self, provider_message_id: &str) -> Result<bool, DatabaseError>;

    /// Most recent `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Full transcript, oldest first.
    async fn list_messages(&self, conversation_id: Uuid)
    -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── Content ─────────────────────────────────────────────────────

    async fn insert_content(&self, record: &ContentRecord) -> Result<(), DatabaseError>;

    async fn get_content(
        &self,
        kind: ContentKind,
        id: &str,
    ) -> Result<Option<ContentRecord>, DatabaseError>;

    /// Set `to` only if the current status is one of `from`.
    ///
    /// Returns whether the row changed. `published_at` is written when given.
    async fn transition_content_status(
        &self,
        kind: ContentKind,
        id: &str,
        from: &[ContentStatus],
        to: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError>;

    /// Unconditionally set the status. Returns whether the row exists.
    async fn set_content_status(
        &self,
        kind: ContentKind,
        id: &str,
        status: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError>;

    /// Replace a record's mutable fields with those of `record`.
    async fn update_content(&self, record: &ContentRecord) -> Result<bool, DatabaseError>;

    // ── Media ───────────────────────────────────────────────────────

    async fn insert_media_asset(&self, asset: &NewMediaAsset) -> Result<MediaAsset, DatabaseError>;

    async fn get_media_asset(&self, id: &str) -> Result<Option<MediaAsset>, DatabaseError>;
}
