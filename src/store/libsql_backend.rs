//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::publish::model::{ContentKind, ContentRecord, ContentStatus, MediaAsset};
use crate::store::migrations;
use crate::store::traits::{Conversation, Database, MessageRole, NewMediaAsset, StoredMessage};
use crate::tenant::TenantIntegrationConfig;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn tenant_ids_where(
        &self,
        column: &str,
        value: &str,
        op: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT tenant_id FROM tenant_integrations WHERE {column} = ?1 ORDER BY tenant_id"),
                params![value],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn collect_messages(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            let msg = row_to_message(&row)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
            messages.push(msg);
        }
        Ok(messages)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed width so that text ordering is
/// chronological.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, tenant_id, address, display_name, created_at, last_activity";

/// 0:id, 1:tenant_id, 2:address, 3:display_name, 4:created_at, 5:last_activity
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(4)?;
    let last: String = row.get(5)?;
    Ok(Conversation {
        id: parse_uuid(&id),
        tenant_id: row.get(1)?,
        address: row.get(2)?,
        display_name: row.get::<Option<String>>(3)?,
        created_at: parse_datetime(&created),
        last_activity: parse_datetime(&last),
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, provider_message_id, created_at";

/// 0:id, 1:conversation_id, 2:role, 3:content, 4:provider_message_id, 5:created_at
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let created: String = row.get(5)?;
    Ok(StoredMessage {
        id: parse_uuid(&id),
        conversation_id: parse_uuid(&conversation_id),
        role: MessageRole::parse(&role),
        content: row.get(3)?,
        provider_message_id: row.get::<Option<String>>(4)?,
        created_at: parse_datetime(&created),
    })
}

/// Column list for a content table. The image column differs per kind but
/// always sits at index 6.
fn content_columns(kind: ContentKind) -> String {
    format!(
        "id, tenant_id, title, body, platform, status, {}, published_at, fields, created_at, updated_at",
        kind.image_column()
    )
}

fn row_to_content(kind: ContentKind, row: &libsql::Row) -> Result<ContentRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("content row parse: {e}"));

    let status_str: String = row.get(5).map_err(read)?;
    let status: ContentStatus = status_str.parse().map_err(DatabaseError::Serialization)?;
    let fields_str: String = row.get(8).map_err(read)?;
    let fields = serde_json::from_str(&fields_str)
        .map_err(|e| DatabaseError::Serialization(format!("content fields: {e}")))?;
    let published: Option<String> = row.get(7).map_err(read)?;
    let created: String = row.get(9).map_err(read)?;
    let updated: String = row.get(10).map_err(read)?;

    Ok(ContentRecord {
        id: row.get(0).map_err(read)?,
        kind,
        tenant_id: row.get(1).map_err(read)?,
        title: row.get::<Option<String>>(2).map_err(read)?,
        body: row.get::<Option<String>>(3).map_err(read)?,
        platform: row.get::<Option<String>>(4).map_err(read)?,
        status,
        image_url: row.get::<Option<String>>(6).map_err(read)?,
        published_at: parse_optional_datetime(&published),
        fields,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

const MEDIA_COLUMNS: &str =
    "id, tenant_id, url, media_type, reference_table, reference_id, created_at";

fn row_to_media(row: &libsql::Row) -> Result<MediaAsset, libsql::Error> {
    let created: String = row.get(6)?;
    Ok(MediaAsset {
        id: row.get(0)?,
        tenant_id: row.get::<Option<String>>(1)?,
        url: row.get(2)?,
        media_type: row.get(3)?,
        reference_table: row.get::<Option<String>>(4)?,
        reference_id: row.get::<Option<String>>(5)?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tenants ─────────────────────────────────────────────────────

    async fn save_tenant_config(
        &self,
        tenant_id: &str,
        config: &TenantIntegrationConfig,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(config)
            .map_err(|e| DatabaseError::Serialization(format!("tenant config: {e}")))?;
        let whatsapp = config.whatsapp.as_ref();

        self.conn()
            .execute(
                "INSERT INTO tenant_integrations
                    (tenant_id, config, whatsapp_phone_number_id, whatsapp_verify_token, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                    config = excluded.config,
                    whatsapp_phone_number_id = excluded.whatsapp_phone_number_id,
                    whatsapp_verify_token = excluded.whatsapp_verify_token,
                    updated_at = excluded.updated_at",
                params![
                    tenant_id,
                    json,
                    opt_text(whatsapp.map(|w| w.phone_number_id.as_str())),
                    opt_text(whatsapp.map(|w| w.verify_token.as_str())),
                    timestamp(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_tenant_config: {e}")))?;

        debug!(tenant_id, "Tenant integration config saved");
        Ok(())
    }

    async fn get_tenant_config(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantIntegrationConfig>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT config FROM tenant_integrations WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_tenant_config: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_tenant_config row parse: {e}")))?;
                let config = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(format!("tenant config: {e}")))?;
                Ok(Some(config))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_tenant_config: {e}"))),
        }
    }

    async fn find_tenants_by_verify_token(
        &self,
        token: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        self.tenant_ids_where("whatsapp_verify_token", token, "find_tenants_by_verify_token")
            .await
    }

    async fn find_tenants_by_channel_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        self.tenant_ids_where(
            "whatsapp_phone_number_id",
            phone_number_id,
            "find_tenants_by_channel_id",
        )
        .await
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn upsert_conversation(
        &self,
        tenant_id: &str,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<Conversation, DatabaseError> {
        let now = timestamp(Utc::now());
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO conversations (id, tenant_id, address, display_name, created_at, last_activity)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                     ON CONFLICT (tenant_id, address) DO UPDATE SET
                        last_activity = excluded.last_activity,
                        display_name = COALESCE(excluded.display_name, conversations.display_name)
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                params![
                    Uuid::new_v4().to_string(),
                    tenant_id,
                    address,
                    opt_text(display_name),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_conversation(&row)
                .map_err(|e| DatabaseError::Query(format!("upsert_conversation row parse: {e}"))),
            Ok(None) => Err(DatabaseError::Query(
                "upsert_conversation returned no row".into(),
            )),
            Err(e) => Err(DatabaseError::Query(format!("upsert_conversation: {e}"))),
        }
    }

    async fn get_conversation(
        &self,
        tenant_id: &str,
        address: &str,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE tenant_id = ?1 AND address = ?2"
                ),
                params![tenant_id, address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_conversation(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_conversation row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn count_conversations(&self, tenant_id: &str) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM conversations WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_conversations: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_conversations: {e}")))?;
                Ok(n as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_conversations: {e}"))),
        }
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        provider_message_id: Option<&str>,
    ) -> Result<Option<StoredMessage>, DatabaseError> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let created = timestamp(created_at);

        let inserted = conn
            .execute(
                "INSERT INTO messages (id, conversation_id, role, content, provider_message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (provider_message_id) DO NOTHING",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    role.as_str(),
                    content,
                    opt_text(provider_message_id),
                    created.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        if inserted == 0 {
            debug!(
                conversation_id = %conversation_id,
                provider_message_id = provider_message_id.unwrap_or_default(),
                "Duplicate message ignored"
            );
            return Ok(None);
        }

        conn.execute(
            "UPDATE conversations SET last_activity = ?2
             WHERE id = ?1 AND last_activity < ?2",
            params![conversation_id.to_string(), created],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_message touch: {e}")))?;

        Ok(Some(StoredMessage {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            provider_message_id: provider_message_id.map(String::from),
            created_at,
        }))
    }

    async fn reply_follows(&self, provider_message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT EXISTS (
                    SELECT 1 FROM messages AS inbound
                    JOIN messages AS reply ON reply.conversation_id = inbound.conversation_id
                    WHERE inbound.provider_message_id = ?1
                      AND reply.role = 'agent'
                      AND reply.rowid > inbound.rowid
                 )",
                params![provider_message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reply_follows: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let found: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("reply_follows: {e}")))?;
                Ok(found != 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("reply_follows: {e}"))),
        }
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.collect_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                    SELECT {MESSAGE_COLUMNS}, rowid AS seq FROM messages
                    WHERE conversation_id = ?1
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?2
                 ) ORDER BY created_at ASC, seq ASC"
            ),
            params![conversation_id.to_string(), limit as i64],
            "recent_messages",
        )
        .await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.collect_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ),
            params![conversation_id.to_string()],
            "list_messages",
        )
        .await
    }

    // ── Content ─────────────────────────────────────────────────────

    async fn insert_content(&self, record: &ContentRecord) -> Result<(), DatabaseError> {
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| DatabaseError::Serialization(format!("content fields: {e}")))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    record.kind.table(),
                    content_columns(record.kind)
                ),
                params![
                    record.id.clone(),
                    record.tenant_id.clone(),
                    opt_text(record.title.as_deref()),
                    opt_text(record.body.as_deref()),
                    opt_text(record.platform.as_deref()),
                    record.status.as_str(),
                    opt_text(record.image_url.as_deref()),
                    opt_text(record.published_at.map(timestamp).as_deref()),
                    fields,
                    timestamp(record.created_at),
                    timestamp(record.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_content: {e}")))?;

        debug!(table = record.kind.table(), id = %record.id, "Content inserted");
        Ok(())
    }

    async fn get_content(
        &self,
        kind: ContentKind,
        id: &str,
    ) -> Result<Option<ContentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE id = ?1",
                    content_columns(kind),
                    kind.table()
                ),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_content: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_content(kind, &row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_content: {e}"))),
        }
    }

    async fn transition_content_status(
        &self,
        kind: ContentKind,
        id: &str,
        from: &[ContentStatus],
        to: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        if from.is_empty() {
            return Ok(false);
        }
        // Status strings come from the enum, never from input.
        let allowed = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {} SET status = ?1, published_at = COALESCE(?2, published_at), updated_at = ?3
                     WHERE id = ?4 AND status IN ({allowed})",
                    kind.table()
                ),
                params![
                    to.as_str(),
                    opt_text(published_at.map(timestamp).as_deref()),
                    timestamp(Utc::now()),
                    id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("transition_content_status: {e}")))?;

        debug!(table = kind.table(), id, to = %to, changed = changed > 0, "Content status transition");
        Ok(changed > 0)
    }

    async fn set_content_status(
        &self,
        kind: ContentKind,
        id: &str,
        status: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {} SET status = ?1, published_at = COALESCE(?2, published_at), updated_at = ?3
                     WHERE id = ?4",
                    kind.table()
                ),
                params![
                    status.as_str(),
                    opt_text(published_at.map(timestamp).as_deref()),
                    timestamp(Utc::now()),
                    id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_content_status: {e}")))?;

        Ok(changed > 0)
    }

    async fn update_content(&self, record: &ContentRecord) -> Result<bool, DatabaseError> {
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| DatabaseError::Serialization(format!("content fields: {e}")))?;

        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {} SET title = ?1, body = ?2, platform = ?3, status = ?4, {} = ?5,
                        published_at = ?6, fields = ?7, updated_at = ?8
                     WHERE id = ?9",
                    record.kind.table(),
                    record.kind.image_column()
                ),
                params![
                    opt_text(record.title.as_deref()),
                    opt_text(record.body.as_deref()),
                    opt_text(record.platform.as_deref()),
                    record.status.as_str(),
                    opt_text(record.image_url.as_deref()),
                    opt_text(record.published_at.map(timestamp).as_deref()),
                    fields,
                    timestamp(Utc::now()),
                    record.id.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_content: {e}")))?;

        Ok(changed > 0)
    }

    // ── Media ───────────────────────────────────────────────────────

    async fn insert_media_asset(
        &self,
        asset: &NewMediaAsset,
    ) -> Result<MediaAsset, DatabaseError> {
        let stored = MediaAsset {
            id: Uuid::new_v4().to_string(),
            tenant_id: asset.tenant_id.clone(),
            url: asset.url.clone(),
            media_type: if asset.media_type.is_empty() {
                "image".to_string()
            } else {
                asset.media_type.clone()
            },
            reference_table: asset.reference_table.clone(),
            reference_id: asset.reference_id.clone(),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO media_assets ({MEDIA_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    stored.id.clone(),
                    opt_text(stored.tenant_id.as_deref()),
                    stored.url.clone(),
                    stored.media_type.clone(),
                    opt_text(stored.reference_table.as_deref()),
                    opt_text(stored.reference_id.as_deref()),
                    timestamp(stored.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_media_asset: {e}")))?;

        debug!(media_id = %stored.id, url = %stored.url, "Media asset inserted");
        Ok(stored)
    }

    async fn get_media_asset(&self, id: &str) -> Result<Option<MediaAsset>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MEDIA_COLUMNS} FROM media_assets WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_media_asset: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_media(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_media_asset row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_media_asset: {e}"))),
        }
    }
}
