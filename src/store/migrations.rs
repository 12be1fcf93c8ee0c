//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "messaging",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tenant_integrations (
                tenant_id TEXT PRIMARY KEY,
                config TEXT NOT NULL DEFAULT '{}',
                whatsapp_phone_number_id TEXT,
                whatsapp_verify_token TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tenant_integrations_phone_number_id
                ON tenant_integrations(whatsapp_phone_number_id);
            CREATE INDEX IF NOT EXISTS idx_tenant_integrations_verify_token
                ON tenant_integrations(whatsapp_verify_token);

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                address TEXT NOT NULL,
                display_name TEXT,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                UNIQUE (tenant_id, address)
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_last_activity
                ON conversations(last_activity);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                provider_message_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_provider_message_id
                ON messages(provider_message_id);
        "#,
    },
    Migration {
        version: 2,
        name: "content_publishing",
        sql: r#"
            CREATE TABLE IF NOT EXISTS social_posts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT,
                body TEXT,
                platform TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                image_url TEXT,
                published_at TEXT,
                fields TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_social_posts_tenant ON social_posts(tenant_id);

            CREATE TABLE IF NOT EXISTS blog_posts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT,
                body TEXT,
                platform TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                featured_image_url TEXT,
                published_at TEXT,
                fields TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_tenant ON blog_posts(tenant_id);

            CREATE TABLE IF NOT EXISTS email_campaigns (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT,
                body TEXT,
                platform TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                header_image_url TEXT,
                published_at TEXT,
                fields TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_email_campaigns_tenant ON email_campaigns(tenant_id);

            CREATE TABLE IF NOT EXISTS media_assets (
                id TEXT PRIMARY KEY,
                tenant_id TEXT,
                url TEXT NOT NULL,
                media_type TEXT NOT NULL DEFAULT 'image',
                reference_table TEXT,
                reference_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_assets_reference
                ON media_assets(reference_table, reference_id);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
