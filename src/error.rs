//! Error types for opsbridge.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No integration config for tenant {0}")]
    TenantNotConfigured(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// CRM protocol adapter errors.
///
/// `Remote` carries the CRM's own error message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM is not configured for this tenant")]
    NotConfigured,

    #[error("CRM request failed during {operation}: {reason}")]
    Http { operation: String, reason: String },

    #[error("CRM {operation} failed: {message}")]
    Remote { operation: String, message: String },

    #[error("Invalid CRM response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Invalid CRM request: {0}")]
    Validation(String),
}

/// Messaging channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },
}

/// Generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Publish dispatcher errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    #[error("Content record {id} not found")]
    NotFound { id: String },

    #[error("Cannot publish record {id} in status {status}; must be approved or scheduled")]
    InvalidStatus { id: String, status: String },

    #[error("Automation client error: {0}")]
    Client(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Automation callback errors.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Invalid callback secret")]
    Unauthorized,

    #[error("Table {0} is not allowed")]
    TableNotAllowed(String),

    #[error("Unknown callback action: {0}")]
    UnknownAction(String),

    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),

    #[error("Record {id} not found in {table}")]
    NotFound { table: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
