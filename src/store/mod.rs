//! Persistence layer: libSQL-backed storage for tenants, conversations and content.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Conversation, Database, MessageRole, NewMediaAsset, StoredMessage};
