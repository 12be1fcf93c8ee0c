//! opsbridge: customer messaging, CRM sync and content publishing for
//! agency tenants.

pub mod channels;
pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod server;
pub mod store;
pub mod tenant;
