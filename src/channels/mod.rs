//! Outbound messaging channels.

pub mod whatsapp;

pub use whatsapp::{WebhookPayload, WhatsAppClient};

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::tenant::WhatsAppCredentials;

/// Receipt for a message the platform accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
    /// Platform-assigned id, when the response carried one.
    pub message_id: Option<String>,
}

/// Sends a plain-text reply on behalf of a tenant.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(
        &self,
        creds: &WhatsAppCredentials,
        to: &str,
        body: &str,
    ) -> Result<SentMessage, ChannelError>;
}
