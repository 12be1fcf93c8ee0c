//! WhatsApp Cloud API: webhook payloads, signature check, and text send.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use crate::channels::{MessageSender, SentMessage};
use crate::error::ChannelError;
use crate::tenant::WhatsAppCredentials;

const CHANNEL: &str = "whatsapp";

/// Graph API base including version.
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com/v21.0";

/// Header carrying the HMAC-SHA256 of the raw delivery body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

// ── Inbound payloads ────────────────────────────────────────────────

/// Top-level webhook delivery body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    /// Delivery/read receipts. Present on status-only payloads.
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Metadata {
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: Option<String>,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBody {
    pub body: String,
}

impl WebhookPayload {
    /// The first change of the first entry. Deliveries carry one event.
    pub fn first_change(&self) -> Option<&ChangeValue> {
        self.entry
            .first()
            .and_then(|e| e.changes.first())
            .map(|c| &c.value)
    }
}

impl ChangeValue {
    pub fn phone_number_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .map(|m| m.phone_number_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn first_message(&self) -> Option<&InboundMessage> {
        self.messages.first()
    }

    /// Profile name of the first contact, if the platform sent one.
    pub fn sender_name(&self) -> Option<&str> {
        self.contacts
            .first()
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

impl InboundMessage {
    /// Body of a `text` message; `None` for every other type.
    pub fn text_body(&self) -> Option<&str> {
        if self.kind != "text" {
            return None;
        }
        self.text.as_ref().map(|t| t.body.as_str())
    }
}

// ── Signature ───────────────────────────────────────────────────────

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) against `body`.
pub fn verify_signature(app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Produce the header value the platform would send for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Outbound ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SendResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct SendResponseMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Sends text messages through the Graph API using per-tenant credentials.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    graph_base: String,
}

impl WhatsAppClient {
    pub fn new(timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL.into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            graph_base: DEFAULT_GRAPH_BASE.to_string(),
        })
    }

    pub fn with_graph_base(mut self, base: impl Into<String>) -> Self {
        self.graph_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: CHANNEL.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send_text(
        &self,
        creds: &WhatsAppCredentials,
        to: &str,
        body: &str,
    ) -> Result<SentMessage, ChannelError> {
        if body.trim().is_empty() {
            return Err(ChannelError::InvalidMessage("empty message body".into()));
        }

        let url = format!("{}/{}/messages", self.graph_base, creds.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&creds.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::send_failed(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        debug!(status = %status, phone_number_id = %creds.phone_number_id, "send response received");

        if !status.is_success() {
            let reason = match serde_json::from_str::<GraphErrorResponse>(&raw) {
                Ok(e) => match e.error.code {
                    Some(code) => format!("{} (code {code})", e.error.message),
                    None => e.error.message,
                },
                Err(_) => format!("API returned {status}: {raw}"),
            };
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ChannelError::AuthFailed {
                    name: CHANNEL.into(),
                    reason,
                });
            }
            return Err(Self::send_failed(reason));
        }

        let message_id = serde_json::from_str::<SendResponse>(&raw)
            .ok()
            .and_then(|r| r.messages.into_iter().next())
            .map(|m| m.id);
        Ok(SentMessage { message_id })
    }
}
