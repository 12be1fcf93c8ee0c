//! Inbound message processor: webhook verification and delivery handling.
//!
//! A delivery is received, routed to a tenant, given context, answered and
//! sent. A skipped delivery records the [`Stage`] it stopped in; nothing
//! here ever surfaces an error to the platform.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::MessageSender;
use crate::channels::whatsapp::{self, WebhookPayload};
use crate::crm::CrmAdapter;
use crate::crm::vtiger::DEFAULT_CRM_TIMEOUT;
use crate::error::DatabaseError;
use crate::llm::{DEFAULT_GENERATION_TIMEOUT, LlmProvider};
use crate::pipeline::context::{ContextBuilder, CrmContext, DEFAULT_HISTORY_WINDOW};
use crate::store::{Database, MessageRole};
use crate::tenant::{TenantIntegrationConfig, WhatsAppCredentials};

/// Sent when generation fails or times out.
pub const FALLBACK_REPLY: &str =
    "Thanks for your message! A member of our team will get back to you shortly.";

/// Characters of each side of the exchange copied into the CRM note.
const NOTE_EXCERPT_CHARS: usize = 200;

/// Stage a skipped delivery stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receiving,
    Routing,
    Contextualizing,
}

/// Why a delivery ended without a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MalformedPayload,
    /// Receipts and other events without a customer message.
    NoMessage,
    UnsupportedType(String),
    MissingChannelId,
    UnknownChannel(String),
    AmbiguousChannel(String),
    MessagingNotConfigured,
    InvalidSignature,
    /// The platform redelivered a message that is answered or in progress.
    Duplicate,
    Storage,
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Replied {
        tenant_id: String,
        conversation_id: Uuid,
        reply: String,
        used_fallback: bool,
        sent: bool,
    },
    Skipped {
        stage: Stage,
        reason: SkipReason,
    },
}

impl Outcome {
    fn skipped(stage: Stage, reason: SkipReason) -> Self {
        Outcome::Skipped { stage, reason }
    }
}

/// Result of a verification handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Echo the challenge with 200.
    Accepted { tenant_id: String, challenge: String },
    /// Missing parameters or wrong mode (400).
    BadRequest(&'static str),
    /// No tenant, or more than one, owns the token (403).
    Forbidden,
}

/// Tunables for delivery handling.
#[derive(Debug, Clone)]
pub struct InboundSettings {
    pub crm_timeout: Duration,
    pub generation_timeout: Duration,
    pub history_window: usize,
}

impl Default for InboundSettings {
    fn default() -> Self {
        Self {
            crm_timeout: DEFAULT_CRM_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// A routed text message with the tenant that owns it.
struct Routed {
    tenant_id: String,
    config: TenantIntegrationConfig,
    whatsapp: WhatsAppCredentials,
    from: String,
    sender_name: Option<String>,
    provider_message_id: String,
    text: String,
}

pub struct InboundProcessor {
    db: Arc<dyn Database>,
    crm: Arc<dyn CrmAdapter>,
    llm: Arc<dyn LlmProvider>,
    sender: Arc<dyn MessageSender>,
    context: ContextBuilder,
    settings: InboundSettings,
    /// Provider message ids currently being answered by this process.
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a claimed provider message id when dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl InboundProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        crm: Arc<dyn CrmAdapter>,
        llm: Arc<dyn LlmProvider>,
        sender: Arc<dyn MessageSender>,
        settings: InboundSettings,
    ) -> Self {
        let context = ContextBuilder::new(db.clone(), crm.clone(), settings.crm_timeout)
            .with_history_window(settings.history_window);
        Self {
            db,
            crm,
            llm,
            sender,
            context,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `id` for this process, or `None` if another task holds it.
    fn claim(&self, id: &str) -> Option<Claim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(id.to_string()).then(|| Claim {
            in_flight: &self.in_flight,
            id: id.to_string(),
        })
    }

    /// Subscription handshake. The token must belong to exactly one tenant.
    pub async fn verify(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Result<Verification, DatabaseError> {
        let (Some(mode), Some(token), Some(challenge)) = (mode, token, challenge) else {
            return Ok(Verification::BadRequest("missing hub.mode, hub.verify_token or hub.challenge"));
        };
        if mode != "subscribe" {
            return Ok(Verification::BadRequest("hub.mode must be subscribe"));
        }
        if token.is_empty() {
            return Ok(Verification::Forbidden);
        }

        let mut tenants = self.db.find_tenants_by_verify_token(token).await?;
        match tenants.len() {
            1 => {
                let tenant_id = tenants.remove(0);
                info!(tenant_id = %tenant_id, "Webhook verified");
                Ok(Verification::Accepted {
                    tenant_id,
                    challenge: challenge.to_string(),
                })
            }
            0 => {
                warn!("Webhook verification with unknown token");
                Ok(Verification::Forbidden)
            }
            n => {
                warn!(matches = n, "Webhook verification token is shared by several tenants");
                Ok(Verification::Forbidden)
            }
        }
    }

    /// Handle one delivery. Always completes; the caller acks with 200.
    pub async fn process_delivery(&self, body: &[u8], signature: Option<&str>) -> Outcome {
        let routed = match self.route(body, signature).await {
            Ok(routed) => routed,
            Err(outcome) => {
                if let Outcome::Skipped { stage, reason } = &outcome {
                    debug!(?stage, ?reason, "Delivery skipped");
                }
                return outcome;
            }
        };

        match self.respond(routed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Delivery aborted on storage failure");
                Outcome::skipped(Stage::Contextualizing, SkipReason::Storage)
            }
        }
    }

    /// Receiving and Routing: parse, filter, and resolve the tenant.
    async fn route(&self, body: &[u8], signature: Option<&str>) -> Result<Routed, Outcome> {
        let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "Unparseable webhook delivery");
            Outcome::skipped(Stage::Receiving, SkipReason::MalformedPayload)
        })?;

        let value = payload
            .first_change()
            .ok_or_else(|| Outcome::skipped(Stage::Receiving, SkipReason::NoMessage))?;
        let message = value
            .first_message()
            .ok_or_else(|| Outcome::skipped(Stage::Receiving, SkipReason::NoMessage))?;
        let Some(text) = message.text_body() else {
            info!(kind = %message.kind, "Ignoring non-text message");
            return Err(Outcome::skipped(
                Stage::Receiving,
                SkipReason::UnsupportedType(message.kind.clone()),
            ));
        };

        let phone_number_id = value
            .phone_number_id()
            .ok_or_else(|| Outcome::skipped(Stage::Routing, SkipReason::MissingChannelId))?;

        let storage = |e: DatabaseError| {
            error!(error = %e, "Tenant lookup failed");
            Outcome::skipped(Stage::Routing, SkipReason::Storage)
        };

        let mut tenants = self
            .db
            .find_tenants_by_channel_id(phone_number_id)
            .await
            .map_err(storage)?;
        let tenant_id = match tenants.len() {
            1 => tenants.remove(0),
            0 => {
                warn!(phone_number_id, "No tenant owns this phone number id");
                return Err(Outcome::skipped(
                    Stage::Routing,
                    SkipReason::UnknownChannel(phone_number_id.to_string()),
                ));
            }
            n => {
                error!(phone_number_id, matches = n, "Phone number id configured on several tenants");
                return Err(Outcome::skipped(
                    Stage::Routing,
                    SkipReason::AmbiguousChannel(phone_number_id.to_string()),
                ));
            }
        };

        let config = self
            .db
            .get_tenant_config(&tenant_id)
            .await
            .map_err(storage)?
            .unwrap_or_default();
        let Some(whatsapp_creds) = config.whatsapp.clone() else {
            warn!(tenant_id = %tenant_id, "Tenant has no messaging credentials");
            return Err(Outcome::skipped(
                Stage::Routing,
                SkipReason::MessagingNotConfigured,
            ));
        };

        if let Some(secret) = whatsapp_creds.app_secret.as_deref().filter(|s| !s.is_empty())
            && !whatsapp::verify_signature(secret, signature, body)
        {
            warn!(tenant_id = %tenant_id, "Webhook signature mismatch, dropping delivery");
            return Err(Outcome::skipped(Stage::Routing, SkipReason::InvalidSignature));
        }

        Ok(Routed {
            tenant_id,
            config,
            whatsapp: whatsapp_creds,
            from: message.from.clone(),
            sender_name: value.sender_name().map(String::from),
            provider_message_id: message.id.clone(),
            text: text.to_string(),
        })
    }

    /// Context, generation, persistence and send.
    async fn respond(&self, msg: Routed) -> Result<Outcome, DatabaseError> {
        let tenant_id = msg.tenant_id.as_str();
        let Some(_claim) = self.claim(&msg.provider_message_id) else {
            info!(
                tenant_id,
                provider_message_id = %msg.provider_message_id,
                "Redelivered message is already being answered"
            );
            return Ok(Outcome::skipped(Stage::Contextualizing, SkipReason::Duplicate));
        };
        info!(tenant_id, from = %msg.from, "Processing inbound message");

        let crm = self
            .context
            .lookup_contact(tenant_id, &msg.config, &msg.from)
            .await;

        let conversation = self
            .db
            .upsert_conversation(tenant_id, &msg.from, msg.sender_name.as_deref())
            .await?;
        let mut history = self.context.load_history(conversation.id).await?;

        let inserted = self
            .db
            .insert_message(
                conversation.id,
                MessageRole::Customer,
                &msg.text,
                Some(&msg.provider_message_id),
            )
            .await?;
        if inserted.is_none() {
            if self.db.reply_follows(&msg.provider_message_id).await? {
                info!(
                    tenant_id,
                    provider_message_id = %msg.provider_message_id,
                    "Redelivered message, reply already handled"
                );
                return Ok(Outcome::skipped(Stage::Contextualizing, SkipReason::Duplicate));
            }
            // Stored by an earlier attempt that never replied. The text is
            // appended again as the final turn.
            warn!(
                tenant_id,
                provider_message_id = %msg.provider_message_id,
                "Redelivered message was never answered, replying now"
            );
            history.retain(|m| m.provider_message_id.as_deref() != Some(msg.provider_message_id.as_str()));
        }

        let context = self.context.build(
            msg.whatsapp.system_prompt.as_deref(),
            &crm,
            &history,
            &msg.text,
        );

        let (reply, used_fallback) = self.generate(tenant_id, context.into_request()).await;

        if let Err(e) = self
            .db
            .insert_message(conversation.id, MessageRole::Agent, &reply, None)
            .await
        {
            error!(tenant_id, error = %e, "Failed to persist reply");
        }

        self.write_crm_note(tenant_id, &msg, &crm, &reply).await;

        let sent = match self.sender.send_text(&msg.whatsapp, &msg.from, &reply).await {
            Ok(receipt) => {
                info!(
                    tenant_id,
                    to = %msg.from,
                    message_id = receipt.message_id.as_deref().unwrap_or_default(),
                    used_fallback,
                    "Reply sent"
                );
                true
            }
            Err(e) => {
                error!(tenant_id, to = %msg.from, error = %e, "Failed to send reply");
                false
            }
        };

        Ok(Outcome::Replied {
            tenant_id: msg.tenant_id.clone(),
            conversation_id: conversation.id,
            reply,
            used_fallback,
            sent,
        })
    }

    /// Generated reply, or the fallback on any failure.
    async fn generate(
        &self,
        tenant_id: &str,
        request: crate::llm::CompletionRequest,
    ) -> (String, bool) {
        match tokio::time::timeout(self.settings.generation_timeout, self.llm.complete(request))
            .await
        {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                debug!(
                    tenant_id,
                    model = self.llm.model_name(),
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Reply generated"
                );
                (response.content.trim().to_string(), false)
            }
            Ok(Ok(_)) => {
                warn!(tenant_id, "Generator returned an empty reply, using fallback");
                (FALLBACK_REPLY.to_string(), true)
            }
            Ok(Err(e)) => {
                warn!(tenant_id, error = %e, "Generation failed, using fallback");
                (FALLBACK_REPLY.to_string(), true)
            }
            Err(_) => {
                warn!(
                    tenant_id,
                    timeout_secs = self.settings.generation_timeout.as_secs(),
                    "Generation timed out, using fallback"
                );
                (FALLBACK_REPLY.to_string(), true)
            }
        }
    }

    async fn write_crm_note(&self, tenant_id: &str, msg: &Routed, crm: &CrmContext, reply: &str) {
        let (Some(record_id), Some(creds)) = (crm.record_id(), msg.config.crm()) else {
            return;
        };
        let note = format!(
            "WhatsApp conversation\nCustomer: {}\nReply: {}",
            excerpt(&msg.text),
            excerpt(reply)
        );

        match tokio::time::timeout(
            self.settings.crm_timeout,
            self.crm.add_note(creds, record_id, &note),
        )
        .await
        {
            Ok(Ok(_)) => debug!(tenant_id, record_id, "CRM note added"),
            Ok(Err(e)) => warn!(tenant_id, record_id, error = %e, "Failed to add CRM note"),
            Err(_) => warn!(tenant_id, record_id, "CRM note timed out"),
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(NOTE_EXCERPT_CHARS).collect()
}
