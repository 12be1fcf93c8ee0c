//! Conversation context: CRM lookup plus stored history, rendered into a
//! system prompt and an ordered transcript for the generator.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::crm::{CrmAdapter, CrmContact};
use crate::error::DatabaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::store::{Database, MessageRole, StoredMessage};
use crate::tenant::TenantIntegrationConfig;

/// Persona used when the tenant hasn't written one.
pub const DEFAULT_PERSONA: &str = "You are a friendly, professional assistant replying to customers \
on WhatsApp on behalf of the business. Keep replies short, warm and helpful. If you don't know \
something, say a team member will follow up.";

/// Number of prior messages fed to the generator.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Upper bound on the reply length requested from the generator.
const REPLY_MAX_TOKENS: u32 = 512;

/// What the CRM knows about the sender.
#[derive(Debug, Clone, PartialEq)]
pub enum CrmContext {
    /// The tenant has no CRM configured.
    NotConfigured,
    /// The lookup failed or timed out; proceed as if nothing is known.
    Unavailable,
    /// Configured, searched, no match.
    NotFound,
    /// A Lead or Contact matched.
    Found(CrmContact),
}

impl CrmContext {
    pub fn contact(&self) -> Option<&CrmContact> {
        match self {
            CrmContext::Found(contact) => Some(contact),
            _ => None,
        }
    }

    /// CRM record id to attach notes to.
    pub fn record_id(&self) -> Option<&str> {
        self.contact()
            .and_then(CrmContact::details)
            .map(|d| d.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub system_prompt: String,
    /// Prior messages plus the new inbound one, oldest first.
    pub transcript: Vec<ChatMessage>,
}

impl ConversationContext {
    pub fn into_request(self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt));
        messages.extend(self.transcript);
        CompletionRequest::new(messages).with_max_tokens(REPLY_MAX_TOKENS)
    }
}

/// Composes CRM lookups and stored history into generation context.
pub struct ContextBuilder {
    db: Arc<dyn Database>,
    crm: Arc<dyn CrmAdapter>,
    crm_timeout: Duration,
    history_window: usize,
}

impl ContextBuilder {
    pub fn new(db: Arc<dyn Database>, crm: Arc<dyn CrmAdapter>, crm_timeout: Duration) -> Self {
        Self {
            db,
            crm,
            crm_timeout,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Best-effort phone lookup. Never fails: errors and timeouts are
    /// logged and reported as `Unavailable`.
    pub async fn lookup_contact(
        &self,
        tenant_id: &str,
        config: &TenantIntegrationConfig,
        phone: &str,
    ) -> CrmContext {
        let Some(creds) = config.crm() else {
            return CrmContext::NotConfigured;
        };

        match tokio::time::timeout(self.crm_timeout, self.crm.search_by_phone(creds, phone)).await
        {
            Ok(Ok(CrmContact::NotFound)) => {
                debug!(tenant_id, "No CRM match for sender");
                CrmContext::NotFound
            }
            Ok(Ok(contact)) => {
                debug!(
                    tenant_id,
                    module = ?contact.module(),
                    "CRM contact matched"
                );
                CrmContext::Found(contact)
            }
            Ok(Err(e)) => {
                warn!(tenant_id, error = %e, "CRM lookup failed, continuing without context");
                CrmContext::Unavailable
            }
            Err(_) => {
                warn!(
                    tenant_id,
                    timeout_secs = self.crm_timeout.as_secs(),
                    "CRM lookup timed out, continuing without context"
                );
                CrmContext::Unavailable
            }
        }
    }

    /// The most recent messages of a conversation, oldest first.
    pub async fn load_history(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.db
            .recent_messages(conversation_id, self.history_window)
            .await
    }

    /// Assemble the prompt and transcript for a reply to `inbound`.
    pub fn build(
        &self,
        persona: Option<&str>,
        crm: &CrmContext,
        history: &[StoredMessage],
        inbound: &str,
    ) -> ConversationContext {
        let mut transcript: Vec<ChatMessage> = history.iter().map(to_chat_message).collect();
        transcript.push(ChatMessage::user(inbound));
        ConversationContext {
            system_prompt: build_system_prompt(persona, crm),
            transcript,
        }
    }
}

fn to_chat_message(msg: &StoredMessage) -> ChatMessage {
    match msg.role {
        MessageRole::Customer => ChatMessage::user(msg.content.clone()),
        MessageRole::Agent => ChatMessage::assistant(msg.content.clone()),
    }
}

/// Tenant persona followed by whatever the CRM contributes.
pub fn build_system_prompt(persona: Option<&str>, crm: &CrmContext) -> String {
    let persona = persona
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PERSONA);

    let mut prompt = persona.to_string();
    match crm {
        CrmContext::NotConfigured | CrmContext::Unavailable => {}
        CrmContext::NotFound => {
            prompt.push_str(
                "\n\n## Customer record\n\
                 This customer is not yet in the CRM. Treat them as a new enquiry.",
            );
        }
        CrmContext::Found(contact) => {
            if let Some(details) = contact.details() {
                let kind = match contact {
                    CrmContact::Lead(_) => "Lead",
                    _ => "Contact",
                };
                prompt.push_str("\n\n## Customer record\n");
                prompt.push_str(&format!("Name: {}\n", details.display_name()));
                prompt.push_str(&format!("Type: {kind}\n"));
                prompt.push_str(&format!("Status: {}\n", details.status));
                if !details.record_number.is_empty() {
                    prompt.push_str(&format!("Record number: {}\n", details.record_number));
                }
                if let Some(company) = details.company.as_deref().filter(|c| !c.is_empty()) {
                    prompt.push_str(&format!("Company: {company}\n"));
                }
                if let Some(notes) = details.description.as_deref().filter(|n| !n.trim().is_empty())
                {
                    prompt.push_str(&format!("Notes: {}\n", notes.trim()));
                }
                prompt.push_str("Address the customer by name where natural.");
            }
        }
    }
    prompt
}
