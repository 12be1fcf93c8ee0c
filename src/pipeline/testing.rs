//! In-process stand-ins for the CRM, generator and sender.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::channels::{MessageSender, SentMessage};
use crate::crm::{CrmAdapter, CrmContact, CrmRecord, CreatedRecord, NewLead};
use crate::error::{ChannelError, CrmError, LlmError};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::tenant::{CrmCredentials, WhatsAppCredentials};

pub struct StubCrm {
    search: Result<CrmContact, String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    notes: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubCrm {
    fn with_result(search: Result<CrmContact, String>) -> Self {
        Self {
            search,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            notes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn found(contact: CrmContact) -> Self {
        Self::with_result(Ok(contact))
    }

    pub fn not_found() -> Self {
        Self::with_result(Ok(CrmContact::NotFound))
    }

    pub fn failing() -> Self {
        Self::with_result(Err("INVALID_AUTH_TOKEN".into()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of searches performed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// (record id, text) of every note written.
    pub fn notes(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.notes.clone()
    }
}

#[async_trait]
impl CrmAdapter for StubCrm {
    async fn search_by_phone(
        &self,
        _creds: &CrmCredentials,
        _phone: &str,
    ) -> Result<CrmContact, CrmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.search.clone().map_err(|message| CrmError::Remote {
            operation: "query".into(),
            message,
        })
    }

    async fn search_by_email(
        &self,
        creds: &CrmCredentials,
        email: &str,
    ) -> Result<CrmContact, CrmError> {
        self.search_by_phone(creds, email).await
    }

    async fn create_lead(
        &self,
        _creds: &CrmCredentials,
        _lead: &NewLead,
    ) -> Result<CreatedRecord, CrmError> {
        Ok(CreatedRecord {
            id: "10x1".into(),
            record_number: Some("LEA1".into()),
        })
    }

    async fn retrieve(&self, _creds: &CrmCredentials, id: &str) -> Result<CrmRecord, CrmError> {
        let mut record = CrmRecord::new();
        record.insert("id".into(), id.into());
        Ok(record)
    }

    async fn update_record(
        &self,
        creds: &CrmCredentials,
        id: &str,
        updates: &CrmRecord,
    ) -> Result<CrmRecord, CrmError> {
        let mut record = self.retrieve(creds, id).await?;
        record.extend(updates.clone());
        Ok(record)
    }

    async fn add_note(
        &self,
        _creds: &CrmCredentials,
        record_id: &str,
        text: &str,
    ) -> Result<CreatedRecord, CrmError> {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push((record_id.to_string(), text.to_string()));
        }
        Ok(CreatedRecord {
            id: "17x1".into(),
            record_number: None,
        })
    }

    async fn test_connection(&self, _creds: &CrmCredentials) -> Result<(), CrmError> {
        self.search.clone().map(|_| ()).map_err(|message| CrmError::Remote {
            operation: "login".into(),
            message,
        })
    }
}

pub struct StubLlm {
    reply: Result<String, String>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl StubLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err("overloaded".into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        match &self.reply {
            Ok(content) => Ok(CompletionResponse {
                content: content.clone(),
                input_tokens: 10,
                output_tokens: 5,
                stop_reason: Some("end_turn".into()),
            }),
            Err(reason) => Err(LlmError::RequestFailed {
                provider: "stub".into(),
                reason: reason.clone(),
            }),
        }
    }
}

#[derive(Default)]
pub struct StubSender {
    fail: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubSender {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// (recipient, body) of every send attempt.
    pub fn sent(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl MessageSender for StubSender {
    async fn send_text(
        &self,
        _creds: &WhatsAppCredentials,
        to: &str,
        body: &str,
    ) -> Result<SentMessage, ChannelError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), body.to_string()));
        }
        if self.fail {
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: "stub failure".into(),
            });
        }
        Ok(SentMessage {
            message_id: Some("wamid.OUT".into()),
        })
    }
}
