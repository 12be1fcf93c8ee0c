//! Publish dispatcher: hands approved content to the automation system.
//!
//! `approved | scheduled → publishing` is written before the hand-off task
//! is spawned; the automation system reports back through the callback.
//! Without an automation endpoint the record goes straight to `published`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::PublishError;
use crate::publish::model::{ContentKind, ContentRecord, ContentStatus};
use crate::store::Database;

/// Bound on the detached automation POST.
pub const DEFAULT_AUTOMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Dashboard request to publish one record.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub kind: ContentKind,
    pub post_id: String,
    pub tenant_id: String,
    /// Overrides the record's own platform in the hand-off.
    pub platform: Option<String>,
}

/// How the record left the dispatchable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Automation,
    Manual,
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub post_id: String,
    pub status: ContentStatus,
    pub mode: DispatchMode,
    /// The detached automation call. Dropping it does not cancel the task.
    pub handoff: Option<JoinHandle<()>>,
}

pub struct PublishDispatcher {
    db: Arc<dyn Database>,
    client: reqwest::Client,
    global_webhook_url: Option<String>,
    callback_url: String,
}

impl PublishDispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        global_webhook_url: Option<String>,
        callback_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Client(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            db,
            client,
            global_webhook_url: global_webhook_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            callback_url: callback_url.into(),
        })
    }

    pub async fn dispatch(&self, request: PublishRequest) -> Result<DispatchOutcome, PublishError> {
        let kind = request.kind;
        let id = request.post_id.as_str();

        let record = self
            .db
            .get_content(kind, id)
            .await?
            .filter(|r| r.tenant_id == request.tenant_id)
            .ok_or_else(|| PublishError::NotFound { id: id.to_string() })?;

        if !record.status.is_dispatchable() {
            warn!(
                table = kind.table(),
                id,
                status = %record.status,
                "Refusing to dispatch record"
            );
            return Err(invalid_status(&record));
        }

        let config = self
            .db
            .get_tenant_config(&request.tenant_id)
            .await?
            .unwrap_or_default();
        let endpoint = config
            .automation_webhook_url()
            .map(String::from)
            .or_else(|| self.global_webhook_url.clone());

        let Some(endpoint) = endpoint else {
            return self.publish_manually(kind, record).await;
        };

        let changed = self
            .db
            .transition_content_status(
                kind,
                id,
                &ContentStatus::DISPATCHABLE,
                ContentStatus::Publishing,
                None,
            )
            .await?;
        if !changed {
            return Err(self.lost_race(kind, id).await);
        }

        let mut handed_off = record;
        handed_off.status = ContentStatus::Publishing;
        let platform = request.platform.or_else(|| handed_off.platform.clone());
        let payload = json!({
            "type": kind.as_str(),
            "record": handed_off.to_wire(),
            "client_config": config,
            "callback_url": self.callback_url,
            "platform": platform,
        });

        info!(
            table = kind.table(),
            id,
            tenant_id = %request.tenant_id,
            endpoint = %endpoint,
            "Dispatching to automation"
        );
        let handoff = spawn_handoff(self.client.clone(), endpoint, payload, id.to_string());

        Ok(DispatchOutcome {
            post_id: request.post_id,
            status: ContentStatus::Publishing,
            mode: DispatchMode::Automation,
            handoff: Some(handoff),
        })
    }

    async fn publish_manually(
        &self,
        kind: ContentKind,
        record: ContentRecord,
    ) -> Result<DispatchOutcome, PublishError> {
        let changed = self
            .db
            .transition_content_status(
                kind,
                &record.id,
                &ContentStatus::DISPATCHABLE,
                ContentStatus::Published,
                Some(Utc::now()),
            )
            .await?;
        if !changed {
            return Err(self.lost_race(kind, &record.id).await);
        }

        info!(table = kind.table(), id = %record.id, "No automation endpoint, published manually");
        Ok(DispatchOutcome {
            post_id: record.id,
            status: ContentStatus::Published,
            mode: DispatchMode::Manual,
            handoff: None,
        })
    }

    /// Another request moved the record between our read and our write.
    async fn lost_race(&self, kind: ContentKind, id: &str) -> PublishError {
        match self.db.get_content(kind, id).await {
            Ok(Some(current)) => invalid_status(&current),
            Ok(None) => PublishError::NotFound { id: id.to_string() },
            Err(e) => PublishError::Database(e),
        }
    }
}

fn invalid_status(record: &ContentRecord) -> PublishError {
    PublishError::InvalidStatus {
        id: record.id.clone(),
        status: record.status.to_string(),
    }
}

/// Fire the automation POST on a detached task. Failures are only logged;
/// the record stays `publishing` until the callback says otherwise.
fn spawn_handoff(
    client: reqwest::Client,
    endpoint: String,
    payload: serde_json::Value,
    id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match client.post(&endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(id = %id, status = %response.status(), "Automation accepted hand-off");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(id = %id, status = %status, body = %body, "Automation rejected hand-off");
            }
            Err(e) => {
                error!(id = %id, endpoint = %endpoint, error = %e, "Automation hand-off failed");
            }
        }
    })
}
