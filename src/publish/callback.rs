//! Automation callback reconciler.
//!
//! The automation system reports progress by calling back with
//! `{ action, table, record_id, data }`. Only content tables are writable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::error::CallbackError;
use crate::publish::model::{ContentKind, ContentRecord, ContentStatus, MediaAsset};
use crate::store::{Database, NewMediaAsset};

/// Header carrying the shared callback secret.
pub const SECRET_HEADER: &str = "x-callback-secret";

/// Key in `fields` holding the failure detail reported by automation.
const PUBLISH_ERROR_FIELD: &str = "publish_error";

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackRequest {
    pub action: String,
    pub table: String,
    pub record_id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    UpdateStatus,
    UpdateField,
    AddMedia,
}

impl CallbackAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "update_status" => Some(CallbackAction::UpdateStatus),
            "update_field" => Some(CallbackAction::UpdateField),
            "add_media" => Some(CallbackAction::AddMedia),
            _ => None,
        }
    }
}

/// What a callback changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallbackOutcome {
    StatusUpdated {
        status: ContentStatus,
    },
    FieldsUpdated {
        fields: Vec<String>,
    },
    MediaAdded {
        asset: MediaAsset,
        image_updated: bool,
    },
}

pub struct CallbackHandler {
    db: Arc<dyn Database>,
    secret: Option<String>,
}

impl CallbackHandler {
    pub fn new(db: Arc<dyn Database>, secret: Option<String>) -> Self {
        Self {
            db,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// A configured secret must be echoed exactly in [`SECRET_HEADER`].
    pub fn authorize(&self, provided: Option<&str>) -> Result<(), CallbackError> {
        match &self.secret {
            None => Ok(()),
            Some(expected) if provided.is_some_and(|p| secrets_match(expected, p)) => Ok(()),
            Some(_) => Err(CallbackError::Unauthorized),
        }
    }

    pub async fn handle(
        &self,
        provided_secret: Option<&str>,
        request: CallbackRequest,
    ) -> Result<CallbackOutcome, CallbackError> {
        self.authorize(provided_secret)?;

        let kind = ContentKind::from_table(&request.table)
            .ok_or_else(|| CallbackError::TableNotAllowed(request.table.clone()))?;
        let action = CallbackAction::parse(&request.action)
            .ok_or_else(|| CallbackError::UnknownAction(request.action.clone()))?;

        info!(
            action = %request.action,
            table = %request.table,
            record_id = %request.record_id,
            "Automation callback"
        );

        match action {
            CallbackAction::UpdateStatus => self.update_status(kind, &request).await,
            CallbackAction::UpdateField => self.update_field(kind, &request).await,
            CallbackAction::AddMedia => self.add_media(kind, &request).await,
        }
    }

    async fn load(&self, kind: ContentKind, id: &str) -> Result<ContentRecord, CallbackError> {
        self.db
            .get_content(kind, id)
            .await?
            .ok_or_else(|| CallbackError::NotFound {
                table: kind.table().to_string(),
                id: id.to_string(),
            })
    }

    async fn update_status(
        &self,
        kind: ContentKind,
        request: &CallbackRequest,
    ) -> Result<CallbackOutcome, CallbackError> {
        let raw = request
            .data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| CallbackError::InvalidPayload("data.status is required".into()))?;
        let status: ContentStatus = raw.parse().map_err(CallbackError::InvalidPayload)?;

        let published_at = if status == ContentStatus::Published {
            let reported = match request.data.get("published_at") {
                Some(v) => parse_timestamp(v)?,
                None => None,
            };
            Some(reported.unwrap_or_else(Utc::now))
        } else {
            None
        };
        let failure = request
            .data
            .get("error")
            .filter(|v| status == ContentStatus::Failed && !v.is_null());

        if let Some(reason) = failure {
            let mut record = self.load(kind, &request.record_id).await?;
            record.status = status;
            record.fields.insert(PUBLISH_ERROR_FIELD.into(), reason.clone());
            self.db.update_content(&record).await?;
        } else if !self
            .db
            .set_content_status(kind, &request.record_id, status, published_at)
            .await?
        {
            return Err(CallbackError::NotFound {
                table: kind.table().to_string(),
                id: request.record_id.clone(),
            });
        }

        info!(table = kind.table(), id = %request.record_id, status = %status, "Content status updated");
        Ok(CallbackOutcome::StatusUpdated { status })
    }

    async fn update_field(
        &self,
        kind: ContentKind,
        request: &CallbackRequest,
    ) -> Result<CallbackOutcome, CallbackError> {
        let updates = request
            .data
            .as_object()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CallbackError::InvalidPayload("data must be a non-empty object".into()))?;

        let mut record = self.load(kind, &request.record_id).await?;
        let mut changed = Vec::with_capacity(updates.len());

        for (key, value) in updates {
            match key.as_str() {
                "id" | "tenant_id" | "created_at" | "updated_at" | "table" => {
                    debug!(field = %key, "Ignoring read-only field in callback");
                    continue;
                }
                "title" => record.title = text_value(value),
                "body" => record.body = text_value(value),
                "platform" => record.platform = text_value(value),
                "status" => {
                    let raw = value.as_str().ok_or_else(|| {
                        CallbackError::InvalidPayload("status must be a string".into())
                    })?;
                    record.status = raw.parse().map_err(CallbackError::InvalidPayload)?;
                }
                "published_at" => record.published_at = parse_timestamp(value)?,
                k if k == "image_url" || k == kind.image_column() => {
                    record.image_url = text_value(value);
                }
                _ => {
                    record.fields.insert(key.clone(), value.clone());
                }
            }
            changed.push(key.clone());
        }

        self.db.update_content(&record).await?;
        info!(table = kind.table(), id = %record.id, fields = ?changed, "Content fields updated");
        Ok(CallbackOutcome::FieldsUpdated { fields: changed })
    }

    async fn add_media(
        &self,
        kind: ContentKind,
        request: &CallbackRequest,
    ) -> Result<CallbackOutcome, CallbackError> {
        let data = &request.data;
        let url = data
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CallbackError::InvalidPayload("data.url is required".into()))?;
        let media_type = data
            .get("media_type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or("image");
        let reference_table = data
            .get("reference_table")
            .and_then(Value::as_str)
            .unwrap_or(kind.table());
        let reference_id = data
            .get("reference_id")
            .and_then(Value::as_str)
            .unwrap_or(&request.record_id);

        // The image column is only patched on content tables.
        let referenced = match ContentKind::from_table(reference_table) {
            Some(ref_kind) => Some(self.load(ref_kind, reference_id).await?),
            None => {
                warn!(reference_table, "Media references a table without an image column");
                None
            }
        };

        let asset = self
            .db
            .insert_media_asset(&NewMediaAsset {
                tenant_id: referenced.as_ref().map(|r| r.tenant_id.clone()),
                url: url.to_string(),
                media_type: media_type.to_string(),
                reference_table: Some(reference_table.to_string()),
                reference_id: Some(reference_id.to_string()),
            })
            .await?;

        let image_updated = match referenced {
            Some(mut record) => {
                record.image_url = Some(url.to_string());
                self.db.update_content(&record).await?
            }
            None => false,
        };

        info!(
            media_id = %asset.id,
            reference_table,
            reference_id,
            image_updated,
            "Media asset added"
        );
        Ok(CallbackOutcome::MediaAdded {
            asset,
            image_updated,
        })
    }
}

/// Constant-time comparison of MACs of both values, keyed by the expected secret.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let mac = || Hmac::<Sha256>::new_from_slice(expected.as_bytes()).ok();
    let (Some(mut want), Some(mut got)) = (mac(), mac()) else {
        return false;
    };
    want.update(expected.as_bytes());
    got.update(provided.as_bytes());
    got.verify_slice(&want.finalize().into_bytes()).is_ok()
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_timestamp(value: &Value) -> Result<Option<DateTime<Utc>>, CallbackError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| CallbackError::InvalidPayload(format!("invalid timestamp {s:?}: {e}"))),
        other => Err(CallbackError::InvalidPayload(format!(
            "timestamp must be an RFC 3339 string, got {other}"
        ))),
    }
}
