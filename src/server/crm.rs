//! Operator-facing CRM routes. Unlike the inbound pipeline these surface
//! every failure to the caller.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::{ApiResponse, AppState, failure, json_body};
use crate::crm::{CrmRecord, NewLead};
use crate::error::CrmError;
use crate::tenant::CrmCredentials;

fn crm_failure(e: CrmError) -> ApiResponse {
    let status = match &e {
        CrmError::NotConfigured | CrmError::Validation(_) => StatusCode::BAD_REQUEST,
        CrmError::Http { .. } | CrmError::Remote { .. } | CrmError::InvalidResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    failure(status, e)
}

/// The tenant's CRM credentials, or the response explaining why there are none.
async fn tenant_crm(state: &AppState, client_id: Option<&str>) -> Result<CrmCredentials, ApiResponse> {
    let Some(client_id) = client_id.filter(|c| !c.is_empty()) else {
        return Err(failure(StatusCode::BAD_REQUEST, "clientId is required"));
    };
    match state.db.get_tenant_config(client_id).await {
        Ok(Some(config)) => config
            .crm()
            .cloned()
            .ok_or_else(|| crm_failure(CrmError::NotConfigured)),
        Ok(None) => Err(crm_failure(CrmError::NotConfigured)),
        Err(e) => {
            error!(client_id, error = %e, "Failed to load tenant config");
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

pub async fn test_connection(
    State(state): State<AppState>,
    creds: Result<Json<CrmCredentials>, JsonRejection>,
) -> impl IntoResponse {
    let creds = match json_body(creds) {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    if !creds.is_complete() {
        return failure(StatusCode::BAD_REQUEST, "url, username and access_key are required");
    }
    match state.crm.test_connection(&creds).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => crm_failure(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub client_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> impl IntoResponse {
    let creds = match tenant_crm(&state, query.client_id.as_deref()).await {
        Ok(creds) => creds,
        Err(response) => return response,
    };

    let result = match (query.phone.as_deref(), query.email.as_deref()) {
        (Some(phone), _) if !phone.is_empty() => state.crm.search_by_phone(&creds, phone).await,
        (_, Some(email)) if !email.is_empty() => state.crm.search_by_email(&creds, email).await,
        _ => return failure(StatusCode::BAD_REQUEST, "phone or email is required"),
    };

    match result {
        Ok(contact) => (
            StatusCode::OK,
            Json(json!({ "success": true, "found": contact.is_found(), "contact": contact })),
        ),
        Err(e) => crm_failure(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadBody {
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub lead: NewLead,
}

pub async fn create_lead(
    State(state): State<AppState>,
    body: Result<Json<CreateLeadBody>, JsonRejection>,
) -> impl IntoResponse {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let creds = match tenant_crm(&state, body.client_id.as_deref()).await {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    match state.crm.create_lead(&creds, &body.lead).await {
        Ok(created) => {
            info!(record_id = %created.id, "Lead created from dashboard");
            (
                StatusCode::CREATED,
                Json(json!({ "success": true, "record": created })),
            )
        }
        Err(e) => crm_failure(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordBody {
    pub client_id: Option<String>,
    #[serde(default)]
    pub updates: CrmRecord,
}

pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRecordBody>, JsonRejection>,
) -> impl IntoResponse {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let creds = match tenant_crm(&state, body.client_id.as_deref()).await {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    if body.updates.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "updates must not be empty");
    }
    match state.crm.update_record(&creds, &id, &body.updates).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({ "success": true, "record": record })),
        ),
        Err(e) => crm_failure(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteBody {
    pub client_id: Option<String>,
    pub text: String,
}

pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NoteBody>, JsonRejection>,
) -> impl IntoResponse {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let creds = match tenant_crm(&state, body.client_id.as_deref()).await {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    if body.text.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "text must not be empty");
    }
    match state.crm.add_note(&creds, &id, &body.text).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "record": created })),
        ),
        Err(e) => crm_failure(e),
    }
}
