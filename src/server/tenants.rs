//! Tenant integration settings.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, info, warn};

use super::{AppState, failure, json_body};
use crate::error::ConfigError;
use crate::tenant::TenantIntegrationConfig;

/// `PUT /api/tenants/{id}/integrations`
///
/// CRM credentials, when present, must pass a live handshake before the
/// config is stored.
pub async fn save_integrations(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    config: Result<Json<TenantIntegrationConfig>, JsonRejection>,
) -> impl IntoResponse {
    let config = match json_body(config) {
        Ok(config) => config,
        Err(response) => return response,
    };
    if let Some(crm) = &config.crm {
        if !crm.is_complete() {
            return failure(
                StatusCode::BAD_REQUEST,
                "crm.url, crm.username and crm.access_key are required",
            );
        }
        if let Err(e) = state.crm.test_connection(crm).await {
            warn!(tenant_id = %tenant_id, error = %e, "Rejected CRM credentials");
            return failure(
                StatusCode::BAD_REQUEST,
                format!("CRM connection test failed: {e}"),
            );
        }
    }

    if let Some(wa) = &config.whatsapp
        && (wa.phone_number_id.trim().is_empty()
            || wa.access_token.trim().is_empty()
            || wa.verify_token.trim().is_empty())
    {
        return failure(
            StatusCode::BAD_REQUEST,
            "whatsapp.phone_number_id, whatsapp.access_token and whatsapp.verify_token are required",
        );
    }

    if let Err(e) = state.db.save_tenant_config(&tenant_id, &config).await {
        error!(tenant_id = %tenant_id, error = %e, "Failed to save tenant config");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    info!(
        tenant_id = %tenant_id,
        crm = config.crm.is_some(),
        whatsapp = config.whatsapp.is_some(),
        "Tenant integrations saved"
    );
    (StatusCode::OK, Json(json!({ "success": true })))
}

/// `GET /api/tenants/{id}/integrations`, with secrets left out.
pub async fn get_integrations(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    match state.db.get_tenant_config(&tenant_id).await {
        Ok(Some(config)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "crm": config.crm.as_ref().map(|c| json!({
                    "url": c.url,
                    "username": c.username,
                    "default_country_code": c.default_country_code,
                })),
                "whatsapp": config.whatsapp.as_ref().map(|w| json!({
                    "phone_number_id": w.phone_number_id,
                    "signature_required": w.app_secret.as_deref().is_some_and(|s| !s.is_empty()),
                    "system_prompt": w.system_prompt,
                })),
                "automation_webhook_url": config.automation_webhook_url(),
            })),
        ),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            ConfigError::TenantNotConfigured(tenant_id),
        ),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "Failed to load tenant config");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
