//! Messaging platform webhook: subscription verification and deliveries.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::channels::whatsapp::SIGNATURE_HEADER;
use crate::pipeline::{Outcome, Verification};

pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let param = |key: &str| params.get(key).map(String::as_str);
    let result = state
        .inbound
        .verify(
            param("hub.mode"),
            param("hub.verify_token"),
            param("hub.challenge"),
        )
        .await;

    match result {
        Ok(Verification::Accepted {
            tenant_id,
            challenge,
        }) => {
            info!(tenant_id = %tenant_id, "Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        Ok(Verification::BadRequest(reason)) => (StatusCode::BAD_REQUEST, reason).into_response(),
        Ok(Verification::Forbidden) => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        Err(e) => {
            error!(error = %e, "Webhook verification lookup failed");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
    }
}

/// Always acknowledged with 200; the platform retries anything else.
pub async fn deliver(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.inbound.process_delivery(&body, signature).await {
        Outcome::Replied {
            tenant_id,
            conversation_id,
            used_fallback,
            sent,
            ..
        } => {
            info!(
                tenant_id = %tenant_id,
                conversation_id = %conversation_id,
                used_fallback,
                sent,
                "Delivery handled"
            );
        }
        Outcome::Skipped { .. } => {}
    }

    (StatusCode::OK, Json(json!({ "ok": true })))
}
