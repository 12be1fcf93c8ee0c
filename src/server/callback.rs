//! `POST /automation/callback`

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, warn};

use super::{ApiResponse, AppState, failure};
use crate::error::CallbackError;
use crate::publish::{CallbackRequest, SECRET_HEADER};

/// The secret is checked before the body is parsed.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.callbacks.authorize(secret) {
        return callback_failure(e);
    }

    let request: CallbackRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return callback_failure(CallbackError::InvalidPayload(format!(
                "malformed callback body: {e}"
            )));
        }
    };

    match state.callbacks.handle(secret, request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "success": true, "outcome": outcome })),
        ),
        Err(e) => callback_failure(e),
    }
}

fn callback_failure(e: CallbackError) -> ApiResponse {
    let status = match &e {
        CallbackError::Unauthorized => StatusCode::UNAUTHORIZED,
        CallbackError::TableNotAllowed(_)
        | CallbackError::UnknownAction(_)
        | CallbackError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        CallbackError::NotFound { .. } => StatusCode::NOT_FOUND,
        CallbackError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "Automation callback failed");
    } else {
        warn!(error = %e, status = %status, "Automation callback rejected");
    }
    failure(status, e)
}
