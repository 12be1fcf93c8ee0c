//! `POST /publish/{kind}`

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::{AppState, failure, json_body};
use crate::error::PublishError;
use crate::publish::{ContentKind, PublishRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBody {
    pub post_id: Option<String>,
    pub client_id: Option<String>,
    pub platform: Option<String>,
}

pub async fn publish(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Result<Json<PublishBody>, JsonRejection>,
) -> impl IntoResponse {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let Some(kind) = ContentKind::from_route(&kind) else {
        return failure(
            StatusCode::BAD_REQUEST,
            PublishError::UnknownContentType(kind),
        );
    };
    let (Some(post_id), Some(tenant_id)) = (
        body.post_id.filter(|s| !s.is_empty()),
        body.client_id.filter(|s| !s.is_empty()),
    ) else {
        return failure(StatusCode::BAD_REQUEST, "postId and clientId are required");
    };

    let request = PublishRequest {
        kind,
        post_id,
        tenant_id,
        platform: body.platform.filter(|p| !p.is_empty()),
    };

    match state.dispatcher.dispatch(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": outcome.status,
                "postId": outcome.post_id,
                "mode": outcome.mode,
            })),
        ),
        Err(e) => {
            let status = match &e {
                PublishError::UnknownContentType(_) | PublishError::InvalidStatus { .. } => {
                    StatusCode::BAD_REQUEST
                }
                PublishError::NotFound { .. } => StatusCode::NOT_FOUND,
                PublishError::Client(_) | PublishError::Database(_) => {
                    error!(error = %e, "Publish dispatch failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            failure(status, e)
        }
    }
}
