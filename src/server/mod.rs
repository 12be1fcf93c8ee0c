//! HTTP surface: platform webhooks, publish and callback endpoints, and the
//! operator-facing CRM and tenant settings routes.

pub mod callback;
pub mod crm;
pub mod publish;
pub mod tenants;
pub mod webhook;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CALLBACK_PATH;
use crate::crm::CrmAdapter;
use crate::pipeline::InboundProcessor;
use crate::publish::{CallbackHandler, PublishDispatcher};
use crate::store::Database;

pub const SERVICE_NAME: &str = "opsbridge";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub crm: Arc<dyn CrmAdapter>,
    pub inbound: Arc<InboundProcessor>,
    pub dispatcher: Arc<PublishDispatcher>,
    pub callbacks: Arc<CallbackHandler>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks/whatsapp",
            get(webhook::verify).post(webhook::deliver),
        )
        .route("/publish/{kind}", post(publish::publish))
        .route(CALLBACK_PATH, post(callback::callback))
        .route("/api/crm/test-connection", post(crm::test_connection))
        .route("/api/crm/search", get(crm::search))
        .route("/api/crm/leads", post(crm::create_lead))
        .route("/api/crm/records/{id}", patch(crm::update_record))
        .route("/api/crm/records/{id}/notes", post(crm::add_note))
        .route(
            "/api/tenants/{id}/integrations",
            put(tenants::save_integrations).get(tenants::get_integrations),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(crate) type ApiResponse = (StatusCode, Json<Value>);

/// `{ success: false, error }` with the given status.
pub(crate) fn failure(status: StatusCode, error: impl ToString) -> ApiResponse {
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
}

/// A JSON request body, with axum's plain-text rejection turned into
/// [`failure`] under the same status.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiResponse> {
    body.map(|Json(value)| value)
        .map_err(|rejection| failure(rejection.status(), rejection.body_text()))
}
