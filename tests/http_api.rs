//! End-to-end tests for the HTTP surface.
//!
//! The router runs in-process against an in-memory store; the generation
//! backend, messaging API, CRM and automation system are wiremock servers.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use opsbridge::channels::WhatsAppClient;
use opsbridge::crm::{CrmAdapter, VtigerClient};
use opsbridge::llm::AnthropicProvider;
use opsbridge::pipeline::{FALLBACK_REPLY, InboundProcessor, InboundSettings};
use opsbridge::publish::{CallbackHandler, ContentKind, ContentRecord, ContentStatus, PublishDispatcher};
use opsbridge::server::{AppState, router};
use opsbridge::store::{Database, LibSqlBackend, MessageRole};
use opsbridge::tenant::{TenantIntegrationConfig, WhatsAppCredentials};

const TENANT: &str = "bakery";
const PHONE_NUMBER_ID: &str = "1001";
const VERIFY_TOKEN: &str = "verify-me";
const CUSTOMER: &str = "447700900123";
const CALLBACK_SECRET: &str = "cb-secret";

struct Harness {
    app: Router,
    db: Arc<dyn Database>,
    llm: MockServer,
    graph: MockServer,
    automation: MockServer,
}

async fn harness() -> Harness {
    let llm = MockServer::start().await;
    let graph = MockServer::start().await;
    let automation = MockServer::start().await;

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let crm: Arc<dyn CrmAdapter> = Arc::new(VtigerClient::new(Duration::from_secs(2)).unwrap());
    let provider = AnthropicProvider::new(
        &SecretString::from("sk-ant-test"),
        "claude-test",
        Duration::from_secs(2),
    )
    .unwrap()
    .with_base_url(format!("{}/v1/messages", llm.uri()));
    let sender = WhatsAppClient::new(Duration::from_secs(2))
        .unwrap()
        .with_graph_base(format!("{}/v21.0", graph.uri()));

    let inbound = InboundProcessor::new(
        db.clone(),
        crm.clone(),
        Arc::new(provider),
        Arc::new(sender),
        InboundSettings {
            crm_timeout: Duration::from_secs(2),
            generation_timeout: Duration::from_secs(2),
            history_window: 20,
        },
    );
    let dispatcher = PublishDispatcher::new(
        db.clone(),
        Some(format!("{}/hooks/publish", automation.uri())),
        "https://ops.example.com/automation/callback",
        Duration::from_secs(2),
    )
    .unwrap();
    let callbacks = CallbackHandler::new(db.clone(), Some(CALLBACK_SECRET.to_string()));

    let app = router(AppState {
        db: db.clone(),
        crm,
        inbound: Arc::new(inbound),
        dispatcher: Arc::new(dispatcher),
        callbacks: Arc::new(callbacks),
    });

    Harness {
        app,
        db,
        llm,
        graph,
        automation,
    }
}

async fn save_whatsapp_tenant(db: &Arc<dyn Database>) {
    let config = TenantIntegrationConfig {
        whatsapp: Some(WhatsAppCredentials {
            access_token: "EAAG-token".into(),
            phone_number_id: PHONE_NUMBER_ID.into(),
            verify_token: VERIFY_TOKEN.into(),
            app_secret: None,
            system_prompt: Some("You are the bakery's assistant.".into()),
        }),
        ..Default::default()
    };
    db.save_tenant_config(TENANT, &config).await.unwrap();
}

fn delivery(text: &str, message_id: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "447700900000", "phone_number_id": PHONE_NUMBER_ID},
                    "contacts": [{"profile": {"name": "Jo"}, "wa_id": CUSTOMER}],
                    "messages": [{
                        "from": CUSTOMER,
                        "id": message_id,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": text}
                    }]
                }
            }]
        }]
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn callback(app: &Router, secret: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/automation/callback")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-callback-secret", secret);
    }
    let (status, bytes) = send(app, builder.body(Body::from(body.to_string())).unwrap()).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Wait for a detached task to reach a mock server.
async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

#[tokio::test]
async fn health_reports_service() {
    let h = harness().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "opsbridge");
}

#[tokio::test]
async fn verification_echoes_challenge_for_known_token() {
    let h = harness().await;
    save_whatsapp_tenant(&h.db).await;

    let uri = format!(
        "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=12345"
    );
    let (status, body) = send(&h.app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"12345");

    let uri = "/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1";
    let (status, _) = send(&h.app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = "/webhooks/whatsapp?hub.mode=subscribe";
    let (status, _) = send(&h.app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn first_message_from_unseen_number_gets_reply() {
    let h = harness().await;
    save_whatsapp_tenant(&h.db).await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "system": "You are the bakery's assistant.",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello Jo! How can we help?"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        })))
        .expect(1)
        .mount(&h.llm)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v21.0/{PHONE_NUMBER_ID}/messages")))
        .and(header("authorization", "Bearer EAAG-token"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": CUSTOMER,
            "type": "text",
            "text": {"body": "Hello Jo! How can we help?"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "wamid.OUT"}]
        })))
        .expect(1)
        .mount(&h.graph)
        .await;

    let (status, body) = send_json(&h.app, "POST", "/webhooks/whatsapp", delivery("Hi", "wamid.IN1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let conversation = h.db.get_conversation(TENANT, CUSTOMER).await.unwrap().unwrap();
    assert_eq!(conversation.display_name.as_deref(), Some("Jo"));
    let messages = h.db.list_messages(conversation.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::Customer);
    assert_eq!(messages[0].content, "Hi");
    assert_eq!(messages[1].role, MessageRole::Agent);
    assert_eq!(messages[1].content, "Hello Jo! How can we help?");
}

#[tokio::test]
async fn generation_failure_sends_fallback() {
    let h = harness().await;
    save_whatsapp_tenant(&h.db).await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&h.llm)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"text": {"body": FALLBACK_REPLY}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "wamid.OUT"}]})))
        .expect(1)
        .mount(&h.graph)
        .await;

    let (status, _) = send_json(&h.app, "POST", "/webhooks/whatsapp", delivery("Open today?", "wamid.IN2")).await;
    assert_eq!(status, StatusCode::OK);

    let conversation = h.db.get_conversation(TENANT, CUSTOMER).await.unwrap().unwrap();
    let messages = h.db.list_messages(conversation.id).await.unwrap();
    assert_eq!(messages.last().map(|m| m.content.as_str()), Some(FALLBACK_REPLY));
}

#[tokio::test]
async fn undeliverable_payloads_are_still_acknowledged() {
    let h = harness().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.graph)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/whatsapp")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"ok": true}));

    // No tenant owns this phone number id.
    let (status, _) = send_json(&h.app, "POST", "/webhooks/whatsapp", delivery("Hi", "wamid.X")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn publishing_a_draft_is_rejected() {
    let h = harness().await;
    let record = ContentRecord::new(ContentKind::Social, TENANT, ContentStatus::Draft);
    h.db.insert_content(&record).await.unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.automation)
        .await;

    let (status, body) = send_json(
        &h.app,
        "POST",
        "/publish/social",
        json!({"postId": record.id, "clientId": TENANT}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let stored = h.db.get_content(ContentKind::Social, &record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Draft);
}

#[tokio::test]
async fn publishing_approved_post_hands_off() {
    let h = harness().await;
    let record = ContentRecord::new(ContentKind::Blog, TENANT, ContentStatus::Approved).with_title("Sourdough 101");
    h.db.insert_content(&record).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/hooks/publish"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.automation)
        .await;

    let (status, body) = send_json(
        &h.app,
        "POST",
        "/publish/blog",
        json!({"postId": record.id, "clientId": TENANT, "platform": "wordpress"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "publishing");
    assert_eq!(body["postId"], record.id.as_str());

    let received = wait_for_requests(&h.automation, 1).await;
    assert_eq!(received.len(), 1);
    let payload: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(payload["type"], "blog");
    assert_eq!(payload["platform"], "wordpress");
    assert_eq!(payload["callback_url"], "https://ops.example.com/automation/callback");
    assert_eq!(payload["record"]["title"], "Sourdough 101");
}

#[tokio::test]
async fn publish_rejects_unknown_kind_and_missing_record() {
    let h = harness().await;

    let (status, _) = send_json(&h.app, "POST", "/publish/podcast", json!({"postId": "p", "clientId": TENANT})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        send_json(&h.app, "POST", "/publish/email", json!({"postId": "missing", "clientId": TENANT})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn callback_add_media_sets_featured_image() {
    let h = harness().await;
    let record = ContentRecord::new(ContentKind::Blog, TENANT, ContentStatus::Publishing);
    h.db.insert_content(&record).await.unwrap();

    let (status, body) = callback(
        &h.app,
        Some(CALLBACK_SECRET),
        json!({
            "action": "add_media",
            "table": "blog_posts",
            "record_id": record.id,
            "data": {"url": "https://cdn.example.com/loaf.jpg"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let stored = h.db.get_content(ContentKind::Blog, &record.id).await.unwrap().unwrap();
    assert_eq!(stored.to_wire()["featured_image_url"], "https://cdn.example.com/loaf.jpg");
}

#[tokio::test]
async fn callback_completes_publish_cycle() {
    let h = harness().await;
    let record = ContentRecord::new(ContentKind::Social, TENANT, ContentStatus::Publishing);
    h.db.insert_content(&record).await.unwrap();

    let (status, _) = callback(
        &h.app,
        Some(CALLBACK_SECRET),
        json!({
            "action": "update_status",
            "table": "social_posts",
            "record_id": record.id,
            "data": {"status": "published"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.db.get_content(ContentKind::Social, &record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Published);
    assert!(stored.published_at.is_some());
}

#[tokio::test]
async fn callback_rejections_map_to_status_codes() {
    let h = harness().await;
    let record = ContentRecord::new(ContentKind::Social, TENANT, ContentStatus::Publishing);
    h.db.insert_content(&record).await.unwrap();
    let update = json!({
        "action": "update_status",
        "table": "social_posts",
        "record_id": record.id,
        "data": {"status": "published"}
    });

    let (status, body) = callback(&h.app, Some("wrong"), update.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = callback(
        &h.app,
        Some(CALLBACK_SECRET),
        json!({"action": "update_field", "table": "users", "record_id": "u1", "data": {"role": "admin"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = callback(
        &h.app,
        Some(CALLBACK_SECRET),
        json!({"action": "update_status", "table": "social_posts", "record_id": "missing", "data": {"status": "published"}}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stored = h.db.get_content(ContentKind::Social, &record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ContentStatus::Publishing);
}

#[tokio::test]
async fn callback_checks_secret_before_reading_body() {
    let h = harness().await;
    let incomplete = json!({"action": "update_status"});

    let (status, body) = callback(&h.app, Some("wrong"), incomplete.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = callback(&h.app, None, incomplete.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, body) = callback(&h.app, Some(CALLBACK_SECRET), incomplete).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("table"));

    let request = Request::builder()
        .method("POST")
        .uri("/automation/callback")
        .header("x-callback-secret", CALLBACK_SECRET)
        .body(Body::from("not json"))
        .unwrap();
    let (status, bytes) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let h = harness().await;

    let request = Request::builder()
        .method("POST")
        .uri("/publish/social")
        .body(Body::from(r#"{"postId":"p1","clientId":"bakery"}"#))
        .unwrap();
    let (status, bytes) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    let request = Request::builder()
        .method("POST")
        .uri("/publish/social")
        .header("content-type", "application/json")
        .body(Body::from("{\"postId\":"))
        .unwrap();
    let (status, bytes) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);

    let (status, body) = send_json(&h.app, "POST", "/api/crm/records/12x3/notes", json!({"clientId": TENANT})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);

    let (status, body) = send_json(
        &h.app,
        "PUT",
        "/api/tenants/bakery/integrations",
        json!({"whatsapp": "not an object"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(h.db.get_tenant_config(TENANT).await.unwrap().is_none());
}

#[tokio::test]
async fn tenant_settings_reject_bad_crm_credentials() {
    let h = harness().await;
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webservice.php"))
        .and(query_param("operation", "getchallenge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": {"code": "AUTHENTICATION_FAILURE", "message": "Given user is inactive"}
        })))
        .mount(&crm)
        .await;

    let (status, body) = send_json(
        &h.app,
        "PUT",
        "/api/tenants/bakery/integrations",
        json!({"crm": {"url": crm.uri(), "username": "admin", "access_key": "secretkey"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(h.db.get_tenant_config(TENANT).await.unwrap().is_none());
}

#[tokio::test]
async fn tenant_settings_round_trip_without_secrets() {
    let h = harness().await;

    let (status, _) = send_json(
        &h.app,
        "PUT",
        "/api/tenants/bakery/integrations",
        json!({
            "whatsapp": {
                "access_token": "EAAG-token",
                "phone_number_id": PHONE_NUMBER_ID,
                "verify_token": VERIFY_TOKEN
            },
            "automation_webhook_url": "https://n8n.example.com/hook"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/api/tenants/bakery/integrations")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains("EAAG-token"));
    assert!(!text.contains(VERIFY_TOKEN));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["whatsapp"]["phone_number_id"], PHONE_NUMBER_ID);
    assert_eq!(body["automation_webhook_url"], "https://n8n.example.com/hook");

    let request = Request::builder()
        .uri("/api/tenants/nobody/integrations")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn crm_search_requires_configured_tenant() {
    let h = harness().await;
    save_whatsapp_tenant(&h.db).await;

    let request = Request::builder()
        .uri(format!("/api/crm/search?clientId={TENANT}&phone={CUSTOMER}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);
}
