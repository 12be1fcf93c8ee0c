//! Webservice client for vtiger-style CRMs.
//!
//! Every logical operation performs the full challenge/login handshake and
//! then runs against the resulting session. Nothing is cached between calls.

use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::crm::CrmAdapter;
use crate::crm::phone::PhoneVariants;
use crate::crm::types::{
    Challenge, CrmContact, CrmModule, CrmRecord, CreatedRecord, Envelope, NewLead, Session, text,
};
use crate::error::CrmError;
use crate::tenant::CrmCredentials;

/// Default per-request timeout for CRM calls.
pub const DEFAULT_CRM_TIMEOUT: Duration = Duration::from_secs(20);

const DEFAULT_COMPANY: &str = "Unknown";
const DEFAULT_LEAD_SOURCE: &str = "Web Site";
const DEFAULT_LEAD_STATUS: &str = "New";

/// Stateless vtiger webservice client.
#[derive(Debug, Clone)]
pub struct VtigerClient {
    client: reqwest::Client,
}

impl VtigerClient {
    pub fn new(timeout: Duration) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrmError::Http {
                operation: "client".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    fn endpoint(creds: &CrmCredentials) -> String {
        format!("{}/webservice.php", creds.url.trim().trim_end_matches('/'))
    }

    /// Challenge → keyed digest → login.
    async fn login(&self, creds: &CrmCredentials) -> Result<Session, CrmError> {
        let challenge: Challenge = self
            .get(
                creds,
                "getchallenge",
                &[("username", creds.username.as_str())],
            )
            .await?;

        let access_key = access_key_digest(&challenge.token, &creds.access_key);

        let session: Session = self
            .post(
                creds,
                "login",
                &[
                    ("username", creds.username.as_str()),
                    ("accessKey", access_key.as_str()),
                ],
            )
            .await?;

        debug!(user_id = %session.user_id, "CRM session established");
        Ok(session)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        creds: &CrmCredentials,
        operation: &str,
        params: &[(&str, &str)],
    ) -> Result<T, CrmError> {
        let mut query: Vec<(&str, &str)> = vec![("operation", operation)];
        query.extend_from_slice(params);

        let resp = self
            .client
            .get(Self::endpoint(creds))
            .query(&query)
            .send()
            .await
            .map_err(|e| http_error(operation, e))?;

        decode(operation, resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        creds: &CrmCredentials,
        operation: &str,
        params: &[(&str, &str)],
    ) -> Result<T, CrmError> {
        let mut form: Vec<(&str, &str)> = vec![("operation", operation)];
        form.extend_from_slice(params);

        let resp = self
            .client
            .post(Self::endpoint(creds))
            .form(&form)
            .send()
            .await
            .map_err(|e| http_error(operation, e))?;

        decode(operation, resp).await
    }

    async fn query(
        &self,
        creds: &CrmCredentials,
        session: &Session,
        sql: &str,
    ) -> Result<Vec<CrmRecord>, CrmError> {
        self.get(
            creds,
            "query",
            &[("sessionName", session.session_name.as_str()), ("query", sql)],
        )
        .await
    }

    async fn retrieve_with(
        &self,
        creds: &CrmCredentials,
        session: &Session,
        id: &str,
    ) -> Result<CrmRecord, CrmError> {
        self.get(
            creds,
            "retrieve",
            &[("sessionName", session.session_name.as_str()), ("id", id)],
        )
        .await
    }

    async fn create(
        &self,
        creds: &CrmCredentials,
        session: &Session,
        element_type: &str,
        element: &CrmRecord,
    ) -> Result<CrmRecord, CrmError> {
        let element = serde_json::to_string(element).map_err(|e| CrmError::InvalidResponse {
            operation: "create".into(),
            reason: e.to_string(),
        })?;
        self.post(
            creds,
            "create",
            &[
                ("sessionName", session.session_name.as_str()),
                ("elementType", element_type),
                ("element", element.as_str()),
            ],
        )
        .await
    }

    /// Run `where_clause` against each module in precedence order and
    /// return the first hit.
    async fn search(
        &self,
        creds: &CrmCredentials,
        where_clause: &str,
    ) -> Result<CrmContact, CrmError> {
        let session = self.login(creds).await?;
        for module in CrmModule::SEARCH_ORDER {
            let sql = format!(
                "SELECT * FROM {} WHERE {where_clause} LIMIT 1;",
                module.as_str()
            );
            let rows = self.query(creds, &session, &sql).await?;
            if let Some(record) = rows.first() {
                debug!(module = module.as_str(), "CRM search matched");
                return Ok(CrmContact::from_record(module, record));
            }
        }
        Ok(CrmContact::NotFound)
    }
}

#[async_trait]
impl CrmAdapter for VtigerClient {
    async fn search_by_phone(
        &self,
        creds: &CrmCredentials,
        phone: &str,
    ) -> Result<CrmContact, CrmError> {
        let Some(variants) = PhoneVariants::parse(phone, &creds.default_country_code) else {
            return Err(CrmError::Validation(format!(
                "phone number '{phone}' has no digits"
            )));
        };
        self.search(creds, &phone_where_clause(&variants)).await
    }

    async fn search_by_email(
        &self,
        creds: &CrmCredentials,
        email: &str,
    ) -> Result<CrmContact, CrmError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(CrmError::Validation("email must not be empty".into()));
        }
        self.search(creds, &format!("email = '{}'", escape_literal(email)))
            .await
    }

    async fn create_lead(
        &self,
        creds: &CrmCredentials,
        lead: &NewLead,
    ) -> Result<CreatedRecord, CrmError> {
        if lead.first_name.trim().is_empty() || lead.last_name.trim().is_empty() {
            return Err(CrmError::Validation(
                "first name and last name are required".into(),
            ));
        }

        let session = self.login(creds).await?;
        let element = lead_element(lead, &session.user_id);
        let created = self
            .create(creds, &session, CrmModule::Leads.as_str(), &element)
            .await?;

        let record = CreatedRecord {
            id: required_id("create", &created)?,
            record_number: text(&created, "lead_no"),
        };
        info!(id = %record.id, "CRM lead created");
        Ok(record)
    }

    async fn retrieve(&self, creds: &CrmCredentials, id: &str) -> Result<CrmRecord, CrmError> {
        let session = self.login(creds).await?;
        self.retrieve_with(creds, &session, id).await
    }

    async fn update_record(
        &self,
        creds: &CrmCredentials,
        id: &str,
        updates: &CrmRecord,
    ) -> Result<CrmRecord, CrmError> {
        let session = self.login(creds).await?;

        // The update operation replaces the whole entity; anything not
        // resubmitted is nulled.
        let mut merged = self.retrieve_with(creds, &session, id).await?;
        for (key, value) in updates {
            merged.insert(key.clone(), value.clone());
        }
        merged.insert("id".into(), Value::String(id.to_string()));

        let element = serde_json::to_string(&merged).map_err(|e| CrmError::InvalidResponse {
            operation: "update".into(),
            reason: e.to_string(),
        })?;

        let updated: CrmRecord = self
            .post(
                creds,
                "update",
                &[
                    ("sessionName", session.session_name.as_str()),
                    ("element", element.as_str()),
                ],
            )
            .await?;

        info!(id, fields = updates.len(), "CRM record updated");
        Ok(updated)
    }

    async fn add_note(
        &self,
        creds: &CrmCredentials,
        record_id: &str,
        text_body: &str,
    ) -> Result<CreatedRecord, CrmError> {
        let session = self.login(creds).await?;

        let mut element = CrmRecord::new();
        element.insert("commentcontent".into(), Value::String(text_body.to_string()));
        element.insert("related_to".into(), Value::String(record_id.to_string()));
        element.insert(
            "assigned_user_id".into(),
            Value::String(session.user_id.clone()),
        );

        let created = self
            .create(creds, &session, "ModComments", &element)
            .await?;

        Ok(CreatedRecord {
            id: required_id("create", &created)?,
            record_number: None,
        })
    }

    async fn test_connection(&self, creds: &CrmCredentials) -> Result<(), CrmError> {
        self.login(creds).await.map(|_| ())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Lowercase hex MD5 of `token` followed by the access key.
pub fn access_key_digest(token: &str, access_key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(token.as_bytes());
    hasher.update(access_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Escape a value for interpolation inside a single-quoted query literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn phone_where_clause(variants: &PhoneVariants) -> String {
    let mut terms = Vec::with_capacity(6);
    for field in ["phone", "mobile"] {
        for form in variants.all() {
            terms.push(format!("{field} = '{}'", escape_literal(form)));
        }
    }
    terms.join(" OR ")
}

fn lead_element(lead: &NewLead, assigned_user_id: &str) -> CrmRecord {
    fn or_default(value: &Option<String>, default: &str) -> String {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    let mut element = CrmRecord::new();
    element.insert("firstname".into(), lead.first_name.trim().into());
    element.insert("lastname".into(), lead.last_name.trim().into());
    element.insert(
        "company".into(),
        or_default(&lead.company, DEFAULT_COMPANY).into(),
    );
    element.insert(
        "leadsource".into(),
        or_default(&lead.lead_source, DEFAULT_LEAD_SOURCE).into(),
    );
    element.insert(
        "leadstatus".into(),
        or_default(&lead.lead_status, DEFAULT_LEAD_STATUS).into(),
    );
    for (key, value) in [
        ("email", &lead.email),
        ("phone", &lead.phone),
        ("description", &lead.description),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            element.insert(key.into(), v.trim().into());
        }
    }
    element.insert("assigned_user_id".into(), assigned_user_id.into());
    element
}

fn required_id(operation: &str, record: &CrmRecord) -> Result<String, CrmError> {
    text(record, "id").ok_or_else(|| CrmError::InvalidResponse {
        operation: operation.into(),
        reason: "result has no id".into(),
    })
}

fn http_error(operation: &str, e: reqwest::Error) -> CrmError {
    CrmError::Http {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

/// Unwrap the `{ success, result, error }` envelope into `T`.
async fn decode<T: DeserializeOwned>(
    operation: &str,
    resp: reqwest::Response,
) -> Result<T, CrmError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| http_error(operation, e))?;

    let envelope: Envelope = match serde_json::from_str(&body) {
        Ok(env) => env,
        Err(_) if !status.is_success() => {
            return Err(CrmError::Http {
                operation: operation.into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Err(e) => {
            return Err(CrmError::InvalidResponse {
                operation: operation.into(),
                reason: e.to_string(),
            });
        }
    };

    if !envelope.success {
        let message = envelope
            .error
            .and_then(|e| e.message.or(e.code))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(CrmError::Remote {
            operation: operation.into(),
            message,
        });
    }

    let result = envelope.result.ok_or_else(|| CrmError::InvalidResponse {
        operation: operation.into(),
        reason: "missing result".into(),
    })?;

    serde_json::from_value(result).map_err(|e| CrmError::InvalidResponse {
        operation: operation.into(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

    fn creds(server: &MockServer) -> CrmCredentials {
        CrmCredentials::new(server.uri(), "admin", "secretkey")
    }

    fn client() -> VtigerClient {
        VtigerClient::new(Duration::from_secs(5)).unwrap()
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "success": true, "result": result }))
    }

    async fn mount_handshake(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/webservice.php"))
            .and(query_param("operation", "getchallenge"))
            .and(query_param("username", "admin"))
            .respond_with(ok(serde_json::json!({ "token": "tok123", "serverTime": 1, "expireTime": 2 })))
            .mount(server)
            .await;

        let expected_key = access_key_digest("tok123", "secretkey");
        Mock::given(method("POST"))
            .and(path("/webservice.php"))
            .and(body_string_contains("operation=login"))
            .and(body_string_contains(format!("accessKey={expected_key}")))
            .respond_with(ok(serde_json::json!({ "sessionName": "sess1", "userId": "19x1" })))
            .mount(server)
            .await;
    }

    fn query_text(request: &Request) -> Option<String> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == "query")
            .map(|(_, v)| v.into_owned())
    }

    /// Matches a query against one module whose WHERE clause mentions `needle`.
    struct QueryMentions {
        module: &'static str,
        needle: String,
    }

    impl Match for QueryMentions {
        fn matches(&self, request: &Request) -> bool {
            query_text(request).is_some_and(|q| {
                q.contains(&format!("FROM {} ", self.module)) && q.contains(&self.needle)
            })
        }
    }

    fn mentions(module: &'static str, needle: impl Into<String>) -> QueryMentions {
        QueryMentions {
            module,
            needle: needle.into(),
        }
    }

    async fn mount_empty_query(server: &MockServer) {
        Mock::given(method("GET"))
            .and(query_param("operation", "query"))
            .respond_with(ok(serde_json::json!([])))
            .mount(server)
            .await;
    }

    #[test]
    fn digest_is_lowercase_hex_md5() {
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        assert_eq!(access_key_digest("a", "bc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn escape_quotes_and_backslashes() {
        assert_eq!(escape_literal("o'brien@x.com"), "o\\'brien@x.com");
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
    }

    #[test]
    fn phone_clause_covers_all_forms_and_fields() {
        let v = PhoneVariants::parse("07700900123", "44").unwrap();
        let clause = phone_where_clause(&v);
        for form in ["'447700900123'", "'07700900123'", "'+447700900123'"] {
            assert!(clause.contains(&format!("phone = {form}")));
            assert!(clause.contains(&format!("mobile = {form}")));
        }
        assert_eq!(clause.matches(" OR ").count(), 5);
    }

    #[test]
    fn lead_element_applies_defaults() {
        let lead = NewLead {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            ..Default::default()
        };
        let el = lead_element(&lead, "19x1");
        assert_eq!(el["firstname"], "Ada");
        assert_eq!(el["company"], "Unknown");
        assert_eq!(el["leadsource"], "Web Site");
        assert_eq!(el["leadstatus"], "New");
        assert_eq!(el["assigned_user_id"], "19x1");
        assert!(el.get("email").is_none());
    }

    #[tokio::test]
    async fn test_connection_success() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        client().test_connection(&creds(&server)).await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_surfaces_remote_message() {
        let server = MockServer::start().await;
        Mock::given(query_param("operation", "getchallenge"))
            .respond_with(ok(serde_json::json!({ "token": "tok123" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": { "code": "INVALID_USER_CREDENTIALS", "message": "Invalid username or password" }
            })))
            .mount(&server)
            .await;

        let err = client().test_connection(&creds(&server)).await.unwrap_err();
        match err {
            CrmError::Remote { operation, message } => {
                assert_eq!(operation, "login");
                assert_eq!(message, "Invalid username or password");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_failure_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client().test_connection(&creds(&server)).await.unwrap_err();
        assert!(matches!(err, CrmError::Http { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn phone_search_matches_any_stored_form() {
        for stored in ["+447700900123", "07700900123", "447700900123"] {
            for searched in ["+447700900123", "07700900123", "447700900123"] {
                let server = MockServer::start().await;
                mount_handshake(&server).await;
                Mock::given(query_param("operation", "query"))
                    .and(mentions("Leads", format!("phone = '{stored}'")))
                    .respond_with(ok(serde_json::json!([{
                        "id": "10x1",
                        "firstname": "Ada",
                        "lastname": "Lovelace",
                        "phone": stored,
                        "leadstatus": "Warm",
                        "lead_no": "LEA1"
                    }])))
                    .mount(&server)
                    .await;
                mount_empty_query(&server).await;

                let found = client()
                    .search_by_phone(&creds(&server), searched)
                    .await
                    .unwrap();
                assert!(
                    matches!(found, CrmContact::Lead(ref d) if d.record_number == "LEA1"),
                    "stored {stored}, searched {searched}: {found:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn lead_takes_priority_over_contact() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(query_param("operation", "query"))
            .and(mentions("Leads", "email = 'ada@example.com'"))
            .respond_with(ok(serde_json::json!([{ "id": "10x1", "firstname": "Lead", "lastname": "Match", "lead_no": "LEA1" }])))
            .mount(&server)
            .await;
        Mock::given(query_param("operation", "query"))
            .and(mentions("Contacts", "email = 'ada@example.com'"))
            .respond_with(ok(serde_json::json!([{ "id": "12x1", "firstname": "Contact", "lastname": "Match", "contact_no": "CON1" }])))
            .expect(0)
            .mount(&server)
            .await;

        let found = client()
            .search_by_email(&creds(&server), "ada@example.com")
            .await
            .unwrap();
        assert_eq!(found.module(), Some(CrmModule::Leads));
    }

    #[tokio::test]
    async fn falls_back_to_contacts() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(query_param("operation", "query"))
            .and(mentions("Contacts", "email"))
            .respond_with(ok(serde_json::json!([{ "id": "12x1", "firstname": "Grace", "lastname": "Hopper", "contact_no": "CON1" }])))
            .mount(&server)
            .await;
        mount_empty_query(&server).await;

        let found = client()
            .search_by_email(&creds(&server), "grace@example.com")
            .await
            .unwrap();
        assert!(matches!(found, CrmContact::Contact(_)));
    }

    #[tokio::test]
    async fn not_found_in_either_module() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        mount_empty_query(&server).await;

        let found = client()
            .search_by_phone(&creds(&server), "+447700900999")
            .await
            .unwrap();
        assert_eq!(found, CrmContact::NotFound);
    }

    #[tokio::test]
    async fn email_quotes_are_escaped_in_query() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(query_param("operation", "query"))
            .and(mentions("Leads", "email = 'o\\'brien@example.com'"))
            .respond_with(ok(serde_json::json!([{ "id": "10x9", "firstname": "Pat", "lastname": "O'Brien", "lead_no": "LEA9" }])))
            .mount(&server)
            .await;
        mount_empty_query(&server).await;

        let found = client()
            .search_by_email(&creds(&server), "o'brien@example.com")
            .await
            .unwrap();
        assert!(found.is_found());
    }

    #[tokio::test]
    async fn create_lead_requires_names() {
        let server = MockServer::start().await;
        let lead = NewLead {
            first_name: "Ada".into(),
            last_name: "  ".into(),
            ..Default::default()
        };
        let err = client().create_lead(&creds(&server), &lead).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_lead_returns_id_and_number() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_string_contains("operation=create"))
            .and(body_string_contains("elementType=Leads"))
            .respond_with(ok(serde_json::json!({ "id": "10x77", "lead_no": "LEA77", "company": "Unknown" })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client()
            .create_lead(
                &creds(&server),
                &NewLead {
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "10x77");
        assert_eq!(created.record_number.as_deref(), Some("LEA77"));
    }

    /// Echoes back the submitted element and records it.
    struct CaptureUpdate(Arc<Mutex<Option<CrmRecord>>>);

    impl Respond for CaptureUpdate {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let element = url_form_field(&request.body, "element")
                .and_then(|raw| serde_json::from_str::<CrmRecord>(&raw).ok())
                .unwrap_or_default();
            *self.0.lock().unwrap() = Some(element.clone());
            ok(Value::Object(element))
        }
    }

    fn url_form_field(body: &[u8], key: &str) -> Option<String> {
        let parsed = reqwest::Url::parse(&format!(
            "http://x/?{}",
            String::from_utf8_lossy(body)
        ))
        .ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn update_preserves_untouched_fields() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        let current = serde_json::json!({
            "id": "10x5",
            "firstname": "Ada",
            "lastname": "Lovelace",
            "company": "Engines Ltd",
            "phone": "+447700900123",
            "leadstatus": "New",
            "lead_no": "LEA5",
            "cf_901": "custom value"
        });
        Mock::given(method("GET"))
            .and(query_param("operation", "retrieve"))
            .and(query_param("id", "10x5"))
            .respond_with(ok(current.clone()))
            .mount(&server)
            .await;

        let captured = Arc::new(Mutex::new(None));
        Mock::given(method("POST"))
            .and(body_string_contains("operation=update"))
            .respond_with(CaptureUpdate(Arc::clone(&captured)))
            .expect(1)
            .mount(&server)
            .await;

        let mut updates = CrmRecord::new();
        updates.insert("leadstatus".into(), "Qualified".into());

        let result = client()
            .update_record(&creds(&server), "10x5", &updates)
            .await
            .unwrap();
        assert_eq!(result["leadstatus"], "Qualified");

        let submitted = captured.lock().unwrap().clone().unwrap();
        for (key, value) in current.as_object().unwrap() {
            if key == "leadstatus" {
                continue;
            }
            assert_eq!(&submitted[key], value, "field {key} changed");
        }
        assert_eq!(submitted["leadstatus"], "Qualified");
    }

    #[tokio::test]
    async fn add_note_links_comment_to_record() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_string_contains("elementType=ModComments"))
            .and(body_string_contains("related_to"))
            .respond_with(ok(serde_json::json!({ "id": "30x1" })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client()
            .add_note(&creds(&server), "12x3", "Customer asked about pricing")
            .await
            .unwrap();
        assert_eq!(created.id, "30x1");
        assert!(created.record_number.is_none());
    }

    #[tokio::test]
    async fn each_operation_runs_its_own_handshake() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        let c = client();
        let creds = creds(&server);
        c.test_connection(&creds).await.unwrap();
        c.test_connection(&creds).await.unwrap();

        let challenges = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query().is_some_and(|q| q.contains("getchallenge")))
            .count();
        assert_eq!(challenges, 2);
    }
}
