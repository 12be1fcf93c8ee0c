//! Tenant integration configuration.
//!
//! Each tenant ("client") carries a bag of third-party credentials. The
//! pipeline only reads it; the settings surface writes it through
//! [`crate::store::Database::save_tenant_config`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country calling code assumed when a CRM config doesn't name one.
pub const DEFAULT_COUNTRY_CODE: &str = "44";

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

/// Per-tenant integration config, stored as JSON.
///
/// Unknown keys are preserved in `extra` so that settings written by other
/// parts of the dashboard survive a round-trip through this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TenantIntegrationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm: Option<CrmCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<WhatsAppCredentials>,
    /// Tenant-level automation endpoint; overrides the global one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_webhook_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TenantIntegrationConfig {
    /// CRM credentials, if the tenant has a usable CRM configured.
    pub fn crm(&self) -> Option<&CrmCredentials> {
        self.crm.as_ref().filter(|c| c.is_complete())
    }

    pub fn automation_webhook_url(&self) -> Option<&str> {
        self.automation_webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Credentials for the CRM's webservice endpoint.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct CrmCredentials {
    /// Instance base URL, e.g. `https://acme.od2.vtiger.com`.
    pub url: String,
    pub username: String,
    pub access_key: String,
    /// Used to derive the local (leading zero) phone form.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl CrmCredentials {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            access_key: access_key.into(),
            default_country_code: default_country_code(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.access_key.trim().is_empty()
    }
}

impl fmt::Debug for CrmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("access_key", &"[REDACTED]")
            .field("default_country_code", &self.default_country_code)
            .finish()
    }
}

/// Messaging platform (WhatsApp Cloud API) credentials.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct WhatsAppCredentials {
    pub access_token: String,
    /// Platform-assigned numeric id of the sending phone number.
    pub phone_number_id: String,
    /// Secret echoed by the platform during webhook verification.
    pub verify_token: String,
    /// When set, deliveries must carry a valid `X-Hub-Signature-256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Persona text for generated replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl fmt::Debug for WhatsAppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhatsAppCredentials")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("verify_token", &"[REDACTED]")
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[REDACTED]"))
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}
