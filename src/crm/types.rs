//! CRM domain types and the webservice response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw CRM record: field name → value.
pub type CrmRecord = serde_json::Map<String, Value>;

/// Entity sets searched by the adapter, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrmModule {
    Leads,
    Contacts,
}

impl CrmModule {
    /// Search order: a Lead match always wins over a Contact match.
    pub const SEARCH_ORDER: [CrmModule; 2] = [CrmModule::Leads, CrmModule::Contacts];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrmModule::Leads => "Leads",
            CrmModule::Contacts => "Contacts",
        }
    }

    fn record_number_field(&self) -> &'static str {
        match self {
            CrmModule::Leads => "lead_no",
            CrmModule::Contacts => "contact_no",
        }
    }
}

/// Identity fields of a matched CRM entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Status classification (lead status for leads).
    pub status: String,
    /// Human-facing record number, e.g. `LEA123`.
    pub record_number: String,
    /// Free-text notes on the record.
    pub description: Option<String>,
}

impl ContactDetails {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub(crate) fn from_record(module: CrmModule, record: &CrmRecord) -> Self {
        let status = match module {
            CrmModule::Leads => text(record, "leadstatus").unwrap_or_else(|| "New".to_string()),
            CrmModule::Contacts => "Customer".to_string(),
        };
        Self {
            id: text(record, "id").unwrap_or_default(),
            first_name: text(record, "firstname").unwrap_or_default(),
            last_name: text(record, "lastname").unwrap_or_default(),
            company: text(record, "company").or_else(|| text(record, "account_id")),
            email: text(record, "email"),
            phone: text(record, "mobile").or_else(|| text(record, "phone")),
            status,
            record_number: text(record, module.record_number_field()).unwrap_or_default(),
            description: text(record, "description"),
        }
    }
}

/// Result of a CRM search: at most one authoritative entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum CrmContact {
    Lead(ContactDetails),
    Contact(ContactDetails),
    NotFound,
}

impl CrmContact {
    pub(crate) fn from_record(module: CrmModule, record: &CrmRecord) -> Self {
        let details = ContactDetails::from_record(module, record);
        match module {
            CrmModule::Leads => CrmContact::Lead(details),
            CrmModule::Contacts => CrmContact::Contact(details),
        }
    }

    pub fn details(&self) -> Option<&ContactDetails> {
        match self {
            CrmContact::Lead(d) | CrmContact::Contact(d) => Some(d),
            CrmContact::NotFound => None,
        }
    }

    pub fn module(&self) -> Option<CrmModule> {
        match self {
            CrmContact::Lead(_) => Some(CrmModule::Leads),
            CrmContact::Contact(_) => Some(CrmModule::Contacts),
            CrmContact::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, CrmContact::NotFound)
    }
}

/// Input for `create_lead`. First and last name are mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lead_source: Option<String>,
    #[serde(default)]
    pub lead_status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Identifier pair returned after creating an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub id: String,
    /// Absent for entities without a numbering scheme (e.g. comments).
    pub record_number: Option<String>,
}

// ── Wire envelope ───────────────────────────────────────────────────

/// `{ success, result?, error?: { code?, message } }`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoteError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Challenge {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Session {
    #[serde(rename = "sessionName")]
    pub session_name: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Read a field as trimmed non-empty text. Numbers are stringified.
pub(crate) fn text(record: &CrmRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
