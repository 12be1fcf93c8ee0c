//! CRM protocol adapter.
//!
//! Owns every wire interaction with the tenant's CRM. Knows nothing about
//! tenants or messaging: callers hand in credentials per call.

pub mod phone;
pub mod types;
pub mod vtiger;

pub use phone::PhoneVariants;
pub use types::{ContactDetails, CreatedRecord, CrmContact, CrmModule, CrmRecord, NewLead};
pub use vtiger::VtigerClient;

use async_trait::async_trait;

use crate::error::CrmError;
use crate::tenant::CrmCredentials;

/// Typed CRM operations.
///
/// Implementations attempt each call once; retry policy belongs to callers.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
    /// Find a Lead, then a Contact, by any stored form of `phone`.
    async fn search_by_phone(
        &self,
        creds: &CrmCredentials,
        phone: &str,
    ) -> Result<CrmContact, CrmError>;

    /// Find a Lead, then a Contact, by exact email.
    async fn search_by_email(
        &self,
        creds: &CrmCredentials,
        email: &str,
    ) -> Result<CrmContact, CrmError>;

    async fn create_lead(
        &self,
        creds: &CrmCredentials,
        lead: &NewLead,
    ) -> Result<CreatedRecord, CrmError>;

    /// Fetch the full record.
    async fn retrieve(&self, creds: &CrmCredentials, id: &str) -> Result<CrmRecord, CrmError>;

    /// Retrieve, shallow-merge `updates`, and write the merged record back.
    async fn update_record(
        &self,
        creds: &CrmCredentials,
        id: &str,
        updates: &CrmRecord,
    ) -> Result<CrmRecord, CrmError>;

    /// Attach a comment to any record, whatever its module.
    async fn add_note(
        &self,
        creds: &CrmCredentials,
        record_id: &str,
        text: &str,
    ) -> Result<CreatedRecord, CrmError>;

    /// Run the session handshake only.
    async fn test_connection(&self, creds: &CrmCredentials) -> Result<(), CrmError>;
}
