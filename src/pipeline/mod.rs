//! Inbound conversational pipeline.
//!
//! Flow:
//! 1. Verify and parse the platform delivery, resolve the owning tenant
//! 2. Look up the sender in the tenant's CRM (best effort)
//! 3. Persist the inbound message and generate a reply over recent history
//! 4. Persist the reply and note the exchange in the CRM
//! 5. Send the reply

pub mod context;
pub mod inbound;
#[cfg(test)]
pub(crate) mod testing;

pub use context::{ContextBuilder, ConversationContext, CrmContext, build_system_prompt};
pub use inbound::{
    FALLBACK_REPLY, InboundProcessor, InboundSettings, Outcome, SkipReason, Stage, Verification,
};
