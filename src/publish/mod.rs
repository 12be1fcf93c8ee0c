//! Content publishing: the dispatch state machine and the automation
//! callback that closes it.

pub mod callback;
pub mod dispatcher;
pub mod model;

pub use callback::{CallbackHandler, CallbackOutcome, CallbackRequest, SECRET_HEADER};
pub use dispatcher::{
    DEFAULT_AUTOMATION_TIMEOUT, DispatchMode, DispatchOutcome, PublishDispatcher, PublishRequest,
};
pub use model::{ContentKind, ContentRecord, ContentStatus, MediaAsset};
