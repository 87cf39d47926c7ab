pub mod models;
pub mod prepare;
pub mod resolve;

pub use models::{EventInboxRow, InboxStatus, PrepareOutcome};
pub use prepare::prepare;
pub use resolve::{mark_failed, mark_succeeded};
