pub mod insert;
pub mod models;
pub mod relay;
pub mod requeue;

pub use insert::insert_outbox;
pub use models::{EventOutboxRow, NewOutboxEntry, OutboxStatus};
pub use relay::{acquire_due, relay_one};
pub use requeue::requeue_outbox;
