pub mod admission;
pub mod models;

pub use admission::{check_absolute, check_and_consume};
pub use models::{QuotaDecision, GAUGE_DIMENSIONS, WINDOWED_DIMENSIONS};
