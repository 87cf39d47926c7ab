pub mod crud;
pub mod models;
pub mod tick;

pub use crud::{create_schedule, delete_schedule, get_schedule, list_schedules, set_enabled};
pub use models::{NewSchedule, Schedule};
pub use tick::tick;
