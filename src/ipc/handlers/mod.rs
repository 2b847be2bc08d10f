pub mod analytics;
pub mod attendance;
pub mod core;
pub mod setup;
pub mod student;
pub mod students;
