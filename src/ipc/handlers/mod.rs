pub mod bulk;
pub mod core;
pub mod drafts;
pub mod grading;
pub mod import;
pub mod reports;
pub mod results;
pub mod setup;
pub mod students;
