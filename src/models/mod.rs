// file: src/models/mod.rs

pub mod alarm;
pub mod assignment;
pub mod course;
pub mod run;
pub mod sync;

// Flattened so callers can write `use crate::models::Assignment`.
pub use alarm::AlarmRecord;
pub use assignment::{fingerprint, Assignment, AssignmentPatch, SubmissionStatus};
pub use course::{Category, Course};
pub use run::{RunFailureState, RunLog, RunStatus};
pub use sync::SyncStats;
