// duesync library
// Coursework deadline to calendar reconciliation

pub mod alarms;
pub mod calendar;
pub mod classroom;
pub mod config;
pub mod database;
pub mod error;
pub mod http_config;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod runner;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use error::{AppError, AppResult};
pub use models::*;
pub use runner::{RunOutcome, Runner};
pub use sync::{SyncEngine, SyncSettings};
