pub mod logging;
pub mod retry;

pub use retry::{Attempted, RetryPolicy};
