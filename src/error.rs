use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("Coursework source error: {0}")]
    Source(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Assignment {0} is dead and cannot be modified")]
    DeadAssignment(String),
}

impl AppError {
    pub fn coursework<S: Into<String>>(msg: S) -> Self {
        Self::Source(msg.into())
    }

    pub fn calendar<S: Into<String>>(msg: S) -> Self {
        Self::Calendar(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_build_domain_variants() {
        let err = AppError::calendar("PUT returned 507");
        assert_eq!(err.to_string(), "Calendar error: PUT returned 507");
        assert!(matches!(AppError::coursework("x"), AppError::Source(_)));

        let err = AppError::Startup("Configuration error: ALERT_EMAIL missing".to_string());
        assert_eq!(err.to_string(), "Startup failed: Configuration error: ALERT_EMAIL missing");
    }

    #[test]
    fn test_dead_assignment_message() {
        let err = AppError::DeadAssignment("cw-1".to_string());
        assert_eq!(
            err.to_string(),
            "Assignment cw-1 is dead and cannot be modified"
        );
    }
}
