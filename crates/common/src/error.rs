use thiserror::Error;

/// Common error types used across the worker.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_converts() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::NotFound("Notification 1 not found".into());
        assert_eq!(err.to_string(), "Not found: Notification 1 not found");
    }

    #[test]
    fn test_serde_error_converts() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
