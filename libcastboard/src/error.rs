//! Error types for Castboard

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CastboardError>;

#[derive(Error, Debug)]
pub enum CastboardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl CastboardError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CastboardError::InvalidInput(_)
            | CastboardError::NotFound(_)
            | CastboardError::InvalidTransition { .. } => 3,
            CastboardError::Config(_) | CastboardError::Database(_) => 2,
            CastboardError::Delivery(_) => 1,
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CastboardError::Delivery(DeliveryError::Network(_))
                | CastboardError::Delivery(DeliveryError::RateLimit(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Faults raised by a publishing adapter.
///
/// Ordinary rejections by a target are not errors; adapters report them
/// through `DeliveryAttemptResult`. These variants cover the cases where the
/// adapter could not complete an attempt at all.
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Target unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Adapter failure: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CastboardError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_found_and_transition() {
        assert_eq!(CastboardError::NotFound("post x".to_string()).exit_code(), 3);

        let error = CastboardError::InvalidTransition {
            from: "published".to_string(),
            to: "scheduled".to_string(),
        };
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let config = CastboardError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(config.exit_code(), 2);

        let db = CastboardError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_delivery_error() {
        let error = CastboardError::Delivery(DeliveryError::Network("timeout".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CastboardError::Delivery(DeliveryError::Unavailable(
            "linkedin returned 503".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Delivery error: Target unavailable: linkedin returned 503"
        );

        let error = CastboardError::InvalidTransition {
            from: "draft".to_string(),
            to: "published".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid status transition: draft -> published");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CastboardError::from(DeliveryError::Network("reset".to_string())).is_transient());
        assert!(CastboardError::from(DeliveryError::RateLimit("429".to_string())).is_transient());
        assert!(!CastboardError::from(DeliveryError::Unavailable("gone".to_string())).is_transient());
        assert!(!CastboardError::from(DeliveryError::Internal("bug".to_string())).is_transient());
        assert!(!CastboardError::from(DeliveryError::Rejected("spam".to_string())).is_transient());
        assert!(!CastboardError::InvalidInput("x".to_string()).is_transient());
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::Corrupt("bad status".to_string());
        let error: CastboardError = db_error.into();

        match error {
            CastboardError::Database(_) => {}
            _ => panic!("Expected CastboardError::Database"),
        }
    }

    #[test]
    fn test_delivery_error_clone() {
        let original = DeliveryError::Network("Connection failed".to_string());
        let cloned = original.clone();

        assert_eq!(original.to_string(), cloned.to_string());
    }
}
