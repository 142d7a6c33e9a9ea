use crate::models::Notification;
use crate::search::TransportError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors (rejected before any network call)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The search engine could not be reached or rejected the request
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// A bulk job stopped before reaching an empty result set
    #[error("Bulk job error: {0}")]
    Job(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Transport(e) if e.is_unreachable() => "NO_RESPONSE",
            AppError::Transport(_) => "SERVER_ERROR",
            AppError::Decode(_) => "DECODE_ERROR",
            AppError::Job(_) => "JOB_ERROR",
        }
    }

    /// Map this error to the notification shown to the user.
    ///
    /// `endpoint` is the configured search engine URL, named when the server
    /// could not be reached at all.
    pub fn notification(&self, endpoint: &str) -> Notification {
        match self {
            AppError::Validation(msg) => Notification::warning(msg.clone()),
            AppError::Transport(e) if e.is_unreachable() => {
                Notification::danger(format!("No response from Elastic Search at {}", endpoint))
            }
            AppError::Transport(e) => {
                Notification::danger(format!("Error: {} {}", e.status, e.message))
            }
            other => Notification::danger(other.to_string()),
        }
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationLevel;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            AppError::Transport(TransportError::unreachable("refused")).error_code(),
            "NO_RESPONSE"
        );
        assert_eq!(
            AppError::Transport(TransportError::new(503, "Service Unavailable")).error_code(),
            "SERVER_ERROR"
        );
        assert_eq!(AppError::Job("stalled".to_string()).error_code(), "JOB_ERROR");
        assert_eq!(
            AppError::Configuration("missing url".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
    }

    #[test]
    fn test_unreachable_notification_names_endpoint() {
        let err = AppError::Transport(TransportError::unreachable("connection refused"));
        let notification = err.notification("http://es:9200");

        assert_eq!(notification.level, NotificationLevel::Danger);
        assert_eq!(
            notification.message,
            "No response from Elastic Search at http://es:9200"
        );
    }

    #[test]
    fn test_server_error_notification_has_status() {
        let err = AppError::Transport(TransportError::new(500, "Internal Server Error"));
        let notification = err.notification("http://es:9200");

        assert_eq!(notification.level, NotificationLevel::Danger);
        assert_eq!(notification.message, "Error: 500 Internal Server Error");
    }

    #[test]
    fn test_validation_is_a_warning() {
        let notification = AppError::Validation("No events selected.".to_string())
            .notification("http://es:9200");

        assert_eq!(notification.level, NotificationLevel::Warning);
        assert_eq!(notification.message, "No events selected.");
    }
}
