//! Error types for search engine calls

use crate::error::AppError;

/// Result type for search engine calls
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Failure reported by the HTTP transport or by the server.
///
/// A `status` of 0 means no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe(.status, .message))]
pub struct TransportError {
    pub status: u16,
    pub message: String,
}

fn describe(status: &u16, message: &str) -> String {
    if *status == 0 {
        format!("No response from server: {}", message)
    } else {
        format!("Server returned {}: {}", status, message)
    }
}

impl TransportError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Connection refused, DNS failure, timeout
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn is_unreachable(&self) -> bool {
        self.status == 0
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ),
            None => Self::unreachable(err.to_string()),
        }
    }
}

/// Errors that can occur while talking to the search engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Transport or server failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Body could not be decoded into the expected response type
    #[error("Failed to decode {kind} response: {message}")]
    Decode { kind: &'static str, message: String },

    /// The response variant does not match the query that was sent
    #[error("Expected a {expected} response")]
    UnexpectedShape { expected: &'static str },
}

impl SearchError {
    pub fn decode(kind: &'static str, err: impl std::fmt::Display) -> Self {
        SearchError::Decode {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Transport(err) => AppError::Transport(err),
            other => AppError::Decode(other.to_string()),
        }
    }
}
