//! API error types and retry classification

use std::time::Duration;
use thiserror::Error;

/// Closed classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received (connect failure, DNS, transport timeout)
    Transient,
    /// A response arrived with status >= 500
    ServerError(u16),
    /// A response arrived with any other failing status
    ClientError(u16),
    /// Anything unrelated to the transport
    Other,
}

impl ErrorKind {
    /// Classify a response status code
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            ErrorKind::ServerError(status)
        } else {
            ErrorKind::ClientError(status)
        }
    }

    /// Check if this kind of failure is worth retrying
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::ServerError(_))
    }
}

/// Errors the scheduler knows how to classify
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

/// Errors that can occur during API calls
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Build the error matching a failing response status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match ErrorKind::from_status(status) {
            ErrorKind::ServerError(status) => ApiError::Server { status, message },
            _ => ApiError::Client { status, message },
        }
    }

    /// Status code of the response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl Classify for ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) | ApiError::Timeout(_) => ErrorKind::Transient,
            ApiError::Server { status, .. } => ErrorKind::ServerError(*status),
            ApiError::Client { status, .. } => ErrorKind::ClientError(*status),
            ApiError::InvalidResponse(_) | ApiError::Json(_) => ErrorKind::Other,
        }
    }
}
