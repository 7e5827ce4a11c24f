//! Error taxonomy for the review engines
//!
//! Every engine operation fails with exactly one [`WorkflowError`]. The four
//! labelled kinds carry business meaning; `Internal` covers everything the
//! boundary must not interpret (storage faults, channel outages).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors raised by repository implementations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("duplicate row violates {constraint}")]
    Duplicate { constraint: String },

    /// A compare-and-set write found the row in a different state
    #[error("{entity} changed concurrently")]
    StaleState { entity: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors raised by the notification channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidState,
    Internal,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("notification error: {0}")]
    Notification(#[from] NotifyError),
}

impl WorkflowError {
    pub fn not_found(message: impl Into<String>) -> Self {
        WorkflowError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        WorkflowError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        WorkflowError::Conflict(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        WorkflowError::InvalidState(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::Forbidden(_) => ErrorKind::Forbidden,
            WorkflowError::Conflict(_) => ErrorKind::Conflict,
            WorkflowError::InvalidState(_) => ErrorKind::InvalidState,
            WorkflowError::Storage(_) | WorkflowError::Notification(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status the transport boundary should answer with
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidState => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Caller-facing body. Internal errors never leak their source text.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            WorkflowError::NotFound(msg)
            | WorkflowError::Forbidden(msg)
            | WorkflowError::Conflict(msg)
            | WorkflowError::InvalidState(msg) => msg.clone(),
            WorkflowError::Storage(_) | WorkflowError::Notification(_) => {
                "internal error".to_string()
            }
        };
        ErrorBody {
            kind: self.kind(),
            status: self.status_code(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
}
