//! # Error Types
//!
//! This module defines the error taxonomy used throughout thermalink.
//!
//! ## Retry Classification
//!
//! | Class | Variants | Consumes a retry? |
//! |-------|----------|-------------------|
//! | Link | `ConnectionFailed`, `ConnectionTimeout`, `DeviceDisconnected`, `WriteFailed`, `WriteTimeout`, `JobTimeout` | Yes |
//! | Codec | `Encoding` | No, the job fails immediately |
//! | Caller | `QueueFull`, `InvalidJob`, `JobNotFound`, `InvalidTransition`, `Config` | Returned synchronously |
//!
//! An encoding failure can never succeed on retry because the input is
//! unchanged, so the scheduler fails those jobs without touching the budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for thermalink operations
#[derive(Debug, Error)]
pub enum ThermalinkError {
    /// The link adapter rejected a connect request
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A connect attempt did not resolve in time
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The link went away (or was never up) while data had to be sent
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// The link adapter rejected a chunk write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A single chunk write did not resolve in time
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The codec could not render a payload (bad symbology content, bad parameter)
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Enqueue was rejected because the queue is at capacity
    #[error("Queue full (capacity {0})")]
    QueueFull(usize),

    /// A job stayed in Processing longer than its timeout
    #[error("Job timed out after {0:?}")]
    JobTimeout(Duration),

    /// The job was cancelled while it was transmitting
    #[error("Job cancelled")]
    JobCancelled,

    /// The job request failed validation at enqueue time
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// No job with the given id is known to the scheduler
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The requested status change is not an edge of the job state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable discriminant of [`ThermalinkError`], attached to events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionFailed,
    ConnectionTimeout,
    DeviceDisconnected,
    WriteFailed,
    WriteTimeout,
    Encoding,
    QueueFull,
    JobTimeout,
    JobCancelled,
    InvalidJob,
    JobNotFound,
    InvalidTransition,
    Config,
    Io,
}

impl ThermalinkError {
    /// The cloneable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            Self::DeviceDisconnected(_) => ErrorKind::DeviceDisconnected,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::WriteTimeout(_) => ErrorKind::WriteTimeout,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::QueueFull(_) => ErrorKind::QueueFull,
            Self::JobTimeout(_) => ErrorKind::JobTimeout,
            Self::JobCancelled => ErrorKind::JobCancelled,
            Self::InvalidJob(_) => ErrorKind::InvalidJob,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a job failing with this error should consume a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFailed
                | ErrorKind::ConnectionTimeout
                | ErrorKind::DeviceDisconnected
                | ErrorKind::WriteFailed
                | ErrorKind::WriteTimeout
                | ErrorKind::JobTimeout
        )
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ThermalinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_errors_are_retryable() {
        assert!(ThermalinkError::ConnectionFailed("refused".into()).is_retryable());
        assert!(ThermalinkError::ConnectionTimeout(Duration::from_secs(1)).is_retryable());
        assert!(ThermalinkError::DeviceDisconnected("gone".into()).is_retryable());
        assert!(ThermalinkError::WriteFailed("gatt".into()).is_retryable());
        assert!(ThermalinkError::WriteTimeout(Duration::from_secs(1)).is_retryable());
        assert!(ThermalinkError::JobTimeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_codec_and_caller_errors_are_not_retryable() {
        assert!(!ThermalinkError::Encoding("too long".into()).is_retryable());
        assert!(!ThermalinkError::QueueFull(100).is_retryable());
        assert!(!ThermalinkError::JobCancelled.is_retryable());
        assert!(!ThermalinkError::InvalidJob("empty".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ThermalinkError::QueueFull(100);
        assert_eq!(err.to_string(), "Queue full (capacity 100)");
        let err = ThermalinkError::InvalidTransition {
            from: "completed".into(),
            to: "processing".into(),
        };
        assert_eq!(err.to_string(), "Invalid transition: completed -> processing");
    }
}
