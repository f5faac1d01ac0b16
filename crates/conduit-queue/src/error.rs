//! Queue adapter errors.

use thiserror::Error;

/// Result alias for queue adapter operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by the queue-trigger adapter and the runtime client.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A message failed while partial batch failure reporting is off, so the
    /// whole batch must be redelivered.
    #[error("message {message_id} failed, aborting batch: {reason}")]
    MessageFailed {
        /// The failing message.
        message_id: String,
        /// What went wrong.
        reason: String,
    },

    /// The invocation payload was not a valid batch event.
    #[error("invalid batch event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    /// The runtime API could not be reached.
    #[error("runtime API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The runtime API answered with an unexpected status.
    #[error("runtime API returned {status}: {body}")]
    RuntimeStatus {
        /// HTTP status returned.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A required runtime API header was absent.
    #[error("runtime API response missing header {0}")]
    MissingHeader(&'static str),
}

impl QueueError {
    /// Creates a batch-abort error.
    pub fn message_failed(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MessageFailed {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error type string reported to the runtime API.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MessageFailed { .. } => "BatchFailed",
            Self::InvalidEvent(_) => "InvalidEvent",
            Self::Transport(_) | Self::RuntimeStatus { .. } | Self::MissingHeader(_) => {
                "Runtime.Unknown"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_failed_display() {
        let err = QueueError::message_failed("m-1", "TIMEOUT: deadline exceeded");
        assert_eq!(
            err.to_string(),
            "message m-1 failed, aborting batch: TIMEOUT: deadline exceeded"
        );
        assert_eq!(err.error_type(), "BatchFailed");
    }
}
