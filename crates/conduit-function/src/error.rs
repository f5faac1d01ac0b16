//! Function adapter errors.

use thiserror::Error;

/// Operational failures of the function adapter.
///
/// Business failures never surface here; they are written to stdout as a
/// failed response.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// The response could not be written to the output stream.
    #[error("failed to write response: {0}")]
    Write(#[source] std::io::Error),

    /// The response could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    /// The HTTP-compatibility server failed.
    #[error(transparent)]
    Server(#[from] conduit_server::ServerError),
}

/// Result alias for function adapter operations.
pub type FunctionResult<T> = Result<T, FunctionError>;
