//! HTTP adapter errors.

use std::io;
use thiserror::Error;

/// Errors that stop the HTTP adapter.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address could not be parsed.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parse failure description.
        reason: String,
    },

    /// The listener could not bind.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// The address that failed to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An I/O error on the listener.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
