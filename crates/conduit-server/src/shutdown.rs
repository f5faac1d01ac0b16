//! Graceful shutdown signal handling.
//!
//! A [`ShutdownSignal`] is a cloneable trigger shared by every adapter loop.
//! It wraps a [`CancellationToken`], so adapters that only understand tokens
//! can take [`ShutdownSignal::token`] directly.
//!
//! # Example
//!
//! ```rust
//! use conduit_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let worker_copy = shutdown.clone();
//!
//! shutdown.trigger();
//! assert!(worker_copy.is_shutdown());
//! ```

use std::io;

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// A signal that can be used to trigger and await graceful shutdown.
///
/// All clones observe the same trigger.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates a new, untriggered shutdown signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` if shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a future that completes once shutdown is triggered.
    ///
    /// Completes immediately if it already was.
    #[must_use]
    pub fn recv(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Returns the underlying token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Creates a signal triggered by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be registered.
    pub fn with_os_signals() -> io::Result<Self> {
        let signal = Self::new();
        let listener = OsSignals::register()?;
        let trigger = signal.clone();

        tokio::spawn(async move {
            listener.recv().await;
            trigger.trigger();
        });

        Ok(signal)
    }
}

/// Registered OS signal streams.
struct OsSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl OsSignals {
    #[cfg(unix)]
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("received SIGTERM, initiating graceful shutdown");
            }
            _ = self.sigint.recv() => {
                tracing::info!("received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    async fn recv(self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
        }
    }
}
