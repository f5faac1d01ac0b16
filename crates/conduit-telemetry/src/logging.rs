//! Structured logging for Conduit workers.
//!
//! Logs go through the `tracing` facade and are rendered by a
//! `tracing-subscriber` formatter, either as JSON lines or in a
//! human-readable layout. The destination stream is configurable because the
//! function adapter reserves stdout for its single response document.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_telemetry::logging::{init_logging, LogConfig, LogWriter};
//!
//! let config = LogConfig {
//!     writer: LogWriter::Stderr,
//!     ..LogConfig::default()
//! };
//! init_logging(&config)?;
//!
//! tracing::info!(request_id = "abc", "processing");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output stream for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogWriter {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g., "info", "conduit_queue=debug,info").
    pub level: String,

    /// Whether to output JSON lines.
    pub json_format: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,

    /// Where log lines are written.
    pub writer: LogWriter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            file_line_info: false,
            include_target: true,
            writer: LogWriter::Stdout,
        }
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Installs the global log subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let writer = match config.writer {
        LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogWriter::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses a filter directive.
///
/// # Errors
///
/// Returns an error if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Standard log field names.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field name.
    pub const SPAN_ID: &str = "span_id";

    /// Request type field name.
    pub const REQUEST_TYPE: &str = "request_type";

    /// Source transport field name.
    pub const SOURCE: &str = "source";

    /// Error code field name.
    pub const ERROR_CODE: &str = "error_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";
}
