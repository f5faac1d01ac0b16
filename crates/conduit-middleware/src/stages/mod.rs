//! Built-in middleware stages.
//!
//! | Stage        | Middleware               | Purpose                                  |
//! |--------------|--------------------------|------------------------------------------|
//! | Recovery     | [`RecoveryMiddleware`]   | Convert panics into `INTERNAL_ERROR`     |
//! | Timeout      | [`TimeoutMiddleware`]    | Bound total processing time              |
//! | Tracing      | [`TracingMiddleware`]    | Propagate or create trace ids            |
//! | Metrics      | [`MetricsMiddleware`]    | Count requests and record durations      |
//! | Logging      | [`LoggingMiddleware`]    | Log start and completion                 |
//! | Validation   | [`ValidationMiddleware`] | Normalize and reject malformed requests  |
//! | Retry        | [`RetryMiddleware`]      | Re-run transient failures with backoff   |
//!
//! The table lists the default order, outermost first.

pub mod logging;
pub mod metrics;
pub mod recovery;
pub mod retry;
pub mod timeout;
pub mod tracing;
pub mod validation;

pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use recovery::RecoveryMiddleware;
pub use retry::{RetryMiddleware, RetryPolicy};
pub use timeout::TimeoutMiddleware;
pub use tracing::{TraceContext, TracingMiddleware};
pub use validation::ValidationMiddleware;
