//! Health endpoints.
//!
//! Liveness and readiness paths bypass the middleware chain and call the use
//! case's health probe directly.
//!
//! | Probe result | Status | Body                                                  |
//! |--------------|--------|-------------------------------------------------------|
//! | `Ok(())`     | 200    | `{"status":"healthy","worker":..,"timestamp":..}`      |
//! | `Err(e)`     | 503    | `{"status":"unhealthy","worker":..,"timestamp":..,"error":..}` |

use bytes::Bytes;
use chrono::{DateTime, Utc};
use conduit_middleware::Handler;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};

use crate::translate::HttpResponse;

/// Paths answered by the health probe.
pub const HEALTH_PATHS: [&str; 6] = ["/health", "/healthz", "/ready", "/readyz", "/live", "/livez"];

/// Returns `true` if `path` is a health path. A trailing slash is ignored.
#[must_use]
pub fn is_health_path(path: &str) -> bool {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    HEALTH_PATHS.contains(&path)
}

/// Health probe response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// `healthy` or `unhealthy`.
    pub status: String,

    /// Worker name.
    pub worker: String,

    /// Platform the worker runs on.
    pub platform: String,

    /// When the probe ran.
    pub timestamp: DateTime<Utc>,

    /// Probe failure message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl HealthStatus {
    /// Runs the use case's health probe through `handler`.
    pub async fn probe(handler: &Handler) -> Self {
        let result = handler.health_check().await;
        let (status, error) = match result {
            Ok(()) => ("healthy", None),
            Err(e) => {
                tracing::warn!(error = %e, worker = handler.worker_name(), "health check failed");
                ("unhealthy", Some(e.to_string()))
            }
        };

        Self {
            status: status.to_string(),
            worker: handler.worker_name().to_string(),
            platform: handler.platform().to_string(),
            timestamp: Utc::now(),
            error,
        }
    }

    /// Returns `true` when the probe succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }

    /// Returns 200 when healthy, 503 otherwise.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Probes `handler` and renders the result as a JSON response.
pub async fn respond(handler: &Handler) -> HttpResponse {
    let status = HealthStatus::probe(handler).await;
    let body = serde_json::to_vec(&status)
        .unwrap_or_else(|_| format!(r#"{{"status":"{}"}}"#, status.status).into_bytes());

    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status.status_code();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
