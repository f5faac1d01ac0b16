//! The normalized inbound request.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The unit of work entering the middleware chain.
///
/// Adapters construct a `Request` from their native event. Fields are public
/// because adapters and middleware fill them in progressively; once the
/// request reaches the use case it is treated as read-only.
///
/// # Wire format
///
/// ```json
/// {"id": "...", "source": "http", "type": "echo", "payload": {"x": 1},
///  "metadata": {"method": "POST"}, "timestamp": "2024-01-01T00:00:00Z"}
/// ```
///
/// `type` is required when deserializing; every other field defaults.
///
/// # Example
///
/// ```
/// use conduit_core::Request;
///
/// let mut request = Request::new("echo", r#"{"x":1}"#);
/// assert!(request.id.is_empty());
///
/// request.normalize();
/// assert!(!request.id.is_empty());
/// assert!(request.timestamp.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier. Generated by [`normalize`](Self::normalize) if empty.
    #[serde(default)]
    pub id: String,

    /// Originating transport tag (`"http"`, `"sqs"`, `"rabbitmq"`, `"openfaas"`).
    #[serde(default)]
    pub source: String,

    /// Logical operation name.
    #[serde(rename = "type")]
    pub request_type: String,

    /// Raw JSON document.
    #[serde(default, with = "crate::raw_json")]
    pub payload: Bytes,

    /// Transport-specific context such as headers or queue attributes.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation instant. `None` until normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Request {
    /// Creates a request with the given type and payload.
    pub fn new(request_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            request_type: request_type.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Sets the correlation identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the originating transport tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a metadata value by key.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Fills in the fields every request must carry once it enters a handler.
    ///
    /// Assigns a UUID v7 identifier when `id` is empty and the current UTC
    /// time when `timestamp` is unset. Calling this on an already normalized
    /// request changes nothing.
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::now_v7().to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    /// Returns `true` if the payload is syntactically valid JSON.
    pub fn payload_is_json(&self) -> bool {
        serde_json::from_slice::<serde::de::IgnoredAny>(&self.payload).is_ok()
    }
}
