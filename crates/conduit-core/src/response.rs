//! The normalized outbound response.

use crate::code::{ErrorCode, ErrorInfo};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The unit of result leaving the middleware chain.
///
/// A response is either successful (carrying optional `data`) or failed
/// (carrying an [`ErrorInfo`]); the constructors keep `success` and `error`
/// consistent and deserialization rejects input that does not, so
/// `is_success() == error().is_none()` always holds.
///
/// # Example
///
/// ```
/// use conduit_core::{ErrorCode, Response};
///
/// let ok = Response::success(r#"{"done":true}"#);
/// assert!(ok.is_success());
///
/// let failed = Response::failure(ErrorCode::RateLimited, "slow down", true);
/// assert!(!failed.is_success());
/// assert!(failed.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireResponse")]
pub struct Response {
    success: bool,

    #[serde(
        default,
        with = "crate::raw_json",
        skip_serializing_if = "Bytes::is_empty"
    )]
    data: Bytes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,

    #[serde(default)]
    metadata: HashMap<String, String>,

    processed_at: DateTime<Utc>,

    #[serde(
        default,
        rename = "duration_ms",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    duration: Option<Duration>,
}

impl Response {
    /// Creates a successful response carrying the given JSON data.
    pub fn success(data: impl Into<Bytes>) -> Self {
        Self {
            success: true,
            data: data.into(),
            error: None,
            metadata: HashMap::new(),
            processed_at: Utc::now(),
            duration: None,
        }
    }

    /// Creates a successful response by serializing `value`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::success(serde_json::to_vec(value)?))
    }

    /// Creates a failed response.
    pub fn failure(code: impl Into<ErrorCode>, message: impl Into<String>, retryable: bool) -> Self {
        Self::from_error(ErrorInfo::new(code, message, retryable))
    }

    /// Creates a failed response from an existing error detail.
    pub fn from_error(error: ErrorInfo) -> Self {
        Self {
            success: false,
            data: Bytes::new(),
            error: Some(error),
            metadata: HashMap::new(),
            processed_at: Utc::now(),
            duration: None,
        }
    }

    /// Returns `true` if processing succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the response data, if any.
    pub fn data(&self) -> Option<&Bytes> {
        if self.data.is_empty() {
            None
        } else {
            Some(&self.data)
        }
    }

    /// Returns the error detail of a failed response.
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Returns a mutable reference to the error detail of a failed response.
    pub fn error_mut(&mut self) -> Option<&mut ErrorInfo> {
        self.error.as_mut()
    }

    /// Returns the error code of a failed response.
    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.error.as_ref().map(|e| &e.code)
    }

    /// Returns `true` if the response failed with `retryable` set.
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }

    /// Returns the response metadata.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Returns the response metadata mutably.
    pub fn metadata_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.metadata
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns when the response was produced.
    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    /// Returns the elapsed processing time, once recorded.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Records the elapsed processing time.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }
}

/// Deserialized form of [`Response`], checked before conversion.
#[derive(Deserialize)]
struct WireResponse {
    success: bool,

    #[serde(default, with = "crate::raw_json")]
    data: Bytes,

    #[serde(default)]
    error: Option<ErrorInfo>,

    #[serde(default)]
    metadata: HashMap<String, String>,

    processed_at: DateTime<Utc>,

    #[serde(default, rename = "duration_ms", with = "duration_ms")]
    duration: Option<Duration>,
}

impl TryFrom<WireResponse> for Response {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        match (wire.success, wire.error.is_some()) {
            (true, true) => return Err("successful response must not carry an error".to_string()),
            (false, false) => return Err("failed response must carry an error".to_string()),
            _ => {}
        }
        Ok(Self {
            success: wire.success,
            data: wire.data,
            error: wire.error,
            metadata: wire.metadata,
            processed_at: wire.processed_at,
            duration: wire.duration,
        })
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
