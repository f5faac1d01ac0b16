//! Error code vocabulary.
//!
//! Codes are short machine-readable tags carried in [`ErrorInfo`]. The set is
//! closed for the framework's own failures and open for use-case codes via
//! [`ErrorCode::Custom`].

use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Machine-readable failure code.
///
/// Serializes as the bare upper-case tag (e.g. `"VALIDATION_ERROR"`).
///
/// # Example
///
/// ```
/// use conduit_core::ErrorCode;
///
/// let code = ErrorCode::from("RATE_LIMITED");
/// assert_eq!(code, ErrorCode::RateLimited);
/// assert!(code.is_transient());
/// assert_eq!(code.http_status().as_u16(), 429);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request failed normalization or validation.
    Validation,
    /// The request was structurally invalid for the use case.
    InvalidRequest,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller is not permitted to perform the operation.
    Forbidden,
    /// The addressed resource does not exist.
    NotFound,
    /// Processing exceeded its deadline.
    Timeout,
    /// Processing was cancelled by the caller or by shutdown.
    Cancelled,
    /// An unexpected failure, including recovered panics.
    Internal,
    /// A network-level failure talking to a dependency.
    Network,
    /// A dependency rejected the call due to rate limiting.
    RateLimited,
    /// A transient failure that is expected to clear on its own.
    Temporary,
    /// A dependency is unavailable.
    ServiceUnavailable,
    /// An upstream gateway timed out.
    GatewayTimeout,
    /// A use-case defined code.
    Custom(String),
}

impl ErrorCode {
    /// Returns the wire tag for this code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::Temporary => "TEMPORARY_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::Custom(code) => code,
        }
    }

    /// Returns `true` for codes that describe transient conditions.
    ///
    /// This is the fallback heuristic the retry stage consults when a
    /// response does not set `retryable` itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Network
                | Self::RateLimited
                | Self::Temporary
                | Self::ServiceUnavailable
                | Self::GatewayTimeout
        )
    }

    /// Returns the HTTP status code an HTTP-facing adapter reports for this code.
    ///
    /// Codes without an explicit mapping (including custom codes) map to 500.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation | Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "VALIDATION_ERROR" => Self::Validation,
            "INVALID_REQUEST" => Self::InvalidRequest,
            "UNAUTHORIZED" => Self::Unauthorized,
            "FORBIDDEN" => Self::Forbidden,
            "NOT_FOUND" => Self::NotFound,
            "TIMEOUT" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            "INTERNAL_ERROR" => Self::Internal,
            "NETWORK_ERROR" => Self::Network,
            "RATE_LIMITED" => Self::RateLimited,
            "TEMPORARY_ERROR" => Self::Temporary,
            "SERVICE_UNAVAILABLE" => Self::ServiceUnavailable,
            "GATEWAY_TIMEOUT" => Self::GatewayTimeout,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from(code))
    }
}

/// Structured failure detail attached to an unsuccessful [`Response`](crate::Response).
///
/// `retryable` is an explicit hint set by whoever builds the response; it is
/// independent of `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable failure code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Whether the operation may safely be re-attempted.
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorInfo {
    /// Creates a new error detail.
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_known_tags() {
        for code in [
            ErrorCode::Validation,
            ErrorCode::Timeout,
            ErrorCode::Cancelled,
            ErrorCode::Internal,
            ErrorCode::GatewayTimeout,
        ] {
            assert_eq!(ErrorCode::from(code.as_str()), code);
        }
    }

    #[test]
    fn test_unknown_tag_is_custom() {
        let code = ErrorCode::from("QUOTA_EXCEEDED");
        assert_eq!(code, ErrorCode::Custom("QUOTA_EXCEEDED".into()));
        assert_eq!(code.to_string(), "QUOTA_EXCEEDED");
        assert!(!code.is_transient());
    }

    #[test]
    fn test_transient_set() {
        let transient: Vec<_> = [
            "TIMEOUT",
            "NETWORK_ERROR",
            "RATE_LIMITED",
            "TEMPORARY_ERROR",
            "SERVICE_UNAVAILABLE",
            "GATEWAY_TIMEOUT",
        ]
        .into_iter()
        .map(ErrorCode::from)
        .collect();
        assert!(transient.iter().all(ErrorCode::is_transient));
        assert!(!ErrorCode::Validation.is_transient());
        assert!(!ErrorCode::Internal.is_transient());
        assert!(!ErrorCode::Cancelled.is_transient());
    }

    #[test]
    fn test_http_status_table() {
        assert_eq!(ErrorCode::Validation.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidRequest.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::Timeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorCode::ServiceUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::Internal.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::Custom("SOMETHING".into()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_info_serialization() {
        let info = ErrorInfo::new(ErrorCode::RateLimited, "slow down", true);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["message"], "slow down");
        assert_eq!(json["retryable"], true);
    }
}
