//! Hosting platform tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The transport a worker is running behind.
///
/// The string form doubles as the [`Request::source`](crate::Request::source)
/// tag set by each adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Plain HTTP server.
    Http,
    /// Batched queue trigger (SQS via a Lambda-style runtime).
    Sqs,
    /// Message-broker consumer.
    #[serde(rename = "rabbitmq")]
    RabbitMq,
    /// Stdin/stdout function invocation.
    #[serde(rename = "openfaas")]
    OpenFaas,
}

impl Platform {
    /// Returns the lower-case tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Sqs => "sqs",
            Self::RabbitMq => "rabbitmq",
            Self::OpenFaas => "openfaas",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "sqs" | "lambda" => Ok(Self::Sqs),
            "rabbitmq" | "amqp" => Ok(Self::RabbitMq),
            "openfaas" | "function" => Ok(Self::OpenFaas),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("HTTP".parse::<Platform>(), Ok(Platform::Http));
        assert_eq!("lambda".parse::<Platform>(), Ok(Platform::Sqs));
        assert_eq!("amqp".parse::<Platform>(), Ok(Platform::RabbitMq));
        assert_eq!("openfaas".parse::<Platform>(), Ok(Platform::OpenFaas));
        assert!("kafka".parse::<Platform>().is_err());
    }

    #[test]
    fn test_serde_tags() {
        assert_eq!(serde_json::to_string(&Platform::RabbitMq).unwrap(), "\"rabbitmq\"");
        let parsed: Platform = serde_json::from_str("\"openfaas\"").unwrap();
        assert_eq!(parsed, Platform::OpenFaas);
    }
}
