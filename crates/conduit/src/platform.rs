//! Platform detection.
//!
//! | Environment                      | Platform          |
//! |----------------------------------|-------------------|
//! | `AWS_LAMBDA_RUNTIME_API` set     | queue trigger     |
//! | `fprocess` set                   | function          |
//! | `RABBITMQ_URL` or `AMQP_URL` set | broker consumer   |
//! | otherwise                        | HTTP              |
//!
//! `worker.platform` in the configuration overrides detection.

use conduit_config::ConduitConfig;
use conduit_core::Platform;
use conduit_function::FPROCESS_VAR;
use conduit_queue::RUNTIME_API_ENV;

use crate::error::{RunError, RunResult};

/// Variables that point the worker at a broker, in lookup order.
pub const BROKER_URL_VARS: [&str; 2] = ["RABBITMQ_URL", "AMQP_URL"];

/// Detects the platform from the process environment.
///
/// # Errors
///
/// Returns an error if `worker.platform` names an unknown platform.
pub fn detect_platform(config: &ConduitConfig) -> RunResult<Platform> {
    detect_platform_with(config, |key| std::env::var(key).ok())
}

/// Detects the platform using `lookup` for environment variables.
///
/// # Errors
///
/// Returns an error if `worker.platform` names an unknown platform.
pub fn detect_platform_with<F>(config: &ConduitConfig, lookup: F) -> RunResult<Platform>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(pinned) = &config.worker.platform {
        return pinned.parse().map_err(RunError::UnknownPlatform);
    }

    let set = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());
    let platform = if set(RUNTIME_API_ENV) {
        Platform::Sqs
    } else if set(FPROCESS_VAR) {
        Platform::OpenFaas
    } else if BROKER_URL_VARS.iter().any(|key| set(key)) {
        Platform::RabbitMq
    } else {
        Platform::Http
    };
    Ok(platform)
}

/// Returns the broker URL: the first of [`BROKER_URL_VARS`], else
/// `broker.url`.
pub fn broker_url_with<F>(config: &ConduitConfig, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    BROKER_URL_VARS
        .iter()
        .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| config.broker.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_config::WorkerConfig;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_detection_order() {
        let config = ConduitConfig::default();
        let cases = [
            (vec![], Platform::Http),
            (vec![("AMQP_URL", "amqp://mq")], Platform::RabbitMq),
            (vec![("fprocess", "./handler"), ("AMQP_URL", "amqp://mq")], Platform::OpenFaas),
            (
                vec![("AWS_LAMBDA_RUNTIME_API", "127.0.0.1:9001"), ("fprocess", "./handler")],
                Platform::Sqs,
            ),
            (vec![("fprocess", " ")], Platform::Http),
        ];
        for (vars, expected) in cases {
            assert_eq!(detect_platform_with(&config, lookup(&vars)).unwrap(), expected);
        }
    }

    #[test]
    fn test_pinned_platform_wins() {
        let config = ConduitConfig {
            worker: WorkerConfig {
                platform: Some("rabbitmq".to_string()),
                ..WorkerConfig::default()
            },
            ..ConduitConfig::default()
        };
        let platform = detect_platform_with(&config, lookup(&[("fprocess", "./handler")])).unwrap();
        assert_eq!(platform, Platform::RabbitMq);
    }

    #[test]
    fn test_unknown_pinned_platform() {
        let config = ConduitConfig {
            worker: WorkerConfig {
                platform: Some("kafka".to_string()),
                ..WorkerConfig::default()
            },
            ..ConduitConfig::default()
        };
        assert!(matches!(
            detect_platform_with(&config, lookup(&[])),
            Err(RunError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn test_broker_url_prefers_environment() {
        let config = ConduitConfig::default();
        assert_eq!(broker_url_with(&config, lookup(&[])), config.broker.url);
        assert_eq!(
            broker_url_with(&config, lookup(&[("RABBITMQ_URL", "amqp://mq:5672")])),
            "amqp://mq:5672"
        );
    }
}
