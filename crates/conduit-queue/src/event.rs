//! SQS-compatible batch event and batch response shapes.
//!
//! Field names follow the JSON the Lambda SQS trigger delivers
//! (`Records`, `messageId`, `messageAttributes`, ...) and the partial batch
//! response it accepts (`batchItemFailures`, `itemIdentifier`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A batch of queue messages delivered in one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SqsEvent {
    /// Messages in delivery order.
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

impl SqsEvent {
    /// Creates an event from messages.
    pub fn new(records: impl IntoIterator<Item = SqsMessage>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

/// One queue message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    /// Queue-assigned message identifier.
    pub message_id: String,

    /// Handle used by the queue to delete the message.
    #[serde(default)]
    pub receipt_handle: String,

    /// Message body, verbatim.
    #[serde(default)]
    pub body: String,

    /// System attributes such as `ApproximateReceiveCount`.
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Sender-supplied attributes.
    #[serde(default)]
    pub message_attributes: HashMap<String, MessageAttribute>,

    /// MD5 digest of the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_of_body: Option<String>,

    /// Event source, normally `aws:sqs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,

    /// ARN of the source queue.
    #[serde(
        default,
        rename = "eventSourceARN",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_source_arn: Option<String>,

    /// Region of the source queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
}

impl SqsMessage {
    /// Creates a message with an id and a body.
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Adds a string message attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_attributes
            .insert(name.into(), MessageAttribute::string(value));
        self
    }

    /// Returns a string message attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.message_attributes
            .get(name)
            .and_then(|attr| attr.string_value.as_deref())
    }
}

/// A sender-supplied message attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttribute {
    /// Value for `String` and `Number` attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,

    /// Base64 value for `Binary` attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,

    /// `String`, `Number` or `Binary`, optionally with a custom suffix.
    #[serde(default)]
    pub data_type: String,
}

impl MessageAttribute {
    /// Creates a `String` attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            binary_value: None,
            data_type: "String".to_string(),
        }
    }
}

/// Partial batch response: the messages to redeliver.
///
/// An empty list means the whole batch was processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// Messages the queue should redeliver.
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    /// Returns `true` when nothing needs redelivery.
    pub fn is_empty(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    /// Returns the identifiers of messages to redeliver, in order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect()
    }
}

/// One message to redeliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    /// The failed message's `messageId`.
    pub item_identifier: String,
}
