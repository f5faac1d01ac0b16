//! Serde helpers for payloads that carry an embedded JSON document.
//!
//! Payload bytes are written as raw JSON when they parse, and as a JSON
//! string otherwise. An empty payload is written as `null`.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

pub(crate) fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    if bytes.is_empty() {
        return serializer.serialize_none();
    }
    match serde_json::from_slice::<&RawValue>(bytes) {
        Ok(raw) => raw.serialize(serializer),
        Err(_) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
    }
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let raw: Option<Box<RawValue>> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|raw| Bytes::from(raw.get().to_owned()))
        .unwrap_or_default())
}
