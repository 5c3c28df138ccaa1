use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Payload encoding of a `RuleMsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// JSON document.
    Json,
    /// Plain text.
    Text,
    /// Opaque binary, carried as a string by convention.
    Binary,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "JSON",
            Self::Text => "TEXT",
            Self::Binary => "BINARY",
        };
        f.write_str(name)
    }
}

/// String key/value pairs attached to a message as it flows through a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    values: HashMap<String, String>,
}

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn put_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, or an empty string when absent.
    #[must_use]
    pub fn get_value(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The unit of work processed by a rule chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMsg {
    /// Creation time in milliseconds since the Unix epoch.
    pub ts: i64,
    /// Unique message id (UUID v4).
    pub id: String,
    /// Message type. Endpoints set this to the message origin.
    #[serde(rename = "type")]
    pub msg_type: String,
    pub data_type: DataType,
    pub metadata: Metadata,
    pub data: String,
}

impl RuleMsg {
    /// Builds a message with a fresh id.
    ///
    /// A `ts` of 0 is replaced with the current time.
    #[must_use]
    pub fn new(
        ts: i64,
        msg_type: impl Into<String>,
        data_type: DataType,
        metadata: Metadata,
        data: impl Into<String>,
    ) -> Self {
        let ts = if ts == 0 { now_millis() } else { ts };
        Self {
            ts,
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            data_type,
            metadata,
            data: data.into(),
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn metadata_put_and_get() {
        let mut md = Metadata::new();
        assert!(md.is_empty());
        md.put_value("productType", "test01");
        assert_eq!(md.get_value("productType"), "test01");
        assert_eq!(md.get_value("missing"), "");
        assert!(md.has("productType"));
        assert_eq!(md.len(), 1);

        md.put_value("productType", "test02");
        assert_eq!(md.get_value("productType"), "test02");
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn new_msg_fills_ts_and_id() {
        let a = RuleMsg::new(0, "TEST", DataType::Text, Metadata::new(), "hello");
        let b = RuleMsg::new(0, "TEST", DataType::Text, Metadata::new(), "hello");
        assert!(a.ts > 0);
        assert_ne!(a.id, b.id);
        assert_eq!(a.data, "hello");
        assert_eq!(a.msg_type, "TEST");
    }

    #[test]
    fn new_msg_keeps_explicit_ts() {
        let msg = RuleMsg::new(42, "TEST", DataType::Json, Metadata::new(), "{}");
        assert_eq!(msg.ts, 42);
    }

    #[test]
    fn rule_msg_serializes_type_field() {
        let msg = RuleMsg::new(1, "TELEMETRY", DataType::Json, Metadata::new(), "{}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "TELEMETRY");
        assert_eq!(json["dataType"], "JSON");
    }

    #[test]
    fn data_type_display() {
        assert_eq!(DataType::Text.to_string(), "TEXT");
        assert_eq!(DataType::Json.to_string(), "JSON");
        assert_eq!(DataType::Binary.to_string(), "BINARY");
    }

    proptest! {
        #[test]
        fn metadata_last_put_wins(key in "[a-zA-Z]{1,12}", first in ".*", second in ".*") {
            let mut md = Metadata::new();
            md.put_value(key.clone(), first);
            md.put_value(key.clone(), second.clone());
            prop_assert_eq!(md.get_value(&key), second.as_str());
            prop_assert_eq!(md.len(), 1);
        }
    }
}
