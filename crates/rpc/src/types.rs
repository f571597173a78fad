//! Types shared by requests and responses.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// An object's value: a JSON map of fields.
pub type ObjectValue = serde_json::Map<String, serde_json::Value>;

/// Type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// UTF-8 string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
}

impl IndexType {
    /// True if `value` can be stored under an index of this type.
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            IndexType::String => value.is_string(),
            IndexType::Number => value.is_number(),
            IndexType::Boolean => value.is_boolean(),
        }
    }
}

/// Definition of one indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Declared type, kept as a raw string so servers can reject unknown types.
    #[serde(rename = "type")]
    pub kind: String,
    /// Reject duplicate values when set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexSpec {
    /// Index of the given type.
    pub fn of(kind: IndexType) -> Self {
        let kind = match kind {
            IndexType::String => "string",
            IndexType::Number => "number",
            IndexType::Boolean => "boolean",
        };
        Self {
            kind: kind.to_string(),
            unique: false,
        }
    }

    /// Parse the declared type.
    pub fn index_type(&self) -> Option<IndexType> {
        match self.kind.as_str() {
            "string" => Some(IndexType::String),
            "number" => Some(IndexType::Number),
            "boolean" => Some(IndexType::Boolean),
            _ => None,
        }
    }
}

/// Bucket schema: indexed fields plus an options version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Indexed fields by name.
    #[serde(default)]
    pub index: BTreeMap<String, IndexSpec>,
    /// Schema version, bumped on update.
    #[serde(default)]
    pub version: u32,
}

impl BucketConfig {
    /// Add an indexed field.
    pub fn with_index(mut self, field: impl Into<String>, kind: IndexType) -> Self {
        self.index.insert(field.into(), IndexSpec::of(kind));
        self
    }

    /// Set the options version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// A bucket as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket name.
    pub name: String,
    /// Current schema.
    pub config: BucketConfig,
    /// Creation time, milliseconds since the Unix epoch.
    pub mtime: i64,
}

/// An object as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Owning bucket.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Stored value.
    pub value: ObjectValue,
    /// Content hash of `value`, hex encoded.
    pub etag: String,
    /// Last modification time, milliseconds since the Unix epoch.
    pub mtime: i64,
}

/// One step of a batch request. Steps apply in order, all or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Write `value` under `key`.
    Put {
        bucket: String,
        key: String,
        value: ObjectValue,
    },
    /// Remove `key`.
    Delete { bucket: String, key: String },
    /// Set `fields` on every object matching `filter`.
    Update {
        bucket: String,
        fields: ObjectValue,
        filter: Filter,
    },
    /// Remove every object matching `filter`.
    DeleteMany { bucket: String, filter: Filter },
}

impl BatchOp {
    /// Bucket the step targets.
    pub fn bucket(&self) -> &str {
        match self {
            BatchOp::Put { bucket, .. }
            | BatchOp::Delete { bucket, .. }
            | BatchOp::Update { bucket, .. }
            | BatchOp::DeleteMany { bucket, .. } => bucket,
        }
    }
}

/// Connection state of a long-lived client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// A backend connection is established.
    Connected,
    /// The last connection attempt failed or the connection dropped.
    Unavailable,
    /// `close()` was called; terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Unavailable => "unavailable",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Build an [`ObjectValue`] from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty map.
pub fn object(value: serde_json::Value) -> ObjectValue {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ObjectValue::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_spec_parses_known_types() {
        assert_eq!(IndexSpec::of(IndexType::Number).index_type(), Some(IndexType::Number));
        let bogus = IndexSpec {
            kind: "blob".into(),
            unique: false,
        };
        assert_eq!(bogus.index_type(), None);
    }

    #[test]
    fn index_type_accepts_matching_json() {
        assert!(IndexType::Number.accepts(&json!(5)));
        assert!(!IndexType::Number.accepts(&json!("5")));
        assert!(IndexType::Boolean.accepts(&json!(true)));
        assert!(IndexType::String.accepts(&json!("x")));
    }

    #[test]
    fn bucket_config_serializes_index_type_field() {
        let config = BucketConfig::default().with_index("field1", IndexType::Number);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["index"]["field1"]["type"], "number");
        assert!(json["index"]["field1"].get("unique").is_none());
    }

    #[test]
    fn object_helper_ignores_non_objects() {
        assert!(object(json!(5)).is_empty());
        assert_eq!(object(json!({"a": 1})).len(), 1);
    }
}
