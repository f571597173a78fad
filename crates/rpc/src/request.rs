//! Request enum defining every RPC operation.
//!
//! Requests are the instruction set of the store protocol. Each variant is
//! self-contained and serializable so it can travel over the wire as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::types::{BatchOp, BucketConfig, ObjectValue};

/// A self-contained, serializable RPC request.
///
/// # Request Categories
///
/// | Category | Count | Description |
/// |----------|-------|-------------|
/// | Liveness | 2 | `Ping`, `Version` |
/// | Bucket | 5 | Bucket lifecycle |
/// | Object | 3 | Single-object CRUD |
/// | Query | 4 | Streaming find, batch, update-many, delete-many |
/// | Raw | 1 | Raw query passthrough (streaming) |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Request {
    // ==================== Liveness (2) ====================
    /// No-op round trip.
    /// Returns: `Response::Unit`
    Ping,

    /// Server version.
    /// Returns: `Response::Version`
    Version,

    // ==================== Bucket (5) ====================
    /// Create a bucket.
    /// Returns: `Response::Unit`
    CreateBucket { name: String, config: BucketConfig },

    /// Fetch a bucket's schema.
    /// Returns: `Response::Bucket`
    GetBucket { name: String },

    /// List every bucket.
    /// Returns: `Response::Buckets`
    ListBuckets,

    /// Replace a bucket's schema.
    /// Returns: `Response::Unit`
    UpdateBucket { name: String, config: BucketConfig },

    /// Drop a bucket and all its objects.
    /// Returns: `Response::Unit`
    DeleteBucket { name: String },

    // ==================== Object (3) ====================
    /// Write an object, optionally conditional on its current etag.
    /// Returns: `Response::Etag`
    PutObject {
        bucket: String,
        key: String,
        value: ObjectValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        etag: Option<String>,
    },

    /// Read an object.
    /// Returns: `Response::Object`
    GetObject { bucket: String, key: String },

    /// Remove an object.
    /// Returns: `Response::Unit`
    DeleteObject { bucket: String, key: String },

    // ==================== Query (4) ====================
    /// Stream every object matching `filter`.
    /// Streams: `ObjectRecord`; Returns: `Response::Unit`
    FindObjects {
        bucket: String,
        filter: Filter,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },

    /// Apply several writes atomically.
    /// Returns: `Response::Etags`
    Batch { ops: Vec<BatchOp> },

    /// Set `fields` on every object matching `filter`.
    /// Returns: `Response::Count`
    UpdateObjects {
        bucket: String,
        fields: ObjectValue,
        filter: Filter,
    },

    /// Remove every object matching `filter`.
    /// Returns: `Response::Count`
    DeleteMany { bucket: String, filter: Filter },

    // ==================== Raw (1) ====================
    /// Raw query passthrough.
    /// Streams: JSON rows; Returns: `Response::Unit`
    Sql { statement: String },
}

/// Fieldless discriminant of [`Request`], used for logs and whitelists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Ping,
    Version,
    CreateBucket,
    GetBucket,
    ListBuckets,
    UpdateBucket,
    DeleteBucket,
    PutObject,
    GetObject,
    DeleteObject,
    FindObjects,
    Batch,
    UpdateObjects,
    DeleteMany,
    Sql,
}

impl Operation {
    /// Every operation, in protocol order.
    pub const ALL: [Operation; 15] = [
        Operation::Ping,
        Operation::Version,
        Operation::CreateBucket,
        Operation::GetBucket,
        Operation::ListBuckets,
        Operation::UpdateBucket,
        Operation::DeleteBucket,
        Operation::PutObject,
        Operation::GetObject,
        Operation::DeleteObject,
        Operation::FindObjects,
        Operation::Batch,
        Operation::UpdateObjects,
        Operation::DeleteMany,
        Operation::Sql,
    ];

    /// RPC method name.
    pub fn method(self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::Version => "version",
            Operation::CreateBucket => "createBucket",
            Operation::GetBucket => "getBucket",
            Operation::ListBuckets => "listBuckets",
            Operation::UpdateBucket => "updateBucket",
            Operation::DeleteBucket => "deleteBucket",
            Operation::PutObject => "putObject",
            Operation::GetObject => "getObject",
            Operation::DeleteObject => "delObject",
            Operation::FindObjects => "findObjects",
            Operation::Batch => "batch",
            Operation::UpdateObjects => "updateObjects",
            Operation::DeleteMany => "deleteMany",
            Operation::Sql => "sql",
        }
    }

    /// True for operations whose results arrive as a record stream.
    pub fn is_streaming(self) -> bool {
        matches!(self, Operation::FindObjects | Operation::Sql)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl Request {
    /// The operation this request performs.
    pub fn operation(&self) -> Operation {
        match self {
            Request::Ping => Operation::Ping,
            Request::Version => Operation::Version,
            Request::CreateBucket { .. } => Operation::CreateBucket,
            Request::GetBucket { .. } => Operation::GetBucket,
            Request::ListBuckets => Operation::ListBuckets,
            Request::UpdateBucket { .. } => Operation::UpdateBucket,
            Request::DeleteBucket { .. } => Operation::DeleteBucket,
            Request::PutObject { .. } => Operation::PutObject,
            Request::GetObject { .. } => Operation::GetObject,
            Request::DeleteObject { .. } => Operation::DeleteObject,
            Request::FindObjects { .. } => Operation::FindObjects,
            Request::Batch { .. } => Operation::Batch,
            Request::UpdateObjects { .. } => Operation::UpdateObjects,
            Request::DeleteMany { .. } => Operation::DeleteMany,
            Request::Sql { .. } => Operation::Sql,
        }
    }
}
