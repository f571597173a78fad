//! The client contract consumed by the harness.
//!
//! Implementations provide [`StoreClient::call`] plus connection-state
//! observation; every typed operation is derived from `call` and checks that
//! the server answered with the response variant the operation promises.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RpcError;
use crate::filter::Filter;
use crate::request::{Operation, Request};
use crate::response::Response;
use crate::types::{BatchOp, Bucket, BucketConfig, ConnectionState, ObjectRecord, ObjectValue};
use crate::Result;

/// Everything a call produced: streamed records followed by the final response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Streamed rows, in arrival order. Empty for non-streaming operations.
    pub records: Vec<serde_json::Value>,
    /// Final response.
    pub response: Response,
}

impl Reply {
    /// A reply with no streamed records.
    pub fn single(response: Response) -> Self {
        Self {
            records: Vec::new(),
            response,
        }
    }
}

/// A long-lived store client.
///
/// Client identity is stable: one instance is expected to survive backend
/// restarts, reconnecting underneath its callers.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Issue one request and collect its reply.
    async fn call(&self, request: Request) -> Result<Reply>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Wait until the client reaches `target`, or `timeout` elapses.
    ///
    /// Returns `true` if the state was reached.
    async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool;

    /// Close the client. Later calls fail with `ClientClosed`.
    async fn close(&self);

    // ==================== Typed operations ====================

    /// No-op round trip.
    async fn ping(&self) -> Result<()> {
        expect_unit(Operation::Ping, self.call(Request::Ping).await?)
    }

    /// Server version.
    async fn version(&self) -> Result<String> {
        match self.call(Request::Version).await?.response {
            Response::Version(v) => Ok(v),
            other => Err(unexpected(Operation::Version, &other)),
        }
    }

    /// Create a bucket.
    async fn create_bucket(&self, name: &str, config: BucketConfig) -> Result<()> {
        let request = Request::CreateBucket {
            name: name.to_string(),
            config,
        };
        expect_unit(Operation::CreateBucket, self.call(request).await?)
    }

    /// Fetch a bucket.
    async fn get_bucket(&self, name: &str) -> Result<Bucket> {
        let request = Request::GetBucket {
            name: name.to_string(),
        };
        match self.call(request).await?.response {
            Response::Bucket(b) => Ok(b),
            other => Err(unexpected(Operation::GetBucket, &other)),
        }
    }

    /// List every bucket.
    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        match self.call(Request::ListBuckets).await?.response {
            Response::Buckets(b) => Ok(b),
            other => Err(unexpected(Operation::ListBuckets, &other)),
        }
    }

    /// Replace a bucket's schema.
    async fn update_bucket(&self, name: &str, config: BucketConfig) -> Result<()> {
        let request = Request::UpdateBucket {
            name: name.to_string(),
            config,
        };
        expect_unit(Operation::UpdateBucket, self.call(request).await?)
    }

    /// Drop a bucket.
    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let request = Request::DeleteBucket {
            name: name.to_string(),
        };
        expect_unit(Operation::DeleteBucket, self.call(request).await?)
    }

    /// Write an object unconditionally. Returns its new etag.
    async fn put_object(&self, bucket: &str, key: &str, value: ObjectValue) -> Result<String> {
        self.put_object_if(bucket, key, value, None).await
    }

    /// Write an object, failing with `EtagConflict` unless the current etag
    /// equals `etag` (when given).
    async fn put_object_if(
        &self,
        bucket: &str,
        key: &str,
        value: ObjectValue,
        etag: Option<String>,
    ) -> Result<String> {
        let request = Request::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            value,
            etag,
        };
        match self.call(request).await?.response {
            Response::Etag(e) => Ok(e),
            other => Err(unexpected(Operation::PutObject, &other)),
        }
    }

    /// Read an object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        let request = Request::GetObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        match self.call(request).await?.response {
            Response::Object(o) => Ok(o),
            other => Err(unexpected(Operation::GetObject, &other)),
        }
    }

    /// Remove an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let request = Request::DeleteObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        expect_unit(Operation::DeleteObject, self.call(request).await?)
    }

    /// Collect every object matching `filter`.
    async fn find_objects(&self, bucket: &str, filter: Filter) -> Result<Vec<ObjectRecord>> {
        let request = Request::FindObjects {
            bucket: bucket.to_string(),
            filter,
            limit: None,
        };
        let reply = self.call(request).await?;
        if !matches!(reply.response, Response::Unit) {
            return Err(unexpected(Operation::FindObjects, &reply.response));
        }
        reply
            .records
            .into_iter()
            .map(|r| {
                serde_json::from_value(r)
                    .map_err(|e| RpcError::protocol(format!("bad findObjects record: {}", e)))
            })
            .collect()
    }

    /// Apply several writes atomically.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<Option<String>>> {
        match self.call(Request::Batch { ops }).await?.response {
            Response::Etags(e) => Ok(e),
            other => Err(unexpected(Operation::Batch, &other)),
        }
    }

    /// Set `fields` on every matching object. Returns the count updated.
    async fn update_objects(&self, bucket: &str, fields: ObjectValue, filter: Filter) -> Result<u64> {
        let request = Request::UpdateObjects {
            bucket: bucket.to_string(),
            fields,
            filter,
        };
        match self.call(request).await?.response {
            Response::Count(n) => Ok(n),
            other => Err(unexpected(Operation::UpdateObjects, &other)),
        }
    }

    /// Remove every matching object. Returns the count removed.
    async fn delete_many(&self, bucket: &str, filter: Filter) -> Result<u64> {
        let request = Request::DeleteMany {
            bucket: bucket.to_string(),
            filter,
        };
        match self.call(request).await?.response {
            Response::Count(n) => Ok(n),
            other => Err(unexpected(Operation::DeleteMany, &other)),
        }
    }

    /// Raw query passthrough. Returns the streamed rows.
    async fn sql(&self, statement: &str) -> Result<Vec<ObjectValue>> {
        let request = Request::Sql {
            statement: statement.to_string(),
        };
        let reply = self.call(request).await?;
        if !matches!(reply.response, Response::Unit) {
            return Err(unexpected(Operation::Sql, &reply.response));
        }
        reply
            .records
            .into_iter()
            .map(|r| match r {
                serde_json::Value::Object(row) => Ok(row),
                other => Err(RpcError::protocol(format!("bad sql row: {}", other))),
            })
            .collect()
    }
}

fn expect_unit(op: Operation, reply: Reply) -> Result<()> {
    match reply.response {
        Response::Unit => Ok(()),
        other => Err(unexpected(op, &other)),
    }
}

fn unexpected(op: Operation, response: &Response) -> RpcError {
    RpcError::protocol(format!(
        "{} answered with unexpected {} response",
        op,
        response.variant()
    ))
}
