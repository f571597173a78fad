//! In-memory bucket/object store.
//!
//! `MemoryStore` is a stateful dispatcher: it routes each [`Request`] to the
//! matching handler and converts the outcome into a [`Reply`]. It backs the
//! loopback server so the harness can exercise every store code path without
//! an external deployment.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;
use xxhash_rust::xxh3::xxh3_64;

use kvsoak_rpc::{
    BatchOp, Bucket, BucketConfig, ErrorKind, Filter, ObjectRecord, ObjectValue, Reply, Request,
    Response, Result, RpcError,
};

/// Longest accepted bucket name.
pub const MAX_BUCKET_NAME_LEN: usize = 63;

#[derive(Debug, Clone)]
struct StoredObject {
    value: ObjectValue,
    etag: String,
    mtime: i64,
}

#[derive(Debug, Clone)]
struct BucketState {
    config: BucketConfig,
    mtime: i64,
    objects: BTreeMap<String, StoredObject>,
}

/// An in-memory store executing requests one at a time.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    version: String,
    buckets: BTreeMap<String, BucketState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store reporting this crate's version.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            buckets: BTreeMap::new(),
        }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Execute a single request.
    pub fn execute(&mut self, request: Request) -> Result<Reply> {
        match request {
            Request::Ping => Ok(Reply::single(Response::Unit)),
            Request::Version => Ok(Reply::single(Response::Version(self.version.clone()))),

            // Bucket requests
            Request::CreateBucket { name, config } => self.create_bucket(name, config),
            Request::GetBucket { name } => {
                let bucket = self.bucket(&name)?;
                Ok(Reply::single(Response::Bucket(describe(&name, bucket))))
            }
            Request::ListBuckets => {
                let buckets = self
                    .buckets
                    .iter()
                    .map(|(name, state)| describe(name, state))
                    .collect();
                Ok(Reply::single(Response::Buckets(buckets)))
            }
            Request::UpdateBucket { name, config } => self.update_bucket(name, config),
            Request::DeleteBucket { name } => {
                if self.buckets.remove(&name).is_none() {
                    return Err(RpcError::bucket_not_found(&name));
                }
                Ok(Reply::single(Response::Unit))
            }

            // Object requests
            Request::PutObject {
                bucket,
                key,
                value,
                etag,
            } => {
                let etag = put(self.bucket_mut(&bucket)?, &bucket, key, value, etag)?;
                Ok(Reply::single(Response::Etag(etag)))
            }
            Request::GetObject { bucket, key } => {
                let state = self.bucket(&bucket)?;
                let object = state
                    .objects
                    .get(&key)
                    .ok_or_else(|| RpcError::object_not_found(&bucket, &key))?;
                Ok(Reply::single(Response::Object(record(&bucket, &key, object))))
            }
            Request::DeleteObject { bucket, key } => {
                let state = self.bucket_mut(&bucket)?;
                if state.objects.remove(&key).is_none() {
                    return Err(RpcError::object_not_found(&bucket, &key));
                }
                Ok(Reply::single(Response::Unit))
            }

            // Query requests
            Request::FindObjects {
                bucket,
                filter,
                limit,
            } => self.find_objects(bucket, filter, limit),
            Request::Batch { ops } => self.batch(ops),
            Request::UpdateObjects {
                bucket,
                fields,
                filter,
            } => {
                let state = self.bucket_mut(&bucket)?;
                let n = update_matching(state, &fields, &filter)?;
                Ok(Reply::single(Response::Count(n)))
            }
            Request::DeleteMany { bucket, filter } => {
                let state = self.bucket_mut(&bucket)?;
                let n = delete_matching(state, &filter)?;
                Ok(Reply::single(Response::Count(n)))
            }

            // Raw requests
            Request::Sql { statement } => self.sql(&statement),
        }
    }

    fn bucket(&self, name: &str) -> Result<&BucketState> {
        self.buckets
            .get(name)
            .ok_or_else(|| RpcError::bucket_not_found(name))
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut BucketState> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| RpcError::bucket_not_found(name))
    }

    fn create_bucket(&mut self, name: String, config: BucketConfig) -> Result<Reply> {
        validate_bucket_name(&name)?;
        validate_config(&config)?;
        if self.buckets.contains_key(&name) {
            return Err(RpcError::new(
                ErrorKind::BucketExists,
                format!("{} already exists", name),
            ));
        }
        self.buckets.insert(
            name,
            BucketState {
                config,
                mtime: now_ms(),
                objects: BTreeMap::new(),
            },
        );
        Ok(Reply::single(Response::Unit))
    }

    fn update_bucket(&mut self, name: String, config: BucketConfig) -> Result<Reply> {
        validate_bucket_name(&name)?;
        validate_config(&config)?;
        let state = self.bucket_mut(&name)?;
        state.config = config;
        state.mtime = now_ms();
        Ok(Reply::single(Response::Unit))
    }

    fn find_objects(&self, bucket: String, filter: Filter, limit: Option<u64>) -> Result<Reply> {
        let state = self.bucket(&bucket)?;
        check_filter(state, &filter)?;
        let limit = limit.unwrap_or(u64::MAX) as usize;
        let records = state
            .objects
            .iter()
            .filter(|(_, object)| filter.matches(&object.value))
            .take(limit)
            .map(|(key, object)| {
                serde_json::to_value(record(&bucket, key, object))
                    .map_err(|e| RpcError::new(ErrorKind::Internal, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Reply {
            records,
            response: Response::Unit,
        })
    }

    // Steps run against a scratch copy that replaces the live state only if
    // every step succeeds.
    fn batch(&mut self, ops: Vec<BatchOp>) -> Result<Reply> {
        let mut scratch = self.buckets.clone();
        let mut etags = Vec::with_capacity(ops.len());
        for op in ops {
            let name = op.bucket().to_string();
            let state = scratch
                .get_mut(&name)
                .ok_or_else(|| RpcError::bucket_not_found(&name))?;
            let etag = match op {
                BatchOp::Put { key, value, .. } => Some(put(state, &name, key, value, None)?),
                BatchOp::Delete { key, .. } => {
                    if state.objects.remove(&key).is_none() {
                        return Err(RpcError::object_not_found(&name, &key));
                    }
                    None
                }
                BatchOp::Update { fields, filter, .. } => {
                    update_matching(state, &fields, &filter)?;
                    None
                }
                BatchOp::DeleteMany { filter, .. } => {
                    delete_matching(state, &filter)?;
                    None
                }
            };
            etags.push(etag);
        }
        self.buckets = scratch;
        Ok(Reply::single(Response::Etags(etags)))
    }

    fn sql(&self, statement: &str) -> Result<Reply> {
        let tokens: Vec<&str> = statement
            .trim()
            .trim_end_matches(';')
            .split_whitespace()
            .collect();
        let keywords: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();

        let row = match keywords.as_slice() {
            ["select", "1"] => json!({ "?column?": 1 }),
            ["select", "now()"] => json!({ "now": Utc::now().to_rfc3339() }),
            // Bucket names are case-sensitive, so the name keeps its spelling.
            ["select", "count(*)", "from", _] => {
                let state = self.bucket(tokens[3])?;
                json!({ "count": state.objects.len() })
            }
            _ => {
                return Err(RpcError::invalid_query(format!(
                    "unsupported statement: {}",
                    statement
                )));
            }
        };

        Ok(Reply {
            records: vec![row],
            response: Response::Unit,
        })
    }
}

/// Check a bucket name: a letter followed by up to 62 letters, digits or
/// underscores.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && name.len() <= MAX_BUCKET_NAME_LEN
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RpcError::new(
            ErrorKind::InvalidBucketName,
            format!("{:?} is not a valid bucket name", name),
        ))
    }
}

fn validate_config(config: &BucketConfig) -> Result<()> {
    for (field, spec) in &config.index {
        if field.is_empty() {
            return Err(RpcError::new(
                ErrorKind::InvalidBucketConfig,
                "index field name is empty",
            ));
        }
        if spec.index_type().is_none() {
            return Err(RpcError::new(
                ErrorKind::InvalidBucketConfig,
                format!("index {} has unsupported type {:?}", field, spec.kind),
            ));
        }
    }
    Ok(())
}

fn check_filter(state: &BucketState, filter: &Filter) -> Result<()> {
    filter.validate().map_err(RpcError::invalid_query)?;
    for field in filter.fields() {
        if !state.config.index.contains_key(field) {
            return Err(RpcError::invalid_query(format!(
                "{} is not an indexed field",
                field
            )));
        }
    }
    Ok(())
}

fn put(
    state: &mut BucketState,
    bucket: &str,
    key: String,
    value: ObjectValue,
    expected_etag: Option<String>,
) -> Result<String> {
    if let Some(expected) = expected_etag {
        let current = state.objects.get(&key).map(|o| o.etag.as_str());
        if current != Some(expected.as_str()) {
            return Err(RpcError::new(
                ErrorKind::EtagConflict,
                format!(
                    "{}::{} has etag {:?}, expected {:?}",
                    bucket, key, current, expected
                ),
            ));
        }
    }
    let etag = etag_of(&value);
    state.objects.insert(
        key,
        StoredObject {
            value,
            etag: etag.clone(),
            mtime: now_ms(),
        },
    );
    Ok(etag)
}

fn update_matching(state: &mut BucketState, fields: &ObjectValue, filter: &Filter) -> Result<u64> {
    check_filter(state, filter)?;
    let mut count = 0;
    let now = now_ms();
    for object in state.objects.values_mut() {
        if filter.matches(&object.value) {
            for (field, value) in fields {
                object.value.insert(field.clone(), value.clone());
            }
            object.etag = etag_of(&object.value);
            object.mtime = now;
            count += 1;
        }
    }
    Ok(count)
}

fn delete_matching(state: &mut BucketState, filter: &Filter) -> Result<u64> {
    check_filter(state, filter)?;
    let before = state.objects.len();
    state.objects.retain(|_, object| !filter.matches(&object.value));
    Ok((before - state.objects.len()) as u64)
}

fn describe(name: &str, state: &BucketState) -> Bucket {
    Bucket {
        name: name.to_string(),
        config: state.config.clone(),
        mtime: state.mtime,
    }
}

fn record(bucket: &str, key: &str, object: &StoredObject) -> ObjectRecord {
    ObjectRecord {
        bucket: bucket.to_string(),
        key: key.to_string(),
        value: object.value.clone(),
        etag: object.etag.clone(),
        mtime: object.mtime,
    }
}

// XXH3 of the canonical JSON encoding; stable across builds and releases.
fn etag_of(value: &ObjectValue) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    format!("{:016X}", xxh3_64(&bytes))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
