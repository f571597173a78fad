//! Every operation with valid inputs, each step building on the last.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use kvsoak_backend::ServerHandle;
use kvsoak_rpc::{object, BatchOp, BucketConfig, ErrorKind, Filter, IndexType, StoreClient};
use kvsoak_transport::RpcClient;

use crate::context::CommandContext;
use crate::error::{ensure, Result, StressError};
use crate::registry::CommandSpec;
use crate::scenarios::{expect_error, ScenarioEnv};

/// Objects written by the batch step: `k1..=k10` with `field1 = n`.
const BATCH_SIZE: i64 = 10;

/// One server and client for the life of the run. Each iteration works in a
/// fresh bucket and deletes it at the end, so no iteration sees another's
/// data.
pub struct SuccessSweep {
    env: Arc<ScenarioEnv>,
    server: Option<Box<dyn ServerHandle>>,
    client: Option<RpcClient>,
}

impl SuccessSweep {
    pub fn new(env: Arc<ScenarioEnv>) -> Self {
        Self {
            env,
            server: None,
            client: None,
        }
    }
}

#[async_trait(?Send)]
impl CommandSpec for SuccessSweep {
    fn name(&self) -> &str {
        "success sweep"
    }

    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        let port = self.env.allocate_port()?;
        let server = self.env.backend.start(port).await?;
        self.client = Some(RpcClient::connect(self.env.client_for(server.port())));
        self.server = Some(server);
        Ok(())
    }

    async fn exec(&mut self, _ctx: &CommandContext) -> Result<()> {
        let (Some(_server), Some(client)) = (self.server.as_ref(), self.client.as_ref()) else {
            return Err(StressError::assertion("server and client not set up"));
        };
        let bucket = format!("soak_{}", Uuid::new_v4().simple());
        run_success_sweep(client, &bucket).await
    }
}

/// create, read, list, update, write, batch-write, query, update-many,
/// delete-many, delete, ping, version, raw query, then drop the bucket.
pub async fn run_success_sweep(c: &dyn StoreClient, bucket: &str) -> Result<()> {
    let config = BucketConfig::default().with_index("field1", IndexType::Number);
    c.create_bucket(bucket, config.clone()).await?;

    let read = c.get_bucket(bucket).await?;
    ensure(read.name == bucket && read.config == config, || {
        format!("getBucket returned {:?}", read)
    })?;

    let listed = c.list_buckets().await?;
    ensure(listed.iter().any(|b| b.name == bucket), || {
        format!("{} missing from listBuckets", bucket)
    })?;

    let updated = config.with_version(2);
    c.update_bucket(bucket, updated.clone()).await?;
    let read = c.get_bucket(bucket).await?;
    ensure(read.config == updated, || {
        format!("updateBucket not reflected: {:?}", read.config)
    })?;

    let value = object(json!({ "field1": 5 }));
    let etag = c.put_object(bucket, "k", value.clone()).await?;
    let record = c.get_object(bucket, "k").await?;
    ensure(record.value == value && record.etag == etag, || {
        format!("getObject returned {:?}, expected {:?} ({})", record.value, value, etag)
    })?;

    let ops = (1..=BATCH_SIZE)
        .map(|n| BatchOp::Put {
            bucket: bucket.to_string(),
            key: format!("k{}", n),
            value: object(json!({ "field1": n })),
        })
        .collect();
    let etags = c.batch(ops).await?;
    ensure(
        etags.len() == BATCH_SIZE as usize && etags.iter().all(Option::is_some),
        || format!("batch returned {:?}", etags),
    )?;

    let found = c.find_objects(bucket, Filter::range("field1", 6, 10)).await?;
    let mut keys: Vec<&str> = found.iter().map(|r| r.key.as_str()).collect();
    keys.sort_unstable();
    ensure(keys == ["k10", "k6", "k7", "k8", "k9"], || {
        format!("range query returned {:?}", keys)
    })?;

    let n = c
        .update_objects(
            bucket,
            object(json!({ "field2": "updated" })),
            Filter::ge("field1", 6),
        )
        .await?;
    ensure(n == 5, || format!("updateObjects touched {} objects, expected 5", n))?;
    let record = c.get_object(bucket, "k7").await?;
    ensure(record.value.get("field2") == Some(&json!("updated")), || {
        format!("k7 after update is {:?}", record.value)
    })?;

    let n = c.delete_many(bucket, Filter::le("field1", 3)).await?;
    ensure(n == 3, || format!("deleteMany removed {} objects, expected 3", n))?;

    c.delete_object(bucket, "k").await?;
    expect_error("getObject", c.get_object(bucket, "k").await, &[ErrorKind::ObjectNotFound])?;

    c.ping().await?;
    let version = c.version().await?;
    ensure(!version.is_empty(), || "empty version string".to_string())?;

    // k4..k10 remain.
    let rows = c.sql(&format!("SELECT count(*) FROM {}", bucket)).await?;
    ensure(
        rows.len() == 1 && rows[0].get("count") == Some(&json!(7)),
        || format!("count query returned {:?}", rows),
    )?;

    c.delete_bucket(bucket).await?;
    expect_error("getBucket", c.get_bucket(bucket).await, &[ErrorKind::BucketNotFound])?;
    Ok(())
}
