//! Every operation against inputs that must fail.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use kvsoak_backend::ServerHandle;
use kvsoak_rpc::{
    object, BatchOp, BucketConfig, ErrorKind, Filter, IndexSpec, IndexType, StoreClient,
};
use kvsoak_transport::RpcClient;

use crate::context::CommandContext;
use crate::error::{Result, StressError};
use crate::registry::CommandSpec;
use crate::scenarios::{expect_error, ScenarioEnv};

/// Bucket created during setup so "already exists" and "wrong etag" have
/// something to collide with.
pub const EXISTING_BUCKET: &str = "sweep_existing";
/// Bucket that is never created.
pub const MISSING_BUCKET: &str = "sweep_missing";
const KEY: &str = "k";

/// One server and client for the life of the run. Each iteration issues
/// every failing call once and requires the documented error kind.
pub struct FailureSweep {
    env: Arc<ScenarioEnv>,
    server: Option<Box<dyn ServerHandle>>,
    client: Option<RpcClient>,
}

impl FailureSweep {
    pub fn new(env: Arc<ScenarioEnv>) -> Self {
        Self {
            env,
            server: None,
            client: None,
        }
    }
}

fn indexed() -> BucketConfig {
    BucketConfig::default().with_index("field1", IndexType::Number)
}

#[async_trait(?Send)]
impl CommandSpec for FailureSweep {
    fn name(&self) -> &str {
        "failure sweep"
    }

    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        let port = self.env.allocate_port()?;
        let server = self.env.backend.start(port).await?;
        let client = RpcClient::connect(self.env.client_for(server.port()));
        client.create_bucket(EXISTING_BUCKET, indexed()).await?;
        client
            .put_object(EXISTING_BUCKET, KEY, object(json!({ "field1": 1 })))
            .await?;
        self.server = Some(server);
        self.client = Some(client);
        Ok(())
    }

    async fn exec(&mut self, _ctx: &CommandContext) -> Result<()> {
        use ErrorKind::*;

        let (Some(_server), Some(c)) = (self.server.as_ref(), self.client.as_ref()) else {
            return Err(StressError::assertion("server and client not set up"));
        };

        // Buckets
        expect_error("getBucket", c.get_bucket(MISSING_BUCKET).await, &[BucketNotFound])?;
        expect_error(
            "updateBucket",
            c.update_bucket(MISSING_BUCKET, indexed()).await,
            &[BucketNotFound],
        )?;
        expect_error("delBucket", c.delete_bucket(MISSING_BUCKET).await, &[BucketNotFound])?;
        expect_error(
            "createBucket",
            c.create_bucket("9 is not a name!", BucketConfig::default()).await,
            &[InvalidBucketName],
        )?;
        let mut bad_index = BucketConfig::default();
        bad_index.index.insert(
            "field1".to_string(),
            IndexSpec {
                kind: "blob".to_string(),
                unique: false,
            },
        );
        expect_error(
            "createBucket",
            c.create_bucket("sweep_bad_index", bad_index).await,
            &[InvalidBucketConfig],
        )?;
        expect_error(
            "createBucket",
            c.create_bucket(EXISTING_BUCKET, indexed()).await,
            &[BucketExists],
        )?;

        // Objects
        expect_error(
            "putObject",
            c.put_object(MISSING_BUCKET, KEY, object(json!({ "field1": 1 }))).await,
            &[BucketNotFound],
        )?;
        expect_error("getObject", c.get_object(MISSING_BUCKET, KEY).await, &[BucketNotFound])?;
        expect_error(
            "getObject",
            c.get_object(EXISTING_BUCKET, "missing").await,
            &[ObjectNotFound],
        )?;
        expect_error(
            "delObject",
            c.delete_object(EXISTING_BUCKET, "missing").await,
            &[ObjectNotFound],
        )?;
        expect_error(
            "putObject",
            c.put_object_if(
                EXISTING_BUCKET,
                KEY,
                object(json!({ "field1": 2 })),
                Some("not-the-etag".to_string()),
            )
            .await,
            &[EtagConflict],
        )?;

        // Queries
        expect_error(
            "findObjects",
            c.find_objects(MISSING_BUCKET, Filter::equal("field1", 1)).await,
            &[BucketNotFound],
        )?;
        expect_error(
            "findObjects",
            c.find_objects(EXISTING_BUCKET, Filter::equal("unindexed", 1)).await,
            &[InvalidQuery],
        )?;
        expect_error(
            "batch",
            c.batch(vec![BatchOp::Delete {
                bucket: MISSING_BUCKET.to_string(),
                key: KEY.to_string(),
            }])
            .await,
            &[BucketNotFound],
        )?;
        expect_error(
            "updateObjects",
            c.update_objects(
                MISSING_BUCKET,
                object(json!({ "field2": "x" })),
                Filter::ge("field1", 0),
            )
            .await,
            &[BucketNotFound],
        )?;
        expect_error(
            "deleteMany",
            c.delete_many(MISSING_BUCKET, Filter::ge("field1", 0)).await,
            &[BucketNotFound],
        )?;
        expect_error("sql", c.sql("DROP TABLE everything").await, &[InvalidQuery])?;
        Ok(())
    }
}
