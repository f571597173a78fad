//! Raw query passthrough

use crate::common::*;
use serde_json::json;

#[tokio::test]
async fn select_one_and_now() {
    let store = TestStore::new().await;
    let rows = store.client.sql("SELECT 1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("?column?"), Some(&json!(1)));

    let rows = store.client.sql("select now();").await.unwrap();
    let now = rows[0].get("now").and_then(|v| v.as_str()).unwrap();
    assert!(chrono_like(now), "{}", now);
    store.stop().await;
}

#[tokio::test]
async fn count_follows_writes() {
    let store = TestStore::with_bucket("Events").await;
    let c = &store.client;
    for n in 0..4 {
        c.put_object("Events", &format!("e{}", n), object(json!({"field1": n})))
            .await
            .unwrap();
    }
    let rows = c.sql("SELECT count(*) FROM Events").await.unwrap();
    assert_eq!(rows[0].get("count"), Some(&json!(4)));

    let err = c.sql("SELECT count(*) FROM Nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BucketNotFound);
    store.stop().await;
}

#[tokio::test]
async fn unsupported_statements_are_invalid() {
    let store = TestStore::new().await;
    for statement in ["DELETE FROM x", "SELECT * FROM", "", "select 2"] {
        let err = store.client.sql(statement).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidQuery, "{:?}", statement);
    }
    store.stop().await;
}

fn chrono_like(stamp: &str) -> bool {
    stamp.len() >= 20 && stamp.contains('T')
}
