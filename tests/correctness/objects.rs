//! Object CRUD and queries

use crate::common::*;
use serde_json::json;

#[tokio::test]
async fn put_get_delete() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;

    let etag = c
        .put_object("b", "k", object(json!({"field1": 5})))
        .await
        .unwrap();
    let record = c.get_object("b", "k").await.unwrap();
    assert_eq!(record.bucket, "b");
    assert_eq!(record.key, "k");
    assert_eq!(record.value, object(json!({"field1": 5})));
    assert_eq!(record.etag, etag);

    c.delete_object("b", "k").await.unwrap();
    assert_eq!(
        c.get_object("b", "k").await.unwrap_err().kind,
        ErrorKind::ObjectNotFound
    );
    store.stop().await;
}

#[tokio::test]
async fn overwrite_changes_etag() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;
    let first = c
        .put_object("b", "k", object(json!({"field1": 1})))
        .await
        .unwrap();
    let second = c
        .put_object_if("b", "k", object(json!({"field1": 2})), Some(first.clone()))
        .await
        .unwrap();
    assert_ne!(first, second);

    // The old etag is stale now.
    let err = c
        .put_object_if("b", "k", object(json!({"field1": 3})), Some(first))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::EtagConflict);
    assert_eq!(
        c.get_object("b", "k").await.unwrap().value,
        object(json!({"field1": 2}))
    );
    store.stop().await;
}

#[tokio::test]
async fn find_with_filters() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;
    for n in 1..=12 {
        c.put_object("b", &format!("k{:02}", n), object(json!({"field1": n})))
            .await
            .unwrap();
    }

    let in_range = c
        .find_objects("b", Filter::range("field1", 6, 10))
        .await
        .unwrap();
    assert_eq!(in_range.len(), 5);

    let exact = c
        .find_objects("b", Filter::equal("field1", 12))
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].key, "k12");

    let none = c
        .find_objects("b", Filter::ge("field1", 100))
        .await
        .unwrap();
    assert!(none.is_empty());
    store.stop().await;
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;

    let etags = c
        .batch(vec![
            BatchOp::Put {
                bucket: "b".into(),
                key: "a".into(),
                value: object(json!({"field1": 1})),
            },
            BatchOp::Put {
                bucket: "b".into(),
                key: "b".into(),
                value: object(json!({"field1": 2})),
            },
            BatchOp::Delete {
                bucket: "b".into(),
                key: "a".into(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(etags.len(), 3);
    assert!(etags[0].is_some() && etags[1].is_some() && etags[2].is_none());

    let err = c
        .batch(vec![
            BatchOp::Put {
                bucket: "b".into(),
                key: "c".into(),
                value: object(json!({"field1": 3})),
            },
            BatchOp::Put {
                bucket: "missing".into(),
                key: "d".into(),
                value: object(json!({"field1": 4})),
            },
        ])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::BucketNotFound);
    assert_eq!(
        c.get_object("b", "c").await.unwrap_err().kind,
        ErrorKind::ObjectNotFound
    );
    store.stop().await;
}

#[tokio::test]
async fn update_and_delete_many() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;
    for n in 1..=10 {
        c.put_object("b", &format!("k{}", n), object(json!({"field1": n})))
            .await
            .unwrap();
    }

    let updated = c
        .update_objects("b", object(json!({"tag": "hot"})), Filter::ge("field1", 8))
        .await
        .unwrap();
    assert_eq!(updated, 3);
    let record = c.get_object("b", "k9").await.unwrap();
    assert_eq!(record.value.get("tag"), Some(&json!("hot")));
    assert_eq!(record.value.get("field1"), Some(&json!(9)));

    let deleted = c.delete_many("b", Filter::le("field1", 4)).await.unwrap();
    assert_eq!(deleted, 4);
    let left = c.find_objects("b", Filter::ge("field1", 0)).await.unwrap();
    assert_eq!(left.len(), 6);
    store.stop().await;
}
