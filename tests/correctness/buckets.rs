//! Bucket CRUD

use crate::common::*;

#[tokio::test]
async fn create_get_list_delete() {
    let store = TestStore::new().await;
    let c = &store.client;
    let config = BucketConfig::default().with_index("field1", IndexType::Number);

    c.create_bucket("users", config.clone()).await.unwrap();
    c.create_bucket("orders", BucketConfig::default()).await.unwrap();

    let bucket = c.get_bucket("users").await.unwrap();
    assert_eq!(bucket.name, "users");
    assert_eq!(bucket.config, config);
    assert!(bucket.mtime > 0);

    let names: Vec<String> = c
        .list_buckets()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(names, vec!["orders", "users"]);

    c.delete_bucket("users").await.unwrap();
    let err = c.get_bucket("users").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BucketNotFound);
    store.stop().await;
}

#[tokio::test]
async fn update_replaces_config() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;
    let config = BucketConfig::default()
        .with_index("field1", IndexType::Number)
        .with_index("name", IndexType::String)
        .with_version(3);
    c.update_bucket("b", config.clone()).await.unwrap();
    assert_eq!(c.get_bucket("b").await.unwrap().config, config);
    store.stop().await;
}

#[tokio::test]
async fn invalid_names_and_duplicates() {
    let store = TestStore::with_bucket("b").await;
    let c = &store.client;
    let long = "x".repeat(64);
    for bad in ["", "1abc", "has space", "dash-ed", long.as_str()] {
        let err = c
            .create_bucket(bad, BucketConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBucketName, "{:?}", bad);
    }
    let err = c
        .create_bucket("b", BucketConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::BucketExists);
    store.stop().await;
}

#[tokio::test]
async fn missing_bucket_operations() {
    let store = TestStore::new().await;
    let c = &store.client;
    assert_eq!(
        c.update_bucket("nope", BucketConfig::default())
            .await
            .unwrap_err()
            .kind,
        ErrorKind::BucketNotFound
    );
    assert_eq!(
        c.delete_bucket("nope").await.unwrap_err().kind,
        ErrorKind::BucketNotFound
    );
    store.stop().await;
}
