use fieldreg_store::{MemoryRemoteStore, RemoteStore, StoreError};
use serde_json::json;

#[tokio::test]
async fn add_then_get_all_and_query() {
    let store = MemoryRemoteStore::new();
    store
        .add("voters", json!({"national_id": "111", "name": "A"}))
        .await
        .unwrap();
    store
        .add("voters", json!({"national_id": "222", "name": "B"}))
        .await
        .unwrap();

    let all = store.get_all("voters").await.unwrap();
    assert_eq!(all.len(), 2);

    let hits = store
        .query("voters", "national_id", &json!("222"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].data["name"], json!("B"));

    let misses = store
        .query("voters", "national_id", &json!("333"))
        .await
        .unwrap();
    assert!(misses.is_empty());
}

#[tokio::test]
async fn get_all_on_unknown_collection_is_empty() {
    let store = MemoryRemoteStore::new();
    assert!(store.get_all("voters").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_merges_top_level_fields() {
    let store = MemoryRemoteStore::new();
    let doc = store
        .add("voters", json!({"national_id": "111", "voted": false}))
        .await
        .unwrap();

    store
        .update("voters", &doc.id, json!({"voted": true}))
        .await
        .unwrap();

    let all = store.get_all("voters").await.unwrap();
    assert_eq!(all[0].data["voted"], json!(true));
    assert_eq!(all[0].data["national_id"], json!("111"));
}

#[tokio::test]
async fn update_rejects_non_object_patch() {
    let store = MemoryRemoteStore::new();
    let doc = store.add("voters", json!({})).await.unwrap();
    let err = store
        .update("voters", &doc.id, json!("not an object"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[tokio::test]
async fn update_missing_doc_is_not_found() {
    let store = MemoryRemoteStore::new();
    store.add("voters", json!({})).await.unwrap();
    let err = store
        .update("voters", "missing", json!({"x": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_document() {
    let store = MemoryRemoteStore::new();
    let doc = store.add("voters", json!({"national_id": "111"})).await.unwrap();
    store.delete("voters", &doc.id).await.unwrap();
    assert_eq!(store.doc_count("voters"), 0);
}

#[tokio::test]
async fn offline_fails_every_operation() {
    let store = MemoryRemoteStore::new();
    store.set_online(false);

    let err = store.get_all("voters").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(err.is_transient());

    let err = store.add("voters", json!({})).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    store.set_online(true);
    store.add("voters", json!({})).await.unwrap();
}

#[tokio::test]
async fn fail_next_recovers_after_n_operations() {
    let store = MemoryRemoteStore::new();
    store.fail_next(2);

    assert!(store.get_all("voters").await.is_err());
    assert!(store.add("voters", json!({})).await.is_err());
    assert!(store.get_all("voters").await.is_ok());
}

#[tokio::test]
async fn subscription_delivers_initial_then_changes() {
    let store = MemoryRemoteStore::new();
    store.add("voters", json!({"national_id": "111"})).await.unwrap();

    let mut sub = store.subscribe("voters").await.unwrap();
    let initial = sub.recv().await.unwrap();
    assert_eq!(initial.seq, 1);
    assert_eq!(initial.docs.len(), 1);

    store.add("voters", json!({"national_id": "222"})).await.unwrap();
    let next = sub.recv().await.unwrap();
    assert_eq!(next.seq, 2);
    assert_eq!(next.docs.len(), 2);
}

#[tokio::test]
async fn snapshot_seq_is_monotonic_per_collection() {
    let store = MemoryRemoteStore::new();
    let mut sub = store.subscribe("voters").await.unwrap();
    // The empty initial snapshot carries seq 0.
    assert_eq!(sub.recv().await.unwrap().seq, 0);

    // Writes to other collections do not advance this one's seq.
    store.add("other", json!({})).await.unwrap();
    store.add("voters", json!({})).await.unwrap();
    let doc = store.add("voters", json!({})).await.unwrap();
    store.delete("voters", &doc.id).await.unwrap();

    assert_eq!(sub.recv().await.unwrap().seq, 1);
    assert_eq!(sub.recv().await.unwrap().seq, 2);
    assert_eq!(sub.recv().await.unwrap().seq, 3);
}
