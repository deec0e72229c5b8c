//! Round trip against a running server.
//!
//! Run with `MONGODB_URI=mongodb://localhost:27017 cargo test -p duoshelf-mongodb -- --ignored`.

use bson::{Bson, doc};
use duoshelf_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateDocumentOptions},
    config::StoreConfig,
    error::DocumentStoreError,
    projection::Projection,
    query::{Filter, Query},
    update::Update,
};
use duoshelf_mongodb::MongoStore;
use futures::TryStreamExt;

const COLLECTION: &str = "duoshelf_live_test";

async fn store() -> MongoStore {
    let mut config = StoreConfig::from_env().unwrap();
    config.database = "duoshelf_test".to_string();

    let store = MongoStore::builder().with_config(config).build().await.unwrap();
    store.ping().await.unwrap();
    store.drop_collection(COLLECTION).await.unwrap();
    store
}

#[tokio::test]
#[ignore = "needs a running MongoDB server"]
async fn writes_reads_and_updates() {
    let store = store().await;

    store
        .insert_documents(
            vec![
                doc! { "_id": 1, "id": "one", "tags": ["a"] },
                doc! { "_id": 2, "id": "two", "tags": ["b"] },
            ],
            COLLECTION,
        )
        .await
        .unwrap();

    let duplicate = store.insert_documents(vec![doc! { "_id": 1, "id": "one" }], COLLECTION).await;
    assert!(matches!(duplicate, Err(DocumentStoreError::DuplicateIdentifier(id, _)) if id == "one"));

    let batch = store
        .insert_documents(vec![doc! { "_id": 3, "id": "three" }, doc! { "_id": 2, "id": "two" }], COLLECTION)
        .await;
    assert!(matches!(batch, Err(DocumentStoreError::BatchWrite { .. })));
    assert_eq!(store.count_documents(None, COLLECTION).await.unwrap(), 2);

    let updated = store
        .update_document(
            Filter::eq("_id", 1),
            Update::new().push("tags", "c"),
            UpdateDocumentOptions { projection: Projection::new(), upsert: false },
            COLLECTION,
        )
        .await
        .unwrap();
    assert_eq!(updated, Some(doc! { "id": "one", "tags": ["a", "c"] }));

    let found: Vec<_> = store
        .find_documents(Query::builder().filter(Filter::eq("tags", "c")).build(), Projection::new(), COLLECTION)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let mut tags = store.distinct_values("tags", None, COLLECTION).await.unwrap();
    tags.sort_by_key(|tag| tag.to_string());
    assert_eq!(tags, vec![Bson::from("a"), Bson::from("b"), Bson::from("c")]);

    store.drop_collection(COLLECTION).await.unwrap();
    store.shutdown().await.unwrap();
}
