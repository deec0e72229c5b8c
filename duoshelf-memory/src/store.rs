//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that stores documents as BSON
//! documents in insertion order, guarded by an async-safe read-write lock.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use tracing::debug;

use duoshelf_core::{
    backend::{RawDocumentStream, StoreBackend, StoreBackendBuilder, UpdateDocumentOptions, UpdateResult},
    document::{ID, PRIMARY_KEY},
    error::{BatchFailure, DocumentStoreError, DocumentStoreResult},
    projection::Projection,
    query::{Expr, Query, Sort, SortDirection},
    update::Update,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, unwind, values_at},
    update::{apply, set_path},
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// Every write holds the write lock for its whole duration, so each operation is atomic.
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use duoshelf_memory::InMemoryStore;
/// use duoshelf_core::client::Client;
///
/// let client = Client::connect(InMemoryStore::builder()).await?;
/// let heroes = client.register_collection::<Hero>(None).await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn primary_key(document: &Document) -> DocumentStoreResult<&Bson> {
    document
        .get(PRIMARY_KEY)
        .ok_or_else(|| DocumentStoreError::Serialization("document has no _id".to_string()))
}

/// The caller-facing id for error messages.
fn display_id(document: &Document) -> String {
    match (document.get_str(ID), document.get(PRIMARY_KEY)) {
        (Ok(id), _) => id.to_string(),
        (Err(_), Some(key)) => key.to_string(),
        (Err(_), None) => "<unknown>".to_string(),
    }
}

fn same_key(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

fn sort_documents(documents: &mut [&Document], sort: &[Sort]) {
    documents.sort_by(|a, b| {
        for key in sort {
            let left = values_at(a, &key.field);
            let right = values_at(b, &key.field);
            let left = left.first().map(|v| Comparable::from(*v)).unwrap_or(Comparable::Null);
            let right = right.first().map(|v| Comparable::from(*v)).unwrap_or(Comparable::Null);

            let ordering = match key.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

fn project(mut document: Document, projection: &Projection) -> Document {
    projection.apply(&mut document);
    document
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let existing = store.entry(collection.to_string()).or_default();

        let mut failures = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            let key = primary_key(document)?;

            let taken = existing.iter().any(|other| other.get(PRIMARY_KEY).is_some_and(|k| same_key(k, key)))
                || documents[..index]
                    .iter()
                    .any(|other| other.get(PRIMARY_KEY).is_some_and(|k| same_key(k, key)));

            if taken {
                failures.push(BatchFailure {
                    index,
                    message: format!("duplicate id {}", display_id(document)),
                });
            }
        }

        match failures.len() {
            0 => {
                debug!(collection, count = documents.len(), "stored documents");
                existing.extend(documents);
                Ok(())
            }
            _ if documents.len() == 1 => Err(DocumentStoreError::DuplicateIdentifier(
                display_id(&documents[0]),
                collection.to_string(),
            )),
            _ => Err(DocumentStoreError::BatchWrite { collection: collection.to_string(), failures }),
        }
    }

    async fn find_documents(
        &self,
        query: Query,
        projection: Projection,
        collection: &str,
    ) -> DocumentStoreResult<RawDocumentStream> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(stream::empty().boxed());
        };

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        // Only the requested window is cloned out of the store.
        let window: Vec<Document> = if query.sort.is_empty() {
            let mut window = Vec::new();
            let mut skipped = 0;
            for document in documents {
                if window.len() >= limit {
                    break;
                }
                if !DocumentEvaluator::matches(document, query.filter.as_ref())? {
                    continue;
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                window.push(document.clone());
            }
            window
        } else {
            let mut matched = Vec::new();
            for document in documents {
                if DocumentEvaluator::matches(document, query.filter.as_ref())? {
                    matched.push(document);
                }
            }

            sort_documents(&mut matched, &query.sort);
            matched.into_iter().skip(offset).take(limit).cloned().collect()
        };
        drop(store);

        Ok(stream::iter(window)
            .map(move |document| Ok(project(document, &projection)))
            .boxed())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;
        for document in documents {
            if DocumentEvaluator::matches(document, filter.as_ref())? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn distinct_values(
        &self,
        path: &str,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Bson> = Vec::new();
        for document in documents {
            if !DocumentEvaluator::matches(document, filter.as_ref())? {
                continue;
            }

            for value in unwind(values_at(document, path)) {
                if matches!(value, Bson::Array(_)) {
                    continue;
                }

                let candidate = Comparable::from(value);
                if !values.iter().any(|seen| Comparable::from(seen) == candidate) {
                    values.push(value.clone());
                }
            }
        }

        Ok(values)
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let doomed = documents
            .iter()
            .map(|document| DocumentEvaluator::matches(document, filter.as_ref()))
            .collect::<DocumentStoreResult<Vec<bool>>>()?;

        let mut index = 0;
        documents.retain(|_| {
            let keep = !doomed[index];
            index += 1;
            keep
        });

        Ok(doomed.iter().filter(|&&matched| matched).count() as u64)
    }

    async fn update_document(
        &self,
        filter: Expr,
        update: Update,
        options: UpdateDocumentOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let mut position = None;
        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(&filter)? {
                position = Some(index);
                break;
            }
        }

        match position {
            Some(index) => {
                let mut updated = documents[index].clone();
                apply(&mut updated, update.ops(), false)?;
                documents[index] = updated.clone();

                Ok(Some(project(updated, &options.projection)))
            }
            None if options.upsert => {
                let mut created = Document::new();
                for (path, value) in filter.equality_fields() {
                    set_path(&mut created, &path, value)?;
                }
                apply(&mut created, update.ops(), true)?;
                documents.push(created.clone());

                debug!(collection, "upserted document");
                Ok(Some(project(created, &options.projection)))
            }
            None => Ok(None),
        }
    }

    async fn update_one(&self, filter: Expr, update: Update, collection: &str) -> DocumentStoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        for document in documents.iter_mut() {
            if DocumentEvaluator::new(document).evaluate(&filter)? {
                let mut updated = document.clone();
                let modified = apply(&mut updated, update.ops(), false)?;
                *document = updated;

                return Ok(UpdateResult { matched_count: 1, modified_count: u64::from(modified) });
            }
        }

        Ok(UpdateResult::default())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);
        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self.store.read().await.keys().cloned().collect())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use duoshelf_core::query::Filter;
    use futures::TryStreamExt;

    use super::*;

    fn hero(key: i32, name: &str, publisher: &str) -> Document {
        doc! { "_id": key, "name": name, "publisher": publisher, "tags": ["hero"] }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_documents(
                vec![hero(1, "Iron Man", "Marvel"), hero(2, "Batman", "DC"), hero(3, "Captain America", "Marvel")],
                "heroes",
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn failed_delete_keeps_every_document() {
        let store = seeded().await;

        let result = store.delete_documents(Some(Filter::matches("name", "(")), "heroes").await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidFilter(_))));
        assert_eq!(store.count_documents(None, "heroes").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn overflowing_increment_leaves_the_document_alone() {
        let store = InMemoryStore::new();
        store.insert_documents(vec![doc! { "_id": 1, "kudos": i64::MAX }], "works").await.unwrap();

        let result = store
            .update_one(Filter::eq("_id", 1), Update::new().inc("kudos", 1i64), "works")
            .await;
        assert!(matches!(result, Err(DocumentStoreError::InvalidUpdate(_))));

        let found: Vec<Document> = store
            .find_documents(Query::default(), Projection::new(), "works")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found, vec![doc! { "_id": 1, "kudos": i64::MAX }]);
    }

    #[tokio::test]
    async fn unsorted_window_follows_insertion_order() {
        let store = seeded().await;
        let query = Query { offset: Some(1), limit: Some(1), ..Query::default() };

        let found: Vec<Document> = store
            .find_documents(query, Projection::new(), "heroes")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found, vec![hero(2, "Batman", "DC")]);
    }

    #[tokio::test]
    async fn batch_with_a_duplicate_writes_nothing() {
        let store = seeded().await;

        let result = store
            .insert_documents(vec![hero(4, "Thor", "Marvel"), hero(2, "Batman", "DC")], "heroes")
            .await;

        match result {
            Err(DocumentStoreError::BatchWrite { failures, .. }) => {
                assert_eq!(failures.iter().map(|f| f.index).collect::<Vec<_>>(), vec![1]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.count_documents(None, "heroes").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn finds_sorted_window_with_projection() {
        let store = seeded().await;
        let query = Query::builder()
            .filter(Filter::eq("publisher", "Marvel"))
            .sort("name", SortDirection::Desc)
            .limit(1)
            .build();

        let found: Vec<Document> = store
            .find_documents(query, Projection::new().exclude("tags"), "heroes")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "name": "Iron Man", "publisher": "Marvel" }]);
    }

    #[tokio::test]
    async fn distinct_unwinds_and_deduplicates() {
        let store = seeded().await;

        let mut publishers = store.distinct_values("publisher", None, "heroes").await.unwrap();
        publishers.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        assert_eq!(publishers, vec![Bson::from("DC"), Bson::from("Marvel")]);
        assert_eq!(store.distinct_values("tags", None, "heroes").await.unwrap(), vec![Bson::from("hero")]);
    }

    #[tokio::test]
    async fn upsert_seeds_document_from_filter() {
        let store = InMemoryStore::new();
        let update = Update::new().set("name", "Thor");

        let created = store
            .update_document(
                Filter::eq("_id", 7),
                update,
                UpdateDocumentOptions { projection: Projection::new().with_primary_key(), upsert: true },
                "heroes",
            )
            .await
            .unwrap();

        assert_eq!(created, Some(doc! { "_id": 7, "name": "Thor" }));
    }

    #[tokio::test]
    async fn missing_collection_is_empty() {
        let store = InMemoryStore::new();

        assert_eq!(store.delete_documents(None, "nothing").await.unwrap(), 0);
        assert_eq!(
            store.update_one(Filter::eq("_id", 1), Update::new().set("a", 1), "nothing").await.unwrap(),
            UpdateResult::default()
        );
    }
}
