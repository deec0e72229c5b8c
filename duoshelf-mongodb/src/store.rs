use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, Database,
    error::{Error as MongoError, ErrorKind},
    options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use tracing::{debug, warn};

use duoshelf_core::{
    backend::{RawDocumentStream, StoreBackend, StoreBackendBuilder, UpdateDocumentOptions, UpdateResult},
    config::StoreConfig,
    document::{ID, PRIMARY_KEY},
    error::{BatchFailure, DocumentStoreError, DocumentStoreResult},
    projection::Projection,
    query::{Expr, Query, Sort, SortDirection},
    update::Update,
};

use crate::{query::MongoQueryTranslator, sanitizer::CollectionName};

const DUPLICATE_KEY: i32 = 11000;

fn storage(e: MongoError) -> DocumentStoreError {
    DocumentStoreError::Storage(e.to_string())
}

/// The caller-facing id for error messages.
fn display_id(document: &Document) -> String {
    match (document.get_str(ID), document.get(PRIMARY_KEY)) {
        (Ok(id), _) => id.to_string(),
        (Err(_), Some(key)) => key.to_string(),
        (Err(_), None) => "<unknown>".to_string(),
    }
}

fn sort_document(sort: &[Sort]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }

    Some(
        sort.iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (key.field.clone(), Bson::Int32(direction))
            })
            .collect(),
    )
}

/// MongoDB storage backend.
///
/// Cloning the underlying driver client is cheap; the connection pool is shared.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    pub fn builder() -> MongoStoreBuilder {
        MongoStoreBuilder::default()
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database.collection(&CollectionName::sanitize(collection_name))
    }

    /// Removes the documents an ordered batch managed to write before it failed.
    async fn roll_back(&self, written: &[Document], collection: &str) {
        if written.is_empty() {
            return;
        }

        let keys: Vec<Bson> = written.iter().filter_map(|d| d.get(PRIMARY_KEY).cloned()).collect();

        match self
            .get_collection(collection)
            .delete_many(doc! { PRIMARY_KEY: { "$in": keys } })
            .await
        {
            Ok(result) => debug!(collection, removed = result.deleted_count, "rolled back partial batch"),
            Err(e) => warn!(collection, error = %e, "failed to roll back partial batch"),
        }
    }
}

#[async_trait]
impl StoreBackend for MongoStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        let result = self
            .get_collection(collection)
            .insert_many(documents.iter())
            .ordered(true)
            .await;

        let error = match result {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        let ErrorKind::InsertMany(failure) = error.kind.as_ref() else {
            return Err(storage(error));
        };
        let Some(write_errors) = failure.write_errors.as_ref().filter(|errors| !errors.is_empty()) else {
            return Err(storage(error));
        };

        // Ordered inserts stop at the first failure; everything before it was written.
        let first_failed = write_errors.iter().map(|e| e.index).min().unwrap_or(0);
        self.roll_back(&documents[..first_failed.min(documents.len())], collection).await;

        if documents.len() == 1 && write_errors[0].code == DUPLICATE_KEY {
            return Err(DocumentStoreError::DuplicateIdentifier(
                display_id(&documents[0]),
                collection.to_string(),
            ));
        }

        Err(DocumentStoreError::BatchWrite {
            collection: collection.to_string(),
            failures: write_errors
                .iter()
                .map(|e| BatchFailure { index: e.index, message: e.message.clone() })
                .collect(),
        })
    }

    async fn find_documents(
        &self,
        query: Query,
        projection: Projection,
        collection: &str,
    ) -> DocumentStoreResult<RawDocumentStream> {
        let options = find_options(&query, &projection);

        let cursor = self
            .get_collection(collection)
            .find(MongoQueryTranslator::translate(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(storage)?;

        Ok(cursor.map_err(storage).boxed())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(storage)
    }

    async fn distinct_values(
        &self,
        path: &str,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(path, MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(storage)
    }

    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(storage)?;

        Ok(result.deleted_count)
    }

    async fn update_document(
        &self,
        filter: Expr,
        update: Update,
        options: UpdateDocumentOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut driver_options = FindOneAndUpdateOptions::default();
        driver_options.return_document = Some(ReturnDocument::After);
        driver_options.upsert = Some(options.upsert);
        driver_options.projection = options.projection.to_document();

        self.get_collection(collection)
            .find_one_and_update(MongoQueryTranslator::translate(Some(&filter))?, update.to_document())
            .with_options(driver_options)
            .await
            .map_err(storage)
    }

    async fn update_one(&self, filter: Expr, update: Update, collection: &str) -> DocumentStoreResult<UpdateResult> {
        let result = self
            .get_collection(collection)
            .update_one(MongoQueryTranslator::translate(Some(&filter))?, update.to_document())
            .await
            .map_err(storage)?;

        Ok(UpdateResult { matched_count: result.matched_count, modified_count: result.modified_count })
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name).drop().await.map_err(storage)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .database
            .list_collection_names()
            .await
            .map_err(storage)?
            .iter()
            .map(|name| CollectionName::restore(name))
            .collect())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Builds a [`MongoStore`] from a [`StoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct MongoStoreBuilder {
    config: StoreConfig,
}

impl MongoStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            config: StoreConfig {
                uri: uri.to_string(),
                database: database.to_string(),
                ..StoreConfig::default()
            },
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoStoreBuilder {
    type Backend = MongoStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(app_name) = &self.config.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = self.config.connect_timeout() {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.config.server_selection_timeout() {
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        debug!(database = %self.config.database, "built mongodb client");
        Ok(MongoStore::new(client, &self.config.database))
    }
}

/// Driver options for a query window. Counts beyond what the server accepts are clamped.
fn find_options(query: &Query, projection: &Projection) -> FindOptions {
    let mut options = FindOptions::default();

    if let Some(limit) = query.limit {
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = query.offset {
        options.skip = Some(u64::try_from(skip).unwrap_or(u64::MAX));
    }
    options.sort = sort_document(&query.sort);
    options.projection = projection.to_document();

    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_keys_keep_their_order() {
        let sort = sort_document(&[Sort::desc("created_at"), Sort::asc("title.original.raw")]);

        assert_eq!(sort, Some(doc! { "created_at": -1, "title.original.raw": 1 }));
        assert_eq!(sort_document(&[]), None);
    }

    #[test]
    fn huge_limits_are_clamped() {
        let query = Query { limit: Some(usize::MAX), offset: Some(20), ..Query::default() };

        let options = find_options(&query, &Projection::new());

        assert_eq!(options.limit, Some(i64::MAX));
        assert_eq!(options.skip, Some(20));
    }

    #[test]
    fn display_id_prefers_record_id() {
        assert_eq!(display_id(&doc! { "_id": 1, "id": "abc" }), "abc");
        assert_eq!(display_id(&doc! { "_id": 1 }), "1");
    }

    #[test]
    fn builder_takes_uri_and_database() {
        let builder = MongoStoreBuilder::new("mongodb://db:27017", "catalog");

        assert_eq!(builder.config.uri, "mongodb://db:27017");
        assert_eq!(builder.config.database, "catalog");
        assert_eq!(builder.config.collection, "fanfictions");
    }
}
