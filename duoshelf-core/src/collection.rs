//! Collection types for document store operations.
//!
//! This module provides collection handles bound to a named physical collection.
//! Handles are cheap to clone and share the backend through an `Arc`.
//!
//! # Collection Types
//!
//! - [`TypedCollection`] - Type-safe collection for a specific record type
//! - [`Collection`] - Untyped collection with explicit BSON documents, for administrative use
//!
//! Every write on a [`TypedCollection`] goes through the identity lifecycle; every read
//! returns a [`StoredDocument`] of the requested [`View`], after checking the view's
//! projection (plus any per-call projection) against the record shape.
//!
//! # Example
//!
//! ```ignore
//! use duoshelf_core::collection::{FindOptions, TypedCollection};
//! use duoshelf_core::query::Filter;
//! use futures::TryStreamExt;
//!
//! let stories = client.collection::<Story>().await?;
//! stories.insert_one(story).await?;
//!
//! let cards: Vec<_> = stories
//!     .find::<StoryCard>(Some(Filter::eq("fandom", "Marvel")), FindOptions::default())
//!     .await?
//!     .try_collect()
//!     .await?;
//! ```

use std::{collections::HashSet, marker::PhantomData, sync::Arc};

use bson::Bson;
use futures::{StreamExt, stream::BoxStream};
use tracing::debug;

use crate::{
    backend::{RawDocumentStream, StoreBackend, UpdateDocumentOptions, UpdateResult},
    document::{CREATED_AT, PRIMARY_KEY, Record, StoredDocument, UPDATED_AT, View},
    error::{DocumentStoreError, DocumentStoreResult},
    identity::{PrimaryKey, create_document, create_documents, on_update, on_upsert},
    projection::Projection,
    query::{Expr, Filter, Query, Sort},
    shape::PathMode,
    update::Update,
};

/// Lazy stream of typed read results.
pub type DocumentStream<V> = BoxStream<'static, DocumentStoreResult<StoredDocument<V>>>;

/// Per-call read options.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Extra fields to exclude on top of the view's projection.
    pub projection: Projection,
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Per-call update options.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Extra fields to exclude from the returned document.
    pub projection: Projection,
    /// Create the document when no document has the given id.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

#[derive(Debug)]
pub struct TypedCollection<B: StoreBackend, R: Record> {
    name: String,
    backend: Arc<B>,
    _marker: PhantomData<R>,
}

impl<B: StoreBackend, R: Record> Clone for TypedCollection<B, R> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), backend: Arc::clone(&self.backend), _marker: PhantomData }
    }
}

impl<B: StoreBackend, R: Record> TypedCollection<B, R> {
    pub fn new(name: impl Into<String>, backend: Arc<B>) -> Self {
        Self { name: name.into(), backend, _marker: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The untyped handle for the same physical collection.
    pub fn raw(&self) -> Collection<B> {
        Collection::new(self.name.clone(), Arc::clone(&self.backend))
    }

    /// Stores a new record and returns it with its storage attributes.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidIdentifier`] for a malformed id,
    /// [`DocumentStoreError::DuplicateIdentifier`] if the id is already taken.
    pub async fn insert_one(&self, record: R) -> DocumentStoreResult<StoredDocument<R>> {
        let document = create_document(record)?;

        self.backend
            .insert_documents(vec![document.to_bson_document()?], &self.name)
            .await?;

        debug!(collection = %self.name, id = document.record.id(), "inserted document");
        Ok(document)
    }

    /// Stores a batch of new records, all or nothing.
    ///
    /// Two records with the same id in one batch are rejected before anything is written.
    pub async fn insert_many(&self, records: Vec<R>) -> DocumentStoreResult<Vec<StoredDocument<R>>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let documents = create_documents(records)?;

        let mut seen = HashSet::with_capacity(documents.len());
        for document in &documents {
            if !seen.insert(document.primary_key) {
                return Err(DocumentStoreError::DuplicateIdentifier(
                    document.record.id().to_string(),
                    self.name.clone(),
                ));
            }
        }

        let raw = documents
            .iter()
            .map(StoredDocument::to_bson_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.backend.insert_documents(raw, &self.name).await?;

        debug!(collection = %self.name, count = documents.len(), "inserted documents");
        Ok(documents)
    }

    /// Looks a document up by record id. `None` if there is no such document.
    pub async fn find_by_id<V>(&self, id: &str, options: FindOptions) -> DocumentStoreResult<Option<StoredDocument<V>>>
    where
        V: View<Record = R>,
    {
        let key = PrimaryKey::parse(id)?;
        self.find_one(Filter::eq(PRIMARY_KEY, key.to_bson()), options).await
    }

    /// Returns the first document matching `filter`.
    pub async fn find_one<V>(&self, filter: Expr, options: FindOptions) -> DocumentStoreResult<Option<StoredDocument<V>>>
    where
        V: View<Record = R>,
    {
        let mut stream = self.find::<V>(Some(filter), options.limit(1)).await?;

        stream.next().await.transpose()
    }

    /// Streams every document matching `filter`, narrowed to `V`.
    ///
    /// Nothing is read until the stream is polled; dropping it stops the read.
    pub async fn find<V>(&self, filter: Option<Expr>, options: FindOptions) -> DocumentStoreResult<DocumentStream<V>>
    where
        V: View<Record = R>,
    {
        let projection = read_projection::<V>(&options.projection)?;
        let query = self.query(filter, options)?;

        let stream = self.backend.find_documents(query, projection, &self.name).await?;

        Ok(stream
            .map(|document| StoredDocument::<V>::from_bson_document(document?))
            .boxed())
    }

    pub async fn count_documents(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        validate_filter::<R>(filter.as_ref())?;
        self.backend.count_documents(filter, &self.name).await
    }

    /// Distinct values at `path` among the documents matching `filter`.
    ///
    /// Array values are unwound. The order of the result is unspecified.
    pub async fn distinct(&self, path: &str, filter: Option<Expr>) -> DocumentStoreResult<Vec<Bson>> {
        validate_path::<R>(path)?;
        validate_filter::<R>(filter.as_ref())?;

        self.backend.distinct_values(path, filter, &self.name).await
    }

    /// Deletes the document with the given id. Returns 0 if there was none.
    pub async fn delete_by_id(&self, id: &str) -> DocumentStoreResult<u64> {
        let key = PrimaryKey::parse(id)?;
        let deleted = self
            .backend
            .delete_documents(Some(Filter::eq(PRIMARY_KEY, key.to_bson())), &self.name)
            .await?;

        debug!(collection = %self.name, id, deleted, "deleted document");
        Ok(deleted)
    }

    pub async fn delete_many(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        validate_filter::<R>(filter.as_ref())?;

        let deleted = self.backend.delete_documents(filter, &self.name).await?;

        debug!(collection = %self.name, deleted, "deleted documents");
        Ok(deleted)
    }

    /// Applies `update` to the document with the given id and returns it as it is afterwards.
    ///
    /// `updated_at` is always moved forward. Without [`UpdateOptions::upsert`] a missing id
    /// yields `None`; with it, the created document receives `id`, `_id` and `created_at`.
    pub async fn update_by_id<V>(
        &self,
        id: &str,
        update: Update,
        options: UpdateOptions,
    ) -> DocumentStoreResult<Option<StoredDocument<V>>>
    where
        V: View<Record = R>,
    {
        update.validate(R::shape())?;
        let projection = read_projection::<V>(&options.projection)?;
        let key = PrimaryKey::parse(id)?;

        let update = if options.upsert { on_upsert(update, id) } else { on_update(update) };

        let document = self
            .backend
            .update_document(
                Filter::eq(PRIMARY_KEY, key.to_bson()),
                update,
                UpdateDocumentOptions { projection, upsert: options.upsert },
                &self.name,
            )
            .await?;

        debug!(collection = %self.name, id, found = document.is_some(), "updated document");
        document.map(StoredDocument::from_bson_document).transpose()
    }

    /// Applies `update` to the document with the given id and reports what happened.
    pub async fn update_one(&self, id: &str, update: Update) -> DocumentStoreResult<UpdateResult> {
        update.validate(R::shape())?;
        let key = PrimaryKey::parse(id)?;

        let result = self
            .backend
            .update_one(Filter::eq(PRIMARY_KEY, key.to_bson()), on_update(update), &self.name)
            .await?;

        debug!(
            collection = %self.name,
            id,
            matched = result.matched_count,
            modified = result.modified_count,
            "updated document"
        );
        Ok(result)
    }

    fn query(&self, filter: Option<Expr>, options: FindOptions) -> DocumentStoreResult<Query> {
        validate_filter::<R>(filter.as_ref())?;
        for sort in &options.sort {
            validate_path::<R>(&sort.field)?;
        }

        Ok(Query { filter, limit: options.limit, offset: options.skip, sort: options.sort })
    }
}

fn read_projection<V: View>(extra: &Projection) -> DocumentStoreResult<Projection> {
    V::projection()
        .merge(extra)
        .validate(<V::Record as Record>::shape())
}

fn validate_filter<R: Record>(filter: Option<&Expr>) -> DocumentStoreResult<()> {
    filter.map_or(Ok(()), |filter| filter.validate(R::shape()))
}

fn validate_path<R: Record>(path: &str) -> DocumentStoreResult<()> {
    if [PRIMARY_KEY, CREATED_AT, UPDATED_AT].contains(&path) || R::shape().resolve(path, PathMode::Query).is_some() {
        Ok(())
    } else {
        Err(DocumentStoreError::InvalidFilter(format!("{path} does not name a field")))
    }
}

/// Untyped handle with raw BSON documents.
///
/// Nothing is validated here; filters and projections are passed to the backend as given.
#[derive(Debug)]
pub struct Collection<B: StoreBackend> {
    name: String,
    backend: Arc<B>,
}

impl<B: StoreBackend> Clone for Collection<B> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), backend: Arc::clone(&self.backend) }
    }
}

impl<B: StoreBackend> Collection<B> {
    pub fn new(name: impl Into<String>, backend: Arc<B>) -> Self {
        Self { name: name.into(), backend }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn find(&self, query: Query, projection: Projection) -> DocumentStoreResult<RawDocumentStream> {
        self.backend.find_documents(query, projection, &self.name).await
    }

    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend.count_documents(filter, &self.name).await
    }

    pub async fn distinct(&self, path: &str, filter: Option<Expr>) -> DocumentStoreResult<Vec<Bson>> {
        self.backend.distinct_values(path, filter, &self.name).await
    }

    pub async fn delete_many(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend.delete_documents(filter, &self.name).await
    }

    /// Removes the collection and every document in it.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        debug!(collection = %self.name, "dropping collection");
        self.backend.drop_collection(&self.name).await
    }
}
