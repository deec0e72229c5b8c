//! Storage backend abstraction for the document store.
//!
//! This module defines the core traits that abstract over different storage implementations,
//! allowing the typed collections to work with various backends (in-memory, MongoDB, etc.).
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for all storage operations
//! including document insertion, lazy retrieval, counting, partial updates and deletion.
//! Implementations are required to be thread-safe (`Send + Sync`) and support concurrent access.
//!
//! Backends receive documents that already went through the identity lifecycle
//! (`_id`, `created_at` and `updated_at` are present) and filters, projections and updates
//! that were already validated against the record shape. They never generate ids and
//! never touch timestamps themselves.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use duoshelf_core::backend::StoreBackend;
//! use duoshelf_core::query::{Filter, Query};
//! use futures::TryStreamExt;
//!
//! let stream = backend
//!     .find_documents(Query::builder().filter(Filter::eq("fandom", "Marvel")).build(), Projection::new(), "fanfictions")
//!     .await?;
//! let documents: Vec<_> = stream.try_collect().await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    projection::Projection,
    query::{Expr, Query},
    update::Update,
};

/// Lazy sequence of raw documents produced by a backend read.
///
/// Dropping the stream releases the underlying cursor.
pub type RawDocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents the filter selected (0 or 1).
    pub matched_count: u64,
    /// Number of documents whose content changed.
    pub modified_count: u64,
}

/// Options for [`StoreBackend::update_document`].
#[derive(Debug, Clone, Default)]
pub struct UpdateDocumentOptions {
    /// Fields to hide from the returned document.
    pub projection: Projection,
    /// Create the document when the filter matches nothing.
    pub upsert: bool,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Every method is atomic with respect to a single document; nothing spans
/// several documents.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Driver failures are converted to [`DocumentStoreError::Storage`](crate::error::DocumentStoreError::Storage)
/// and never leak driver types.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug + 'static {
    /// Inserts new documents into a collection, all or nothing.
    ///
    /// # Arguments
    ///
    /// * `documents` - Stored documents, each carrying its `_id`
    /// * `collection` - The name of the collection to insert into. Created automatically if it doesn't exist.
    ///
    /// # Errors
    ///
    /// [`DuplicateIdentifier`](crate::error::DocumentStoreError::DuplicateIdentifier) when a single
    /// document collides with an existing one, [`BatchWrite`](crate::error::DocumentStoreError::BatchWrite)
    /// when part of a larger batch failed. In both cases nothing from the batch remains stored.
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()>;

    /// Queries documents in a collection using a structured query.
    ///
    /// The returned stream is lazy: documents are produced as the caller polls it.
    ///
    /// # Arguments
    ///
    /// * `query` - The [`Query`] object specifying filters, sorts, limits, and offsets
    /// * `projection` - Fields to remove from every document
    /// * `collection` - The name of the collection to query
    async fn find_documents(
        &self,
        query: Query,
        projection: Projection,
        collection: &str,
    ) -> DocumentStoreResult<RawDocumentStream>;

    /// Counts the documents matching `filter` (all documents when `None`).
    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64>;

    /// Returns the distinct values found at `path` among the documents matching `filter`.
    ///
    /// Arrays are unwound: each element counts as a value. Order is unspecified.
    async fn distinct_values(
        &self,
        path: &str,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Deletes every document matching `filter` and returns how many were removed.
    ///
    /// Deleting from a collection that does not exist removes nothing.
    async fn delete_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64>;

    /// Applies `update` to the first document matching `filter` and returns the document
    /// as it is after the update, or `None` when nothing matched and no upsert happened.
    async fn update_document(
        &self,
        filter: Expr,
        update: Update,
        options: UpdateDocumentOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Applies `update` to the first document matching `filter` and reports the counts.
    async fn update_one(&self, filter: Expr, update: Update, collection: &str) -> DocumentStoreResult<UpdateResult>;

    /// Drops (deletes) a collection and all its documents.
    ///
    /// # Warning
    ///
    /// This operation is irreversible.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this. Calling it twice must be harmless.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
