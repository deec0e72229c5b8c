//! Record-level facade over a [`TypedCollection`].
//!
//! A [`Repository`] builds records through their validated factory, hides the primary key
//! from everything it returns, and reads through a default view `V` that usually leaves out
//! heavy nested fields.

use std::marker::PhantomData;

use bson::Bson;
use futures::TryStreamExt;
use tracing::debug;

use crate::{
    backend::{StoreBackend, UpdateResult},
    collection::{FindOptions, TypedCollection},
    document::{CREATED_AT, NewRecord, PRIMARY_KEY, StoredDocument, View},
    error::DocumentStoreResult,
    identity::PrimaryKey,
    page::{Page, PaginationParams},
    query::{Expr, Filter, Sort},
    update::Update,
};

#[derive(Debug)]
pub struct Repository<B, R, V = R>
where
    B: StoreBackend,
    R: NewRecord,
    V: View<Record = R>,
{
    collection: TypedCollection<B, R>,
    _view: PhantomData<V>,
}

impl<B, R, V> Clone for Repository<B, R, V>
where
    B: StoreBackend,
    R: NewRecord,
    V: View<Record = R>,
{
    fn clone(&self) -> Self {
        Self { collection: self.collection.clone(), _view: PhantomData }
    }
}

impl<B, R, V> Repository<B, R, V>
where
    B: StoreBackend,
    R: NewRecord,
    V: View<Record = R>,
{
    pub fn new(collection: TypedCollection<B, R>) -> Self {
        Self { collection, _view: PhantomData }
    }

    pub fn collection(&self) -> &TypedCollection<B, R> {
        &self.collection
    }

    /// Builds a record from `input` and stores it.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Validation`](crate::error::DocumentStoreError::Validation) when the
    /// factory rejects the input; nothing is written in that case.
    pub async fn create(&self, input: R::Input) -> DocumentStoreResult<StoredDocument<R>> {
        let record = R::from_input(input).inspect_err(|e| debug!(operation = "create", error = %e, "input rejected"))?;
        let document = self.collection.insert_one(record).await?;

        debug!(operation = "create", id = document.record.id(), "created");
        Ok(document.hide_primary_key())
    }

    /// Reads one record through the default view.
    pub async fn retrieve(&self, id: &str) -> DocumentStoreResult<Option<StoredDocument<V>>> {
        let document = self.collection.find_by_id::<V>(id, FindOptions::default()).await?;

        debug!(operation = "retrieve", id, found = document.is_some());
        Ok(document)
    }

    /// One window of the records matching `filter`, newest first.
    pub async fn list(
        &self,
        filter: Option<Expr>,
        pagination: &PaginationParams,
    ) -> DocumentStoreResult<Vec<StoredDocument<V>>> {
        let options = FindOptions::new()
            .sort(Sort::desc(CREATED_AT))
            .skip(pagination.offset())
            .limit(pagination.per_page);

        let documents: Vec<_> = self
            .collection
            .find::<V>(filter, options)
            .await?
            .try_collect()
            .await?;

        debug!(operation = "list", page = pagination.page, returned = documents.len());
        Ok(documents)
    }

    /// Like [`list`](Self::list), with the total count and navigation metadata.
    pub async fn page(
        &self,
        filter: Option<Expr>,
        pagination: &PaginationParams,
    ) -> DocumentStoreResult<Page<StoredDocument<V>>> {
        let count = self.collection.count_documents(filter.clone()).await?;
        let items = self.list(filter, pagination).await?;

        Ok(Page::from_window(items, count, pagination))
    }

    /// Applies `update` to the record with the given id.
    ///
    /// `matched_count == 0` means there is no such record. An empty update changes nothing,
    /// not even `updated_at`.
    pub async fn update(&self, id: &str, update: Update) -> DocumentStoreResult<UpdateResult> {
        if update.is_empty() {
            let key = PrimaryKey::parse(id)?;
            let matched_count = self
                .collection
                .count_documents(Some(Filter::eq(PRIMARY_KEY, key.to_bson())))
                .await?;

            debug!(operation = "update", id, matched = matched_count, "empty update");
            return Ok(UpdateResult { matched_count, modified_count: 0 });
        }

        let result = self.collection.update_one(id, update).await?;

        debug!(operation = "update", id, matched = result.matched_count, modified = result.modified_count);
        Ok(result)
    }

    pub async fn delete(&self, id: &str) -> DocumentStoreResult<u64> {
        let deleted = self.collection.delete_by_id(id).await?;

        debug!(operation = "delete", id, deleted);
        Ok(deleted)
    }

    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        let count = self.collection.count_documents(filter).await?;

        debug!(operation = "count", count);
        Ok(count)
    }

    /// Unique values at `path` across all records.
    pub async fn distinct(&self, path: &str) -> DocumentStoreResult<Vec<Bson>> {
        let values = self.collection.distinct(path, None).await?;

        debug!(operation = "distinct", path, values = values.len());
        Ok(values)
    }
}
