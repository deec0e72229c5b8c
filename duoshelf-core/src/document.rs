//! Core traits and types for records and their stored representation.
//!
//! A [`Record`] is the storage-agnostic domain value. Writing it produces a
//! [`StoredDocument`], which adds the primary key and the creation/update timestamps.
//! Reads hand back a `StoredDocument<V>` where `V` is a [`View`]: either the record itself
//! or a hand-written narrowed type matching a projection.
//!
//! # Example
//!
//! ```ignore
//! use duoshelf_core::document::{Record, View};
//! use duoshelf_core::projection::Projection;
//! use duoshelf_core::shape::{FieldKind, Shape};
//! use serde::{Deserialize, Serialize};
//! use std::sync::LazyLock;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Story {
//!     pub id: String,
//!     pub fandom: String,
//!     pub chapters: Vec<String>,
//! }
//!
//! static STORY_SHAPE: LazyLock<Shape> = LazyLock::new(|| {
//!     Shape::new()
//!         .field("id", FieldKind::String)
//!         .field("fandom", FieldKind::String)
//!         .field("chapters", FieldKind::array(FieldKind::String))
//! });
//!
//! impl Record for Story {
//!     fn id(&self) -> &str { &self.id }
//!     fn collection_name() -> &'static str { "stories" }
//!     fn shape() -> &'static Shape { &STORY_SHAPE }
//! }
//!
//! /// Catalog card: everything but the chapters.
//! #[derive(Debug, Clone, Deserialize)]
//! pub struct StoryCard {
//!     pub id: String,
//!     pub fandom: String,
//! }
//!
//! impl View for StoryCard {
//!     type Record = Story;
//!     fn projection() -> Projection { Projection::new().exclude("chapters") }
//! }
//! ```

use bson::{Bson, DateTime, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identity::PrimaryKey,
    projection::Projection,
    shape::Shape,
};

/// Storage name of the primary key.
pub const PRIMARY_KEY: &str = "_id";
/// Name of the caller-assigned identifier every record carries.
pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Core trait that all records stored in a collection must implement.
///
/// The only required attribute is a caller-assigned string id, unique within the
/// collection. Storage never generates ids.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns this record's identifier.
    fn id(&self) -> &str;

    /// Returns the default collection name for this record type.
    fn collection_name() -> &'static str;

    /// Returns the structural description used to validate filters, projections and updates.
    fn shape() -> &'static Shape;
}

/// A read result type bound to a record type and the projection that produces it.
///
/// Every record is its own identity view. Narrowed views list only the fields that
/// survive their projection; fields removed by an extra per-call projection must be
/// `Option` (or `#[serde(default)]`) in the view.
pub trait View: DeserializeOwned + Send + Sync + 'static {
    type Record: Record;

    fn projection() -> Projection;
}

impl<R: Record> View for R {
    type Record = R;

    fn projection() -> Projection {
        Projection::new()
    }
}

/// A record that can be built from unvalidated input.
///
/// Construction either returns a fully formed record or fails with
/// [`DocumentStoreError::Validation`]; nothing is patched in place afterwards.
pub trait NewRecord: Record {
    type Input: Send + 'static;

    fn from_input(input: Self::Input) -> DocumentStoreResult<Self>;
}

/// Extension trait providing serialization utilities for records.
///
/// This trait is automatically implemented for all types that implement [`Record`].
pub trait DocumentExt: Record {
    /// Converts this record to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the record is not a map.
    fn to_bson_document(&self) -> DocumentStoreResult<Document>;

    /// Converts this record to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a record from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<R: Record> DocumentExt for R {
    fn to_bson_document(&self) -> DocumentStoreResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::Serialization(format!(
                "expected a document, got {:?}",
                other.element_type()
            ))),
        }
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// A record (or view of a record) together with its storage-only attributes.
///
/// `primary_key` is `None` when the projection hid it, which is the default for reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument<T> {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(flatten)]
    pub record: T,
}

impl<T> StoredDocument<T> {
    /// Drops the primary key, as done for every value handed out of a repository.
    pub fn hide_primary_key(mut self) -> Self {
        self.primary_key = None;
        self
    }

    /// Replaces the payload while keeping the storage attributes.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StoredDocument<U> {
        StoredDocument {
            primary_key: self.primary_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
            record: f(self.record),
        }
    }
}

impl<T: Serialize> StoredDocument<T> {
    /// Builds the wire document: storage attributes first, then the record fields.
    pub fn to_bson_document(&self) -> DocumentStoreResult<Document> {
        let record = match serialize_to_bson(&self.record)? {
            Bson::Document(document) => document,
            other => {
                return Err(DocumentStoreError::Serialization(format!(
                    "expected a document, got {:?}",
                    other.element_type()
                )));
            }
        };

        let mut document = Document::new();

        if let Some(key) = &self.primary_key {
            document.insert(PRIMARY_KEY, key.to_bson());
        }
        document.insert(CREATED_AT, self.created_at);
        document.insert(UPDATED_AT, self.updated_at);
        document.extend(record);

        Ok(document)
    }
}

impl<T: DeserializeOwned> StoredDocument<T> {
    /// Splits a wire document into storage attributes and payload.
    ///
    /// # Errors
    ///
    /// Fails when a timestamp is missing or the remaining fields do not deserialize
    /// into `T` (for example a view expecting a field the projection removed).
    pub fn from_bson_document(mut document: Document) -> DocumentStoreResult<Self> {
        let primary_key = document
            .remove(PRIMARY_KEY)
            .map(PrimaryKey::from_bson)
            .transpose()?;
        let created_at = take_datetime(&mut document, CREATED_AT)?;
        let updated_at = take_datetime(&mut document, UPDATED_AT)?;
        let record = deserialize_from_bson(Bson::Document(document))?;

        Ok(Self { primary_key, created_at, updated_at, record })
    }
}

fn take_datetime(document: &mut Document, key: &str) -> DocumentStoreResult<DateTime> {
    match document.remove(key) {
        Some(Bson::DateTime(value)) => Ok(value),
        Some(other) => Err(DocumentStoreError::Serialization(format!(
            "{key} must be a date-time, got {:?}",
            other.element_type()
        ))),
        None => Err(DocumentStoreError::Serialization(format!("{key} is missing"))),
    }
}
