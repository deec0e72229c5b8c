//! Convenient re-exports of commonly used types from duoshelf.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use duoshelf::prelude::*;
//! ```
//!
//! This provides access to:
//! - Record traits, views and stored documents
//! - The client, collections and repositories
//! - Filter, projection and update construction
//! - Error types, configuration and pagination

pub use duoshelf_core::{
    backend::{StoreBackend, StoreBackendBuilder, UpdateResult},
    client::{Client, ClientEvent},
    collection::{Collection, DocumentStream, FindOptions, TypedCollection, UpdateOptions},
    config::StoreConfig,
    document::{DocumentExt, NewRecord, Record, StoredDocument, View},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Page, PaginationParams},
    projection::Projection,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    repository::Repository,
    shape::{FieldKind, Shape},
    update::Update,
};
