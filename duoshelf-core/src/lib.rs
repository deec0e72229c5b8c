//! A typed document-store access layer for the duofiction catalog.
//!
//! This crate is the core of the duoshelf project and provides:
//!
//! - **Record traits** ([`document`]) - Records, views, factories and their stored form
//! - **Identity lifecycle** ([`identity`]) - Primary keys and creation/update timestamps
//! - **Shapes** ([`shape`]) - Static field descriptions the algebra is validated against
//! - **Query and filtering API** ([`query`]) - Filter construction, validation and visitors
//! - **Projections** ([`projection`]) - Exclusion-only field projections
//! - **Updates** ([`update`]) - Partial update operations
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Collections interface** ([`collection`]) - Typed and untyped collection handles
//! - **Repository** ([`repository`]) - Record-level facade with validated construction
//! - **Client** ([`client`]) - Connection lifecycle, collection registry and events
//! - **Configuration** ([`config`]) - Connection settings from the environment or TOML
//! - **Error handling** ([`error`]) - Comprehensive error types and result types
//! - **Pagination** ([`page`]) - Pages and pagination parameters
//!
//! # Example
//!
//! ```ignore
//! use duoshelf_core::document::Record;
//! use duoshelf_core::shape::{FieldKind, Shape};
//! use serde::{Deserialize, Serialize};
//! use std::sync::LazyLock;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Hero {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! static HERO: LazyLock<Shape> = LazyLock::new(|| {
//!     Shape::new().field("id", FieldKind::String).field("name", FieldKind::String)
//! });
//!
//! impl Record for Hero {
//!     fn id(&self) -> &str { &self.id }
//!     fn collection_name() -> &'static str { "heroes" }
//!     fn shape() -> &'static Shape { &HERO }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as duoshelf_core;

pub mod backend;
pub mod client;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod page;
pub mod projection;
pub mod query;
pub mod repository;
pub mod shape;
pub mod update;
