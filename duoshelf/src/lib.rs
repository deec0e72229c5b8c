//! Main duoshelf crate providing a unified interface to the catalog's document store.
//!
//! This crate is the primary entry point for the duofiction web application. It
//! re-exports the core types from the sub-crates, gives access to the storage backends,
//! and carries the fanfiction record model.
//!
//! # Features
//!
//! - **Typed records** - Serde types with a static shape; filters, projections and updates are checked against it
//! - **Narrowed reads** - Views bound to a projection, so a read returns only what is present
//! - **Identity lifecycle** - Primary keys and creation/update timestamps are managed by the layer
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use duoshelf::{prelude::*, fanfiction, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     duoshelf::logging::init(false)?;
//!
//!     let config = StoreConfig::from_env()?;
//!     let client = Client::connect(InMemoryStore::builder()).await?;
//!     let fanfictions = fanfiction::repository(&client, &config).await?;
//!
//!     client
//!         .run_until_shutdown(async {
//!             let page = fanfictions
//!                 .page(Some(Filter::eq("language_code", "es")), &PaginationParams::new(1, 20))
//!                 .await?;
//!             println!("{} stories", page.count);
//!             Ok(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod fanfiction;
pub mod logging;
pub mod prelude;

pub use duoshelf_core::{
    backend, client, collection, config, document, error, identity, page, projection, query, repository, shape,
    update,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use duoshelf_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use duoshelf_mongodb::{MongoStore, MongoStoreBuilder};
}
