//! In-memory document storage backend for duoshelf.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! tests and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Document-database semantics** - Dot-paths reach into arrays, updates apply in order
//! - **Full query support** - Filtering, sorting, skip and limit, projection and distinct
//!
//! # Quick Start
//!
//! ```ignore
//! use duoshelf_core::{client::Client, collection::FindOptions};
//! use duoshelf_memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(InMemoryStore::builder()).await?;
//!     let heroes = client.register_collection::<Hero>(None).await?;
//!
//!     heroes.insert_one(iron_man()).await?;
//!     let found = heroes.find_by_id::<Hero>(IRON_MAN_ID, FindOptions::new()).await?;
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as duoshelf_memory;

mod evaluator;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
