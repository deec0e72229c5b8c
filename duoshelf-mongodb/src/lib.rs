//! MongoDB backend implementation for duoshelf.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait,
//! translating filters, projections and updates into the server's native operators.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! duoshelf = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filtering, sorting and projection run on the server
//! - **Streaming reads** - Results are handed out as the driver cursor produces them
//! - **Atomic updates** - `update_by_id` maps to a single `findOneAndUpdate`
//!
//! # Connection
//!
//! Connection settings come from a [`StoreConfig`](duoshelf_core::config::StoreConfig),
//! usually read from the environment.
//!
//! # Example
//!
//! ```ignore
//! use duoshelf::{client::Client, config::StoreConfig, mongodb::MongoStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::from_env()?;
//!     let client = Client::connect(MongoStore::builder().with_config(config)).await?;
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as duoshelf_mongodb;

mod query;
mod sanitizer;
pub mod store;

pub use store::{MongoStore, MongoStoreBuilder};
