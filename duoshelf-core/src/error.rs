//! Error types and result types for document store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`].
//! "Not found" is never an error: reads and updates that may miss return `Option::None`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// A single failed entry of a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the failing record in the submitted batch.
    pub index: usize,
    /// Backend-provided reason.
    pub message: String,
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The record id cannot be turned into a primary key.
    ///
    /// This is a programming error and is never retried.
    #[error("Invalid identifier {0:?}: {1}")]
    InvalidIdentifier(String, String),
    /// A document with the given id already exists in the collection.
    /// The first argument is the document id, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateIdentifier(String, String),
    /// Part of a batch write failed. The batch was rolled back before this error was returned.
    #[error("Batch write failed in collection {collection} at indices {:?}", failures.iter().map(|f| f.index).collect::<Vec<_>>())]
    BatchWrite {
        collection: String,
        failures: Vec<BatchFailure>,
    },
    /// The underlying storage transport failed (connection, timeout, server error).
    #[error("Storage error: {0}")]
    Storage(String),
    /// Input was rejected by a record factory.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A filter references an unknown path or applies an operator the field does not support.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// A projection references an unknown or non-excludable path.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),
    /// An update references an unknown path, conflicts with itself or touches identity fields.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
    /// A collection was requested that was never registered on the client.
    #[error("Collection not registered: {0}")]
    CollectionNotRegistered(String),
    /// The client was used after [`close`](crate::client::Client::close).
    #[error("Client is closed")]
    ClientClosed,
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DocumentStoreError {
    fn from(err: toml::de::Error) -> Self {
        DocumentStoreError::Config(err.to_string())
    }
}
