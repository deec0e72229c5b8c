//! Connection lifecycle and collection registry.
//!
//! A [`Client`] owns the backend for the lifetime of the process. It is acquired once at
//! startup, hands out collection handles for the record types registered on it, and is
//! released through a single idempotent [`Client::close`].
//!
//! Lifecycle changes are logged and broadcast as [`ClientEvent`]s.
//!
//! ```ignore
//! let client = Client::connect(MongoStore::builder().with_config(StoreConfig::from_env()?)).await?;
//! let fanfictions = client.register_collection::<Fanfiction>(None).await?;
//!
//! client.run_until_shutdown(serve(fanfictions)).await?;
//! ```

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    future::Future,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mea::rwlock::RwLock;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, TypedCollection},
    document::Record,
    error::{DocumentStoreError, DocumentStoreResult},
};

const EVENT_CAPACITY: usize = 64;

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Opened,
    Closed,
    /// A connection-level failure, as reported through [`Client::report_error`].
    Error(String),
}

/// A broadcast receiver for client events.
pub type ClientEvents = broadcast::Receiver<ClientEvent>;

struct ClientInner<B> {
    backend: Arc<B>,
    closed: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
    registry: RwLock<HashMap<TypeId, String>>,
}

/// Shared handle to an open store. Clones refer to the same connection.
pub struct Client<B: StoreBackend> {
    inner: Arc<ClientInner<B>>,
}

impl<B: StoreBackend> Clone for Client<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: StoreBackend> fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.inner.backend)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<B: StoreBackend> Client<B> {
    /// Builds the backend and checks that it answers.
    ///
    /// # Errors
    ///
    /// Whatever the builder or the first ping returns; the backend is shut down again
    /// if the ping fails.
    pub async fn connect<Builder>(builder: Builder) -> DocumentStoreResult<Self>
    where
        Builder: StoreBackendBuilder<Backend = B>,
    {
        let backend = builder.build().await?;

        if let Err(e) = backend.ping().await {
            error!(error = %e, "Failed to connect to the database.");
            if let Err(shutdown) = backend.shutdown().await {
                warn!(error = %shutdown, "shutdown after failed connect");
            }
            return Err(e);
        }

        Ok(Self::from_backend(backend))
    }

    /// Wraps an already connected backend.
    pub fn from_backend(backend: B) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let client = Self {
            inner: Arc::new(ClientInner {
                backend: Arc::new(backend),
                closed: AtomicBool::new(false),
                events,
                registry: RwLock::new(HashMap::new()),
            }),
        };

        info!("Connected to the database.");
        client.emit(ClientEvent::Opened);
        client
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> ClientEvents {
        self.inner.events.subscribe()
    }

    /// Binds `R` to a physical collection (its default collection name unless `name` is given)
    /// and returns the handle. Registering again rebinds.
    pub async fn register_collection<R: Record>(&self, name: Option<&str>) -> DocumentStoreResult<TypedCollection<B, R>> {
        self.ensure_open()?;

        let name = name.unwrap_or(R::collection_name()).to_string();
        self.inner
            .registry
            .write()
            .await
            .insert(TypeId::of::<R>(), name.clone());

        info!(collection = %name, record = std::any::type_name::<R>(), "registered collection");
        Ok(TypedCollection::new(name, Arc::clone(&self.inner.backend)))
    }

    /// The handle for a record type registered earlier.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::CollectionNotRegistered`] if `R` was never registered,
    /// [`DocumentStoreError::ClientClosed`] after [`close`](Self::close).
    pub async fn collection<R: Record>(&self) -> DocumentStoreResult<TypedCollection<B, R>> {
        self.ensure_open()?;

        let registry = self.inner.registry.read().await;
        let name = registry
            .get(&TypeId::of::<R>())
            .ok_or_else(|| DocumentStoreError::CollectionNotRegistered(R::collection_name().to_string()))?;

        Ok(TypedCollection::new(name.clone(), Arc::clone(&self.inner.backend)))
    }

    /// Untyped handle for administrative access. No registration required.
    pub fn raw_collection(&self, name: &str) -> DocumentStoreResult<Collection<B>> {
        self.ensure_open()?;
        Ok(Collection::new(name, Arc::clone(&self.inner.backend)))
    }

    /// Logs a connection-level error and broadcasts it to subscribers.
    pub fn report_error(&self, error: &DocumentStoreError) {
        error!(error = %error, "Database connection error.");
        self.emit(ClientEvent::Error(error.to_string()));
    }

    /// Releases the backend. Only the first call does anything.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.inner.backend.shutdown().await {
            self.report_error(&e);
            return Err(e);
        }

        info!("Disconnected from the database.");
        self.emit(ClientEvent::Closed);
        Ok(())
    }

    /// Runs `app` and closes the client afterwards, whether `app` finished or failed, the
    /// process was asked to stop (ctrl-c, SIGTERM), or a connection error was reported.
    ///
    /// Returns `None` when interrupted by a signal. A reported connection error is returned
    /// as [`DocumentStoreError::Storage`].
    pub async fn run_until_shutdown<F, T>(&self, app: F) -> DocumentStoreResult<Option<T>>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        let events = self.subscribe();

        let outcome = tokio::select! {
            result = app => result.map(Some),
            signal = shutdown_signal() => match signal {
                Ok(()) => {
                    info!("Received shutdown signal.");
                    Ok(None)
                }
                Err(e) => Err(DocumentStoreError::Initialization(format!("signal handler: {e}"))),
            },
            message = connection_error(events) => {
                warn!(error = %message, "Stopping after a connection error.");
                Err(DocumentStoreError::Storage(message))
            }
        };

        let closed = self.close().await;
        let value = outcome?;
        closed?;

        Ok(value)
    }

    fn ensure_open(&self) -> DocumentStoreResult<()> {
        if self.is_closed() { Err(DocumentStoreError::ClientClosed) } else { Ok(()) }
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Resolves on ctrl-c, or on SIGTERM where there is one.
async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<io::Result<()>>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        result = terminate => result,
    }
}

/// Resolves with the first [`ClientEvent::Error`] broadcast on `events`.
async fn connection_error(mut events: ClientEvents) -> String {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Error(message)) => return message,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return std::future::pending().await,
        }
    }
}
