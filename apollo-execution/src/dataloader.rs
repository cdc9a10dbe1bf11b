//! Batched loading of values requested by many resolvers at once.
//!
//! A [`DataLoader`] queues keys until it is dispatched. Dispatching runs a single
//! bulk load for every queued key. When to dispatch is decided by the
//! [`DataLoaderDispatcherInstrumentation`](crate::instrumentation::DataLoaderDispatcherInstrumentation).

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::FieldError;

/// Loads many values in one call.
#[async_trait::async_trait]
pub trait BatchLoader: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Send + 'static;

    /// Returns one value per key, in the order of `keys`.
    async fn load(&self, keys: Vec<Self::Key>) -> Result<Vec<Self::Value>, FieldError>;
}

type Waiter<V> = oneshot::Sender<Result<V, FieldError>>;

/// Queues keys and resolves them with a [`BatchLoader`] when dispatched.
pub struct DataLoader<L: BatchLoader> {
    loader: Arc<L>,
    // Keys in the order they were first requested.
    pending: Arc<Mutex<IndexMap<L::Key, Vec<Waiter<L::Value>>>>>,
}

impl<L: BatchLoader> Clone for DataLoader<L> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<L: BatchLoader> DataLoader<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            pending: Default::default(),
        }
    }

    /// Queues `key` and returns the future of its value.
    ///
    /// The key is queued when this is called, not when the future is first polled.
    /// The future only completes after the next dispatch.
    pub fn load(&self, key: L::Key) -> BoxFuture<'static, Result<L::Value, FieldError>> {
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().entry(key).or_default().push(sender);
        Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(FieldError::new("the batch load was dropped")))
        })
    }

    /// The number of distinct keys waiting for a dispatch.
    pub fn pending_keys(&self) -> usize {
        self.pending.lock().len()
    }

    /// Starts a bulk load for every queued key.
    ///
    /// The load is spawned on the current tokio runtime. Outside of a runtime every
    /// queued key fails instead. Returns `false` when nothing was queued.
    pub fn dispatch(&self) -> bool {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return false;
        }
        let (keys, waiters): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(keys = keys.len(), "data loader dispatched outside of a tokio runtime");
            fail_all(
                waiters,
                FieldError::new("data loaders can only be dispatched within a tokio runtime"),
            );
            return true;
        };
        let loader = self.loader.clone();
        runtime.spawn(async move {
            tracing::debug!(keys = keys.len(), "loading batch");
            let key_count = keys.len();
            match loader.load(keys).await {
                Ok(values) if values.len() == key_count => {
                    for (value, waiters) in values.into_iter().zip(waiters) {
                        for waiter in waiters {
                            let _ = waiter.send(Ok(value.clone()));
                        }
                    }
                }
                Ok(values) => {
                    let error = FieldError::new(format!(
                        "the batch loader returned {} values for {key_count} keys",
                        values.len()
                    ));
                    fail_all(waiters, error);
                }
                Err(error) => fail_all(waiters, error),
            }
        });
        true
    }
}

fn fail_all<V>(waiters: Vec<Vec<Waiter<V>>>, error: FieldError) {
    for waiter in waiters.into_iter().flatten() {
        let _ = waiter.send(Err(error.clone()));
    }
}

/// Something that can be dispatched by a [`DataLoaderRegistry`].
pub trait Dispatch: Send + Sync + 'static {
    /// Starts loading whatever is queued. Returns `false` when nothing was queued.
    fn dispatch(&self) -> bool;
}

impl<L: BatchLoader> Dispatch for DataLoader<L> {
    fn dispatch(&self) -> bool {
        DataLoader::dispatch(self)
    }
}

/// The loaders dispatched together for an execution.
///
/// Dispatching spawns the bulk loads, so executions using a registry must run within
/// a tokio runtime.
#[derive(Clone, Default)]
pub struct DataLoaderRegistry {
    loaders: Arc<RwLock<Vec<Arc<dyn Dispatch>>>>,
    dispatches: Arc<AtomicUsize>,
}

impl DataLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, loader: impl Dispatch) -> &Self {
        self.loaders.write().push(Arc::new(loader));
        self
    }

    /// Dispatches every registered loader.
    pub fn dispatch_all(&self) {
        let started = self
            .loaders
            .read()
            .iter()
            .filter(|loader| loader.dispatch())
            .count();
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(batches = started, "dispatched data loaders");
    }

    /// How many times [`dispatch_all`](Self::dispatch_all) ran.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for DataLoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoaderRegistry")
            .field("loaders", &self.loaders.read().len())
            .field("dispatches", &self.dispatch_count())
            .finish()
    }
}
