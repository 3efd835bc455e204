//! In-memory transactional store for testing and demonstrations.

use crate::error::{ResourceError, ResourceResult, WriteRejected};
use crate::resource::{IsolationLevel, ResourceFactory, TransactionalResource, WriteGuard};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A single change tracked by a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Put {
        collection: String,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        collection: String,
        key: String,
    },
}

impl Change {
    fn matches(&self, collection: &str, key: &str) -> bool {
        match self {
            Self::Put {
                collection: c,
                key: k,
                ..
            }
            | Self::Delete {
                collection: c,
                key: k,
            } => c == collection && k == key,
        }
    }

    fn value(&self) -> Option<Vec<u8>> {
        match self {
            Self::Put { value, .. } => Some(value.clone()),
            Self::Delete { .. } => None,
        }
    }
}

/// Counters describing what happened to an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back explicitly.
    pub rollbacks: u64,
    /// Resources handed out by factories.
    pub resources_created: u64,
    /// Resources disposed.
    pub resources_disposed: u64,
}

/// Committed data shared by every resource created from the same factory.
///
/// Data is organised as `collection -> key -> bytes`. Values are opaque.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use txscope_resource::{
///     InMemoryResourceFactory, InMemoryStore, IsolationLevel, ResourceFactory,
///     TransactionalResource,
/// };
///
/// let store = Arc::new(InMemoryStore::new());
/// let factory = InMemoryResourceFactory::new(Arc::clone(&store));
///
/// let resource = factory.create_resource().unwrap();
/// resource.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
/// resource.put("heroes", "1", b"Batman".to_vec()).unwrap();
/// resource.save_changes().unwrap();
/// resource.commit().unwrap();
///
/// assert_eq!(store.get("heroes", "1"), Some(b"Batman".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    resources_created: AtomicU64,
    resources_disposed: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a committed value.
    #[must_use]
    pub fn get(&self, collection: &str, key: &str) -> Option<Vec<u8>> {
        self.data
            .read()
            .get(collection)
            .and_then(|entries| entries.get(key).cloned())
    }

    /// Returns all committed entries of a collection in key order.
    #[must_use]
    pub fn scan(&self, collection: &str) -> Vec<(String, Vec<u8>)> {
        self.data
            .read()
            .get(collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of committed entries in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.data.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns a snapshot of the store counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            resources_created: self.resources_created.load(Ordering::Relaxed),
            resources_disposed: self.resources_disposed.load(Ordering::Relaxed),
        }
    }

    /// Removes all committed data. Counters are kept.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Applies a batch of changes atomically.
    fn apply(&self, changes: Vec<Change>) {
        let mut data = self.data.write();
        for change in changes {
            match change {
                Change::Put {
                    collection,
                    key,
                    value,
                } => {
                    data.entry(collection).or_default().insert(key, value);
                }
                Change::Delete { collection, key } => {
                    if let Some(entries) = data.get_mut(&collection) {
                        entries.remove(&key);
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct OpenTransaction {
    isolation: IsolationLevel,
    /// Saved but not yet committed.
    staged: Vec<Change>,
}

#[derive(Debug, Default)]
struct ResourceState {
    /// Tracked but not yet saved.
    tracked: Vec<Change>,
    transaction: Option<OpenTransaction>,
    disposed: bool,
}

/// A resource over an [`InMemoryStore`].
///
/// Changes go through three stages: `put`/`delete` track them,
/// `save_changes` moves them into the open transaction, and `commit`
/// publishes them to the store. Reads see the newest stage first.
///
/// Isolation levels are recorded but not enforced; every transaction reads
/// the latest committed data.
pub struct InMemoryResource {
    id: u64,
    store: Arc<InMemoryStore>,
    state: Mutex<ResourceState>,
    guard: RwLock<Option<WriteGuard>>,
}

impl InMemoryResource {
    fn new(id: u64, store: Arc<InMemoryStore>) -> Self {
        Self {
            id,
            store,
            state: Mutex::new(ResourceState::default()),
            guard: RwLock::new(None),
        }
    }

    /// Returns the resource ID, unique per factory.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the isolation level of the open transaction, if any.
    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.state
            .lock()
            .transaction
            .as_ref()
            .map(|txn| txn.isolation)
    }

    /// Returns true once the resource has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Returns the number of tracked changes not yet saved.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// Returns true while a write guard is installed.
    #[must_use]
    pub fn has_write_guard(&self) -> bool {
        self.guard.read().is_some()
    }

    /// Tracks an insert or update.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has been disposed.
    pub fn put(
        &self,
        collection: impl Into<String>,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> ResourceResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        state.tracked.push(Change::Put {
            collection: collection.into(),
            key: key.into(),
            value,
        });
        Ok(())
    }

    /// Tracks a delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has been disposed.
    pub fn delete(&self, collection: impl Into<String>, key: impl Into<String>) -> ResourceResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        state.tracked.push(Change::Delete {
            collection: collection.into(),
            key: key.into(),
        });
        Ok(())
    }

    /// Reads a value, seeing this resource's own uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has been disposed.
    pub fn get(&self, collection: &str, key: &str) -> ResourceResult<Option<Vec<u8>>> {
        let state = self.state.lock();
        ensure_open(&state)?;

        let staged = state
            .transaction
            .iter()
            .flat_map(|txn| txn.staged.iter());
        let newest = state
            .tracked
            .iter()
            .rev()
            .chain(staged.rev())
            .find(|change| change.matches(collection, key));

        Ok(match newest {
            Some(change) => change.value(),
            None => self.store.get(collection, key),
        })
    }

    /// Returns all entries of a collection, including this resource's own
    /// uncommitted changes, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource has been disposed.
    pub fn scan(&self, collection: &str) -> ResourceResult<Vec<(String, Vec<u8>)>> {
        let state = self.state.lock();
        ensure_open(&state)?;

        let mut entries: BTreeMap<String, Vec<u8>> =
            self.store.scan(collection).into_iter().collect();
        let staged = state
            .transaction
            .iter()
            .flat_map(|txn| txn.staged.iter());
        for change in staged.chain(state.tracked.iter()) {
            match change {
                Change::Put {
                    collection: c,
                    key,
                    value,
                } if c == collection => {
                    entries.insert(key.clone(), value.clone());
                }
                Change::Delete { collection: c, key } if c == collection => {
                    entries.remove(key);
                }
                _ => {}
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn check_guard(&self) -> Result<(), WriteRejected> {
        // Clone out so the guard never runs under our lock.
        let guard = self.guard.read().clone();
        match guard {
            Some(guard) => guard(),
            None => Ok(()),
        }
    }
}

fn ensure_open(state: &ResourceState) -> ResourceResult<()> {
    if state.disposed {
        Err(ResourceError::Disposed)
    } else {
        Ok(())
    }
}

impl TransactionalResource for InMemoryResource {
    fn begin_transaction(&self, isolation: IsolationLevel) -> ResourceResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        if state.transaction.is_some() {
            return Err(ResourceError::TransactionAlreadyActive);
        }
        state.transaction = Some(OpenTransaction {
            isolation,
            staged: Vec::new(),
        });
        tracing::trace!(resource = self.id, %isolation, "transaction begun");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().transaction.is_some()
    }

    fn save_changes(&self) -> ResourceResult<usize> {
        if self.state.lock().disposed {
            return Err(ResourceError::Disposed);
        }
        self.check_guard()?;

        let mut state = self.state.lock();
        let tracked = std::mem::take(&mut state.tracked);
        let Some(txn) = state.transaction.as_mut() else {
            state.tracked = tracked;
            return Err(ResourceError::NoTransaction);
        };
        let saved = tracked.len();
        txn.staged.extend(tracked);
        Ok(saved)
    }

    fn commit(&self) -> ResourceResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        let txn = state
            .transaction
            .take()
            .ok_or(ResourceError::NoTransaction)?;
        let count = txn.staged.len();
        self.store.apply(txn.staged);
        tracing::trace!(resource = self.id, changes = count, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> ResourceResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        if state.transaction.take().is_none() {
            return Err(ResourceError::NoTransaction);
        }
        state.tracked.clear();
        self.store.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(resource = self.id, "transaction rolled back");
        Ok(())
    }

    fn dispose(&self) -> ResourceResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Ok(());
        }
        state.disposed = true;
        state.transaction = None;
        state.tracked.clear();
        drop(state);

        *self.guard.write() = None;
        self.store.resources_disposed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_write_guard(&self, guard: Option<WriteGuard>) {
        *self.guard.write() = guard;
    }

    fn save_changes_async(&self) -> impl Future<Output = ResourceResult<usize>> + Send {
        async move {
            tokio::task::yield_now().await;
            self.save_changes()
        }
    }

    fn commit_async(&self) -> impl Future<Output = ResourceResult<()>> + Send {
        async move {
            tokio::task::yield_now().await;
            self.commit()
        }
    }

    fn rollback_async(&self) -> impl Future<Output = ResourceResult<()>> + Send {
        async move {
            tokio::task::yield_now().await;
            self.rollback()
        }
    }
}

impl std::fmt::Debug for InMemoryResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResource")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Hands out [`InMemoryResource`]s bound to one shared store.
#[derive(Debug)]
pub struct InMemoryResourceFactory {
    store: Arc<InMemoryStore>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl InMemoryResourceFactory {
    /// Creates a factory over the given store.
    #[must_use]
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Simulates an unreachable backend. While unavailable, resource
    /// creation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryResourceFactory {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }
}

impl ResourceFactory for InMemoryResourceFactory {
    type Resource = InMemoryResource;

    fn create_resource(&self) -> ResourceResult<InMemoryResource> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ResourceError::backend("store unavailable"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.store.resources_created.fetch_add(1, Ordering::Relaxed);
        Ok(InMemoryResource::new(id, Arc::clone(&self.store)))
    }
}
