//! Transactional resource contract.

use crate::error::{ResourceResult, WriteRejected};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Callback consulted before a resource persists pending changes through its
/// native API.
///
/// Returning an error vetoes the persist; the resource must surface it to
/// the caller as [`crate::ResourceError::WriteRejected`].
pub type WriteGuard = Arc<dyn Fn() -> Result<(), WriteRejected> + Send + Sync>;

/// Transaction isolation level requested when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Dirty reads permitted.
    ReadUncommitted,
    /// Only committed data is visible.
    #[default]
    ReadCommitted,
    /// Rows read once stay stable for the transaction.
    RepeatableRead,
    /// Full serializability.
    Serializable,
    /// Reads see a consistent snapshot taken at transaction start.
    Snapshot,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        };
        f.write_str(name)
    }
}

/// A stateful handle to a connection plus its open transaction.
///
/// Resources are shared between every scope of one logical flow, so all
/// methods take `&self` and implementations use interior mutability.
///
/// # Invariants
///
/// - `save_changes` consults the installed [`WriteGuard`] before doing
///   anything and fails without side effects if the guard vetoes
/// - `commit` and `rollback` end the open transaction
/// - every operation after `dispose` fails with
///   [`crate::ResourceError::Disposed`]
///
/// The async variants default to the synchronous implementation. They are
/// cancelled by dropping the returned future; what happens to the
/// transaction in that case is up to the implementation.
pub trait TransactionalResource: Send + Sync + 'static {
    /// Begins a transaction at the given isolation level.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the resource has
    /// been disposed.
    fn begin_transaction(&self, isolation: IsolationLevel) -> ResourceResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Persists pending changes into the open transaction.
    ///
    /// This is the native persist path. It must call the installed write
    /// guard first. Returns the number of changes persisted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResourceError::WriteRejected`] if the guard vetoes,
    /// or an error if no transaction is open.
    fn save_changes(&self) -> ResourceResult<usize>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the commit fails.
    fn commit(&self) -> ResourceResult<()>;

    /// Rolls back the open transaction, discarding all pending changes.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn rollback(&self) -> ResourceResult<()>;

    /// Releases the connection. Any open transaction is abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the connection fails.
    fn dispose(&self) -> ResourceResult<()>;

    /// Installs or removes the pre-write guard.
    fn set_write_guard(&self, guard: Option<WriteGuard>);

    /// Async variant of [`Self::save_changes`].
    fn save_changes_async(&self) -> impl Future<Output = ResourceResult<usize>> + Send {
        async move { self.save_changes() }
    }

    /// Async variant of [`Self::commit`].
    fn commit_async(&self) -> impl Future<Output = ResourceResult<()>> + Send {
        async move { self.commit() }
    }

    /// Async variant of [`Self::rollback`].
    fn rollback_async(&self) -> impl Future<Output = ResourceResult<()>> + Send {
        async move { self.rollback() }
    }

    /// Async variant of [`Self::dispose`].
    fn dispose_async(&self) -> impl Future<Output = ResourceResult<()>> + Send {
        async move { self.dispose() }
    }
}

/// Creates fresh transactional resources, typically from a connection pool.
pub trait ResourceFactory: Send + Sync {
    /// The resource type produced.
    type Resource: TransactionalResource;

    /// Creates a new resource bound to a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired.
    fn create_resource(&self) -> ResourceResult<Self::Resource>;
}

impl<F: ResourceFactory + ?Sized> ResourceFactory for Arc<F> {
    type Resource = F::Resource;

    fn create_resource(&self) -> ResourceResult<Self::Resource> {
        (**self).create_resource()
    }
}
