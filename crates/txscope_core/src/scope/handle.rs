//! Caller-facing scope handle and the resource half of disposal.

use super::state::{final_state, Finish, Scope, Settlement};
use crate::error::{ScopeError, ScopeResult};
use crate::types::{ScopeId, ScopeState};
use std::fmt;
use std::sync::Arc;
use txscope_resource::{IsolationLevel, ResourceResult, TransactionalResource};

/// A unit of work joined to the ambient transaction of the current flow.
///
/// Handles are created by [`crate::ScopeFactory`]. Call [`complete`] once the
/// work succeeded, then [`dispose`] (or [`dispose_async`]) in reverse
/// creation order. Only the root scope of a flow commits; it does so on
/// disposal if it was completed and no nested scope failed.
///
/// Dropping a handle that was never disposed runs the synchronous disposal
/// and logs any error, so an early return through `?` rolls the work back.
/// A handle dropped out of order, or outside its flow, abandons its scope:
/// a root rolls back and releases its resource, a joined scope fails its
/// parent.
///
/// [`complete`]: Self::complete
/// [`dispose`]: Self::dispose
/// [`dispose_async`]: Self::dispose_async
pub struct ScopeHandle<R: TransactionalResource> {
    scope: Arc<Scope<R>>,
}

impl<R: TransactionalResource> ScopeHandle<R> {
    pub(crate) fn new(scope: Arc<Scope<R>>) -> Self {
        Self { scope }
    }

    /// Returns the scope ID.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.scope.id()
    }

    /// Returns the nesting depth, 0 for the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope.depth()
    }

    /// Returns true if this scope owns the resource.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.scope.is_root()
    }

    /// Returns true if the scope never persists changes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.scope.is_read_only()
    }

    /// Returns true if the native persist path is allowed.
    #[must_use]
    pub fn allows_direct_writes(&self) -> bool {
        self.scope.allows_direct_writes()
    }

    /// Returns the isolation level of the shared transaction.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.scope.isolation_level()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.scope.state()
    }

    /// Returns true once [`Self::complete`] succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.scope.is_completed()
    }

    /// Returns true if a nested scope failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.scope.is_failed()
    }

    /// Returns true once disposal started.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    /// Returns the shared resource.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::AlreadyDisposed`] after disposal.
    pub fn resource(&self) -> ScopeResult<Arc<R>> {
        if self.scope.is_disposed() {
            return Err(self.scope.already_disposed());
        }
        Ok(Arc::clone(self.scope.resource()))
    }

    /// Marks the work of this scope as successful.
    ///
    /// Nothing is committed here; the root commits on disposal.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::DoubleCompletion`] on the second call and
    /// [`ScopeError::AlreadyDisposed`] after disposal.
    pub fn complete(&self) -> ScopeResult<()> {
        self.scope.complete()
    }

    /// Disposes the scope, committing or rolling back if it is the root.
    ///
    /// A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the protocol error the disposal surfaced, or the resource
    /// error if the protocol succeeded but the resource failed.
    pub fn dispose(&self) -> ScopeResult<()> {
        let Some(settlement) = self.scope.settle()? else {
            return Ok(());
        };
        let resource = self.scope.resource();
        if settlement.release {
            resource.set_write_guard(None);
        }

        let outcome = match settlement.finish {
            Finish::Nothing => Ok(()),
            Finish::Rollback => rollback_if_open(&self.scope),
            Finish::Commit { persist } => commit(&self.scope, persist),
        };
        let released = if settlement.release {
            resource.dispose()
        } else {
            Ok(())
        };
        conclude(&self.scope, settlement, outcome, released)
    }

    /// Async variant of [`Self::dispose`], driving the resource through its
    /// async methods.
    ///
    /// Cancelling the returned future after it started leaves the scope
    /// disposed and popped; the resource half may be incomplete.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispose`].
    pub async fn dispose_async(&self) -> ScopeResult<()> {
        let Some(settlement) = self.scope.settle()? else {
            return Ok(());
        };
        let resource = self.scope.resource();
        if settlement.release {
            resource.set_write_guard(None);
        }

        let outcome = match settlement.finish {
            Finish::Nothing => Ok(()),
            Finish::Rollback => rollback_if_open_async(&self.scope).await,
            Finish::Commit { persist } => commit_async(&self.scope, persist).await,
        };
        let released = if settlement.release {
            resource.dispose_async().await
        } else {
            Ok(())
        };
        conclude(&self.scope, settlement, outcome, released)
    }
}

fn rollback_if_open<R: TransactionalResource>(scope: &Scope<R>) -> ResourceResult<()> {
    let resource = scope.resource();
    if !resource.in_transaction() {
        return Ok(());
    }
    resource.rollback()?;
    scope.stats().record_rollback();
    tracing::debug!(scope_id = %scope.id(), "transaction rolled back");
    Ok(())
}

async fn rollback_if_open_async<R: TransactionalResource>(scope: &Scope<R>) -> ResourceResult<()> {
    let resource = scope.resource();
    if !resource.in_transaction() {
        return Ok(());
    }
    resource.rollback_async().await?;
    scope.stats().record_rollback();
    tracing::debug!(scope_id = %scope.id(), "transaction rolled back");
    Ok(())
}

fn commit<R: TransactionalResource>(scope: &Scope<R>, persist: bool) -> ResourceResult<()> {
    let resource = scope.resource();
    let mut result = Ok(());
    if persist {
        result = resource.save_changes().map(drop);
    }
    if result.is_ok() {
        result = resource.commit();
    }
    match result {
        Ok(()) => {
            committed(scope);
            Ok(())
        }
        Err(err) => {
            if let Err(rollback_err) = rollback_if_open(scope) {
                tracing::warn!(scope_id = %scope.id(), error = %rollback_err, "rollback after failed commit failed");
            }
            Err(err)
        }
    }
}

async fn commit_async<R: TransactionalResource>(scope: &Scope<R>, persist: bool) -> ResourceResult<()> {
    let resource = scope.resource();
    let mut result = Ok(());
    if persist {
        result = resource.save_changes_async().await.map(drop);
    }
    if result.is_ok() {
        result = resource.commit_async().await;
    }
    match result {
        Ok(()) => {
            committed(scope);
            Ok(())
        }
        Err(err) => {
            if let Err(rollback_err) = rollback_if_open_async(scope).await {
                tracing::warn!(scope_id = %scope.id(), error = %rollback_err, "rollback after failed commit failed");
            }
            Err(err)
        }
    }
}

fn committed<R>(scope: &Scope<R>) {
    scope.stats().record_commit();
    tracing::debug!(scope_id = %scope.id(), "transaction committed");
}

/// Records the terminal state and picks the error to surface. Protocol
/// errors win over resource errors; the losers are logged.
fn conclude<R>(
    scope: &Scope<R>,
    settlement: Settlement,
    outcome: ResourceResult<()>,
    released: ResourceResult<()>,
) -> ScopeResult<()> {
    scope.finish(final_state(settlement.finish, &outcome));

    let mut resource_errors = outcome.err().into_iter().chain(released.err());
    let primary = match settlement.error {
        Some(err) => Some(err),
        None => resource_errors.next().map(ScopeError::from),
    };
    for err in resource_errors {
        tracing::warn!(scope_id = %scope.id(), error = %err, "resource failure during disposal");
    }
    primary.map_or(Ok(()), Err)
}

impl<R: TransactionalResource> Drop for ScopeHandle<R> {
    fn drop(&mut self) {
        if self.scope.is_disposed() {
            return;
        }
        let Err(err) = self.dispose() else {
            return;
        };
        tracing::warn!(
            scope_id = %self.scope.id(),
            depth = self.scope.depth(),
            error = %err,
            "scope dropped without explicit disposal"
        );
        if matches!(err, ScopeError::OutOfOrderDisposal { .. }) && self.scope.abandon() {
            release_abandoned(&self.scope);
        }
    }
}

/// Rolls back and releases the resource of an abandoned root.
fn release_abandoned<R: TransactionalResource>(scope: &Scope<R>) {
    let resource = scope.resource();
    resource.set_write_guard(None);
    let rolled_back = rollback_if_open(scope);
    for err in rolled_back.err().into_iter().chain(resource.dispose().err()) {
        tracing::warn!(scope_id = %scope.id(), error = %err, "failed to release abandoned scope");
    }
}

impl<R: TransactionalResource> fmt::Debug for ScopeHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("id", &self.id())
            .field("depth", &self.depth())
            .field("read_only", &self.is_read_only())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{flow, ResourceAccessor, ScopeError, ScopeFactory, ScopeOptions, ScopeState};
    use std::sync::Arc;
    use txscope_resource::{
        InMemoryResource, InMemoryResourceFactory, InMemoryStore, ResourceError,
        TransactionalResource,
    };

    fn factory() -> (Arc<InMemoryStore>, ScopeFactory<InMemoryResourceFactory>) {
        let resources = InMemoryResourceFactory::default();
        let store = Arc::clone(resources.store());
        (store, ScopeFactory::new(resources))
    }

    #[test]
    fn completed_root_commits_once() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            root.complete().unwrap();

            root.dispose().unwrap();
            root.dispose().unwrap();

            assert_eq!(root.state(), ScopeState::Committed);
        });
        assert_eq!(store.get("heroes", "1"), Some(b"Batman".to_vec()));
        assert_eq!(store.stats().commits, 1);
        assert_eq!(store.stats().resources_disposed, 1);
        assert_eq!(scopes.stats().snapshot().commits, 1);
    }

    #[test]
    fn uncompleted_writable_root_rolls_back() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();

            let err = root.dispose().unwrap_err();
            assert!(matches!(err, ScopeError::AbortedScope { depth: 0, .. }));
            assert_eq!(root.state(), ScopeState::RolledBack);
        });
        assert_eq!(store.count("heroes"), 0);
        assert_eq!(store.stats().rollbacks, 1);
        assert_eq!(scopes.stats().snapshot().aborted, 1);
    }

    #[test]
    fn read_only_root_needs_no_completion() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create_read_only().unwrap();
            root.dispose().unwrap();
            assert_eq!(root.state(), ScopeState::RolledBack);
        });
        assert_eq!(store.stats().resources_disposed, 1);
    }

    #[test]
    fn completed_child_with_uncompleted_root_rolls_back() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();
            child.resource().unwrap().put("heroes", "1", b"Robin".to_vec()).unwrap();
            child.complete().unwrap();
            child.dispose().unwrap();
            assert_eq!(child.state(), ScopeState::Released);

            assert!(matches!(root.dispose(), Err(ScopeError::AbortedScope { .. })));
        });
        assert_eq!(store.count("heroes"), 0);
    }

    #[test]
    fn complete_twice_and_after_dispose() {
        let (_store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create_read_only().unwrap();
            root.complete().unwrap();
            assert!(matches!(root.complete(), Err(ScopeError::DoubleCompletion { .. })));

            root.dispose().unwrap();
            assert!(matches!(root.complete(), Err(ScopeError::AlreadyDisposed { .. })));
            assert!(matches!(root.resource(), Err(ScopeError::AlreadyDisposed { .. })));
        });
    }

    #[test]
    fn outer_disposed_before_inner_is_out_of_order() {
        let (_store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();

            let err = root.dispose().unwrap_err();
            match err {
                ScopeError::OutOfOrderDisposal { scope, active, .. } => {
                    assert_eq!(scope, root.id());
                    assert_eq!(active, Some(child.id()));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(root.state(), ScopeState::Active);
            assert!(!root.is_disposed());
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 2);
            child.complete().unwrap();
            child.dispose().unwrap();
        });
        assert_eq!(scopes.stats().snapshot().out_of_order, 1);
    }

    #[test]
    fn retry_in_order_after_out_of_order_runs_the_full_protocol() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            root.complete().unwrap();
            let child = scopes.create().unwrap();

            assert!(matches!(root.dispose(), Err(ScopeError::OutOfOrderDisposal { .. })));
            child.complete().unwrap();
            child.dispose().unwrap();
            root.dispose().unwrap();

            assert_eq!(root.state(), ScopeState::Committed);
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 0);

            let next = scopes.create().unwrap();
            assert!(next.is_root());
            next.resource().unwrap().put("heroes", "2", b"Robin".to_vec()).unwrap();
            next.complete().unwrap();
            next.dispose().unwrap();
        });
        assert_eq!(store.count("heroes"), 2);
        assert_eq!(store.stats().commits, 2);
        assert_eq!(store.stats().resources_disposed, 2);
    }

    #[test]
    fn root_dropped_out_of_order_releases_its_resource() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            let child = scopes.create().unwrap();

            let abandoned = root.scope.clone();
            drop(root);
            assert_eq!(abandoned.state(), ScopeState::Abandoned);
            assert_eq!(store.stats().resources_disposed, 1);
            assert_eq!(store.stats().rollbacks, 1);

            child.complete().unwrap();
            child.dispose().unwrap();
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 0);

            let next = scopes.create().unwrap();
            assert!(next.is_root());
            next.resource().unwrap().put("heroes", "2", b"Robin".to_vec()).unwrap();
            next.complete().unwrap();
            next.dispose().unwrap();
        });
        assert_eq!(store.count("heroes"), 1);
        assert_eq!(store.get("heroes", "2"), Some(b"Robin".to_vec()));
        assert_eq!(store.stats().resources_disposed, 2);
    }

    #[test]
    fn child_dropped_out_of_order_fails_the_root() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();
            let grandchild = scopes.create().unwrap();

            drop(child);
            assert!(root.is_failed());
            grandchild.complete().unwrap();
            grandchild.dispose().unwrap();
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 1);

            root.complete().unwrap();
            assert!(matches!(root.dispose(), Err(ScopeError::CascadingFailure { depth: 0, .. })));
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 0);
        });
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().resources_disposed, 1);
    }

    #[test]
    fn handle_dropped_outside_its_flow_releases_its_resource() {
        let (store, scopes) = factory();
        let root = flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            root
        });
        assert_eq!(store.stats().resources_disposed, 0);

        drop(root);
        assert_eq!(store.count("heroes"), 0);
        assert_eq!(store.stats().resources_disposed, 1);
        assert_eq!(scopes.stats().snapshot().out_of_order, 1);
    }

    #[test]
    fn direct_write_is_refused_and_rolls_back() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let resource = root.resource().unwrap();
            resource.put("heroes", "1", b"Batman".to_vec()).unwrap();

            let err = resource.save_changes().unwrap_err();
            assert!(matches!(err, ResourceError::WriteRejected(_)));

            root.complete().unwrap();
            let err = root.dispose().unwrap_err();
            assert!(matches!(err, ScopeError::DirectWriteViolation(ref v) if v.depth == 0));
            assert_eq!(root.state(), ScopeState::RolledBack);
        });
        assert_eq!(store.count("heroes"), 0);
    }

    #[test]
    fn allowed_direct_write_commits() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes
                .create_with(ScopeOptions::new().allow_direct_writes(true))
                .unwrap();
            let resource = root.resource().unwrap();
            resource.put("heroes", "1", b"Batman".to_vec()).unwrap();
            assert_eq!(resource.save_changes().unwrap(), 1);
            root.complete().unwrap();
            root.dispose().unwrap();
        });
        assert_eq!(store.count("heroes"), 1);
    }

    #[test]
    fn read_only_scope_refuses_direct_writes_even_when_allowed() {
        let (_store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes
                .create_with(ScopeOptions::new().read_only(true).allow_direct_writes(true))
                .unwrap();
            let resource = root.resource().unwrap();
            assert!(resource.save_changes().unwrap_err().is_write_rejected());
            assert!(matches!(root.dispose(), Err(ScopeError::DirectWriteViolation(_))));
        });
    }

    #[test]
    fn violation_in_child_fails_root() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();
            let resource = child.resource().unwrap();
            resource.put("heroes", "1", b"Robin".to_vec()).unwrap();
            let _ = resource.save_changes();
            child.complete().unwrap();

            let err = child.dispose().unwrap_err();
            assert!(matches!(err, ScopeError::DirectWriteViolation(ref v) if v.depth == 1));
            assert!(root.is_failed());

            root.complete().unwrap();
            let err = root.dispose().unwrap_err();
            assert!(matches!(err, ScopeError::DirectWriteViolation(ref v) if v.depth == 1));
        });
        assert_eq!(store.count("heroes"), 0);
    }

    #[test]
    fn dropping_an_undisposed_handle_rolls_back() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            {
                let root = scopes.create().unwrap();
                root.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            }
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 0);
        });
        assert_eq!(store.count("heroes"), 0);
        assert_eq!(store.stats().resources_disposed, 1);
    }

    #[test]
    fn failed_commit_surfaces_resource_error() {
        let (store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create().unwrap();
            let resource = root.resource().unwrap();
            resource.put("heroes", "1", b"Batman".to_vec()).unwrap();
            resource.dispose().unwrap();
            root.complete().unwrap();

            let err = root.dispose().unwrap_err();
            assert!(matches!(err, ScopeError::Resource(ResourceError::Disposed)));
            assert_eq!(root.state(), ScopeState::RolledBack);
        });
        assert_eq!(store.count("heroes"), 0);
    }

    #[tokio::test]
    async fn async_disposal_follows_the_same_protocol() {
        let (store, scopes) = factory();
        flow::scope(async {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();
            child.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
            child.complete().unwrap();
            child.dispose_async().await.unwrap();

            root.complete().unwrap();
            root.dispose_async().await.unwrap();
            assert_eq!(root.state(), ScopeState::Committed);
        })
        .await;
        assert_eq!(store.count("heroes"), 1);
    }

    #[tokio::test]
    async fn async_disposal_of_an_aborted_child_fails_the_root() {
        let (store, scopes) = factory();
        flow::scope(async {
            let root = scopes.create().unwrap();
            let child = scopes.create().unwrap();
            child.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();

            let err = child.dispose_async().await.unwrap_err();
            assert!(matches!(err, ScopeError::AbortedScope { depth: 1, .. }));
            assert_eq!(child.state(), ScopeState::RolledBack);
            assert!(root.is_failed());

            root.complete().unwrap();
            let err = root.dispose_async().await.unwrap_err();
            assert!(matches!(err, ScopeError::CascadingFailure { depth: 0, .. }));
            assert_eq!(ResourceAccessor::depth::<InMemoryResource>(), 0);
        })
        .await;
        assert_eq!(store.count("heroes"), 0);
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().resources_disposed, 1);
        let stats = scopes.stats().snapshot();
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.cascading_failures, 1);
    }

    #[tokio::test]
    async fn async_disposal_propagates_cascading_failures_through_every_level() {
        let (store, scopes) = factory();
        flow::scope(async {
            let root = scopes.create().unwrap();
            let middle = scopes.create().unwrap();
            let leaf = scopes.create().unwrap();

            assert!(matches!(
                leaf.dispose_async().await,
                Err(ScopeError::AbortedScope { depth: 2, .. })
            ));
            middle.complete().unwrap();
            assert!(matches!(
                middle.dispose_async().await,
                Err(ScopeError::CascadingFailure { depth: 1, .. })
            ));
            root.complete().unwrap();
            assert!(matches!(
                root.dispose_async().await,
                Err(ScopeError::CascadingFailure { depth: 0, .. })
            ));
        })
        .await;
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().resources_disposed, 1);
        assert_eq!(scopes.stats().snapshot().cascading_failures, 2);
    }

    #[test]
    fn debug_output_names_the_scope() {
        let (_store, scopes) = factory();
        flow::scope_sync(|| {
            let root = scopes.create_read_only().unwrap();
            let debug = format!("{root:?}");
            assert!(debug.contains("ScopeHandle"));
            assert!(debug.contains("read_only: true"));
            root.dispose().unwrap();
        });
    }
}
