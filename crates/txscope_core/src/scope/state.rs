//! Scope state and the disposal decision.

use crate::ambient::AmbientStack;
use crate::config::ScopeOptions;
use crate::error::{DirectWriteViolation, ScopeError, ScopeResult};
use crate::flow;
use crate::stats::ScopeStats;
use crate::types::{ScopeId, ScopeState};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use txscope_resource::{
    IsolationLevel, ResourceFactory, ResourceResult, TransactionalResource, WriteGuard,
    WriteRejected,
};

/// Mutable part of a scope.
#[derive(Debug, Default)]
struct ScopeStatus {
    state: ScopeState,
    completed: bool,
    /// Set by a nested scope that went wrong.
    failed: bool,
    disposed: bool,
    violation: Option<DirectWriteViolation>,
}

/// One nested unit of work.
///
/// A root scope (no parent) owns its resource; a joined scope shares the
/// root's resource and never decides the transaction outcome on success.
pub(crate) struct Scope<R> {
    id: ScopeId,
    parent: Option<Arc<Scope<R>>>,
    resource: Arc<R>,
    depth: usize,
    read_only: bool,
    allow_direct_writes: bool,
    isolation: IsolationLevel,
    stats: Arc<ScopeStats>,
    status: Mutex<ScopeStatus>,
}

/// What disposal does to the shared transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    /// Leave the transaction alone.
    Nothing,
    /// Roll back if the transaction is still open.
    Rollback,
    /// Persist pending changes unless read-only, then commit.
    Commit { persist: bool },
}

/// Outcome of the bookkeeping half of disposal. The resource half is run by
/// [`crate::ScopeHandle`] either synchronously or asynchronously.
#[derive(Debug)]
pub(crate) struct Settlement {
    pub(crate) finish: Finish,
    /// Root only: remove the guard and dispose the resource.
    pub(crate) release: bool,
    /// Protocol error to surface regardless of how the resource behaves.
    pub(crate) error: Option<ScopeError>,
}

impl<R: TransactionalResource> Scope<R> {
    /// Creates a scope in the current flow, joining the top scope if there
    /// is one and becoming root otherwise, and pushes it.
    pub(crate) fn begin<F>(
        factory: &F,
        options: ScopeOptions,
        stats: &Arc<ScopeStats>,
    ) -> ScopeResult<Arc<Self>>
    where
        F: ResourceFactory<Resource = R> + ?Sized,
    {
        flow::ensure_active()?;
        let stack = AmbientStack::<R>::current();

        let scope = match stack.peek() {
            Some(parent) => {
                if parent.read_only && !options.read_only {
                    return Err(ScopeError::NestingViolation {
                        parent: parent.id,
                        depth: parent.depth + 1,
                    });
                }
                stats.record_joined();
                Arc::new(Self {
                    id: ScopeId::next(),
                    parent: Some(Arc::clone(parent)),
                    resource: Arc::clone(&parent.resource),
                    depth: parent.depth + 1,
                    read_only: parent.read_only,
                    allow_direct_writes: parent.allow_direct_writes,
                    isolation: parent.isolation,
                    stats: Arc::clone(stats),
                    status: Mutex::new(ScopeStatus::default()),
                })
            }
            None => {
                let scope = Self::new_root(factory, options, stats)?;
                stats.record_root();
                scope
            }
        };

        stack.push(Arc::clone(&scope)).publish()?;
        tracing::debug!(
            scope_id = %scope.id,
            depth = scope.depth,
            read_only = scope.read_only,
            flow = ?flow::token(),
            "scope created"
        );
        Ok(scope)
    }

    fn new_root<F>(factory: &F, options: ScopeOptions, stats: &Arc<ScopeStats>) -> ScopeResult<Arc<Self>>
    where
        F: ResourceFactory<Resource = R> + ?Sized,
    {
        let resource = Arc::new(factory.create_resource()?);
        if let Err(err) = resource.begin_transaction(options.isolation_level) {
            if let Err(dispose_err) = resource.dispose() {
                tracing::warn!(error = %dispose_err, "failed to release resource after begin failed");
            }
            return Err(err.into());
        }

        let scope = Arc::new(Self {
            id: ScopeId::next(),
            parent: None,
            resource: Arc::clone(&resource),
            depth: 0,
            read_only: options.read_only,
            allow_direct_writes: options.allow_direct_writes,
            isolation: options.isolation_level,
            stats: Arc::clone(stats),
            status: Mutex::new(ScopeStatus::default()),
        });
        resource.set_write_guard(Some(direct_write_guard(&scope)));
        Ok(scope)
    }

    /// Creates a root scope that is not pushed onto any stack.
    #[cfg(test)]
    pub(crate) fn detached_root<F>(factory: &F, options: ScopeOptions, stats: Arc<ScopeStats>) -> Arc<Self>
    where
        F: ResourceFactory<Resource = R>,
    {
        Self::new_root(factory, options, &stats).expect("create detached root")
    }

    /// Guard policy: records a violation on this scope and vetoes the write
    /// unless direct writes are allowed on a writable scope.
    fn check_direct_write(&self) -> Result<(), WriteRejected> {
        let reason = if !self.allow_direct_writes {
            "direct writes are not allowed; complete the scope instead"
        } else if self.read_only {
            "read-only scopes never persist changes"
        } else {
            tracing::trace!(scope_id = %self.id, "direct write allowed");
            return Ok(());
        };

        let violation = DirectWriteViolation {
            scope: self.id,
            depth: self.depth,
            reason: reason.to_string(),
        };
        tracing::debug!(scope_id = %self.id, depth = self.depth, reason, "direct write refused");
        self.stats.record_violation();
        let message = violation.to_string();
        let mut status = self.status.lock();
        if status.violation.is_none() {
            status.violation = Some(violation);
        }
        Err(WriteRejected::new(message))
    }
}

impl<R> Scope<R> {
    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn allows_direct_writes(&self) -> bool {
        self.allow_direct_writes
    }

    pub(crate) fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    pub(crate) fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    pub(crate) fn state(&self) -> ScopeState {
        self.status.lock().state
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.status.lock().completed
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.status.lock().failed
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.status.lock().disposed
    }

    pub(crate) fn stats(&self) -> &ScopeStats {
        &self.stats
    }

    pub(crate) fn already_disposed(&self) -> ScopeError {
        ScopeError::AlreadyDisposed {
            scope: self.id,
            depth: self.depth,
        }
    }

    /// Records that the caller's work succeeded.
    pub(crate) fn complete(&self) -> ScopeResult<()> {
        let mut status = self.status.lock();
        if status.disposed {
            return Err(self.already_disposed());
        }
        if status.completed {
            return Err(ScopeError::DoubleCompletion {
                scope: self.id,
                depth: self.depth,
            });
        }
        status.completed = true;
        status.state = ScopeState::Completed;
        drop(status);

        tracing::debug!(scope_id = %self.id, depth = self.depth, "scope completed");
        Ok(())
    }

    /// Records the final state once the resource half of disposal ran.
    pub(crate) fn finish(&self, state: ScopeState) {
        self.status.lock().state = state;
    }

    /// Gives up on a scope whose handle is gone while it is not on top of
    /// its flow's stack. The scope is marked disposed and `Abandoned` and its
    /// parent is failed; the stack drops it once it surfaces.
    ///
    /// Returns true if the caller must release the resource, i.e. the scope
    /// is a root that was not disposed yet.
    pub(crate) fn abandon(&self) -> bool {
        let violation = {
            let mut status = self.status.lock();
            if status.disposed {
                return false;
            }
            status.disposed = true;
            status.state = ScopeState::Abandoned;
            status.violation.clone()
        };
        if let Some(parent) = &self.parent {
            parent.fail(violation);
        }
        tracing::warn!(scope_id = %self.id, depth = self.depth, "scope abandoned");
        self.parent.is_none()
    }

    /// Stamps a failure coming from a nested scope.
    fn fail(&self, violation: Option<DirectWriteViolation>) {
        let mut status = self.status.lock();
        status.failed = true;
        if status.violation.is_none() {
            status.violation = violation;
        }
    }
}

impl<R: TransactionalResource> Scope<R> {
    /// Runs the bookkeeping half of disposal: marks the scope disposed, pops
    /// it from the flow's stack and decides what happens to the transaction.
    ///
    /// Returns `Ok(None)` if the scope was already disposed.
    pub(crate) fn settle(self: &Arc<Self>) -> ScopeResult<Option<Settlement>> {
        if self.is_disposed() {
            tracing::debug!(scope_id = %self.id, "scope already disposed");
            return Ok(None);
        }

        // Out of order: stays undisposed and on the stack.
        let stack = AmbientStack::<R>::current();
        let on_top = stack.peek().is_some_and(|top| Arc::ptr_eq(top, self));
        if !on_top {
            let active = stack.peek().map(|top| top.id);
            self.stats.record_out_of_order();
            tracing::warn!(
                scope_id = %self.id,
                depth = self.depth,
                active = ?active,
                flow = ?flow::token(),
                "scope disposed out of order"
            );
            return Err(ScopeError::OutOfOrderDisposal {
                scope: self.id,
                depth: self.depth,
                active,
            });
        }

        let (completed, failed, violation) = {
            let mut status = self.status.lock();
            if status.disposed {
                return Ok(None);
            }
            status.disposed = true;
            (status.completed, status.failed, status.violation.clone())
        };
        stack
            .pop()
            .ok_or_else(|| ScopeError::internal("active scope vanished from the stack"))?
            .publish()?;

        let root = self.is_root();
        let settlement = if let Some(violation) = violation {
            if let Some(parent) = &self.parent {
                parent.fail(Some(violation.clone()));
            }
            Settlement {
                finish: if root { Finish::Rollback } else { Finish::Nothing },
                release: root,
                error: Some(ScopeError::DirectWriteViolation(violation)),
            }
        } else if failed {
            self.stats.record_cascading_failure();
            if let Some(parent) = &self.parent {
                parent.fail(None);
            }
            Settlement {
                finish: if root { Finish::Rollback } else { Finish::Nothing },
                release: root,
                error: Some(ScopeError::CascadingFailure {
                    scope: self.id,
                    depth: self.depth,
                }),
            }
        } else if !self.read_only && !completed {
            self.stats.record_aborted();
            if let Some(parent) = &self.parent {
                parent.fail(None);
            }
            Settlement {
                finish: Finish::Rollback,
                release: root,
                error: Some(ScopeError::AbortedScope {
                    scope: self.id,
                    depth: self.depth,
                }),
            }
        } else if root && completed {
            Settlement {
                finish: Finish::Commit {
                    persist: !self.read_only,
                },
                release: true,
                error: None,
            }
        } else if root {
            // Read-only and never completed: reading needs no completion.
            Settlement {
                finish: Finish::Rollback,
                release: true,
                error: None,
            }
        } else {
            Settlement {
                finish: Finish::Nothing,
                release: false,
                error: None,
            }
        };

        tracing::debug!(
            scope_id = %self.id,
            depth = self.depth,
            finish = ?settlement.finish,
            error = settlement.error.as_ref().map(tracing::field::display),
            "scope disposed"
        );
        Ok(Some(settlement))
    }
}

/// Terminal state for a scope whose resource half ran with `result`.
pub(crate) fn final_state(finish: Finish, result: &ResourceResult<()>) -> ScopeState {
    match (finish, result) {
        (Finish::Nothing, _) => ScopeState::Released,
        (Finish::Commit { .. }, Ok(())) => ScopeState::Committed,
        (Finish::Commit { .. }, Err(_)) | (Finish::Rollback, _) => ScopeState::RolledBack,
    }
}

/// Builds the guard a root scope installs on its resource.
///
/// The violation is recorded on the top scope of the current flow when that
/// scope shares the resource, otherwise on the root.
fn direct_write_guard<R: TransactionalResource>(root: &Arc<Scope<R>>) -> WriteGuard {
    let root: Weak<Scope<R>> = Arc::downgrade(root);
    Arc::new(move || {
        let Some(root) = root.upgrade() else {
            return Err(WriteRejected::new("the owning scope has been released"));
        };
        let current = AmbientStack::<R>::current()
            .peek()
            .filter(|top| Arc::ptr_eq(&top.resource, &root.resource))
            .cloned()
            .unwrap_or(root);
        current.check_direct_write()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use txscope_resource::{InMemoryResource, InMemoryResourceFactory};

    fn begin(
        factory: &InMemoryResourceFactory,
        options: ScopeOptions,
        stats: &Arc<ScopeStats>,
    ) -> ScopeResult<Arc<Scope<InMemoryResource>>> {
        Scope::begin(factory, options, stats)
    }

    #[test]
    fn begin_outside_flow_is_internal_error() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        let err = begin(&factory, ScopeOptions::default(), &stats).err().unwrap();
        assert!(matches!(err, ScopeError::InternalConsistency { .. }));
        assert_eq!(factory.store().stats().resources_created, 0);
    }

    #[test]
    fn joined_scope_inherits_parent_settings() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        flow::scope_sync(|| {
            let root = begin(
                &factory,
                ScopeOptions::new()
                    .allow_direct_writes(true)
                    .isolation_level(IsolationLevel::Serializable),
                &stats,
            )
            .unwrap();
            let joined = begin(&factory, ScopeOptions::new().read_only(true), &stats).unwrap();

            assert!(Arc::ptr_eq(joined.resource(), root.resource()));
            assert_eq!(joined.depth(), 1);
            assert!(!joined.is_read_only());
            assert!(joined.allows_direct_writes());
            assert_eq!(joined.isolation_level(), IsolationLevel::Serializable);
            assert_eq!(factory.store().stats().resources_created, 1);
        });
    }

    #[test]
    fn settle_twice_is_a_no_op() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        flow::scope_sync(|| {
            let root = begin(&factory, ScopeOptions::new().read_only(true), &stats).unwrap();
            let first = root.settle().unwrap().unwrap();
            assert_eq!(first.finish, Finish::Rollback);
            assert!(first.release);
            assert!(first.error.is_none());
            assert!(root.settle().unwrap().is_none());
        });
    }

    #[test]
    fn completed_writable_root_commits_with_persist() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        flow::scope_sync(|| {
            let root = begin(&factory, ScopeOptions::default(), &stats).unwrap();
            root.complete().unwrap();
            let settlement = root.settle().unwrap().unwrap();
            assert_eq!(settlement.finish, Finish::Commit { persist: true });
        });
    }

    #[test]
    fn aborted_child_stamps_parent() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        flow::scope_sync(|| {
            let root = begin(&factory, ScopeOptions::default(), &stats).unwrap();
            let child = begin(&factory, ScopeOptions::default(), &stats).unwrap();

            let settlement = child.settle().unwrap().unwrap();
            assert_eq!(settlement.finish, Finish::Rollback);
            assert!(!settlement.release);
            assert!(matches!(settlement.error, Some(ScopeError::AbortedScope { depth: 1, .. })));
            assert!(root.is_failed());
        });
    }

    #[test]
    fn guard_records_violation_on_top_scope() {
        let factory = InMemoryResourceFactory::default();
        let stats = Arc::new(ScopeStats::new());
        flow::scope_sync(|| {
            let root = begin(&factory, ScopeOptions::default(), &stats).unwrap();
            let child = begin(&factory, ScopeOptions::default(), &stats).unwrap();

            let err = child.resource().save_changes().unwrap_err();
            assert!(err.is_write_rejected());
            assert!(child.status.lock().violation.is_some());
            assert!(root.status.lock().violation.is_none());
            assert_eq!(stats.snapshot().violations, 1);
        });
    }

    #[test]
    fn final_states() {
        assert_eq!(final_state(Finish::Nothing, &Ok(())), ScopeState::Released);
        assert_eq!(
            final_state(Finish::Commit { persist: true }, &Ok(())),
            ScopeState::Committed
        );
        assert_eq!(
            final_state(
                Finish::Commit { persist: false },
                &Err(txscope_resource::ResourceError::NoTransaction)
            ),
            ScopeState::RolledBack
        );
        assert_eq!(final_state(Finish::Rollback, &Ok(())), ScopeState::RolledBack);
    }
}
