//! Flow-local storage.
//!
//! A *flow* is one logical call chain, e.g. the handling of one request. It
//! may hop between worker threads at every `.await`, so the ambient scope
//! stack lives in a tokio task-local rather than a thread-local.
//!
//! - [`scope`] runs a future as a new flow with an empty slot
//! - [`scope_sync`] does the same for synchronous code
//! - nested calls shadow the outer slot, which is how concurrently running
//!   children of one flow are kept apart from their parent
//! - `tokio::spawn`ed tasks never inherit a slot
//!
//! One slot holds a stack per resource type, keyed by [`TypeId`].
//!
//! ```rust
//! # tokio_test_block(async {
//! use txscope_core::flow;
//!
//! assert!(!flow::is_active());
//! flow::scope(async {
//!     assert!(flow::is_active());
//!     let outer = flow::token();
//!     flow::scope(async move {
//!         assert_ne!(flow::token(), outer);
//!     })
//!     .await;
//! })
//! .await;
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::error::{ScopeError, ScopeResult};
use crate::types::FlowToken;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

struct FlowSlot {
    token: FlowToken,
    values: RefCell<HashMap<TypeId, Box<dyn Any + Send>>>,
}

impl FlowSlot {
    fn new() -> Self {
        Self {
            token: FlowToken::new(),
            values: RefCell::new(HashMap::new()),
        }
    }
}

tokio::task_local! {
    static FLOW: FlowSlot;
}

/// Runs `future` as a new logical flow.
pub async fn scope<F: Future>(future: F) -> F::Output {
    let slot = FlowSlot::new();
    tracing::trace!(flow = %slot.token, "flow started");
    FLOW.scope(slot, future).await
}

/// Runs `f` as a new logical flow on the current thread.
pub fn scope_sync<T>(f: impl FnOnce() -> T) -> T {
    let slot = FlowSlot::new();
    tracing::trace!(flow = %slot.token, "flow started");
    FLOW.sync_scope(slot, f)
}

/// Returns true if the caller runs inside a flow.
#[must_use]
pub fn is_active() -> bool {
    FLOW.try_with(|_| ()).is_ok()
}

/// Returns the token of the current flow, if any.
#[must_use]
pub fn token() -> Option<FlowToken> {
    FLOW.try_with(|slot| slot.token).ok()
}

/// Fails unless the caller runs inside a flow.
pub(crate) fn ensure_active() -> ScopeResult<()> {
    if is_active() {
        Ok(())
    } else {
        Err(no_flow())
    }
}

/// Reads the value of type `T` from the current flow.
///
/// Yields `T::default()` when nothing was stored yet or no flow is active.
pub(crate) fn load<T>() -> T
where
    T: Clone + Default + Send + 'static,
{
    FLOW.try_with(|slot| {
        slot.values
            .borrow()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    })
    .ok()
    .flatten()
    .unwrap_or_default()
}

/// Replaces the value of type `T` in the current flow.
pub(crate) fn store<T: Send + 'static>(value: T) -> ScopeResult<()> {
    FLOW.try_with(|slot| {
        slot.values
            .borrow_mut()
            .insert(TypeId::of::<T>(), Box::new(value));
    })
    .map_err(|_| no_flow())
}

fn no_flow() -> ScopeError {
    ScopeError::internal("no flow is active; run the call chain inside flow::scope or flow::scope_sync")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_outside_flow_yields_default() {
        assert!(!is_active());
        assert_eq!(load::<u32>(), 0);
        assert!(token().is_none());
    }

    #[test]
    fn store_outside_flow_is_an_internal_error() {
        let err = store(5u32).unwrap_err();
        assert!(matches!(err, ScopeError::InternalConsistency { .. }));
    }

    #[test]
    fn values_are_keyed_by_type() {
        scope_sync(|| {
            store(7u32).unwrap();
            store(String::from("seven")).unwrap();
            assert_eq!(load::<u32>(), 7);
            assert_eq!(load::<String>(), "seven");
            assert_eq!(load::<u64>(), 0);
        });
    }

    #[test]
    fn nested_flows_shadow_the_outer_slot() {
        scope_sync(|| {
            store(1u32).unwrap();
            let outer = token();

            scope_sync(|| {
                assert_eq!(load::<u32>(), 0);
                assert_ne!(token(), outer);
                store(2u32).unwrap();
            });

            assert_eq!(load::<u32>(), 1);
            assert_eq!(token(), outer);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn value_survives_suspension_points() {
        scope(async {
            store(42u32).unwrap();
            for _ in 0..10 {
                tokio::task::yield_now().await;
                assert_eq!(load::<u32>(), 42);
            }
        })
        .await;
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_the_flow() {
        scope(async {
            store(3u32).unwrap();
            let seen = tokio::spawn(async { (is_active(), load::<u32>()) })
                .await
                .unwrap();
            assert_eq!(seen, (false, 0));
        })
        .await;
    }
}
