//! Test fixtures.
//!
//! Provides an in-memory store wired to a scope factory, plus helpers for
//! running test bodies inside a flow.

use crate::sample::HeroService;
use std::future::Future;
use std::sync::Arc;
use txscope_core::{flow, ResourceAccessor, ScopeFactory, ScopeStatsSnapshot};
use txscope_resource::{InMemoryResource, InMemoryResourceFactory, InMemoryStore, StoreStats};

/// An in-memory store with a scope factory over it.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// The committed data.
    pub store: Arc<InMemoryStore>,
    /// Scope factory creating resources over `store`.
    pub scopes: ScopeFactory<InMemoryResourceFactory>,
}

impl TestEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        let resources = InMemoryResourceFactory::default();
        let store = Arc::clone(resources.store());
        Self {
            store,
            scopes: ScopeFactory::new(resources),
        }
    }

    /// Returns the resource factory, e.g. to make it unavailable.
    pub fn resources(&self) -> &Arc<InMemoryResourceFactory> {
        self.scopes.resource_factory()
    }

    /// Returns a hero service over this environment.
    pub fn hero_service(&self) -> HeroService {
        HeroService::new(self.scopes.clone())
    }

    /// Returns the committed entry count of a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.store.count(collection)
    }

    /// Returns the store counters.
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Returns the scope counters.
    pub fn scope_stats(&self) -> ScopeStatsSnapshot {
        self.scopes.stats().snapshot()
    }

    /// Tracks a write through the ambient resource.
    ///
    /// # Panics
    ///
    /// Panics without an active scope.
    pub fn put(&self, collection: &str, key: &str, value: &str) {
        ResourceAccessor::current::<InMemoryResource>()
            .expect("no active scope")
            .put(collection, key, value.as_bytes().to_vec())
            .expect("put failed");
    }

    /// Runs `f` in a fresh flow.
    pub fn in_flow<T>(&self, f: impl FnOnce(&Self) -> T) -> T {
        flow::scope_sync(|| f(self))
    }

    /// Runs `future` in a fresh flow.
    pub async fn in_flow_async<F: Future>(&self, future: F) -> F::Output {
        flow::scope(future).await
    }

    /// Asserts that no scope is left on the current flow's stack.
    ///
    /// # Panics
    ///
    /// Panics if a scope is still active.
    pub fn assert_idle(&self) {
        assert_eq!(
            ResourceAccessor::depth::<InMemoryResource>(),
            0,
            "scopes left on the ambient stack"
        );
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test body with a fresh environment inside a flow.
///
/// # Example
///
/// ```rust
/// use txscope_testkit::with_env;
///
/// with_env(|env| {
///     let scope = env.scopes.create().unwrap();
///     env.put("heroes", "1", "Batman");
///     scope.complete().unwrap();
///     scope.dispose().unwrap();
///     assert_eq!(env.count("heroes"), 1);
/// });
/// ```
pub fn with_env<F, R>(f: F) -> R
where
    F: FnOnce(&TestEnv) -> R,
{
    let env = TestEnv::new();
    env.in_flow(f)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates an environment whose store already holds `count` committed
    /// entries in `collection`, keyed `0..count`.
    pub fn populated(collection: &str, count: usize) -> TestEnv {
        let env = TestEnv::new();
        env.in_flow(|env| {
            let scope = env.scopes.create().expect("create scope");
            for i in 0..count {
                env.put(collection, &i.to_string(), &format!("value-{i}"));
            }
            scope.complete().expect("complete scope");
            scope.dispose().expect("dispose scope");
        });
        env
    }
}
