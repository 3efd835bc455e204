//! Scope creation.

use crate::config::ScopeOptions;
use crate::error::{ScopeError, ScopeResult};
use crate::flow;
use crate::scope::{Scope, ScopeHandle};
use crate::stats::ScopeStats;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use txscope_resource::ResourceFactory;

/// Creates scopes over resources produced by a [`ResourceFactory`].
///
/// The factory itself holds no per-flow state; which scope a new one joins
/// is decided by the ambient stack of the calling flow. Clones share the
/// resource factory and the statistics.
///
/// # Example
///
/// ```rust
/// use txscope_core::{flow, ScopeFactory};
/// use txscope_resource::InMemoryResourceFactory;
///
/// let resources = InMemoryResourceFactory::default();
/// let store = resources.store().clone();
/// let scopes = ScopeFactory::new(resources);
///
/// flow::scope_sync(|| {
///     let outer = scopes.create().unwrap();
///     let inner = scopes.create().unwrap();
///     inner.resource().unwrap().put("heroes", "1", b"Batman".to_vec()).unwrap();
///     inner.complete().unwrap();
///     inner.dispose().unwrap();
///
///     outer.complete().unwrap();
///     outer.dispose().unwrap();
/// });
///
/// assert_eq!(store.count("heroes"), 1);
/// ```
pub struct ScopeFactory<F: ResourceFactory> {
    resources: Arc<F>,
    stats: Arc<ScopeStats>,
}

impl<F: ResourceFactory> ScopeFactory<F> {
    /// Creates a scope factory over the given resource factory.
    pub fn new(resources: F) -> Self {
        Self::from_arc(Arc::new(resources))
    }

    /// Creates a scope factory over a shared resource factory.
    pub fn from_arc(resources: Arc<F>) -> Self {
        Self {
            resources,
            stats: Arc::new(ScopeStats::new()),
        }
    }

    /// Returns the underlying resource factory.
    #[must_use]
    pub fn resource_factory(&self) -> &Arc<F> {
        &self.resources
    }

    /// Returns the statistics shared by every scope this factory created.
    #[must_use]
    pub fn stats(&self) -> &ScopeStats {
        &self.stats
    }

    /// Creates a writable scope with default options.
    ///
    /// # Errors
    ///
    /// See [`Self::create_with`].
    pub fn create(&self) -> ScopeResult<ScopeHandle<F::Resource>> {
        self.create_with(ScopeOptions::default())
    }

    /// Creates a read-only scope.
    ///
    /// # Errors
    ///
    /// See [`Self::create_with`].
    pub fn create_read_only(&self) -> ScopeResult<ScopeHandle<F::Resource>> {
        self.create_with(ScopeOptions::new().read_only(true))
    }

    /// Creates a scope in the current flow.
    ///
    /// Joins the active scope if there is one, inheriting its resource and
    /// settings; otherwise acquires a resource, begins a transaction at the
    /// requested isolation level and becomes the root.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::NestingViolation`] if a writable scope is requested
    ///   inside a read-only one
    /// - [`ScopeError::InternalConsistency`] if no flow is active
    /// - [`ScopeError::Resource`] if the resource cannot be acquired or the
    ///   transaction cannot begin
    pub fn create_with(&self, options: ScopeOptions) -> ScopeResult<ScopeHandle<F::Resource>> {
        let scope = Scope::begin(self.resources.as_ref(), options, &self.stats)?;
        Ok(ScopeHandle::new(scope))
    }

    /// Runs `f` inside a new scope.
    ///
    /// A flow is established first if none is active. The scope is
    /// completed when `f` returns `Ok` and disposed asynchronously on every
    /// path. If `f` fails, its error is returned and a disposal error is
    /// only logged.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or the scope error of creation, completion
    /// or disposal converted into `E`.
    pub async fn execute<T, E, W, Fut>(&self, options: ScopeOptions, f: W) -> Result<T, E>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ScopeError>,
    {
        if flow::is_active() {
            self.run(options, f).await
        } else {
            flow::scope(self.run(options, f)).await
        }
    }

    async fn run<T, E, W, Fut>(&self, options: ScopeOptions, f: W) -> Result<T, E>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ScopeError>,
    {
        let scope = self.create_with(options)?;
        match f().await {
            Ok(value) => {
                scope.complete()?;
                scope.dispose_async().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(dispose_err) = scope.dispose_async().await {
                    tracing::warn!(
                        scope_id = %scope.id(),
                        error = %dispose_err,
                        "scope disposal failed after the unit of work failed"
                    );
                }
                Err(err)
            }
        }
    }
}

impl<F: ResourceFactory> Clone for ScopeFactory<F> {
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ScopeFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFactory")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
