//! Ambient resource lookup.

use crate::ambient::AmbientStack;
use crate::error::{ScopeError, ScopeResult};
use std::sync::Arc;
use txscope_resource::TransactionalResource;

/// Finds the resource of the active scope in the current flow.
///
/// Repositories and services use this instead of taking a scope handle, so
/// a call chain can open scopes at any layer without threading them through
/// every signature.
///
/// ```rust
/// use txscope_core::{flow, ResourceAccessor, ScopeFactory};
/// use txscope_resource::{InMemoryResource, InMemoryResourceFactory};
///
/// let scopes = ScopeFactory::new(InMemoryResourceFactory::default());
/// flow::scope_sync(|| {
///     assert!(ResourceAccessor::current::<InMemoryResource>().is_err());
///
///     let scope = scopes.create_read_only().unwrap();
///     let resource = ResourceAccessor::current::<InMemoryResource>().unwrap();
///     assert!(std::sync::Arc::ptr_eq(&resource, &scope.resource().unwrap()));
///     scope.dispose().unwrap();
/// });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceAccessor;

impl ResourceAccessor {
    /// Returns the resource of the top scope for `R`.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::NoActiveScope`] if no scope for `R` is active in
    /// the current flow, including when no flow is active at all.
    pub fn current<R: TransactionalResource>() -> ScopeResult<Arc<R>> {
        AmbientStack::<R>::current()
            .peek()
            .map(|scope| Arc::clone(scope.resource()))
            .ok_or(ScopeError::NoActiveScope)
    }

    /// Returns the number of active scopes for `R` in the current flow.
    #[must_use]
    pub fn depth<R: TransactionalResource>() -> usize {
        AmbientStack::<R>::current().len()
    }
}
