//! Core type definitions for txscope.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a scope.
///
/// Scope IDs are process-wide, monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u64);

impl ScopeId {
    /// Creates a scope ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next unused scope ID.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.0)
    }
}

/// Opaque token identifying one logical flow of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowToken(Uuid);

impl FlowToken {
    /// Creates a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FlowToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow:{}", self.0.simple())
    }
}

/// Observable lifecycle state of a scope.
///
/// ```text
/// Active -> Completed -> { Committed, RolledBack, Released }
/// Active -> { RolledBack, Released }
/// { Active, Completed } -> Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeState {
    /// Created and not yet completed or disposed.
    #[default]
    Active,
    /// Completed by the caller, waiting for disposal.
    Completed,
    /// Root scope disposed after completion; the transaction committed.
    Committed,
    /// Disposed and the transaction was rolled back at this level.
    RolledBack,
    /// Disposed without a transaction decision at this level. Joined scopes
    /// end here; the root decides the outcome.
    Released,
    /// Handle dropped while the scope could not be disposed in order.
    Abandoned,
}

impl ScopeState {
    /// Returns true for states a scope never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active | Self::Completed)
    }
}
