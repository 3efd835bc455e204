//! Scope configuration.

use txscope_resource::IsolationLevel;

/// Options for creating a scope.
///
/// Only a root scope uses these values. A scope that joins an enclosing one
/// inherits the enclosing scope's settings; the only effect of the options
/// there is that a writable request inside a read-only scope is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Whether the scope only reads.
    pub read_only: bool,

    /// Whether pending changes may be persisted directly through the
    /// resource instead of through completion.
    pub allow_direct_writes: bool,

    /// Isolation level of the transaction a root scope begins.
    pub isolation_level: IsolationLevel,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            allow_direct_writes: false,
            isolation_level: IsolationLevel::ReadCommitted,
        }
    }
}

impl ScopeOptions {
    /// Creates options with default values: writable, no direct writes,
    /// read committed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the scope is read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether direct writes are allowed.
    #[must_use]
    pub const fn allow_direct_writes(mut self, value: bool) -> Self {
        self.allow_direct_writes = value;
        self
    }

    /// Sets the isolation level.
    #[must_use]
    pub const fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }
}
