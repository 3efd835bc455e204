//! Error types for scope operations.

use crate::types::ScopeId;
use std::fmt;
use thiserror::Error;
use txscope_resource::ResourceError;

/// Result type for scope operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

/// A persist through the resource's native API that the scope refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectWriteViolation {
    /// The scope that was active when the write was attempted.
    pub scope: ScopeId,
    /// Nesting depth of that scope (0 for the root).
    pub depth: usize,
    /// Why the write was refused.
    pub reason: String,
}

impl fmt::Display for DirectWriteViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at depth {}: {}", self.scope, self.depth, self.reason)
    }
}

/// Errors raised by the scoping protocol.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A writable scope was requested inside a read-only scope.
    #[error("cannot nest a writable scope inside read-only {parent} (requested depth {depth})")]
    NestingViolation {
        /// The read-only parent.
        parent: ScopeId,
        /// Depth the rejected scope would have had.
        depth: usize,
    },

    /// `complete` was called twice.
    #[error("{scope} at depth {depth} has already been completed")]
    DoubleCompletion {
        /// The scope.
        scope: ScopeId,
        /// Its nesting depth.
        depth: usize,
    },

    /// The scope was used after disposal.
    #[error("{scope} at depth {depth} has already been disposed")]
    AlreadyDisposed {
        /// The scope.
        scope: ScopeId,
        /// Its nesting depth.
        depth: usize,
    },

    /// Scopes were disposed in a different order than they were created.
    #[error(
        "{scope} at depth {depth} is not the active scope of this flow (active: {})",
        display_active(.active)
    )]
    OutOfOrderDisposal {
        /// The scope being disposed.
        scope: ScopeId,
        /// Its nesting depth.
        depth: usize,
        /// The scope actually on top of the stack, if any.
        active: Option<ScopeId>,
    },

    /// Pending changes were persisted directly through the resource.
    #[error("direct write through a scoped resource: {0}")]
    DirectWriteViolation(DirectWriteViolation),

    /// A nested scope failed, so this one cannot succeed.
    #[error("{scope} at depth {depth} failed because a nested scope failed")]
    CascadingFailure {
        /// The scope.
        scope: ScopeId,
        /// Its nesting depth.
        depth: usize,
    },

    /// A writable scope was disposed without being completed.
    #[error("writable {scope} at depth {depth} was disposed without being completed")]
    AbortedScope {
        /// The scope.
        scope: ScopeId,
        /// Its nesting depth.
        depth: usize,
    },

    /// No scope is active in the current flow.
    #[error("no active scope in the current flow")]
    NoActiveScope,

    /// An internal invariant of the ambient storage was broken.
    #[error("internal consistency error: {message}")]
    InternalConsistency {
        /// Description of the broken invariant.
        message: String,
    },

    /// The transactional resource failed.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
}

fn display_active(active: &Option<ScopeId>) -> String {
    active.map_or_else(|| "none".to_string(), |id| id.to_string())
}

impl ScopeError {
    /// Creates an internal consistency error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalConsistency {
            message: message.into(),
        }
    }

    /// Returns the scope this error is about, if any.
    #[must_use]
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            Self::DoubleCompletion { scope, .. }
            | Self::AlreadyDisposed { scope, .. }
            | Self::OutOfOrderDisposal { scope, .. }
            | Self::CascadingFailure { scope, .. }
            | Self::AbortedScope { scope, .. } => Some(*scope),
            Self::DirectWriteViolation(violation) => Some(violation.scope),
            Self::NestingViolation { parent, .. } => Some(*parent),
            Self::NoActiveScope | Self::InternalConsistency { .. } | Self::Resource(_) => None,
        }
    }

    /// Returns the nesting depth this error refers to, if any.
    #[must_use]
    pub fn depth(&self) -> Option<usize> {
        match self {
            Self::NestingViolation { depth, .. }
            | Self::DoubleCompletion { depth, .. }
            | Self::AlreadyDisposed { depth, .. }
            | Self::OutOfOrderDisposal { depth, .. }
            | Self::CascadingFailure { depth, .. }
            | Self::AbortedScope { depth, .. } => Some(*depth),
            Self::DirectWriteViolation(violation) => Some(violation.depth),
            Self::NoActiveScope | Self::InternalConsistency { .. } | Self::Resource(_) => None,
        }
    }
}
