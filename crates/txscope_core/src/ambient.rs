//! The per-flow stack of active scopes.
//!
//! The stack is a persistent linked list: `push` and `pop` return a new
//! stack and leave the receiver untouched, and the result has to be
//! published back into the flow. An earlier snapshot therefore stays a valid
//! view of the state it was taken in.

use crate::error::ScopeResult;
use crate::flow;
use crate::scope::Scope;
use std::sync::Arc;
use txscope_resource::TransactionalResource;

struct Frame<R> {
    scope: Arc<Scope<R>>,
    next: Option<Arc<Frame<R>>>,
}

/// LIFO stack of the scopes active in one flow for resource type `R`.
pub(crate) struct AmbientStack<R> {
    head: Option<Arc<Frame<R>>>,
    len: usize,
}

impl<R> Clone for AmbientStack<R> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<R> Default for AmbientStack<R> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<R: TransactionalResource> AmbientStack<R> {
    /// Returns the stack of the current flow, empty if none was published.
    ///
    /// Abandoned scopes left on top by a dropped handle are skipped.
    pub(crate) fn current() -> Self {
        flow::load::<Self>().live()
    }

    /// Publishes this stack as the current flow's stack.
    ///
    /// # Errors
    ///
    /// Returns an internal consistency error if no flow is active.
    pub(crate) fn publish(self) -> ScopeResult<()> {
        flow::store(self)
    }

    /// Returns a new stack with `scope` on top.
    #[must_use]
    pub(crate) fn push(&self, scope: Arc<Scope<R>>) -> Self {
        Self {
            head: Some(Arc::new(Frame {
                scope,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }
}

impl<R> AmbientStack<R> {
    /// Returns the top scope.
    pub(crate) fn peek(&self) -> Option<&Arc<Scope<R>>> {
        self.head.as_ref().map(|frame| &frame.scope)
    }

    /// Returns the stack without the disposed scopes on top.
    #[must_use]
    pub(crate) fn live(self) -> Self {
        let mut stack = self;
        while stack.peek().is_some_and(|top| top.is_disposed()) {
            let Some(next) = stack.pop() else { break };
            stack = next;
        }
        stack
    }

    /// Returns the stack without its top scope, or `None` if empty.
    #[must_use]
    pub(crate) fn pop(&self) -> Option<Self> {
        self.head.as_ref().map(|frame| Self {
            head: frame.next.clone(),
            len: self.len - 1,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
