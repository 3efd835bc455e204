//! Scope statistics.
//!
//! Counters shared by every scope created from one [`crate::ScopeFactory`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let factory = ScopeFactory::new(resources);
//!
//! // Create and dispose scopes...
//!
//! let stats = factory.stats().snapshot();
//! println!("Commits: {}", stats.commits);
//! println!("Rollbacks: {}", stats.rollbacks);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Scope lifecycle counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct ScopeStats {
    /// Root scopes created (each owns one resource).
    roots_created: AtomicU64,
    /// Scopes that joined an enclosing scope.
    joined_created: AtomicU64,
    /// Transactions committed by root scopes.
    commits: AtomicU64,
    /// Transactions rolled back by any scope.
    rollbacks: AtomicU64,
    /// Writable scopes disposed without completion.
    aborted: AtomicU64,
    /// Direct writes refused by the guard.
    violations: AtomicU64,
    /// Scopes that failed because a nested scope failed.
    cascading_failures: AtomicU64,
    /// Disposals attempted out of order.
    out_of_order: AtomicU64,
}

impl ScopeStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_root(&self) {
        self.roots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_joined(&self) {
        self.joined_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cascading_failure(&self) {
        self.cascading_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_out_of_order(&self) {
        self.out_of_order.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> ScopeStatsSnapshot {
        ScopeStatsSnapshot {
            roots_created: self.roots_created.load(Ordering::Relaxed),
            joined_created: self.joined_created.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            cascading_failures: self.cascading_failures.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ScopeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStatsSnapshot {
    /// Root scopes created.
    pub roots_created: u64,
    /// Joined scopes created.
    pub joined_created: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back.
    pub rollbacks: u64,
    /// Writable scopes disposed without completion.
    pub aborted: u64,
    /// Direct writes refused.
    pub violations: u64,
    /// Cascading failures.
    pub cascading_failures: u64,
    /// Out-of-order disposals.
    pub out_of_order: u64,
}

impl ScopeStatsSnapshot {
    /// Total scopes created.
    #[must_use]
    pub fn scopes_created(&self) -> u64 {
        self.roots_created + self.joined_created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = ScopeStats::new();
        assert_eq!(stats.snapshot(), ScopeStatsSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let stats = ScopeStats::new();
        stats.record_root();
        stats.record_joined();
        stats.record_joined();
        stats.record_commit();
        stats.record_rollback();
        stats.record_aborted();

        let snap = stats.snapshot();
        assert_eq!(snap.scopes_created(), 3);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.aborted, 1);
        assert_eq!(snap.violations, 0);
    }
}
