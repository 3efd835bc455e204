//! CLI command implementations.

pub mod demo;
pub mod heroes;

use serde::Serialize;
use txscope_core::ScopeStatsSnapshot;

/// Output format shared by all commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Serializable copy of the scope counters.
#[derive(Debug, Serialize)]
pub struct StatsReport {
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

impl From<ScopeStatsSnapshot> for StatsReport {
    fn from(stats: ScopeStatsSnapshot) -> Self {
        Self {
            roots_created: stats.roots_created,
            joined_created: stats.joined_created,
            commits: stats.commits,
            rollbacks: stats.rollbacks,
            aborted: stats.aborted,
            violations: stats.violations,
            cascading_failures: stats.cascading_failures,
            out_of_order: stats.out_of_order,
        }
    }
}

impl StatsReport {
    /// Prints the counters as text.
    pub fn print_text(&self) {
        println!("Scope statistics:");
        println!("  Roots created:      {}", self.roots_created);
        println!("  Joined created:     {}", self.joined_created);
        println!("  Commits:            {}", self.commits);
        println!("  Rollbacks:          {}", self.rollbacks);
        println!("  Aborted:            {}", self.aborted);
        println!("  Violations:         {}", self.violations);
        println!("  Cascading failures: {}", self.cascading_failures);
        println!("  Out of order:       {}", self.out_of_order);
    }
}
