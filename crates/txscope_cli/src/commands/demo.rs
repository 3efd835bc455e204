//! Demo command implementation.
//!
//! Each scenario runs in its own flow against a fresh in-memory store and
//! reports what the outermost disposal returned and what was committed.

use super::{Format, StatsReport};
use serde::Serialize;
use std::sync::Arc;
use txscope_core::{flow, ScopeFactory, ScopeOptions, ScopeResult, TransactionalResource};
use txscope_resource::{InMemoryResourceFactory, InMemoryStore};

const COLLECTION: &str = "heroes";

/// Demonstration scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Nested scopes that all complete; the root commits.
    Commit,
    /// A nested scope that never completes; everything rolls back.
    Abort,
    /// A writable scope requested inside a read-only one.
    NestingViolation,
    /// A persist through the resource that bypasses completion.
    DirectWrite,
    /// Every scenario above.
    All,
}

impl Scenario {
    fn expand(self) -> Vec<Scenario> {
        match self {
            Self::All => vec![
                Self::Commit,
                Self::Abort,
                Self::NestingViolation,
                Self::DirectWrite,
            ],
            other => vec![other],
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Abort => "abort",
            Self::NestingViolation => "nesting-violation",
            Self::DirectWrite => "direct-write",
            Self::All => "all",
        }
    }
}

/// Result of one scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: &'static str,
    /// The error the scenario surfaced, if any.
    pub error: Option<String>,
    /// Keys committed to the store.
    pub committed: Vec<String>,
    /// Scope counters after the run.
    pub stats: StatsReport,
}

/// Runs the demo command.
pub fn run(scenario: Scenario, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let reports: Vec<ScenarioReport> = scenario.expand().into_iter().map(run_scenario).collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => {
            for report in &reports {
                print_text_output(report);
            }
        }
    }
    Ok(())
}

fn run_scenario(scenario: Scenario) -> ScenarioReport {
    let resources = InMemoryResourceFactory::default();
    let store = Arc::clone(resources.store());
    let scopes = ScopeFactory::new(resources);
    tracing::info!(scenario = scenario.name(), "running scenario");

    let result = flow::scope_sync(|| match scenario {
        Scenario::Commit => commit(&scopes),
        Scenario::Abort => abort(&scopes),
        Scenario::NestingViolation => nesting_violation(&scopes),
        Scenario::DirectWrite => direct_write(&scopes),
        Scenario::All => Ok(()),
    });
    if let Err(err) = &result {
        tracing::info!(scenario = scenario.name(), error = %err, "scenario surfaced an error");
    }

    ScenarioReport {
        scenario: scenario.name(),
        error: result.err().map(|err| err.to_string()),
        committed: committed_keys(&store),
        stats: scopes.stats().snapshot().into(),
    }
}

fn committed_keys(store: &InMemoryStore) -> Vec<String> {
    store
        .scan(COLLECTION)
        .into_iter()
        .map(|(key, _)| key)
        .collect()
}

fn commit(scopes: &ScopeFactory<InMemoryResourceFactory>) -> ScopeResult<()> {
    let outer = scopes.create()?;
    outer.resource()?.put(COLLECTION, "1", b"Superman".to_vec())?;

    let inner = scopes.create()?;
    inner.resource()?.put(COLLECTION, "2", b"Batman".to_vec())?;
    inner.complete()?;
    inner.dispose()?;

    outer.complete()?;
    outer.dispose()
}

fn abort(scopes: &ScopeFactory<InMemoryResourceFactory>) -> ScopeResult<()> {
    let outer = scopes.create()?;
    outer.resource()?.put(COLLECTION, "1", b"Superman".to_vec())?;

    let inner = scopes.create()?;
    inner.resource()?.put(COLLECTION, "2", b"Batman".to_vec())?;
    if let Err(err) = inner.dispose() {
        tracing::info!(error = %err, "inner scope failed; error swallowed");
    }

    outer.complete()?;
    outer.dispose()
}

fn nesting_violation(scopes: &ScopeFactory<InMemoryResourceFactory>) -> ScopeResult<()> {
    let outer = scopes.create_read_only()?;
    let result = scopes.create().map(drop);
    outer.dispose()?;
    result
}

fn direct_write(scopes: &ScopeFactory<InMemoryResourceFactory>) -> ScopeResult<()> {
    let outer = scopes.create_with(ScopeOptions::default())?;
    let resource = outer.resource()?;
    resource.put(COLLECTION, "1", b"Superman".to_vec())?;
    if let Err(err) = resource.save_changes() {
        tracing::info!(error = %err, "direct write refused; error swallowed");
    }
    outer.complete()?;
    outer.dispose()
}

fn print_text_output(report: &ScenarioReport) {
    println!("=== {} ===", report.scenario);
    match &report.error {
        Some(err) => println!("Outcome:   error: {err}"),
        None => println!("Outcome:   ok"),
    }
    if report.committed.is_empty() {
        println!("Committed: (nothing)");
    } else {
        println!("Committed: {}", report.committed.join(", "));
    }
    report.stats.print_text();
    println!();
}
