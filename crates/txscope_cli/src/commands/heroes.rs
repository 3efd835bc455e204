//! Heroes command implementation.
//!
//! Drives the sample hero service: stores the given heroes in one
//! transaction, then lists what was committed.

use super::{Format, StatsReport};
use serde::Serialize;
use txscope_testkit::{Hero, TestEnv};

/// Heroes command result.
#[derive(Debug, Serialize)]
pub struct HeroesReport {
    /// Heroes read back after the batch.
    pub heroes: Vec<Hero>,
    /// The error the batch surfaced, if any.
    pub error: Option<String>,
    /// Scope counters after the run.
    pub stats: StatsReport,
}

/// Runs the heroes command.
pub async fn run(names: Vec<String>, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let report = collect(names).await?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            if let Some(err) = &report.error {
                println!("Batch rejected: {err}");
            }
            println!("Heroes ({}):", report.heroes.len());
            for hero in &report.heroes {
                println!("  {hero}");
            }
            println!();
            report.stats.print_text();
        }
    }
    Ok(())
}

async fn collect(names: Vec<String>) -> Result<HeroesReport, Box<dyn std::error::Error>> {
    let env = TestEnv::new();
    let service = env.hero_service();

    let batch: Vec<Hero> = names.into_iter().map(Hero::new).collect();
    let error = match service.add_heroes(batch).await {
        Ok(stored) => {
            tracing::info!(count = stored.len(), "heroes stored");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "hero batch rejected");
            Some(err.to_string())
        }
    };

    let heroes = service.get_heroes().await?;
    Ok(HeroesReport {
        heroes,
        error,
        stats: env.scopes.stats().snapshot().into(),
    })
}
