//! txscope CLI
//!
//! Command-line demonstrations of ambient transaction scopes.
//!
//! # Commands
//!
//! - `demo` - Run scope scenarios against an in-memory store
//! - `heroes` - Store and list heroes through the sample service
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::demo::Scenario;
use commands::Format;
use tracing_subscriber::EnvFilter;

/// Ambient transaction scope demonstrations.
#[derive(Parser)]
#[command(name = "txscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scope scenarios against an in-memory store
    Demo {
        /// Scenario to run
        #[arg(value_enum, default_value = "all")]
        scenario: Scenario,
    },

    /// Store heroes in one transaction and list them
    Heroes {
        /// Hero names; an empty name rejects the whole batch
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo { scenario } => commands::demo::run(scenario, cli.format)?,
        Commands::Heroes { names } => commands::heroes::run(names, cli.format).await?,
        Commands::Version => {
            println!("txscope CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txscope Core v{}", txscope_core::VERSION);
        }
    }

    Ok(())
}
