//! Polydex CLI
//!
//! Plans physical indexes, renders the engine configuration and checks a
//! record type registry. It never starts or talks to the engine.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Polydex - index planning for polymorphic record types
#[derive(Parser, Debug)]
#[command(name = "polydex", author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "POLYDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Record type registry path
    #[arg(short, long, env = "POLYDEX_TYPES", default_value = "types.toml")]
    types: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the physical indexes of the registry
    Plan {
        /// Only plan these types and their descendants
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Render the engine configuration
    Configure {
        /// Output file (default: <var_path>/polydex.conf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print to stdout instead of writing a file
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
    },
    /// Validate configuration, registry and partition ids
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = commands::load_config(args.config.as_deref())?;
    let planner = commands::load_planner(&config, &args.types)?;

    match args.command {
        Command::Plan { types, json } => {
            println!("{}", commands::plan(&planner, &types, json)?);
        }
        Command::Configure { output, stdout } => {
            if stdout {
                print!("{}", commands::render(&config, &planner)?);
            } else {
                let path = commands::configure(&config, &planner, output.as_deref()).await?;
                println!("Wrote {}", path.display());
            }
        }
        Command::Check => {
            println!("{}", commands::check(&config, &planner)?);
        }
    }
    Ok(())
}
