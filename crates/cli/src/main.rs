//! oppctl - OPP Gen2 board tool
//!
//! Discovers the boards on one or more OPP serial chains, prints what they
//! report, watches switches and pulses coils.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "oppctl")]
#[command(about = "OPP Gen2 board tool - discover boards, watch switches, pulse coils")]
#[command(version)]
#[command(long_about = "
oppctl talks to Open Pinball Project Gen2 boards over their serial chains.
Each --port is one chain; chains are numbered 0, 1, ... in the order given.
Switch and coil numbers use the chain-card-channel form, e.g. 0-1-9.

Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// YAML platform configuration
    #[arg(short, long, global = true, env = "OPPCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port of a chain; repeat for more chains
    #[arg(short, long = "port", global = true)]
    ports: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover boards and print their wings, firmware and cards
    Probe,

    /// Print the current state of every switch
    Switches,

    /// Print switch changes until Ctrl-C
    Watch,

    /// Configure and pulse one coil
    Pulse {
        /// Coil number, e.g. 0-0-3
        coil: String,
        /// Pulse width in milliseconds
        #[arg(long)]
        pulse_ms: Option<u8>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("oppctl={log_level},opp_gen2_platform={log_level},opp_gen2_protocol={log_level}")
                    .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = execute_command(&cli).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            std::process::exit(exit_code);
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        commands::completion(*shell);
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref(), &cli.ports)?;
    match &cli.command {
        Commands::Probe => commands::probe(config, cli.json).await?,
        Commands::Switches => commands::switches(config, cli.json).await?,
        Commands::Watch => commands::watch(config, cli.json).await?,
        Commands::Pulse { coil, pulse_ms } => {
            commands::pulse(config, coil, *pulse_ms, cli.json).await?;
        }
        Commands::Completion { .. } => {}
    }
    Ok(())
}
