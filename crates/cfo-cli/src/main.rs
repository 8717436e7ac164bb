//! `cfo` -- run AI-CFO analyses and guarded actions against an entity file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::Output;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Analyze client accounts and run guarded financial actions.
#[derive(Parser)]
#[command(name = "cfo", version, about)]
struct Cli {
    /// Config file (default: ~/.ai-cfo/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a text summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full multi-agent analysis for one entity, or for all of them.
    Analyze {
        /// JSON array of entities.
        entities: PathBuf,
        /// Only analyze this entity id.
        #[arg(long)]
        entity: Option<String>,
    },

    /// License waste across every entity in the file.
    Sweep {
        /// JSON array of entities.
        entities: PathBuf,
    },

    /// Upsell analysis, proposal risk check and proposal draft.
    Upsell {
        /// JSON array of entities.
        entities: PathBuf,
        #[arg(long)]
        entity: String,
    },

    /// Remove unused license seats, subject to the guardrails.
    Downgrade {
        /// JSON array of entities.
        entities: PathBuf,
        #[arg(long)]
        entity: String,
        /// Approve the downgrade if the guardrails queued it.
        #[arg(long)]
        approve: bool,
    },

    /// Print the effective guardrail policy.
    Policy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    cfo_telemetry::logging::init_from_config("cfo", &config.general);

    let output = if cli.json { Output::Json } else { Output::Text };

    match cli.command {
        Commands::Analyze { entities, entity } => {
            commands::analyze::run(&entities, entity.as_deref(), config, output).await?;
        }
        Commands::Sweep { entities } => {
            commands::sweep::run(&entities, config, output).await?;
        }
        Commands::Upsell { entities, entity } => {
            commands::upsell::run(&entities, &entity, config, output).await?;
        }
        Commands::Downgrade {
            entities,
            entity,
            approve,
        } => {
            commands::downgrade::run(&entities, &entity, approve, config, output).await?;
        }
        Commands::Policy => {
            commands::policy::run(&config, output)?;
        }
    }

    Ok(())
}
