//! fourtrack CLI
//!
//! Command-line interface for fourtrack session stores.

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fourtrack::cli::{commands, Cli, Commands};
use fourtrack::config::StudioConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("fourtrack v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => StudioConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StudioConfig::default(),
    };
    config = config.apply_env().context("applying environment overrides")?;
    if let Some(store) = cli.store {
        config.store_root = store;
    }
    debug!(?config, "Configuration loaded");

    match cli.command {
        Some(cmd) => handle_command(&config, cmd),
        None => {
            println!("fourtrack v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(config: &StudioConfig, cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::NewSession { name, tier, tempo } => {
            commands::new_session(config, &name, tier.map(Into::into), tempo)?;
        }
        Commands::ListSessions => commands::list_sessions(config)?,
        Commands::Inspect { session } => commands::inspect(config, session)?,
        Commands::AddRegion {
            session,
            track,
            wav,
            start,
            offset,
            duration,
        } => {
            commands::add_region(config, session, track, &wav, start, offset, duration)
                .with_context(|| format!("adding {} to track {}", wav.display(), track))?;
        }
        Commands::Bounce { session, output } => {
            commands::bounce(config, session, &output)
                .with_context(|| format!("bouncing to {}", output.display()))?;
        }
        Commands::ListMixes => commands::list_mixes(config)?,
        Commands::Diagnose { session } => commands::diagnose(config, session)?,
    }
    Ok(())
}
