//! CLI Module
//!
//! Command-line interface for managing sessions in a fourtrack store.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

use crate::state::Tier;

/// fourtrack - four-track tape recorder sessions from the command line
#[derive(Parser, Debug)]
#[command(name = "fourtrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root (overrides the configuration)
    #[arg(short, long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Session length tier
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TierArg {
    Standard,
    Extended,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Standard => Tier::Standard,
            TierArg::Extended => Tier::Extended,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty session
    #[command(name = "new-session")]
    NewSession {
        /// Session name
        name: String,

        /// Length tier (defaults to the configured tier)
        #[arg(short, long, value_enum)]
        tier: Option<TierArg>,

        /// Tempo in BPM
        #[arg(long)]
        tempo: Option<f64>,
    },

    /// List stored sessions
    #[command(name = "sessions")]
    ListSessions,

    /// Print a session's tracks and regions
    #[command(name = "inspect")]
    Inspect {
        /// Session id
        session: Uuid,
    },

    /// Place a WAV file on a track
    #[command(name = "add-region")]
    AddRegion {
        /// Session id
        session: Uuid,

        /// Track number (1-4)
        track: usize,

        /// WAV file to place
        wav: PathBuf,

        /// Timeline position in seconds
        start: f64,

        /// Offset into the file in seconds
        #[arg(long, default_value_t = 0.0)]
        offset: f64,

        /// Length in seconds (defaults to the rest of the file)
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Mix a session down to a stereo WAV file
    #[command(name = "bounce")]
    Bounce {
        /// Session id
        session: Uuid,

        /// Output WAV path
        output: PathBuf,
    },

    /// List bounced mixes
    #[command(name = "list-mixes")]
    ListMixes,

    /// Check a session against a headless engine
    #[command(name = "diagnose")]
    Diagnose {
        /// Session id
        session: Uuid,
    },
}
