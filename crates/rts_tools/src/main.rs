//! Scenario kernel - Development Tools

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rts_tools::data::load_metadata;
use rts_tools::runner::{run, verify_replay, RunOptions};
use rts_tools::{encode, validate};

#[derive(Parser)]
#[command(name = "rts-tools")]
#[command(about = "Development tools for the scenario kernel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a map headless and print the final state digest
    Run {
        /// Binary map file
        map: PathBuf,

        /// Number of frames to run
        #[arg(short, long, default_value = "1000")]
        frames: u64,

        /// Metadata RON file (built-in rules if omitted)
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Kernel configuration RON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Setup RON file with spawns and commands
        #[arg(long)]
        setup: Option<PathBuf>,

        /// Random seed, overriding the configuration
        #[arg(long)]
        seed: Option<u64>,

        /// Save the run as a replay
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Decode a map and check its placement rules
    Validate {
        /// Binary map file
        map: PathBuf,

        /// Metadata RON file (built-in rules if omitted)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Convert a RON record list into a binary map
    Encode {
        /// RON record list
        input: PathBuf,

        /// Output map file
        output: PathBuf,
    },

    /// Convert a binary map into a RON record list
    Decode {
        /// Binary map file
        input: PathBuf,

        /// Output RON file
        output: PathBuf,
    },

    /// Play a replay and verify its final digest
    Replay {
        /// Replay file
        file: PathBuf,

        /// Metadata RON file (built-in rules if omitted)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
}

fn execute(command: Commands) -> rts_tools::error::Result<()> {
    match command {
        Commands::Run {
            map,
            frames,
            metadata,
            config,
            setup,
            seed,
            record,
        } => {
            let summary = run(&RunOptions {
                map,
                metadata,
                config,
                setup,
                seed,
                frames,
                record,
            })?;
            println!(
                "frame {} digest {:#018x} ({} elements, {} impacts, {} completions)",
                summary.frames, summary.digest, summary.elements, summary.impacts, summary.completions
            );
        }
        Commands::Validate { map, metadata } => {
            let report = validate::validate_map(&map, load_metadata(metadata.as_deref())?)?;
            println!("{report}");
        }
        Commands::Encode { input, output } => {
            encode::encode_map(&input, &output)?;
        }
        Commands::Decode { input, output } => {
            encode::decode_map(&input, &output)?;
        }
        Commands::Replay { file, metadata } => {
            let digest = verify_replay(&file, metadata.as_deref())?;
            println!("replay verified, digest {digest:#018x}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
