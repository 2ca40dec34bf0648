//! Headless frame runner.
//!
//! Loads a map, places the setup's units, steps the scenario and reports the
//! final state digest. Runs can be recorded as replays and verified later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rts_kernel::config::KernelConfig;
use rts_kernel::error::KernelError;
use rts_kernel::metadata::Metadata;
use rts_kernel::replay::Replay;

use crate::data::{context_for, load_config, load_metadata, load_setup, map_info, read_map, RunSetup};
use crate::error::{Result, ToolError};

/// Inputs of a headless run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Binary map file.
    pub map: PathBuf,
    /// Metadata RON file; the built-in rules when absent.
    pub metadata: Option<PathBuf>,
    /// Kernel configuration RON file; the defaults when absent.
    pub config: Option<PathBuf>,
    /// Setup RON file with spawns and commands.
    pub setup: Option<PathBuf>,
    /// Seed overriding the configuration's.
    pub seed: Option<u64>,
    /// Number of frames to run.
    pub frames: u64,
    /// Where to save the recorded replay.
    pub record: Option<PathBuf>,
}

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Frame counter at the end.
    pub frames: u64,
    /// Final state digest.
    pub digest: u64,
    /// Live elements at the end.
    pub elements: usize,
    /// Missile impacts over the run.
    pub impacts: usize,
    /// Finished production jobs over the run.
    pub completions: usize,
}

/// Run a map for a number of frames, recording the run as a replay.
///
/// # Errors
///
/// Returns an error if any input fails to load or a spawn cannot be placed.
pub fn run_bytes(
    map: Vec<u8>,
    config: KernelConfig,
    metadata: Arc<Metadata>,
    setup: &RunSetup,
    frames: u64,
) -> Result<(RunSummary, Replay)> {
    let info = map_info(&map)?;
    let mut replay = Replay::new(map, config);
    let mut scenario = replay.restore_initial_state(context_for(&info, metadata))?;
    for spawn in &setup.spawns {
        if !replay.spawn(&mut scenario, &spawn.type_name, spawn.owner, spawn.position) {
            return Err(KernelError::Placement(format!(
                "cannot place {} at {:?}",
                spawn.type_name, spawn.position
            ))
            .into());
        }
    }

    let mut commands = setup.commands.iter().peekable();
    let mut summary = RunSummary {
        frames: 0,
        digest: 0,
        elements: 0,
        impacts: 0,
        completions: 0,
    };
    for _ in 0..frames {
        while let Some(recorded) = commands.next_if(|c| c.frame <= scenario.frame()) {
            if !replay.issue(&mut scenario, recorded.player, recorded.command.clone()) {
                tracing::warn!(frame = scenario.frame(), command = ?recorded.command, "command rejected");
            }
        }
        let events = scenario.update();
        summary.impacts += events.impacts.len();
        summary.completions += events.completed.len();
    }
    replay.finalize(&scenario);

    summary.frames = scenario.frame();
    summary.digest = scenario.state_digest();
    summary.elements = scenario.element_count();
    Ok((summary, replay))
}

/// Load everything named by `options` and run it.
///
/// # Errors
///
/// Returns an error if any input fails to load, a spawn cannot be placed or
/// the replay cannot be written.
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let map = read_map(&options.map)?;
    let mut config = load_config(options.config.as_deref())?;
    if let Some(seed) = options.seed {
        config.seed = seed;
    }
    let metadata = load_metadata(options.metadata.as_deref())?;
    let setup = load_setup(options.setup.as_deref())?;

    let (summary, replay) = run_bytes(map, config, metadata, &setup, options.frames)?;
    tracing::info!(
        frames = summary.frames,
        digest = format_args!("{:#018x}", summary.digest),
        elements = summary.elements,
        "run finished"
    );
    if let Some(path) = &options.record {
        replay.save(path)?;
        tracing::info!(path = %path.display(), "replay saved");
    }
    Ok(summary)
}

/// Play a replay file and check it reproduces its recorded digest.
///
/// # Errors
///
/// Returns an error if the replay cannot be loaded or the run diverges.
pub fn verify_replay(path: &Path, metadata: Option<&Path>) -> Result<u64> {
    if !path.exists() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }
    let replay = Replay::load(path)?;
    let info = map_info(&replay.map)?;
    let scenario = replay.play(context_for(&info, load_metadata(metadata)?))?;
    Ok(scenario.state_digest())
}
