//! Replays: recorded inputs of a run, for lockstep verification.
//!
//! A replay holds the encoded map, the kernel configuration (and with it the
//! seed), the units placed before the first frame and every command issued
//! afterwards. Playing it back against the same metadata must reproduce the
//! recorded state digest bit for bit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::config::KernelConfig;
use crate::context::KernelContext;
use crate::element::PlayerIndex;
use crate::error::{KernelError, Result};
use crate::math::Vec2Fixed;
use crate::scenario::Scenario;

/// Replay file format version.
pub const REPLAY_VERSION: u32 = 2;

/// A unit or building placement attempted before the first frame.
///
/// Failed placements are recorded too: they still consume an element ID, so
/// skipping them on playback would shift every later ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySpawn {
    /// Entity type name.
    pub type_name: String,
    /// Owning player.
    pub owner: Option<PlayerIndex>,
    /// Center position.
    pub position: Vec2Fixed,
    /// Whether the placement succeeded when recorded.
    #[serde(default = "placed_by_default")]
    pub placed: bool,
}

const fn placed_by_default() -> bool {
    true
}

/// A command issued before a frame update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Frame counter when the command was issued.
    pub frame: u64,
    /// Issuing player.
    pub player: PlayerIndex,
    /// The command.
    pub command: Command,
}

/// Complete replay data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Encoded map records.
    pub map: Vec<u8>,
    /// Kernel configuration, including the seed.
    pub config: KernelConfig,
    /// Players added on top of those created by start locations.
    pub players: Vec<PlayerIndex>,
    /// Entities placed before the first frame.
    pub spawns: Vec<ReplaySpawn>,
    /// Commands in frame order.
    pub commands: Vec<ReplayCommand>,
    /// Frame counter at the end of the run.
    pub final_frame: u64,
    /// State digest at the end of the run.
    pub final_digest: u64,
}

impl Replay {
    /// Start a replay for a map.
    #[must_use]
    pub fn new(map: Vec<u8>, config: KernelConfig) -> Self {
        Self {
            version: REPLAY_VERSION,
            map,
            config,
            players: Vec::new(),
            spawns: Vec::new(),
            commands: Vec::new(),
            final_frame: 0,
            final_digest: 0,
        }
    }

    /// Add a player to the scenario and record it.
    pub fn add_player(&mut self, scenario: &mut Scenario, player: PlayerIndex) -> bool {
        self.players.push(player);
        scenario.add_player(player)
    }

    /// Spawn an entity into the scenario and record the attempt and its outcome.
    pub fn spawn(
        &mut self,
        scenario: &mut Scenario,
        type_name: &str,
        owner: Option<PlayerIndex>,
        position: Vec2Fixed,
    ) -> bool {
        let placed = scenario.spawn(type_name, owner, position).is_some();
        self.spawns.push(ReplaySpawn {
            type_name: type_name.to_owned(),
            owner,
            position,
            placed,
        });
        placed
    }

    /// Issue a command to the scenario and record it.
    pub fn issue(&mut self, scenario: &mut Scenario, player: PlayerIndex, command: Command) -> bool {
        self.commands.push(ReplayCommand {
            frame: scenario.frame(),
            player,
            command: command.clone(),
        });
        scenario.issue_command(player, command)
    }

    /// Record the end state of the run.
    pub fn finalize(&mut self, scenario: &Scenario) {
        self.final_frame = scenario.frame();
        self.final_digest = scenario.state_digest();
    }

    /// Commands issued at one frame.
    #[must_use]
    pub fn commands_at_frame(&self, frame: u64) -> Vec<&ReplayCommand> {
        self.commands.iter().filter(|c| c.frame == frame).collect()
    }

    /// Length of the run in frames.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_frame
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| KernelError::Replay(format!("Failed to serialize replay: {e}")))
    }

    /// Decode with bincode and check the version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| KernelError::Replay(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(KernelError::Replay(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Save the replay to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| KernelError::Replay(format!("Failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| KernelError::Replay(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Build the scenario as it was before the first frame.
    pub fn restore_initial_state(&self, context: KernelContext) -> Result<Scenario> {
        let mut scenario = Scenario::from_bytes(&self.map, self.config.clone(), context)?;
        for &player in &self.players {
            scenario.add_player(player);
        }
        for spawn in &self.spawns {
            let placed = scenario.spawn(&spawn.type_name, spawn.owner, spawn.position).is_some();
            if placed != spawn.placed {
                return Err(KernelError::Replay(format!(
                    "Placing {} at {:?} {} on playback but was recorded as {}",
                    spawn.type_name,
                    spawn.position,
                    if placed { "succeeded" } else { "failed" },
                    if spawn.placed { "placed" } else { "blocked" },
                )));
            }
        }
        Ok(scenario)
    }

    /// Play the whole replay and verify the final digest.
    pub fn play(&self, context: KernelContext) -> Result<Scenario> {
        let mut player = ReplayPlayer::new(self.clone(), context)?;
        while player.advance() {}
        let scenario = player.into_scenario();
        let actual = scenario.state_digest();
        if actual != self.final_digest {
            tracing::error!(
                frame = self.final_frame,
                expected = self.final_digest,
                actual,
                "replay diverged"
            );
            return Err(KernelError::DesyncDetected {
                frame: self.final_frame,
                expected: self.final_digest,
                actual,
            });
        }
        tracing::info!(frames = self.final_frame, "replay verified");
        Ok(scenario)
    }
}

/// Steps a scenario through a replay one frame at a time.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    scenario: Scenario,
    command_index: usize,
}

impl ReplayPlayer {
    /// Restore the replay's initial state.
    pub fn new(replay: Replay, context: KernelContext) -> Result<Self> {
        let scenario = replay.restore_initial_state(context)?;
        Ok(Self {
            replay,
            scenario,
            command_index: 0,
        })
    }

    /// Issue this frame's commands and run one update.
    ///
    /// Returns `true` while there are frames left to play.
    pub fn advance(&mut self) -> bool {
        if self.scenario.frame() >= self.replay.final_frame {
            return false;
        }
        let frame = self.scenario.frame();
        while let Some(recorded) = self.replay.commands.get(self.command_index) {
            if recorded.frame > frame {
                break;
            }
            self.scenario
                .issue_command(recorded.player, recorded.command.clone());
            self.command_index += 1;
        }
        self.scenario.update();
        self.scenario.frame() < self.replay.final_frame
    }

    /// Current frame counter.
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        self.scenario.frame()
    }

    /// The scenario being played.
    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Give up the player and keep the scenario.
    #[must_use]
    pub fn into_scenario(self) -> Scenario {
        self.scenario
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::element::ElementId;
    use crate::metadata::Metadata;
    use crate::pathfinding::GridPathFinder;
    use crate::persistence::{encode_records, Record};

    fn p(index: u8) -> PlayerIndex {
        PlayerIndex::new(index).unwrap()
    }

    fn context() -> KernelContext {
        KernelContext::new(
            Arc::new(Metadata::builtin()),
            Box::new(GridPathFinder::new(128, 128)),
        )
    }

    fn map() -> Vec<u8> {
        encode_records(&[
            Record::MapHeader {
                name: "Duel".into(),
                width: 32,
                height: 32,
            },
            Record::StartLocation { x: 2, y: 2, player: 0 },
            Record::StartLocation { x: 24, y: 24, player: 1 },
        ])
        .unwrap()
    }

    fn recorded_run() -> (Replay, u64) {
        let mut replay = Replay::new(map(), KernelConfig::default().with_seed(11));
        let mut scenario = replay.restore_initial_state(context()).unwrap();
        replay.spawn(&mut scenario, "Marine", Some(p(0)), Vec2Fixed::from_ints(40, 60));
        replay.spawn(&mut scenario, "Vulture", Some(p(1)), Vec2Fixed::from_ints(80, 60));
        for _ in 0..5 {
            scenario.update();
        }
        let marine = ElementId::new(2);
        replay.issue(
            &mut scenario,
            p(0),
            Command::Move {
                entity: marine,
                target: Vec2Fixed::from_ints(60, 60),
            },
        );
        for _ in 0..120 {
            scenario.update();
        }
        replay.finalize(&scenario);
        (replay, scenario.state_digest())
    }

    #[test]
    fn test_playback_reproduces_digest() {
        let (replay, digest) = recorded_run();
        assert_eq!(replay.command_count(), 1);
        assert_eq!(replay.commands_at_frame(5).len(), 1);
        let scenario = replay.play(context()).unwrap();
        assert_eq!(scenario.frame(), 125);
        assert_eq!(scenario.state_digest(), digest);
    }

    #[test]
    fn test_blocked_spawns_replay_with_shifted_ids() {
        let mut replay = Replay::new(map(), KernelConfig::default().with_seed(5));
        let mut scenario = replay.restore_initial_state(context()).unwrap();
        let position = Vec2Fixed::from_ints(40, 60);
        assert!(replay.spawn(&mut scenario, "Marine", Some(p(0)), position));
        assert!(!replay.spawn(&mut scenario, "Marine", Some(p(0)), position));
        assert!(!replay.spawn(&mut scenario, "Marine", Some(p(1)), position));
        assert!(replay.spawn(&mut scenario, "Vulture", Some(p(1)), Vec2Fixed::from_ints(80, 60)));
        assert_eq!(
            replay.spawns.iter().map(|spawn| spawn.placed).collect::<Vec<_>>(),
            vec![true, false, false, true]
        );

        // The vulture's ID is past the two IDs the blocked marines consumed.
        let vulture = ElementId::new(5);
        assert!(scenario.element(vulture).is_some());
        replay.issue(
            &mut scenario,
            p(1),
            Command::Move {
                entity: vulture,
                target: Vec2Fixed::from_ints(100, 60),
            },
        );
        for _ in 0..60 {
            scenario.update();
        }
        replay.finalize(&scenario);

        let replayed = replay.play(context()).unwrap();
        assert_eq!(replayed.state_digest(), scenario.state_digest());
        assert!(replayed.element(vulture).is_some());
    }

    #[test]
    fn test_spawn_outcome_mismatch_is_rejected() {
        let (mut replay, _) = recorded_run();
        replay.spawns[1].placed = false;
        let error = replay.restore_initial_state(context()).unwrap_err();
        assert!(matches!(error, KernelError::Replay(_)));
    }

    #[test]
    fn test_tampered_replay_detects_desync() {
        let (mut replay, _) = recorded_run();
        replay.commands.clear();
        let error = replay.play(context()).unwrap_err();
        assert!(matches!(error, KernelError::DesyncDetected { frame: 125, .. }));
    }

    #[test]
    fn test_bytes_round_trip_and_version_check() {
        let (mut replay, _) = recorded_run();
        let decoded = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, replay);

        replay.version = 99;
        let error = Replay::from_bytes(&replay.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(error, KernelError::Replay(_)));
    }

    #[test]
    fn test_save_and_load() {
        let (replay, _) = recorded_run();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        replay.save(&path).unwrap();
        assert_eq!(Replay::load(&path).unwrap(), replay);
    }
}
