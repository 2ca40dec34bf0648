//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a scenario produces identical state
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep clients only exchange commands, so every client must reach the
//! same state digest after every frame. Sources of non-determinism include:
//!
//! - **Floating-point math**: the kernel uses [`rts_kernel::math::Fixed`] throughout.
//! - **Hash map iteration order**: the kernel iterates in element ID order
//!   and keeps its maps in `BTreeMap`s.
//! - **System randomness**: every scenario owns a generator seeded from its
//!   configuration.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual state machines (motion, missiles, jobs)
//! 2. **Property tests**: random inputs must still produce deterministic outputs
//! 3. **Integration tests**: full scenarios are reproducible
//! 4. **Parallel tests**: running N scenarios on N threads all match

use std::thread;

use rts_kernel::scenario::Scenario;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Digests from each run.
    pub hashes: Vec<u64>,
    /// Number of frames simulated.
    pub frames: u64,
}

impl DeterminismResult {
    /// Get all unique digests (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs agreed, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different digests.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Scenario is non-deterministic!\n\
                 Runs: {}\n\
                 Frames: {}\n\
                 Unique digests: {} (expected 1)\n\
                 All digests: {:#018x?}",
                self.hashes.len(),
                self.frames,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Where two runs of the same scenario first disagreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Frame counter after which the digests differed.
    pub frame: u64,
    /// Stored fields whose digest differed.
    pub fields: Vec<String>,
}

/// Run some state multiple times and verify determinism.
///
/// # Example
///
/// ```
/// use rts_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    frames: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..frames {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        frames,
    }
}

/// Run a scenario twice with identical setup and compare final digests.
pub fn verify_scenario_determinism<F>(setup_fn: F, frames: u64) -> bool
where
    F: Fn() -> Scenario,
{
    verify_determinism(
        2,
        frames,
        &setup_fn,
        |scenario| {
            scenario.update();
        },
        Scenario::state_digest,
    )
    .is_deterministic
}

/// Run N scenarios on scoped threads and collect their final digests.
///
/// Catches non-determinism that only shows up under different thread
/// scheduling or memory layout.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_scenarios<F>(setup_fn: F, runs: usize, frames: u64) -> DeterminismResult
where
    F: Fn() -> Scenario + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut scenario = setup_fn();
                    for _ in 0..frames {
                        scenario.update();
                    }
                    scenario.state_digest()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        frames,
    }
}

/// Step two runs side by side and report the first frame they disagree on.
///
/// Returns `None` if the runs agree for all `frames`. On divergence the
/// per-field snapshots are diffed to name the fields that differ.
pub fn find_first_divergence<F>(setup_fn: F, frames: u64) -> Option<Divergence>
where
    F: Fn() -> Scenario,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    let diverged = |a: &Scenario, b: &Scenario| {
        (a.state_digest() != b.state_digest()).then(|| Divergence {
            frame: a.frame(),
            fields: a.snapshot().diff(&b.snapshot()),
        })
    };

    if let Some(divergence) = diverged(&first, &second) {
        return Some(divergence);
    }
    for _ in 0..frames {
        first.update();
        second.update();
        if let Some(divergence) = diverged(&first, &second) {
            tracing::warn!(frame = divergence.frame, fields = ?divergence.fields, "runs diverged");
            return Some(divergence);
        }
    }
    None
}

/// Proptest strategies for scenario inputs.
pub mod strategies {
    use proptest::prelude::*;
    use rts_kernel::command::Command;
    use rts_kernel::element::ElementId;
    use rts_kernel::math::Vec2Fixed;

    /// Built-in unit types that can be spawned freely.
    pub const UNIT_TYPES: [&str; 3] = ["Marine", "Vulture", "Wraith"];

    /// A whole-cell position inside a map of `width` x `height` cells.
    pub fn arb_position(width: i32, height: i32) -> impl Strategy<Value = Vec2Fixed> {
        (1..width - 1, 1..height - 1).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// One of the built-in unit type names.
    pub fn arb_unit_type() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(UNIT_TYPES.to_vec())
    }

    /// A unit to spawn: type, owner slot and position.
    pub fn arb_spawn(width: i32, height: i32) -> impl Strategy<Value = (&'static str, u8, Vec2Fixed)> {
        (arb_unit_type(), 0u8..2, arb_position(width, height))
    }

    /// A list of units to spawn.
    pub fn arb_spawn_list(
        max_units: usize,
        width: i32,
        height: i32,
    ) -> impl Strategy<Value = Vec<(&'static str, u8, Vec2Fixed)>> {
        proptest::collection::vec(arb_spawn(width, height), 1..max_units)
    }

    /// A movement-related command for one of the first `max_id` elements.
    pub fn arb_unit_command(max_id: u32, width: i32, height: i32) -> impl Strategy<Value = Command> {
        let entity = (0..max_id).prop_map(ElementId::new);
        prop_oneof![
            (entity.clone(), arb_position(width, height))
                .prop_map(|(entity, target)| Command::Move { entity, target }),
            entity.clone().prop_map(|entity| Command::Stop { entity }),
            (entity.clone(), (0..max_id).prop_map(ElementId::new))
                .prop_map(|(entity, target)| Command::Attack { entity, target }),
            entity.prop_map(|entity| Command::TakeOff { entity }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_scenario, player, pos, skirmish_scenario};
    use proptest::prelude::*;
    use rts_kernel::command::Command;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_map_determinism() {
        assert!(verify_scenario_determinism(|| duel_scenario(3), 100));
    }

    #[test]
    fn test_skirmish_determinism() {
        assert!(verify_scenario_determinism(|| skirmish_scenario(7), 400));
    }

    #[test]
    fn test_seed_changes_uphill_outcomes() {
        let setup = |seed: u64| {
            move || {
                let mut scenario = skirmish_scenario(seed);
                for _ in 0..10 {
                    scenario.update();
                }
                scenario
            }
        };
        assert!(verify_scenario_determinism(setup(1), 200));
        assert!(verify_scenario_determinism(setup(2), 200));
    }

    #[test]
    fn test_no_divergence_between_identical_runs() {
        assert!(find_first_divergence(|| skirmish_scenario(5), 200).is_none());
    }

    #[test]
    fn test_divergence_names_the_field() {
        let runs = std::cell::Cell::new(0);
        let divergence = find_first_divergence(
            || {
                runs.set(runs.get() + 1);
                let mut scenario = duel_scenario(1);
                let offset = if runs.get() == 1 { 0 } else { 4 };
                let marine = scenario.spawn("Marine", Some(player(0)), pos(60, 40)).unwrap();
                scenario.issue_command(
                    player(0),
                    Command::Move {
                        entity: marine,
                        target: pos(80 + offset, 40),
                    },
                );
                scenario
            },
            100,
        )
        .expect("runs with different targets diverge");
        assert_eq!(divergence.frame, 1);
        assert!(divergence.fields.iter().any(|field| field.contains("motion")));
    }

    #[test]
    fn test_parallel_skirmishes_agree() {
        run_parallel_scenarios(|| skirmish_scenario(9), 4, 200).assert_deterministic();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_random_spawns_are_deterministic(
            spawns in strategies::arb_spawn_list(12, 190, 126),
        ) {
            let setup = || {
                let mut scenario = crate::fixtures::empty_scenario(48, 32, 17);
                for (unit, owner, position) in &spawns {
                    scenario.spawn(unit, Some(player(*owner)), *position);
                }
                scenario
            };
            prop_assert!(verify_scenario_determinism(setup, 150));
        }
    }
}
