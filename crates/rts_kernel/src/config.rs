//! Kernel tuning constants.

use crate::math::{fixed_decimal_serde, Fixed};
use serde::{Deserialize, Serialize};

/// Tunable constants of the simulation.
///
/// [`Default`] yields the canonical values. Every client in a lockstep session
/// must run with an identical configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Minerals every player starts with.
    pub starting_minerals: u32,
    /// Vespene gas every player starts with.
    pub starting_gas: u32,
    /// Hard cap on total supply per player.
    pub supply_cap: u32,
    /// Number of jobs a production line can hold.
    pub production_line_capacity: usize,
    /// Frames a take-off or landing lasts.
    pub vtol_frames: u32,
    /// Vertical distance, in cells, between a grounded and an airborne position.
    #[serde(with = "fixed_decimal_serde")]
    pub vtol_altitude: Fixed,
    /// Frames after which a missile is destroyed regardless of state.
    pub missile_max_lifetime: u32,
    /// Chance, in percent, that a shot from low ground hits a target on high ground.
    pub low_to_high_hit_percent: u32,
    /// Frames a path tracker waits on a blocked step before searching a new path.
    pub repath_after_blocked_frames: u32,
    /// Seed of the scenario random generator.
    pub seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            starting_minerals: 5000,
            starting_gas: 5000,
            supply_cap: 200,
            production_line_capacity: 5,
            vtol_frames: 72,
            vtol_altitude: Fixed::from_num(2),
            missile_max_lifetime: 250,
            low_to_high_hit_percent: 70,
            repath_after_blocked_frames: 8,
            seed: 0,
        }
    }
}

impl KernelConfig {
    /// Return a copy with a different random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = KernelConfig::default();
        assert_eq!(config.starting_minerals, 5000);
        assert_eq!(config.starting_gas, 5000);
        assert_eq!(config.supply_cap, 200);
        assert_eq!(config.production_line_capacity, 5);
        assert_eq!(config.vtol_frames, 72);
        assert_eq!(config.missile_max_lifetime, 250);
        assert_eq!(config.low_to_high_hit_percent, 70);
    }

    #[test]
    fn test_with_seed_keeps_other_fields() {
        let config = KernelConfig::default().with_seed(42);
        assert_eq!(config.seed, 42);
        assert_eq!(config.supply_cap, 200);
    }
}
