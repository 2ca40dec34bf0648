//! Test fixtures and helpers.
//!
//! Pre-built scenarios and maps for consistent testing.

use std::sync::Arc;

use fixed::types::I32F32;
use rts_kernel::config::KernelConfig;
use rts_kernel::context::KernelContext;
use rts_kernel::element::PlayerIndex;
use rts_kernel::math::Vec2Fixed;
use rts_kernel::metadata::Metadata;
use rts_kernel::pathfinding::GridPathFinder;
use rts_kernel::persistence::Record;
use rts_kernel::scenario::{MapInfo, Scenario};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Position in cells.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Player slot by number.
///
/// # Panics
///
/// Panics if `index` is not a valid slot.
#[must_use]
pub fn player(index: u8) -> PlayerIndex {
    PlayerIndex::new(index).expect("player slot out of range")
}

/// Collaborators over the built-in metadata and an open grid sized for the map.
#[must_use]
pub fn context(map: &MapInfo) -> KernelContext {
    let (width, height) = map.cell_size();
    KernelContext::new(
        Arc::new(Metadata::builtin()),
        Box::new(GridPathFinder::new(width, height)),
    )
}

/// An empty scenario of `width` x `height` quad tiles.
#[must_use]
pub fn empty_scenario(width: u32, height: u32, seed: u64) -> Scenario {
    let map = MapInfo::new("fixture", width, height);
    let context = context(&map);
    Scenario::new(map, KernelConfig::default().with_seed(seed), context)
}

/// Records of a two-player map with resources beside each base.
#[must_use]
pub fn duel_map_records() -> Vec<Record> {
    vec![
        Record::MapHeader {
            name: "Duel".into(),
            width: 48,
            height: 32,
        },
        Record::StartLocation { x: 2, y: 2, player: 0 },
        Record::MineralField { x: 12, y: 2, amount: 1500 },
        Record::MineralField { x: 12, y: 3, amount: 1500 },
        Record::VespeneGeyser { x: 2, y: 10, amount: 5000 },
        Record::StartLocation { x: 42, y: 26, player: 1 },
        Record::MineralField { x: 34, y: 28, amount: 1500 },
        Record::VespeneGeyser { x: 42, y: 20, amount: 5000 },
    ]
}

/// Bootstrapped duel map with no units.
///
/// # Panics
///
/// Panics if the fixture map fails to load.
#[must_use]
pub fn duel_scenario(seed: u64) -> Scenario {
    let records = duel_map_records();
    let map = MapInfo::new("Duel", 48, 32);
    Scenario::from_records(&records, KernelConfig::default().with_seed(seed), context(&map))
        .expect("fixture map is valid")
}

/// Two small armies facing each other across open ground.
///
/// Player 0 fields marines, player 1 fields vultures and a wraith; both
/// sides have a command center for supply.
#[must_use]
pub fn skirmish_scenario(seed: u64) -> Scenario {
    let mut scenario = empty_scenario(48, 32, seed);
    scenario.add_player(player(0));
    scenario.add_player(player(1));
    scenario.spawn("CommandCenter", Some(player(0)), pos(20, 20));
    scenario.spawn("CommandCenter", Some(player(1)), pos(170, 100));
    for row in 0..4 {
        scenario.spawn("Marine", Some(player(0)), pos(80, 50 + row * 3));
        scenario.spawn("Vulture", Some(player(1)), pos(104, 50 + row * 3));
    }
    scenario.spawn("Wraith", Some(player(1)), pos(110, 60));
    scenario
}
