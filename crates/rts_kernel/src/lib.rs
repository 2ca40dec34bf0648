//! # RTS Kernel
//!
//! Deterministic, frame-stepped scenario kernel for a real-time strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO besides replay files
//! - No system randomness (a seeded generator per scenario)
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! Identical inputs produce bit-identical state on every platform, which is
//! what lockstep multiplayer and replays rely on.
//!
//! ## Crate Structure
//!
//! - [`scenario`] - Root container and the four-step frame update
//! - [`element`] - Element identity, ownership and map footprints
//! - [`entity`], [`motion`], [`path_tracker`] - Units, buildings and movement
//! - [`combat`] - Armour, weapons, missiles and damage
//! - [`economy`] - Players, supply and production lines
//! - [`command`] - Player commands and their executions
//! - [`storage`] - Field-based state model and digests
//! - [`persistence`] - Binary map records and bootstrap
//! - [`replay`] - Recorded runs and lockstep verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod command;
pub mod config;
pub mod context;
pub mod economy;
pub mod element;
pub mod entity;
pub mod error;
pub mod math;
pub mod metadata;
pub mod motion;
pub mod path_tracker;
pub mod pathfinding;
pub mod persistence;
pub mod replay;
pub mod scenario;
pub mod spatial;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{Armour, CustomWeaponLogic, ImpactInfo, Missile, MissileState, Weapon};
    pub use crate::command::{Command, CommandExecution, ExecutionStatus};
    pub use crate::config::KernelConfig;
    pub use crate::context::{ElementFactory, KernelContext, MetadataFactory, SpawnContext};
    pub use crate::economy::{JobState, Player, Product, ProductionJob, ProductionLine};
    pub use crate::element::{ElementId, ElementKind, PlayerIndex, ScenarioElement, MAX_PLAYERS};
    pub use crate::entity::{Body, Entity};
    pub use crate::error::{KernelError, Result};
    pub use crate::math::{Fixed, QuadPos, RectFixed, Vec2Fixed, QUAD_TILE_CELLS};
    pub use crate::metadata::{EntityClass, EntityType, Metadata, MissileType, UpgradeType, WeaponType};
    pub use crate::motion::{MotionControl, MotionState};
    pub use crate::pathfinding::{GridPathFinder, Layer, PathFinder};
    pub use crate::persistence::{decode_records, encode_records, Record};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::scenario::{Completion, FrameEvents, Impact, MapInfo, Scenario};
    pub use crate::storage::{Field, StateSnapshot, Stored};
}
