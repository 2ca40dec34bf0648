//! Weapons: targeting rules, range bands and launch cooldowns.

use std::fmt;
use std::sync::Arc;

use crate::element::{ElementId, PlayerIndex};
use crate::math::Fixed;
use crate::metadata::{DamageType, MissileType, UnitSize, WeaponType};
use crate::storage::{Field, StateVisitor, Stored};

/// What a weapon knows about a prospective target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Target element.
    pub id: ElementId,
    /// Target owner.
    pub owner: Option<PlayerIndex>,
    /// Whether the target is airborne.
    pub flying: bool,
    /// Size class of the target.
    pub size: UnitSize,
}

/// Inputs to a custom weapon's damage computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactInfo {
    /// Target element.
    pub target: ElementId,
    /// Raw damage captured at launch.
    pub raw_damage: Fixed,
    /// Target armor including upgrades.
    pub armor: Fixed,
    /// Damage type of the weapon.
    pub damage_type: DamageType,
    /// Size class of the target.
    pub target_size: UnitSize,
}

/// User-supplied behaviour for weapons the standard rules cannot express.
pub trait CustomWeaponLogic: fmt::Debug + Send + Sync {
    /// Whether the weapon may attack the target at all.
    fn can_target_entity(&self, target: &TargetInfo) -> bool;

    /// Damage dealt when a missile of this weapon hits.
    fn impact_damage(&self, impact: &ImpactInfo) -> Fixed;
}

/// Standard metadata-driven weapon or a custom one.
#[derive(Debug, Clone)]
pub enum WeaponKind {
    /// Targeting and damage follow the weapon descriptor.
    Standard,
    /// Targeting and damage are delegated to user logic.
    Custom(Arc<dyn CustomWeaponLogic>),
}

/// Result of asking a weapon to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    /// Whether the target can be attacked from here at all.
    pub reachable: bool,
    /// Number of missiles to create this frame.
    pub missiles: u32,
}

/// A weapon mounted on an entity.
#[derive(Debug, Clone)]
pub struct Weapon {
    weapon_type: Arc<WeaponType>,
    missile_type: Arc<MissileType>,
    kind: WeaponKind,
    last_launch_frame: Field<Option<u64>>,
}

impl Weapon {
    /// Create a weapon.
    #[must_use]
    pub fn new(
        weapon_type: Arc<WeaponType>,
        missile_type: Arc<MissileType>,
        kind: WeaponKind,
    ) -> Self {
        Self {
            weapon_type,
            missile_type,
            kind,
            last_launch_frame: Field::new("last_launch_frame"),
        }
    }

    /// Weapon descriptor.
    #[must_use]
    pub fn weapon_type(&self) -> &Arc<WeaponType> {
        &self.weapon_type
    }

    /// Missile descriptor.
    #[must_use]
    pub fn missile_type(&self) -> &Arc<MissileType> {
        &self.missile_type
    }

    /// Standard or custom.
    #[must_use]
    pub fn kind(&self) -> &WeaponKind {
        &self.kind
    }

    /// Frame of the most recent launch.
    #[must_use]
    pub fn last_launch_frame(&self) -> Option<u64> {
        self.last_launch_frame.get()
    }

    /// Whether the weapon may attack the target.
    #[must_use]
    pub fn can_target_entity(&self, target: &TargetInfo) -> bool {
        match &self.kind {
            WeaponKind::Standard => {
                if target.flying {
                    self.weapon_type.targets_air
                } else {
                    self.weapon_type.targets_ground
                }
            }
            WeaponKind::Custom(logic) => logic.can_target_entity(target),
        }
    }

    /// Whether the cooldown has elapsed at `frame`.
    #[must_use]
    pub fn can_launch_missiles(&self, frame: u64) -> bool {
        match self.last_launch_frame.get() {
            None => true,
            Some(last) => frame.saturating_sub(last) >= u64::from(self.weapon_type.cooldown),
        }
    }

    /// Whether `distance` lies inside the inclusive range band.
    #[must_use]
    pub fn is_in_range(&self, distance: Fixed) -> bool {
        distance >= self.weapon_type.min_range && distance <= self.weapon_type.max_range
    }

    /// Fire at a target if it is reachable and the cooldown allows.
    pub fn launch_missiles(&mut self, frame: u64, target: &TargetInfo, distance: Fixed) -> Launch {
        let reachable = self.can_target_entity(target) && self.is_in_range(distance);
        if !reachable || !self.can_launch_missiles(frame) {
            return Launch {
                reachable,
                missiles: 0,
            };
        }
        self.last_launch_frame.write(Some(frame));
        Launch {
            reachable,
            missiles: self.weapon_type.missile_count,
        }
    }

    /// Raw damage with an upgrade bonus applied.
    #[must_use]
    pub fn raw_damage(&self, bonus: u32) -> Fixed {
        Fixed::from_num(self.weapon_type.damage + bonus)
    }
}

impl Stored for Weapon {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("type", &self.weapon_type.name);
        self.last_launch_frame.accept(visitor);
    }
}
