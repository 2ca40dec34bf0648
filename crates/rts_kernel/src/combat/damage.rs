//! Damage resolution.
//!
//! ```text
//! reduced = max(0, raw - armor)
//! final   = reduced × effectiveness(damage type, target size)
//! final   = max(final, 0.5)   when raw > 0
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::combat::CustomWeaponLogic;
use crate::element::{ElementId, PlayerIndex};
use crate::math::Fixed;
use crate::metadata::{DamageType, UnitSize};

/// Smallest damage a positive hit can deal: one half.
pub const MIN_DAMAGE: Fixed = Fixed::from_bits(1 << 31);

/// Damage multiplier of a damage type against a target size.
#[must_use]
pub fn effectiveness(damage_type: DamageType, size: UnitSize) -> Fixed {
    let quarters = match (damage_type, size) {
        (DamageType::Normal, _) => 4,

        (DamageType::Concussive, UnitSize::Small) => 4,
        (DamageType::Concussive, UnitSize::Medium) => 2,
        (DamageType::Concussive, UnitSize::Large) => 1,

        (DamageType::Explosive, UnitSize::Small) => 2,
        (DamageType::Explosive, UnitSize::Medium) => 3,
        (DamageType::Explosive, UnitSize::Large) => 4,
    };

    Fixed::from_num(quarters) / Fixed::from_num(4)
}

/// Damage dealt by one hit after armor and size effectiveness.
#[must_use]
pub fn final_damage(raw: Fixed, armor: Fixed, damage_type: DamageType, size: UnitSize) -> Fixed {
    let reduced = (raw - armor).max(Fixed::ZERO);
    let damage = reduced * effectiveness(damage_type, size);
    if raw > Fixed::ZERO {
        damage.max(MIN_DAMAGE)
    } else {
        damage
    }
}

/// Attack parameters captured when a missile is launched.
///
/// Later upgrades or the attacker's death do not change a missile already
/// in flight.
#[derive(Clone)]
pub struct DamageSource {
    /// Launching entity.
    pub attacker: ElementId,
    /// Owner of the launching entity.
    pub attacker_owner: Option<PlayerIndex>,
    /// Weapon damage including upgrade bonus.
    pub raw_damage: Fixed,
    /// Damage type.
    pub damage_type: DamageType,
    /// Terrain level the missile was launched from.
    pub launch_level: u8,
    /// User logic of a custom weapon.
    pub custom: Option<Arc<dyn CustomWeaponLogic>>,
}

impl fmt::Debug for DamageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DamageSource")
            .field("attacker", &self.attacker)
            .field("attacker_owner", &self.attacker_owner)
            .field("raw_damage", &self.raw_damage)
            .field("damage_type", &self.damage_type)
            .field("launch_level", &self.launch_level)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl Hash for DamageSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attacker.hash(state);
        self.attacker_owner.hash(state);
        self.raw_damage.hash(state);
        self.damage_type.hash(state);
        self.launch_level.hash(state);
        self.custom.is_some().hash(state);
    }
}
