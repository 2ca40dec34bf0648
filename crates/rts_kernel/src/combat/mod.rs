//! Combat: armour, weapons, missiles and damage resolution.

pub mod armour;
pub mod damage;
pub mod missile;
pub mod weapon;

pub use armour::{is_hostile, Armour};
pub use damage::{effectiveness, final_damage, DamageSource, MIN_DAMAGE};
pub use missile::{Missile, MissileState};
pub use weapon::{CustomWeaponLogic, ImpactInfo, Launch, TargetInfo, Weapon, WeaponKind};
