//! Immutable type descriptors consumed by the kernel.
//!
//! Descriptors are authored in data files and parsed outside the kernel; here
//! they are plain serde structs looked up by name through [`Metadata`] and
//! shared as `Arc`s by every element of that type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::combat::CustomWeaponLogic;
use crate::error::{KernelError, Result};
use crate::math::{fixed_decimal_serde, Fixed, Vec2Fixed};

/// Enums with a fixed external name for every variant.
///
/// The table is written by hand next to each enum and resolved in both
/// directions.
pub trait NamedEnum: Copy + PartialEq + 'static {
    /// Every variant paired with its external name.
    const NAMES: &'static [(Self, &'static str)];

    /// External name of this variant.
    #[must_use]
    fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(variant, _)| *variant == self)
            .map_or("", |(_, name)| *name)
    }

    /// Variant with the given external name.
    #[must_use]
    fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(variant, _)| *variant)
    }
}

/// Broad category of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityClass {
    /// Mobile unit.
    #[default]
    Unit,
    /// Stand-alone structure.
    Building,
    /// Structure attached to a building.
    Addon,
}

impl NamedEnum for EntityClass {
    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::Unit, "Unit"),
        (Self::Building, "Building"),
        (Self::Addon, "Addon"),
    ];
}

/// How a weapon's damage interacts with target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DamageType {
    /// Full damage against every size.
    #[default]
    Normal,
    /// Effective against small targets.
    Concussive,
    /// Effective against large targets.
    Explosive,
}

impl NamedEnum for DamageType {
    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::Normal, "Normal"),
        (Self::Concussive, "Concussive"),
        (Self::Explosive, "Explosive"),
    ];
}

/// Size class of an attackable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitSize {
    /// Infantry-sized.
    Small,
    /// Vehicle-sized.
    #[default]
    Medium,
    /// Large vehicles, capital ships and structures.
    Large,
}

impl NamedEnum for UnitSize {
    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::Small, "Small"),
        (Self::Medium, "Medium"),
        (Self::Large, "Large"),
    ];
}

/// Footprint of an entity in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
}

impl Footprint {
    /// Create a footprint.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Footprint as a vector, for building rectangles.
    #[must_use]
    pub fn size(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.width as i32, self.height as i32)
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Descriptor of a unit, building or addon type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityType {
    /// Unique type name.
    pub name: String,
    /// Category.
    pub class: EntityClass,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Base armor.
    pub armor: u32,
    /// Size class.
    pub size: UnitSize,
    /// Movement speed in cells per frame. Zero means immobile.
    #[serde(with = "fixed_decimal_serde")]
    pub speed: Fixed,
    /// Whether the entity flies from creation.
    pub flying: bool,
    /// Whether a building of this type can take off and land.
    pub can_lift_off: bool,
    /// Sight range in quad tiles.
    pub sight_range: u32,
    /// Footprint in cells.
    pub footprint: Footprint,
    /// Supply consumed.
    pub supply_cost: u32,
    /// Supply provided once complete.
    pub supply_provided: u32,
    /// Mineral cost.
    pub mineral_cost: u32,
    /// Vespene gas cost.
    pub gas_cost: u32,
    /// Frames needed to build.
    pub build_time: u32,
    /// Names of the weapons this type carries.
    pub weapons: Vec<String>,
    /// Names of the units and upgrades this type can produce.
    pub products: Vec<String>,
    /// Names of the addons this type can build.
    pub addons: Vec<String>,
    /// Upgrade whose level is added to armor.
    pub armor_upgrade: Option<String>,
}

impl EntityType {
    /// Whether the type can move on its own.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.speed > Fixed::ZERO
    }

    /// Whether the type can produce anything.
    #[must_use]
    pub fn is_producer(&self) -> bool {
        !self.products.is_empty() || !self.addons.is_empty()
    }
}

/// Descriptor of a weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponType {
    /// Unique weapon name.
    pub name: String,
    /// Raw damage per missile.
    pub damage: u32,
    /// Damage type.
    pub damage_type: DamageType,
    /// Frames between launches.
    pub cooldown: u32,
    /// Minimum range in cells (inclusive).
    #[serde(with = "fixed_decimal_serde")]
    pub min_range: Fixed,
    /// Maximum range in cells (inclusive).
    #[serde(with = "fixed_decimal_serde")]
    pub max_range: Fixed,
    /// Whether ground targets can be attacked.
    pub targets_ground: bool,
    /// Whether air targets can be attacked.
    pub targets_air: bool,
    /// Missile launched by the weapon.
    pub missile: String,
    /// Missiles created per launch.
    pub missile_count: u32,
    /// Upgrade whose level is added to damage.
    pub damage_upgrade: Option<String>,
}

impl Default for WeaponType {
    fn default() -> Self {
        Self {
            name: String::new(),
            damage: 0,
            damage_type: DamageType::Normal,
            cooldown: 1,
            min_range: Fixed::ZERO,
            max_range: Fixed::ONE,
            targets_ground: true,
            targets_air: false,
            missile: String::new(),
            missile_count: 1,
            damage_upgrade: None,
        }
    }
}

/// Descriptor of a missile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissileType {
    /// Unique missile name.
    pub name: String,
    /// Speed in cells per frame. Zero means the missile hits instantly.
    #[serde(with = "fixed_decimal_serde")]
    pub speed: Fixed,
    /// Frames between launch order and actual launch.
    pub launch_delay: u32,
    /// Frames the impact visual plays.
    pub impact_duration: u32,
}

/// Descriptor of a researchable upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeType {
    /// Unique upgrade name.
    pub name: String,
    /// Mineral cost per level.
    pub mineral_cost: u32,
    /// Vespene gas cost per level.
    pub gas_cost: u32,
    /// Frames needed per level.
    pub build_time: u32,
    /// Highest level that can be researched.
    pub max_level: u32,
    /// Bonus added per level to damage or armor.
    pub bonus_per_level: u32,
}

/// Serializable list of descriptors, as authored in data files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSource {
    /// Unit, building and addon types.
    pub entities: Vec<EntityType>,
    /// Weapon types.
    pub weapons: Vec<WeaponType>,
    /// Missile types.
    pub missiles: Vec<MissileType>,
    /// Upgrade types.
    pub upgrades: Vec<UpgradeType>,
}

/// Registry of descriptors, looked up by name.
#[derive(Clone, Default)]
pub struct Metadata {
    entities: BTreeMap<String, Arc<EntityType>>,
    weapons: BTreeMap<String, Arc<WeaponType>>,
    missiles: BTreeMap<String, Arc<MissileType>>,
    upgrades: BTreeMap<String, Arc<UpgradeType>>,
    custom_weapons: BTreeMap<String, Arc<dyn CustomWeaponLogic>>,
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("weapons", &self.weapons.keys().collect::<Vec<_>>())
            .field("missiles", &self.missiles.keys().collect::<Vec<_>>())
            .field("upgrades", &self.upgrades.keys().collect::<Vec<_>>())
            .field(
                "custom_weapons",
                &self.custom_weapons.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Metadata {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from authored descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Metadata`] if a name is defined twice or a
    /// descriptor references something that does not exist.
    pub fn from_source(source: MetadataSource) -> Result<Self> {
        let mut metadata = Self::new();
        for missile in source.missiles {
            let name = missile.name.clone();
            if metadata.missiles.insert(name.clone(), Arc::new(missile)).is_some() {
                return Err(duplicate("missile", &name));
            }
        }
        for weapon in source.weapons {
            let name = weapon.name.clone();
            if metadata.weapons.insert(name.clone(), Arc::new(weapon)).is_some() {
                return Err(duplicate("weapon", &name));
            }
        }
        for upgrade in source.upgrades {
            let name = upgrade.name.clone();
            if metadata.upgrades.insert(name.clone(), Arc::new(upgrade)).is_some() {
                return Err(duplicate("upgrade", &name));
            }
        }
        for entity in source.entities {
            let name = entity.name.clone();
            if metadata.entities.insert(name.clone(), Arc::new(entity)).is_some() {
                return Err(duplicate("entity type", &name));
            }
        }
        metadata.validate()?;
        Ok(metadata)
    }

    /// Export the descriptors back into their authored form.
    #[must_use]
    pub fn to_source(&self) -> MetadataSource {
        MetadataSource {
            entities: self.entities.values().map(|e| (**e).clone()).collect(),
            weapons: self.weapons.values().map(|w| (**w).clone()).collect(),
            missiles: self.missiles.values().map(|m| (**m).clone()).collect(),
            upgrades: self.upgrades.values().map(|u| (**u).clone()).collect(),
        }
    }

    /// Check that every cross-reference resolves.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Metadata`] describing the first dangling reference.
    pub fn validate(&self) -> Result<()> {
        for weapon in self.weapons.values() {
            if !self.missiles.contains_key(&weapon.missile) {
                return Err(KernelError::Metadata(format!(
                    "weapon '{}' launches unknown missile '{}'",
                    weapon.name, weapon.missile
                )));
            }
            if weapon.min_range > weapon.max_range {
                return Err(KernelError::Metadata(format!(
                    "weapon '{}' has min range above max range",
                    weapon.name
                )));
            }
            self.check_upgrade(&weapon.name, weapon.damage_upgrade.as_deref())?;
        }
        for entity in self.entities.values() {
            for weapon in &entity.weapons {
                if !self.weapons.contains_key(weapon) {
                    return Err(KernelError::Metadata(format!(
                        "'{}' carries unknown weapon '{weapon}'",
                        entity.name
                    )));
                }
            }
            for product in &entity.products {
                let is_unit = self
                    .entities
                    .get(product)
                    .is_some_and(|p| p.class == EntityClass::Unit);
                if !is_unit && !self.upgrades.contains_key(product) {
                    return Err(KernelError::Metadata(format!(
                        "'{}' produces '{product}', which is neither a unit nor an upgrade",
                        entity.name
                    )));
                }
            }
            for addon in &entity.addons {
                let is_addon = self
                    .entities
                    .get(addon)
                    .is_some_and(|a| a.class == EntityClass::Addon);
                if !is_addon {
                    return Err(KernelError::Metadata(format!(
                        "'{}' lists '{addon}', which is not an addon",
                        entity.name
                    )));
                }
            }
            self.check_upgrade(&entity.name, entity.armor_upgrade.as_deref())?;
        }
        Ok(())
    }

    fn check_upgrade(&self, owner: &str, upgrade: Option<&str>) -> Result<()> {
        match upgrade {
            Some(name) if !self.upgrades.contains_key(name) => Err(KernelError::Metadata(
                format!("'{owner}' references unknown upgrade '{name}'"),
            )),
            _ => Ok(()),
        }
    }

    /// Register or replace an entity type.
    pub fn insert_entity_type(&mut self, entity: EntityType) {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
    }

    /// Register or replace a weapon type.
    pub fn insert_weapon_type(&mut self, weapon: WeaponType) {
        self.weapons.insert(weapon.name.clone(), Arc::new(weapon));
    }

    /// Register or replace a missile type.
    pub fn insert_missile_type(&mut self, missile: MissileType) {
        self.missiles.insert(missile.name.clone(), Arc::new(missile));
    }

    /// Register or replace an upgrade type.
    pub fn insert_upgrade_type(&mut self, upgrade: UpgradeType) {
        self.upgrades.insert(upgrade.name.clone(), Arc::new(upgrade));
    }

    /// Attach user logic to a weapon name. Weapons with that name become custom weapons.
    pub fn register_custom_weapon(
        &mut self,
        weapon: impl Into<String>,
        logic: Arc<dyn CustomWeaponLogic>,
    ) {
        self.custom_weapons.insert(weapon.into(), logic);
    }

    /// Look up an entity type.
    #[must_use]
    pub fn entity_type(&self, name: &str) -> Option<Arc<EntityType>> {
        self.entities.get(name).cloned()
    }

    /// Look up a weapon type.
    #[must_use]
    pub fn weapon_type(&self, name: &str) -> Option<Arc<WeaponType>> {
        self.weapons.get(name).cloned()
    }

    /// Look up a missile type.
    #[must_use]
    pub fn missile_type(&self, name: &str) -> Option<Arc<MissileType>> {
        self.missiles.get(name).cloned()
    }

    /// Look up an upgrade type.
    #[must_use]
    pub fn upgrade_type(&self, name: &str) -> Option<Arc<UpgradeType>> {
        self.upgrades.get(name).cloned()
    }

    /// Look up custom logic registered for a weapon.
    #[must_use]
    pub fn custom_weapon(&self, name: &str) -> Option<Arc<dyn CustomWeaponLogic>> {
        self.custom_weapons.get(name).cloned()
    }

    /// Names of all entity types, sorted.
    pub fn entity_type_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// A small built-in rule set used by tests, benchmarks and the tools.
    #[must_use]
    pub fn builtin() -> Self {
        let mut metadata = Self::new();

        metadata.insert_missile_type(MissileType {
            name: "GaussBullet".into(),
            speed: Fixed::ZERO,
            launch_delay: 0,
            impact_duration: 4,
        });
        metadata.insert_missile_type(MissileType {
            name: "Grenade".into(),
            speed: Fixed::from_num(2),
            launch_delay: 2,
            impact_duration: 8,
        });
        metadata.insert_missile_type(MissileType {
            name: "Gemini".into(),
            speed: Fixed::from_num(3),
            launch_delay: 0,
            impact_duration: 8,
        });

        metadata.insert_upgrade_type(UpgradeType {
            name: "InfantryWeapons".into(),
            mineral_cost: 100,
            gas_cost: 100,
            build_time: 4000,
            max_level: 3,
            bonus_per_level: 1,
        });
        metadata.insert_upgrade_type(UpgradeType {
            name: "InfantryArmor".into(),
            mineral_cost: 100,
            gas_cost: 100,
            build_time: 4000,
            max_level: 3,
            bonus_per_level: 1,
        });

        metadata.insert_weapon_type(WeaponType {
            name: "GaussRifle".into(),
            damage: 6,
            damage_type: DamageType::Normal,
            cooldown: 15,
            max_range: Fixed::from_num(16),
            targets_ground: true,
            targets_air: true,
            missile: "GaussBullet".into(),
            damage_upgrade: Some("InfantryWeapons".into()),
            ..WeaponType::default()
        });
        metadata.insert_weapon_type(WeaponType {
            name: "FragmentationGrenade".into(),
            damage: 20,
            damage_type: DamageType::Concussive,
            cooldown: 30,
            max_range: Fixed::from_num(20),
            missile: "Grenade".into(),
            ..WeaponType::default()
        });
        metadata.insert_weapon_type(WeaponType {
            name: "BurstLasers".into(),
            damage: 8,
            cooldown: 30,
            max_range: Fixed::from_num(20),
            missile: "GaussBullet".into(),
            ..WeaponType::default()
        });
        metadata.insert_weapon_type(WeaponType {
            name: "GeminiMissiles".into(),
            damage: 10,
            damage_type: DamageType::Explosive,
            cooldown: 22,
            max_range: Fixed::from_num(20),
            targets_ground: false,
            targets_air: true,
            missile: "Gemini".into(),
            missile_count: 2,
            ..WeaponType::default()
        });

        metadata.insert_entity_type(EntityType {
            name: "Marine".into(),
            class: EntityClass::Unit,
            max_hp: 40,
            size: UnitSize::Small,
            speed: Fixed::from_num(0.25),
            sight_range: 7,
            supply_cost: 1,
            mineral_cost: 50,
            build_time: 360,
            weapons: vec!["GaussRifle".into()],
            armor_upgrade: Some("InfantryArmor".into()),
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Vulture".into(),
            class: EntityClass::Unit,
            max_hp: 80,
            size: UnitSize::Medium,
            speed: Fixed::from_num(0.5),
            sight_range: 8,
            supply_cost: 2,
            mineral_cost: 75,
            build_time: 450,
            weapons: vec!["FragmentationGrenade".into()],
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Wraith".into(),
            class: EntityClass::Unit,
            max_hp: 120,
            size: UnitSize::Large,
            speed: Fixed::from_num(0.375),
            flying: true,
            sight_range: 7,
            supply_cost: 2,
            mineral_cost: 150,
            gas_cost: 100,
            build_time: 900,
            weapons: vec!["BurstLasers".into(), "GeminiMissiles".into()],
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "CommandCenter".into(),
            class: EntityClass::Building,
            max_hp: 1500,
            armor: 1,
            size: UnitSize::Large,
            can_lift_off: true,
            sight_range: 10,
            footprint: Footprint::new(16, 12),
            supply_provided: 10,
            mineral_cost: 400,
            build_time: 1800,
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "SupplyDepot".into(),
            class: EntityClass::Building,
            max_hp: 500,
            armor: 1,
            size: UnitSize::Large,
            sight_range: 8,
            footprint: Footprint::new(12, 8),
            supply_provided: 8,
            mineral_cost: 100,
            build_time: 600,
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Barracks".into(),
            class: EntityClass::Building,
            max_hp: 1000,
            armor: 1,
            size: UnitSize::Large,
            can_lift_off: true,
            sight_range: 8,
            footprint: Footprint::new(16, 12),
            mineral_cost: 150,
            build_time: 1200,
            products: vec!["Marine".into()],
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Factory".into(),
            class: EntityClass::Building,
            max_hp: 1250,
            armor: 1,
            size: UnitSize::Large,
            can_lift_off: true,
            sight_range: 8,
            footprint: Footprint::new(16, 12),
            mineral_cost: 200,
            gas_cost: 100,
            build_time: 1200,
            products: vec!["Vulture".into()],
            addons: vec!["MachineShop".into()],
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "MachineShop".into(),
            class: EntityClass::Addon,
            max_hp: 750,
            armor: 1,
            size: UnitSize::Large,
            sight_range: 8,
            footprint: Footprint::new(8, 8),
            mineral_cost: 50,
            gas_cost: 50,
            build_time: 600,
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Starport".into(),
            class: EntityClass::Building,
            max_hp: 1300,
            armor: 1,
            size: UnitSize::Large,
            can_lift_off: true,
            sight_range: 10,
            footprint: Footprint::new(16, 12),
            mineral_cost: 150,
            gas_cost: 100,
            build_time: 1050,
            products: vec!["Wraith".into()],
            ..EntityType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "EngineeringBay".into(),
            class: EntityClass::Building,
            max_hp: 850,
            armor: 1,
            size: UnitSize::Large,
            sight_range: 8,
            footprint: Footprint::new(16, 12),
            mineral_cost: 125,
            build_time: 900,
            products: vec!["InfantryWeapons".into(), "InfantryArmor".into()],
            ..EntityType::default()
        });

        metadata
    }
}

fn duplicate(kind: &str, name: &str) -> KernelError {
    KernelError::Metadata(format!("{kind} '{name}' is defined twice"))
}
