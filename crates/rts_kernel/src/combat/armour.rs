//! Armour: hit points, weapons and the attack target of an entity.
//!
//! Target acquisition and attacks need to look at other elements, so they
//! are implemented on [`Scenario`] and take the attacker's ID.

use crate::combat::damage::DamageSource;
use crate::combat::missile::Missile;
use crate::combat::weapon::{TargetInfo, Weapon, WeaponKind};
use crate::element::{ElementId, ElementKind, PlayerIndex, ScenarioElement};
use crate::math::{Fixed, Vec2Fixed};
use crate::metadata::{EntityType, UnitSize};
use crate::scenario::Scenario;
use crate::storage::{Field, StateVisitor, Stored};

/// Whether two owners are enemies. Neutral elements are nobody's enemy.
#[must_use]
pub fn is_hostile(a: Option<PlayerIndex>, b: Option<PlayerIndex>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a != b)
}

/// Hit points, armor and weapons of an entity.
#[derive(Debug, Clone)]
pub struct Armour {
    max_hp: Fixed,
    base_armor: u32,
    size: UnitSize,
    armor_upgrade: Option<String>,
    hp: Field<Fixed>,
    weapons: Vec<Weapon>,
    target: Field<Option<ElementId>>,
    target_vector: Field<Vec2Fixed>,
    last_enemy_damage_frame: Field<Option<u64>>,
}

impl Armour {
    /// Create full-health armour for an entity type.
    #[must_use]
    pub fn new(entity_type: &EntityType, weapons: Vec<Weapon>) -> Self {
        let max_hp = Fixed::from_num(entity_type.max_hp);
        Self {
            max_hp,
            base_armor: entity_type.armor,
            size: entity_type.size,
            armor_upgrade: entity_type.armor_upgrade.clone(),
            hp: Field::with_value("hp", max_hp),
            weapons,
            target: Field::new("target"),
            target_vector: Field::new("target_vector"),
            last_enemy_damage_frame: Field::new("last_enemy_damage_frame"),
        }
    }

    /// Current hit points.
    #[must_use]
    pub fn hp(&self) -> Fixed {
        self.hp.get()
    }

    /// Maximum hit points.
    #[must_use]
    pub fn max_hp(&self) -> Fixed {
        self.max_hp
    }

    /// Whether hit points reached zero.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.hp.get() <= Fixed::ZERO
    }

    /// Size class.
    #[must_use]
    pub fn size(&self) -> UnitSize {
        self.size
    }

    /// Armor before upgrades.
    #[must_use]
    pub fn base_armor(&self) -> u32 {
        self.base_armor
    }

    /// Upgrade that adds to armor.
    #[must_use]
    pub fn armor_upgrade(&self) -> Option<&str> {
        self.armor_upgrade.as_deref()
    }

    /// Mounted weapons.
    #[must_use]
    pub fn weapons(&self) -> &[Weapon] {
        &self.weapons
    }

    /// Whether any weapon is mounted.
    #[must_use]
    pub fn has_weapons(&self) -> bool {
        !self.weapons.is_empty()
    }

    /// Whether some weapon can attack the target.
    #[must_use]
    pub fn can_attack(&self, target: &TargetInfo) -> bool {
        self.weapons.iter().any(|w| w.can_target_entity(target))
    }

    /// Current attack target.
    #[must_use]
    pub fn target(&self) -> Option<ElementId> {
        self.target.get()
    }

    /// Vector from the entity to its target when last checked.
    #[must_use]
    pub fn target_vector(&self) -> Vec2Fixed {
        self.target_vector.get()
    }

    /// Frame on which an enemy last dealt damage.
    #[must_use]
    pub fn last_enemy_damage_frame(&self) -> Option<u64> {
        self.last_enemy_damage_frame.get()
    }

    /// Set hit points, clamped to `0..=max_hp`.
    pub fn set_hp(&mut self, hp: Fixed) {
        self.hp.write(hp.clamp(Fixed::ZERO, self.max_hp));
    }

    /// Subtract damage, returning the hit points actually lost.
    ///
    /// Damage from another player's element records the frame for
    /// regeneration and AI logic.
    pub fn apply_damage(
        &mut self,
        amount: Fixed,
        attacker_owner: Option<PlayerIndex>,
        own_owner: Option<PlayerIndex>,
        frame: u64,
    ) -> Fixed {
        let before = self.hp.get();
        self.set_hp(before - amount.max(Fixed::ZERO));
        if attacker_owner != own_owner {
            self.last_enemy_damage_frame.write(Some(frame));
        }
        before - self.hp.get()
    }

    pub(crate) fn weapons_mut(&mut self) -> &mut [Weapon] {
        &mut self.weapons
    }

    pub(crate) fn lock_target(&mut self, target: ElementId, vector: Vec2Fixed) {
        self.target.write(Some(target));
        self.target_vector.write(vector);
    }

    pub(crate) fn set_target_vector(&mut self, vector: Vec2Fixed) {
        self.target_vector.write(vector);
    }

    pub(crate) fn clear_target(&mut self) {
        if self.target.get().is_some() {
            self.target.write(None);
            self.target_vector.write(Vec2Fixed::ZERO);
        }
    }
}

impl Stored for Armour {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        self.hp.accept(visitor);
        self.target.accept(visitor);
        self.target_vector.accept(visitor);
        self.last_enemy_damage_frame.accept(visitor);
        for (index, weapon) in self.weapons.iter().enumerate() {
            weapon.visit_scoped(&format!("weapon{index}"), visitor);
        }
    }
}

impl Scenario {
    /// Targeting view of a live, map-attached entity, with its position.
    #[must_use]
    pub fn target_info(&self, id: ElementId) -> Option<(TargetInfo, Vec2Fixed)> {
        let element = self.element(id)?;
        let entity = element.as_entity()?;
        if !element.is_attached() || entity.armour().is_dead() {
            return None;
        }
        let position = entity.position()?;
        let info = TargetInfo {
            id,
            owner: element.owner(),
            flying: entity.body().is_flying(),
            size: entity.armour().size(),
        };
        Some((info, position))
    }

    /// Hostile entity in sight that one of the entity's weapons can attack.
    ///
    /// Enemies some weapon can already reach come first, then the nearest.
    /// Candidates are scanned in ID order; on equal rank the first found wins.
    #[must_use]
    pub fn select_enemy(&self, id: ElementId) -> Option<ElementId> {
        let element = self.element(id)?;
        let entity = element.as_entity()?;
        let owner = element.owner();
        let position = entity.position()?;
        if !entity.armour().has_weapons() {
            return None;
        }

        let mut best: Option<((bool, Fixed), ElementId)> = None;
        for candidate in entity.locator().search(&self.spatial, position) {
            if candidate == id {
                continue;
            }
            let Some((info, candidate_position)) = self.target_info(candidate) else {
                continue;
            };
            if !is_hostile(owner, info.owner) || !entity.armour().can_attack(&info) {
                continue;
            }
            let distance = position.distance(candidate_position);
            let reachable = entity
                .armour()
                .weapons()
                .iter()
                .any(|w| w.can_target_entity(&info) && w.is_in_range(distance));
            let rank = (!reachable, distance);
            if best.map_or(true, |(top, _)| rank < top) {
                best = Some((rank, candidate));
            }
        }
        best.map(|(_, candidate)| candidate)
    }

    /// Lock onto a target if some weapon can reach it; otherwise clear the target.
    pub fn start_attack(&mut self, id: ElementId, target: ElementId) -> bool {
        let resolved = self.target_info(target);
        let Some(entity) = self.entity_mut(id) else {
            return false;
        };
        let (Some((info, target_position)), Some(position)) = (resolved, entity.position()) else {
            entity.armour_mut().clear_target();
            return false;
        };
        let distance = position.distance(target_position);
        let in_range = entity
            .armour()
            .weapons()
            .iter()
            .any(|w| w.can_target_entity(&info) && w.is_in_range(distance));
        if in_range {
            entity
                .armour_mut()
                .lock_target(target, target_position - position);
            tracing::trace!(attacker = %id, target = %target, "attack started");
        } else {
            entity.armour_mut().clear_target();
        }
        in_range
    }

    /// Fire every weapon that can reach the current target.
    ///
    /// Clears the target, returning `false`, once it left the map or no weapon
    /// can reach it any more.
    pub fn continue_attack(&mut self, id: ElementId) -> bool {
        let Some(element) = self.element(id) else {
            return false;
        };
        let owner = element.owner();
        let Some(entity) = element.as_entity() else {
            return false;
        };
        let Some(target) = entity.armour().target() else {
            return false;
        };
        let resolved = self.target_info(target);
        let position = entity.position();
        let (Some((info, target_position)), Some(position)) = (resolved, position) else {
            if let Some(entity) = self.entity_mut(id) {
                entity.armour_mut().clear_target();
            }
            return false;
        };

        let bonuses: Vec<u32> = entity
            .armour()
            .weapons()
            .iter()
            .map(|w| self.upgrade_bonus(owner, w.weapon_type().damage_upgrade.as_deref()))
            .collect();
        let launch_level = self.path_finder.ground_level(position);
        let frame = self.frame();
        let max_lifetime = self.config.missile_max_lifetime;
        let distance = position.distance(target_position);

        let Some(entity) = self.entity_mut(id) else {
            return false;
        };
        entity
            .armour_mut()
            .set_target_vector(target_position - position);

        let mut reachable = false;
        let mut missiles = Vec::new();
        for (weapon, bonus) in entity.armour_mut().weapons_mut().iter_mut().zip(bonuses) {
            let launch = weapon.launch_missiles(frame, &info, distance);
            reachable |= launch.reachable;
            for _ in 0..launch.missiles {
                let source = DamageSource {
                    attacker: id,
                    attacker_owner: owner,
                    raw_damage: weapon.raw_damage(bonus),
                    damage_type: weapon.weapon_type().damage_type,
                    launch_level,
                    custom: match weapon.kind() {
                        WeaponKind::Standard => None,
                        WeaponKind::Custom(logic) => Some(logic.clone()),
                    },
                };
                let missile = Missile::new(
                    weapon.missile_type().clone(),
                    id,
                    target,
                    source,
                    max_lifetime,
                );
                missiles.push(missile);
            }
        }
        if !reachable {
            entity.armour_mut().clear_target();
        }

        for missile in missiles {
            let name = missile.missile_type().name.clone();
            let element = ScenarioElement::new(name, ElementKind::Missile(Box::new(missile)))
                .with_owner(owner);
            self.add_element_next_frame(element, Some(position));
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armour(max_hp: u32) -> Armour {
        let entity_type = EntityType {
            name: "Target".into(),
            max_hp,
            armor: 2,
            ..EntityType::default()
        };
        Armour::new(&entity_type, Vec::new())
    }

    #[test]
    fn test_select_enemy_prefers_targets_in_range() {
        use std::sync::Arc;

        use crate::config::KernelConfig;
        use crate::context::KernelContext;
        use crate::metadata::{EntityClass, Metadata, WeaponType};
        use crate::pathfinding::GridPathFinder;
        use crate::scenario::MapInfo;

        let mut metadata = Metadata::builtin();
        metadata.insert_weapon_type(WeaponType {
            name: "Shell".into(),
            damage: 30,
            cooldown: 60,
            min_range: Fixed::from_num(8),
            max_range: Fixed::from_num(30),
            targets_ground: true,
            missile: "GaussBullet".into(),
            ..WeaponType::default()
        });
        metadata.insert_entity_type(EntityType {
            name: "Howitzer".into(),
            class: EntityClass::Unit,
            max_hp: 150,
            speed: Fixed::from_num(0.25),
            sight_range: 10,
            weapons: vec!["Shell".into()],
            ..EntityType::default()
        });
        let map = MapInfo::new("range", 32, 32);
        let (width, height) = map.cell_size();
        let context = KernelContext::new(Arc::new(metadata), Box::new(GridPathFinder::new(width, height)));
        let mut scenario = Scenario::new(map, KernelConfig::default(), context);

        let p0 = PlayerIndex::new(0);
        let p1 = PlayerIndex::new(1);
        let howitzer = scenario.spawn("Howitzer", p0, Vec2Fixed::from_ints(40, 40)).unwrap();
        let close = scenario.spawn("Marine", p1, Vec2Fixed::from_ints(44, 40)).unwrap();
        assert_eq!(scenario.select_enemy(howitzer), Some(close));

        let reachable = scenario.spawn("Marine", p1, Vec2Fixed::from_ints(55, 40)).unwrap();
        let farther = scenario.spawn("Marine", p1, Vec2Fixed::from_ints(40, 60)).unwrap();
        assert_ne!(reachable, farther);
        assert_eq!(scenario.select_enemy(howitzer), Some(reachable));
    }

    #[test]
    fn test_hostility() {
        let p0 = PlayerIndex::new(0);
        let p1 = PlayerIndex::new(1);
        assert!(is_hostile(p0, p1));
        assert!(!is_hostile(p0, p0));
        assert!(!is_hostile(p0, None));
        assert!(!is_hostile(None, None));
    }

    #[test]
    fn test_hp_clamped_at_zero() {
        let mut armour = armour(10);
        let dealt = armour.apply_damage(Fixed::from_num(25), PlayerIndex::new(1), PlayerIndex::new(0), 7);
        assert_eq!(dealt, Fixed::from_num(10));
        assert_eq!(armour.hp(), Fixed::ZERO);
        assert!(armour.is_dead());
    }

    #[test]
    fn test_set_hp_clamped_at_max() {
        let mut armour = armour(10);
        armour.set_hp(Fixed::from_num(50));
        assert_eq!(armour.hp(), armour.max_hp());
    }

    #[test]
    fn test_enemy_damage_timestamped() {
        let mut armour = armour(100);
        armour.apply_damage(Fixed::ONE, PlayerIndex::new(0), PlayerIndex::new(0), 5);
        assert_eq!(armour.last_enemy_damage_frame(), None);
        armour.apply_damage(Fixed::ONE, PlayerIndex::new(1), PlayerIndex::new(0), 6);
        assert_eq!(armour.last_enemy_damage_frame(), Some(6));
    }
}
