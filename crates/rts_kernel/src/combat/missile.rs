//! Missiles: launched projectiles and their impact.
//!
//! ```text
//! Launching --delay elapsed--> Launched --reached target--> Impacted --visual done--> destroyed
//!     |                                                                  ^
//!     +-- source or target left the map, or source re-targeted -------> destroyed
//! ```
//!
//! A missile older than the configured maximum lifetime is destroyed in any
//! state.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::combat::damage::{final_damage, DamageSource};
use crate::combat::weapon::ImpactInfo;
use crate::element::ElementId;
use crate::math::{Fixed, RectFixed, Vec2Fixed};
use crate::metadata::MissileType;
use crate::scenario::{Impact, Scenario};
use crate::storage::{Field, StateVisitor, Stored};

/// Admissible flight directions, scaled by [`DIRECTION_SCALE`].
const DIRECTIONS: [(i32, i32); 16] = [
    (256, 0),
    (237, 98),
    (181, 181),
    (98, 237),
    (0, 256),
    (-98, 237),
    (-181, 181),
    (-237, 98),
    (-256, 0),
    (-237, -98),
    (-181, -181),
    (-98, -237),
    (0, -256),
    (98, -237),
    (181, -181),
    (237, -98),
];

const DIRECTION_SCALE: i32 = 256;

/// Lifecycle state of a missile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissileState {
    /// Waiting for the launch delay.
    Launching,
    /// In flight.
    Launched,
    /// Hit; playing the impact visual.
    Impacted,
}

/// A projectile fired by a weapon.
#[derive(Debug, Clone)]
pub struct Missile {
    missile_type: Arc<MissileType>,
    source: ElementId,
    target: ElementId,
    damage: DamageSource,
    max_lifetime: u32,
    state: Field<MissileState>,
    delay: Field<u32>,
    position: Field<Vec2Fixed>,
    velocity: Field<Vec2Fixed>,
    target_position: Field<Vec2Fixed>,
    impact_frames: Field<u32>,
    age: Field<u32>,
}

impl Missile {
    /// Create a missile waiting to launch.
    #[must_use]
    pub fn new(
        missile_type: Arc<MissileType>,
        source: ElementId,
        target: ElementId,
        damage: DamageSource,
        max_lifetime: u32,
    ) -> Self {
        let delay = missile_type.launch_delay;
        Self {
            missile_type,
            source,
            target,
            damage,
            max_lifetime,
            state: Field::with_value("state", MissileState::Launching),
            delay: Field::with_value("delay", delay),
            position: Field::new("position"),
            velocity: Field::new("velocity"),
            target_position: Field::new("target_position"),
            impact_frames: Field::new("impact_frames"),
            age: Field::new("age"),
        }
    }

    /// Missile descriptor.
    #[must_use]
    pub fn missile_type(&self) -> &Arc<MissileType> {
        &self.missile_type
    }

    /// Launching entity.
    #[must_use]
    pub fn source(&self) -> ElementId {
        self.source
    }

    /// Targeted entity.
    #[must_use]
    pub fn target(&self) -> ElementId {
        self.target
    }

    /// Attack parameters captured at launch.
    #[must_use]
    pub fn damage(&self) -> &DamageSource {
        &self.damage
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> MissileState {
        self.state.get()
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec2Fixed {
        self.position.get()
    }

    /// Velocity of the last flight step.
    #[must_use]
    pub fn velocity(&self) -> Vec2Fixed {
        self.velocity.get()
    }

    /// Last known target position.
    #[must_use]
    pub fn target_position(&self) -> Vec2Fixed {
        self.target_position.get()
    }

    /// Frames since admission.
    #[must_use]
    pub fn age(&self) -> u32 {
        self.age.get()
    }

    /// Footprint of the missile's map object.
    #[must_use]
    pub fn area(&self) -> RectFixed {
        RectFixed::centered(self.position.get(), Vec2Fixed::from_ints(1, 1))
    }

    pub(crate) fn place(&mut self, position: Vec2Fixed) {
        self.position.write(position);
    }

    /// Count one more frame of life; returns whether the lifetime is exhausted.
    pub fn grow_older(&mut self) -> bool {
        let age = self.age.get() + 1;
        self.age.write(age);
        age >= self.max_lifetime
    }

    /// Count down the launch delay; returns whether it has elapsed.
    pub fn count_down_launch(&mut self) -> bool {
        let delay = self.delay.get();
        if delay > 0 {
            self.delay.write(delay - 1);
        }
        self.delay.get() == 0
    }

    /// Record the launch position and aim, entering `Launched`.
    pub fn launch(&mut self, from: Vec2Fixed, target_position: Vec2Fixed) {
        self.position.write(from);
        self.target_position.write(target_position);
        self.velocity.write(self.choose_velocity(from, target_position));
        self.state.write(MissileState::Launched);
    }

    /// Move one frame towards the target; returns `true` on reaching it.
    ///
    /// `target_position` is the target's current position, or `None` if it is
    /// gone, in which case the missile flies to the last known position.
    pub fn fly(&mut self, target_position: Option<Vec2Fixed>) -> bool {
        if let Some(position) = target_position {
            self.target_position.write(position);
        }
        let target = self.target_position.get();
        let position = self.position.get();
        let speed = self.missile_type.speed;

        if speed <= Fixed::ZERO || position.distance(target) <= speed {
            self.velocity.write(target - position);
            self.position.write(target);
            return true;
        }

        let velocity = self.choose_velocity(position, target);
        self.velocity.write(velocity);
        self.position.write(position + velocity);
        false
    }

    /// Enter `Impacted` and start the impact visual.
    pub fn begin_impact(&mut self) {
        self.state.write(MissileState::Impacted);
        self.impact_frames.write(self.missile_type.impact_duration);
        self.velocity.write(Vec2Fixed::ZERO);
    }

    /// Count down the impact visual; returns whether it has finished.
    pub fn count_down_impact(&mut self) -> bool {
        let frames = self.impact_frames.get();
        if frames > 0 {
            self.impact_frames.write(frames - 1);
        }
        self.impact_frames.get() == 0
    }

    /// The admissible velocity bringing the missile closest to `target`.
    fn choose_velocity(&self, position: Vec2Fixed, target: Vec2Fixed) -> Vec2Fixed {
        let speed = self.missile_type.speed;
        let scale = Fixed::from_num(DIRECTION_SCALE);
        let mut best: Option<(Fixed, Vec2Fixed)> = None;
        for &(dx, dy) in &DIRECTIONS {
            let velocity = Vec2Fixed::new(
                Fixed::from_num(dx) * speed / scale,
                Fixed::from_num(dy) * speed / scale,
            );
            let error = (position + velocity).distance_squared(target);
            if best.map_or(true, |(lowest, _)| error < lowest) {
                best = Some((error, velocity));
            }
        }
        best.map_or(Vec2Fixed::ZERO, |(_, velocity)| velocity)
    }
}

impl Stored for Missile {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("source", &self.source);
        visitor.visit("target", &self.target);
        visitor.visit("damage", &self.damage);
        self.state.accept(visitor);
        self.delay.accept(visitor);
        self.position.accept(visitor);
        self.velocity.accept(visitor);
        self.target_position.accept(visitor);
        self.impact_frames.accept(visitor);
        self.age.accept(visitor);
    }
}

impl Scenario {
    /// Advance one missile by one frame.
    pub(crate) fn update_missile(&mut self, id: ElementId) {
        let Some(missile) = self.element(id).and_then(|e| e.as_missile()) else {
            return;
        };
        let (source, target, state) = (missile.source(), missile.target(), missile.state());

        if self.missile_mut(id).is_some_and(Missile::grow_older) {
            tracing::trace!(missile = %id, "missile reached its maximum lifetime");
            self.remove_element_next_frame(id);
            return;
        }

        match state {
            MissileState::Launching => {
                let source_position = self.entity(source).and_then(|attacker| {
                    let locked = attacker.armour().target() == Some(target);
                    locked.then(|| attacker.position()).flatten()
                });
                let target_position = self.target_info(target).map(|(_, position)| position);
                let (Some(from), Some(to)) = (source_position, target_position) else {
                    tracing::trace!(missile = %id, "missile launch cancelled");
                    self.remove_element_next_frame(id);
                    return;
                };
                let Some(missile) = self.missile_mut(id) else {
                    return;
                };
                if !missile.count_down_launch() {
                    return;
                }
                missile.launch(from, to);
                self.fly_missile(id);
            }
            MissileState::Launched => self.fly_missile(id),
            MissileState::Impacted => {
                if self.missile_mut(id).is_some_and(Missile::count_down_impact) {
                    self.remove_element_next_frame(id);
                }
            }
        }
    }

    fn fly_missile(&mut self, id: ElementId) {
        let Some(target) = self.element(id).and_then(|e| e.as_missile()).map(Missile::target) else {
            return;
        };
        let target_position = self.target_info(target).map(|(_, position)| position);
        let Some(missile) = self.missile_mut(id) else {
            return;
        };
        let impacted = missile.fly(target_position);
        let area = missile.area();
        if impacted {
            missile.begin_impact();
        }
        let finished = impacted && missile.count_down_impact();
        self.move_map_objects(id, area);

        if impacted {
            self.resolve_impact(id);
            if finished {
                self.remove_element_next_frame(id);
            }
        }
    }

    /// Apply a missile's damage to its target, if the target is still there.
    fn resolve_impact(&mut self, id: ElementId) {
        let Some(missile) = self.element(id).and_then(|e| e.as_missile()) else {
            return;
        };
        let source = missile.damage().clone();
        let target = missile.target();
        let Some((info, target_position)) = self.target_info(target) else {
            return;
        };
        let Some(armour) = self.entity(target).map(|e| e.armour()) else {
            return;
        };
        let armor_bonus = self.upgrade_bonus(info.owner, armour.armor_upgrade());
        let armor = Fixed::from_num(armour.base_armor() + armor_bonus);

        let damage = match &source.custom {
            Some(logic) => logic.impact_damage(&ImpactInfo {
                target,
                raw_damage: source.raw_damage,
                armor,
                damage_type: source.damage_type,
                target_size: info.size,
            }),
            None => {
                let uphill = !info.flying
                    && self.path_finder.ground_level(target_position) > source.launch_level;
                let hit = !uphill
                    || self.rng.gen_range(0..100) < self.config.low_to_high_hit_percent;
                if hit {
                    final_damage(source.raw_damage, armor, source.damage_type, info.size)
                } else {
                    tracing::trace!(missile = %id, "missile missed uphill target");
                    Fixed::ZERO
                }
            }
        };

        let frame = self.frame();
        let Some(entity) = self.entity_mut(target) else {
            return;
        };
        let dealt = entity
            .armour_mut()
            .apply_damage(damage, source.attacker_owner, info.owner, frame);
        tracing::debug!(missile = %id, target = %target, damage = %dealt, "missile impact");
        self.events.impacts.push(Impact {
            missile: id,
            attacker: source.attacker,
            target,
            damage: dealt,
        });
    }

    fn missile_mut(&mut self, id: ElementId) -> Option<&mut Missile> {
        match self.element_mut(id)?.kind_mut() {
            crate::element::ElementKind::Missile(missile) => Some(&mut **missile),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DamageType;

    fn missile(speed: i32, delay: u32, impact: u32, lifetime: u32) -> Missile {
        let missile_type = Arc::new(MissileType {
            name: "Shell".into(),
            speed: Fixed::from_num(speed),
            launch_delay: delay,
            impact_duration: impact,
        });
        let source = DamageSource {
            attacker: ElementId::new(1),
            attacker_owner: None,
            raw_damage: Fixed::from_num(10),
            damage_type: DamageType::Normal,
            launch_level: 0,
            custom: None,
        };
        Missile::new(missile_type, ElementId::new(1), ElementId::new(2), source, lifetime)
    }

    #[test]
    fn test_launch_delay_counts_down() {
        let mut missile = missile(2, 2, 1, 250);
        assert!(!missile.count_down_launch());
        assert!(missile.count_down_launch());
        assert!(missile.count_down_launch());
    }

    #[test]
    fn test_instant_missile_hits_on_first_flight() {
        let mut missile = missile(0, 0, 1, 250);
        missile.launch(Vec2Fixed::ZERO, Vec2Fixed::from_ints(30, 0));
        assert!(missile.fly(None));
        assert_eq!(missile.position(), Vec2Fixed::from_ints(30, 0));
    }

    #[test]
    fn test_flight_converges_on_target() {
        let mut missile = missile(2, 0, 1, 250);
        let target = Vec2Fixed::from_ints(10, 3);
        missile.launch(Vec2Fixed::ZERO, target);
        let mut frames = 0;
        while !missile.fly(Some(target)) {
            frames += 1;
            assert!(frames < 20, "missile never arrived");
        }
        assert_eq!(missile.position(), target);
        assert!(frames >= 4);
    }

    #[test]
    fn test_axis_aligned_flight_is_exact() {
        let mut missile = missile(2, 0, 1, 250);
        missile.launch(Vec2Fixed::ZERO, Vec2Fixed::from_ints(10, 0));
        assert!(!missile.fly(None));
        assert_eq!(missile.position(), Vec2Fixed::from_ints(2, 0));
        assert_eq!(missile.velocity(), Vec2Fixed::from_ints(2, 0));
    }

    #[test]
    fn test_impact_visual_countdown() {
        let mut missile = missile(0, 0, 3, 250);
        missile.begin_impact();
        assert_eq!(missile.state(), MissileState::Impacted);
        assert!(!missile.count_down_impact());
        assert!(!missile.count_down_impact());
        assert!(missile.count_down_impact());
    }

    #[test]
    fn test_lifetime_ceiling() {
        let mut missile = missile(1, 0, 1, 3);
        assert!(!missile.grow_older());
        assert!(!missile.grow_older());
        assert!(missile.grow_older());
    }
}
