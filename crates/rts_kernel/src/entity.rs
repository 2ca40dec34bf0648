//! Entities: units, buildings and addons.

use std::sync::Arc;

use crate::combat::Armour;
use crate::economy::ProductionLine;
use crate::element::ElementId;
use crate::math::{Fixed, RectFixed, Vec2Fixed};
use crate::metadata::EntityType;
use crate::motion::MotionControl;
use crate::pathfinding::{Layer, PathFinder};
use crate::spatial::SpatialIndex;
use crate::storage::{Field, StateVisitor, Stored};

/// Physical state of an entity on the map.
///
/// `position` is the center of the footprint and is `None` while detached.
#[derive(Debug, Clone)]
pub struct Body {
    size: Vec2Fixed,
    position: Field<Option<Vec2Fixed>>,
    velocity: Field<Vec2Fixed>,
    flying: Field<bool>,
    shadow_offset: Field<Fixed>,
}

impl Body {
    /// Create a detached body with the given footprint size.
    #[must_use]
    pub fn new(size: Vec2Fixed, flying: bool) -> Self {
        Self {
            size,
            position: Field::new("position"),
            velocity: Field::new("velocity"),
            flying: Field::with_value("flying", flying),
            shadow_offset: Field::new("shadow_offset"),
        }
    }

    /// Footprint size in cells.
    #[must_use]
    pub fn size(&self) -> Vec2Fixed {
        self.size
    }

    /// Center position while on the map.
    #[must_use]
    pub fn position(&self) -> Option<Vec2Fixed> {
        self.position.get()
    }

    /// Velocity in cells per frame.
    #[must_use]
    pub fn velocity(&self) -> Vec2Fixed {
        self.velocity.get()
    }

    /// Whether the entity is airborne.
    #[must_use]
    pub fn is_flying(&self) -> bool {
        self.flying.get()
    }

    /// Vertical offset of the visual shadow.
    #[must_use]
    pub fn shadow_offset(&self) -> Fixed {
        self.shadow_offset.get()
    }

    /// Footprint rectangle at the current position.
    #[must_use]
    pub fn area(&self) -> Option<RectFixed> {
        self.position().map(|p| RectFixed::centered(p, self.size))
    }

    pub(crate) fn set_position(&mut self, position: Option<Vec2Fixed>) -> Option<Vec2Fixed> {
        self.position.write(position)
    }

    /// Whether the position was written since the last call, clearing the flag.
    pub(crate) fn take_moved(&mut self) -> bool {
        self.position.take_changed()
    }

    pub(crate) fn set_velocity(&mut self, velocity: Vec2Fixed) {
        if self.velocity.get() != velocity {
            self.velocity.write(velocity);
        }
    }

    pub(crate) fn set_flying(&mut self, flying: bool) {
        if self.flying.get() != flying {
            self.flying.write(flying);
        }
    }

    pub(crate) fn set_shadow_offset(&mut self, offset: Fixed) {
        self.shadow_offset.write(offset);
    }
}

impl Stored for Body {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        self.position.accept(visitor);
        self.velocity.accept(visitor);
        self.flying.accept(visitor);
        self.shadow_offset.accept(visitor);
    }
}

/// Finds elements within sight range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    sight_range: u32,
}

impl Locator {
    /// Create a locator with a sight range in quad tiles.
    #[must_use]
    pub const fn new(sight_range: u32) -> Self {
        Self { sight_range }
    }

    /// Sight range in quad tiles.
    #[must_use]
    pub const fn sight_range(&self) -> u32 {
        self.sight_range
    }

    /// Elements whose map objects lie within sight of `position`, in ID order.
    #[must_use]
    pub fn search(&self, index: &SpatialIndex, position: Vec2Fixed) -> Vec<ElementId> {
        index.query_radius(position, self.sight_range)
    }
}

/// A unit, building or addon.
#[derive(Debug, Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    body: Body,
    motion: Option<MotionControl>,
    armour: Armour,
    locator: Locator,
    production: Option<ProductionLine>,
    under_construction: Field<bool>,
    addon: Field<Option<ElementId>>,
}

impl Entity {
    /// Assemble an entity from its parts.
    #[must_use]
    pub fn new(
        entity_type: Arc<EntityType>,
        armour: Armour,
        motion: Option<MotionControl>,
        production: Option<ProductionLine>,
    ) -> Self {
        let body = Body::new(entity_type.footprint.size(), entity_type.flying);
        let locator = Locator::new(entity_type.sight_range);
        Self {
            entity_type,
            body,
            motion,
            armour,
            locator,
            production,
            under_construction: Field::new("under_construction"),
            addon: Field::new("addon"),
        }
    }

    /// Mark the entity as still being built.
    #[must_use]
    pub fn under_construction(mut self, under_construction: bool) -> Self {
        self.under_construction.write(under_construction);
        self
    }

    /// Type descriptor.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Physical state.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Center position while on the map.
    #[must_use]
    pub fn position(&self) -> Option<Vec2Fixed> {
        self.body.position()
    }

    /// Motion control, for mobile and liftable entities.
    #[must_use]
    pub fn motion(&self) -> Option<&MotionControl> {
        self.motion.as_ref()
    }

    /// Hit points, weapons and attack target.
    #[must_use]
    pub fn armour(&self) -> &Armour {
        &self.armour
    }

    /// Mutable armour.
    pub fn armour_mut(&mut self) -> &mut Armour {
        &mut self.armour
    }

    /// Sight range helper.
    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Production line, for producers.
    #[must_use]
    pub fn production(&self) -> Option<&ProductionLine> {
        self.production.as_ref()
    }

    /// Whether the entity is still being built.
    #[must_use]
    pub fn is_under_construction(&self) -> bool {
        self.under_construction.get()
    }

    /// Addon attached to this building.
    #[must_use]
    pub fn addon(&self) -> Option<ElementId> {
        self.addon.get()
    }

    /// Whether the entity can currently act: alive and finished.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !self.armour.is_dead() && !self.is_under_construction()
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Body, Option<&mut MotionControl>) {
        (&mut self.body, self.motion.as_mut())
    }

    pub(crate) fn production_mut(&mut self) -> Option<&mut ProductionLine> {
        self.production.as_mut()
    }

    pub(crate) fn finish_construction(&mut self) {
        self.under_construction.write(false);
    }

    pub(crate) fn set_addon(&mut self, addon: Option<ElementId>) {
        self.addon.write(addon);
    }

    /// Reserve the footprint and place the entity at `position`.
    pub(crate) fn attach(
        &mut self,
        owner: ElementId,
        position: Vec2Fixed,
        path_finder: &mut dyn PathFinder,
    ) -> bool {
        if let Some(motion) = self.motion.as_mut() {
            return motion.on_attach(&mut self.body, owner, position, path_finder);
        }
        let layer = if self.body.is_flying() {
            Layer::Air
        } else {
            Layer::Ground
        };
        let area = RectFixed::centered(position, self.body.size());
        if !path_finder.reserve(layer, owner, &area) {
            return false;
        }
        self.body.set_position(Some(position));
        true
    }

    /// Release reservations and clear the position, returning the last one.
    pub(crate) fn detach(
        &mut self,
        owner: ElementId,
        path_finder: &mut dyn PathFinder,
    ) -> Option<Vec2Fixed> {
        if let Some(motion) = self.motion.as_mut() {
            return motion.on_detach(&mut self.body, owner, path_finder);
        }
        path_finder.release(Layer::Ground, owner);
        path_finder.release(Layer::Air, owner);
        self.body.set_velocity(Vec2Fixed::ZERO);
        self.body.set_position(None)
    }
}

impl Stored for Entity {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        self.body.visit_scoped("body", visitor);
        if let Some(motion) = &self.motion {
            motion.visit_scoped("motion", visitor);
        }
        self.armour.visit_scoped("armour", visitor);
        if let Some(line) = &self.production {
            line.visit_scoped("production", visitor);
        }
        self.under_construction.accept(visitor);
        self.addon.accept(visitor);
    }
}
