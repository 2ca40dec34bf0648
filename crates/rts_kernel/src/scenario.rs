//! The scenario: root container of a simulation and its frame loop.
//!
//! [`Scenario::update`] advances one frame in a fixed order:
//!
//! 1. continue every active command execution (over a snapshot of the set),
//! 2. update every registered element not scheduled for removal, in ID order,
//! 3. increment the frame counter,
//! 4. apply scheduled removals, then scheduled additions.
//!
//! Elements created or destroyed while step 2 runs are only scheduled; the
//! element set never changes during iteration.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::command::{Command, CommandExecution, ExecutionStatus};
use crate::config::KernelConfig;
use crate::context::{ElementFactory, KernelContext, SpawnContext};
use crate::economy::{
    JobOutcome, Player, Product, ProductionJob, ProductionLine, SupplyContribution,
};
use crate::element::{
    ElementId, ElementKind, PlayerIndex, ResourceNode, ScenarioElement, Upgrade, MAX_PLAYERS,
    MINERAL_FIELD_QUADS, START_LOCATION_QUADS, VESPENE_GEYSER_QUADS,
};
use crate::entity::{Body, Entity};
use crate::math::{Fixed, QuadPos, RectFixed, Vec2Fixed, QUAD_TILE_CELLS};
use crate::metadata::Metadata;
use crate::motion::{MotionControl, MotionState};
use crate::pathfinding::{Layer, PathFinder};
use crate::spatial::SpatialIndex;
use crate::storage::{StateHasher, StateSnapshot, StateVisitor, Stored};

new_key_type! {
    struct ElementKey;
}

/// How many rings of candidate positions are tried around a producer.
const SPAWN_RINGS: i32 = 4;

/// Dimensions of the map in quad tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapInfo {
    /// Display name.
    pub name: String,
    /// Width in quad tiles.
    pub width: u32,
    /// Height in quad tiles.
    pub height: u32,
}

impl MapInfo {
    /// Describe a map.
    #[must_use]
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Map area in cells.
    #[must_use]
    pub fn bounds(&self) -> RectFixed {
        QuadPos::new(0, 0).area(self.width, self.height)
    }

    /// Map size in cells.
    #[must_use]
    pub fn cell_size(&self) -> (u32, u32) {
        let cells = QUAD_TILE_CELLS.unsigned_abs();
        (self.width * cells, self.height * cells)
    }
}

/// A missile hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    /// The missile.
    pub missile: ElementId,
    /// Entity that launched it.
    pub attacker: ElementId,
    /// Entity hit.
    pub target: ElementId,
    /// Hit points actually removed.
    pub damage: Fixed,
}

/// A finished production job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Producer building.
    pub producer: ElementId,
    /// Name of the product.
    pub product: String,
}

/// What happened during one call to [`Scenario::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameEvents {
    /// Frame number that was processed.
    pub frame: u64,
    /// Elements admitted in step 4.
    pub admitted: Vec<ElementId>,
    /// Elements retired in step 4.
    pub retired: Vec<ElementId>,
    /// Missile hits.
    pub impacts: Vec<Impact>,
    /// Finished production jobs.
    pub completed: Vec<Completion>,
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    At(Vec2Fixed),
    Near(RectFixed),
}

#[derive(Debug)]
struct PendingAdd {
    element: ScenarioElement,
    placement: Option<Placement>,
    release_supply: Option<(PlayerIndex, u32)>,
}

/// Root container of a simulation.
#[derive(Debug)]
pub struct Scenario {
    pub(crate) config: KernelConfig,
    metadata: Arc<Metadata>,
    factory: Arc<dyn ElementFactory>,
    pub(crate) path_finder: Box<dyn PathFinder>,
    map: MapInfo,
    next_id: u32,
    frame: u64,
    pub(crate) spatial: SpatialIndex,
    players: [Option<Player>; MAX_PLAYERS],
    elements: SlotMap<ElementKey, ScenarioElement>,
    registry: BTreeMap<ElementId, ElementKey>,
    pending_add: Vec<PendingAdd>,
    pending_remove: BTreeSet<ElementId>,
    executions: BTreeMap<ElementId, Box<dyn CommandExecution>>,
    updating: bool,
    iterating: bool,
    admitting: bool,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) events: FrameEvents,
}

impl Scenario {
    /// Create an empty scenario with no players.
    #[must_use]
    pub fn new(map: MapInfo, config: KernelConfig, context: KernelContext) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            metadata: context.metadata,
            factory: context.factory,
            path_finder: context.path_finder,
            map,
            next_id: 0,
            frame: 0,
            spatial: SpatialIndex::new(),
            players: Default::default(),
            elements: SlotMap::with_key(),
            registry: BTreeMap::new(),
            pending_add: Vec::new(),
            pending_remove: BTreeSet::new(),
            executions: BTreeMap::new(),
            updating: false,
            iterating: false,
            admitting: false,
            rng,
            events: FrameEvents::default(),
        }
    }

    /// Map dimensions.
    #[must_use]
    pub fn map(&self) -> &MapInfo {
        &self.map
    }

    /// Kernel constants.
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Type descriptors.
    #[must_use]
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// Number of completed frames.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Spatial index of map objects.
    #[must_use]
    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Movement validity collaborator.
    #[must_use]
    pub fn path_finder(&self) -> &dyn PathFinder {
        self.path_finder.as_ref()
    }

    /// Whether [`update`](Self::update) is running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updating
    }

    // ---------------------------------------------------------------------
    // Players
    // ---------------------------------------------------------------------

    /// Occupy a player slot with the configured starting resources.
    ///
    /// Returns `false` if the slot is already taken.
    pub fn add_player(&mut self, index: PlayerIndex) -> bool {
        if self.players[index.slot()].is_some() {
            return false;
        }
        let mut player = Player::new(index, &self.config);
        let start = self.registry.iter().find_map(|(id, key)| {
            match self.elements.get(*key).map(ScenarioElement::kind) {
                Some(ElementKind::StartLocation(start)) if start.player() == index => Some(*id),
                _ => None,
            }
        });
        player.set_start_location(start);
        self.players[index.slot()] = Some(player);
        tracing::debug!(player = %index, "player added");
        true
    }

    /// Player in a slot.
    #[must_use]
    pub fn player(&self, index: PlayerIndex) -> Option<&Player> {
        self.players[index.slot()].as_ref()
    }

    /// Mutable player in a slot.
    pub fn player_mut(&mut self, index: PlayerIndex) -> Option<&mut Player> {
        self.players[index.slot()].as_mut()
    }

    /// Occupied player slots in index order.
    pub fn players(&self) -> impl Iterator<Item = &Player> + '_ {
        self.players.iter().flatten()
    }

    /// Upgrade a player researched under `name`.
    #[must_use]
    pub fn upgrade(&self, owner: PlayerIndex, name: &str) -> Option<&Upgrade> {
        let id = self.player(owner)?.upgrade(name)?;
        match self.element(id)?.kind() {
            ElementKind::Upgrade(upgrade) => Some(upgrade),
            _ => None,
        }
    }

    /// Researched level of an upgrade; 0 when never researched.
    #[must_use]
    pub fn upgrade_level(&self, owner: PlayerIndex, name: &str) -> u32 {
        self.upgrade(owner, name).map_or(0, Upgrade::level)
    }

    /// Level an upgrade will reach once every queued research job finishes.
    fn committed_upgrade_level(&self, owner: PlayerIndex, name: &str) -> u32 {
        let pending: u32 = self
            .pending_add
            .iter()
            .filter(|pending| pending.element.owner() == Some(owner) && pending.element.type_name() == name)
            .filter_map(|pending| match pending.element.kind() {
                ElementKind::Upgrade(upgrade) => Some(upgrade.level()),
                _ => None,
            })
            .sum();
        let queued = self.player(owner).map_or(0, |player| {
            player
                .buildings()
                .chain(player.addons())
                .filter_map(|id| self.entity(id)?.production())
                .flat_map(ProductionLine::jobs)
                .filter(|job| matches!(job.product(), Product::Upgrade(upgrade) if upgrade.name == name))
                .count()
        });
        let queued = u32::try_from(queued).unwrap_or(u32::MAX);
        self.upgrade_level(owner, name)
            .saturating_add(pending)
            .saturating_add(queued)
    }

    /// Bonus an upgrade grants its owner; 0 for neutral owners or no upgrade.
    #[must_use]
    pub fn upgrade_bonus(&self, owner: Option<PlayerIndex>, name: Option<&str>) -> u32 {
        let (Some(owner), Some(name)) = (owner, name) else {
            return 0;
        };
        self.upgrade(owner, name).map_or(0, Upgrade::bonus)
    }

    // ---------------------------------------------------------------------
    // Element lookup
    // ---------------------------------------------------------------------

    /// A registered element.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&ScenarioElement> {
        self.elements.get(*self.registry.get(&id)?)
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> Option<&mut ScenarioElement> {
        self.elements.get_mut(*self.registry.get(&id)?)
    }

    /// A registered entity.
    #[must_use]
    pub fn entity(&self, id: ElementId) -> Option<&Entity> {
        self.element(id)?.as_entity()
    }

    /// A registered entity, mutably.
    pub fn entity_mut(&mut self, id: ElementId) -> Option<&mut Entity> {
        self.element_mut(id)?.as_entity_mut()
    }

    /// IDs of registered elements in ascending order.
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.registry.keys().copied()
    }

    /// Registered elements in ID order.
    pub fn elements(&self) -> impl Iterator<Item = &ScenarioElement> + '_ {
        self.registry.values().filter_map(|key| self.elements.get(*key))
    }

    /// Number of registered elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.registry.len()
    }

    /// Elements whose map objects cover a point.
    #[must_use]
    pub fn elements_at(&self, point: Vec2Fixed) -> Vec<ElementId> {
        self.spatial.query_point(point)
    }

    /// Whether an element has an active command execution.
    #[must_use]
    pub fn has_execution(&self, id: ElementId) -> bool {
        self.executions.contains_key(&id)
    }

    // ---------------------------------------------------------------------
    // Element lifecycle
    // ---------------------------------------------------------------------

    /// Build an element through the element factory.
    #[must_use]
    pub fn create_element(
        &self,
        type_name: &str,
        owner: Option<PlayerIndex>,
        under_construction: bool,
    ) -> Option<ScenarioElement> {
        let spawn = SpawnContext {
            owner,
            under_construction,
            config: &self.config,
        };
        self.factory.create_element(type_name, &spawn)
    }

    /// Register an element and assign it the next ID.
    ///
    /// # Panics
    ///
    /// Panics if the element is already registered, if elements are being
    /// iterated, or if another admission or retirement is in progress.
    pub fn admit(&mut self, mut element: ScenarioElement) -> ElementId {
        assert!(
            !element.is_registered(),
            "element {:?} is already registered",
            element.id()
        );
        assert!(!self.iterating, "elements cannot be admitted while the scenario iterates them");
        assert!(!self.admitting, "nested element admission or retirement");
        self.admitting = true;

        let id = ElementId::new(self.next_id);
        self.next_id += 1;
        element.set_id(Some(id));
        enroll(&mut self.players, id, &element);
        tracing::debug!(element = %id, kind = element.type_name(), "element admitted");
        let key = self.elements.insert(element);
        self.registry.insert(id, key);
        self.events.admitted.push(id);

        self.admitting = false;
        id
    }

    /// Unregister a detached element and hand it back without an ID.
    ///
    /// Running production is aborted, refunding the owner. An active command
    /// execution is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the element is unknown, still owns map objects, if elements
    /// are being iterated, or if another admission or retirement is in progress.
    pub fn retire(&mut self, id: ElementId) -> ScenarioElement {
        assert!(!self.iterating, "elements cannot be retired while the scenario iterates them");
        assert!(!self.admitting, "nested element admission or retirement");
        let Some(key) = self.registry.get(&id).copied() else {
            panic!("cannot retire unregistered element {id}");
        };
        assert!(
            !self.elements.get(key).is_some_and(ScenarioElement::is_attached),
            "element {id} still owns map objects and cannot be retired"
        );
        self.admitting = true;

        self.registry.remove(&id);
        let Some(mut element) = self.elements.remove(key) else {
            panic!("element registry lost track of {id}");
        };
        self.executions.remove(&id);
        self.pending_remove.remove(&id);

        let mut doomed_addons = Vec::new();
        if let Some(player) = element.owner().and_then(|o| self.players[o.slot()].as_mut()) {
            player.unregister(id);
            if let Some(line) = element.as_entity_mut().and_then(Entity::production_mut) {
                for outcome in line.abort_all(player) {
                    if let JobOutcome::DestroyAddon(addon) = outcome {
                        doomed_addons.push(addon);
                    }
                }
            }
        }
        if let ElementKind::StartLocation(start) = element.kind() {
            if let Some(player) = self.players[start.player().slot()].as_mut() {
                if player.start_location() == Some(id) {
                    player.set_start_location(None);
                }
            }
        }
        for other in self.elements.values_mut() {
            if let Some(entity) = other.as_entity_mut() {
                if entity.addon() == Some(id) {
                    entity.set_addon(None);
                }
            }
        }
        element.set_id(None);
        tracing::debug!(element = %id, kind = element.type_name(), "element retired");
        self.events.retired.push(id);
        self.admitting = false;

        for addon in doomed_addons {
            self.dispose(addon);
        }
        element
    }

    /// Place an element on the map, creating its map object.
    ///
    /// Returns `false` if the element is unknown, already attached, cannot
    /// be on the map, or the position is not free.
    pub fn attach_to_map(&mut self, id: ElementId, position: Vec2Fixed) -> bool {
        let Some(key) = self.registry.get(&id).copied() else {
            return false;
        };
        let Some(element) = self.elements.get_mut(key) else {
            return false;
        };
        if element.is_attached() {
            return false;
        }
        let path_finder = self.path_finder.as_mut();
        let area = match element.kind_mut() {
            ElementKind::Entity(entity) => {
                if !entity.attach(id, position, path_finder) {
                    return false;
                }
                entity.body().area()
            }
            ElementKind::Missile(missile) => {
                missile.place(position);
                Some(missile.area())
            }
            ElementKind::MineralField(node) => {
                attach_resource(node, id, position, MINERAL_FIELD_QUADS, path_finder)
            }
            ElementKind::VespeneGeyser(node) => {
                attach_resource(node, id, position, VESPENE_GEYSER_QUADS, path_finder)
            }
            ElementKind::StartLocation(start) => {
                let quad = QuadPos::containing(position);
                start.set_position(Some(quad));
                Some(quad.area(START_LOCATION_QUADS.0, START_LOCATION_QUADS.1))
            }
            ElementKind::Upgrade(_) => None,
        };
        let Some(area) = area else {
            return false;
        };
        let object = self.spatial.insert(id, area);
        element.push_map_object(object);
        tracing::trace!(element = %id, ?position, "element attached to map");
        true
    }

    /// Remove an element's map objects and reservations.
    ///
    /// Returns the last position, or `None` if the element was not attached.
    pub fn detach_from_map(&mut self, id: ElementId) -> Option<Vec2Fixed> {
        let key = self.registry.get(&id).copied()?;
        let element = self.elements.get_mut(key)?;
        if !element.is_attached() {
            return None;
        }
        for object in element.take_map_objects() {
            self.spatial.remove(object);
        }
        let path_finder = self.path_finder.as_mut();
        let position = match element.kind_mut() {
            ElementKind::Entity(entity) => entity.detach(id, path_finder),
            ElementKind::Missile(missile) => Some(missile.position()),
            ElementKind::MineralField(node) | ElementKind::VespeneGeyser(node) => {
                path_finder.release(Layer::Ground, id);
                node.set_position(None).map(QuadPos::corner)
            }
            ElementKind::StartLocation(start) => start.set_position(None).map(QuadPos::corner),
            ElementKind::Upgrade(_) => None,
        };
        tracing::trace!(element = %id, "element detached from map");
        position
    }

    /// Transfer an element to another owner.
    ///
    /// Production queued by the previous owner is aborted and refunded.
    /// Returns `false` for an unknown element.
    ///
    /// # Panics
    ///
    /// Panics if elements are being iterated.
    pub fn set_owner(&mut self, id: ElementId, owner: Option<PlayerIndex>) -> bool {
        assert!(!self.iterating, "ownership cannot change while the scenario iterates elements");
        let Some(key) = self.registry.get(&id).copied() else {
            return false;
        };
        let Some(element) = self.elements.get_mut(key) else {
            return false;
        };
        let previous = element.owner();
        if previous == owner {
            return true;
        }

        let mut doomed_addons = Vec::new();
        if let Some(player) = previous.and_then(|o| self.players[o.slot()].as_mut()) {
            player.unregister(id);
            if let Some(line) = element.as_entity_mut().and_then(Entity::production_mut) {
                for outcome in line.abort_all(player) {
                    if let JobOutcome::DestroyAddon(addon) = outcome {
                        doomed_addons.push(addon);
                    }
                }
            }
        }
        element.set_owner(owner);
        enroll(&mut self.players, id, element);
        self.executions.remove(&id);
        tracing::debug!(element = %id, ?previous, ?owner, "owner changed");

        for addon in doomed_addons {
            self.dispose(addon);
        }
        true
    }

    /// Schedule an element to be admitted, and optionally attached, in step 4
    /// of the current or next update.
    pub fn add_element_next_frame(&mut self, element: ScenarioElement, position: Option<Vec2Fixed>) {
        self.pending_add.push(PendingAdd {
            element,
            placement: position.map(Placement::At),
            release_supply: None,
        });
    }

    /// Schedule an element to be detached and retired in step 4.
    pub fn remove_element_next_frame(&mut self, id: ElementId) {
        if self.registry.contains_key(&id) {
            self.pending_remove.insert(id);
        }
    }

    /// Create, admit and attach an element in one go.
    ///
    /// Returns `None`, leaving nothing behind, if the type is unknown or the
    /// position is not free.
    pub fn spawn(
        &mut self,
        type_name: &str,
        owner: Option<PlayerIndex>,
        position: Vec2Fixed,
    ) -> Option<ElementId> {
        let element = self.create_element(type_name, owner, false)?;
        let id = self.admit(element);
        if self.attach_to_map(id, position) {
            Some(id)
        } else {
            self.retire(id);
            None
        }
    }

    /// Destroy an element now, or at the end of the frame while iterating.
    pub(crate) fn dispose(&mut self, id: ElementId) {
        if !self.registry.contains_key(&id) {
            return;
        }
        self.detach_from_map(id);
        if self.iterating {
            self.remove_element_next_frame(id);
        } else {
            self.retire(id);
        }
    }

    pub(crate) fn move_map_objects(&mut self, id: ElementId, area: RectFixed) {
        let Some(key) = self.registry.get(&id).copied() else {
            return;
        };
        let Some(element) = self.elements.get(key) else {
            return;
        };
        for &object in element.map_objects() {
            self.spatial.update_box(object, area);
        }
    }

    // ---------------------------------------------------------------------
    // Motion
    // ---------------------------------------------------------------------

    /// Start moving an entity along a path to `target`.
    pub fn start_moving(&mut self, id: ElementId, target: Vec2Fixed) -> bool {
        let Some(entity) = self
            .registry
            .get(&id)
            .and_then(|key| self.elements.get_mut(*key))
            .and_then(ScenarioElement::as_entity_mut)
        else {
            return false;
        };
        let (body, Some(motion)) = entity.parts_mut() else {
            return false;
        };
        motion.start_moving(body, target, self.path_finder.as_ref())
    }

    /// Stop an entity's movement.
    pub fn stop_moving(&mut self, id: ElementId) {
        if let Some(entity) = self.entity_mut(id) {
            if let (body, Some(motion)) = entity.parts_mut() {
                motion.stop_moving(body);
            }
        }
    }

    /// Begin lifting off a fixed entity.
    pub fn take_off(&mut self, id: ElementId) -> bool {
        self.with_motion(id, |motion, body, path_finder| {
            motion.begin_take_off(body, id, path_finder)
        })
    }

    /// Begin landing an airborne entity.
    pub fn land(&mut self, id: ElementId, to_fixed: bool) -> bool {
        self.with_motion(id, |motion, body, path_finder| {
            motion.begin_land(body, id, to_fixed, path_finder)
        })
    }

    /// Anchor a stopped ground entity.
    pub fn fix(&mut self, id: ElementId) -> bool {
        self.with_motion(id, |motion, _, _| motion.fix())
    }

    /// Release an anchored entity.
    pub fn unfix(&mut self, id: ElementId) -> bool {
        self.with_motion(id, |motion, _, _| motion.unfix())
    }

    pub(crate) fn clear_attack(&mut self, id: ElementId) {
        if let Some(entity) = self.entity_mut(id) {
            entity.armour_mut().clear_target();
        }
    }

    fn with_motion(
        &mut self,
        id: ElementId,
        action: impl FnOnce(&mut MotionControl, &mut Body, &mut dyn PathFinder) -> bool,
    ) -> bool {
        let Some(entity) = self
            .registry
            .get(&id)
            .and_then(|key| self.elements.get_mut(*key))
            .and_then(ScenarioElement::as_entity_mut)
        else {
            return false;
        };
        if entity.armour().is_dead() {
            return false;
        }
        let (body, Some(motion)) = entity.parts_mut() else {
            return false;
        };
        action(motion, body, self.path_finder.as_mut())
    }

    // ---------------------------------------------------------------------
    // Production
    // ---------------------------------------------------------------------

    /// Queue a unit or upgrade, or start building an addon.
    ///
    /// Returns `false` if the producer does not belong to `player`, cannot
    /// make the product, its line is full, or the player cannot pay.
    pub fn start_production(&mut self, player: PlayerIndex, producer: ElementId, product: &str) -> bool {
        let Some(element) = self.element(producer) else {
            return false;
        };
        if element.owner() != Some(player) {
            return false;
        }
        let Some(entity) = element.as_entity() else {
            return false;
        };
        if !entity.is_operational() || entity.production().is_none() {
            return false;
        }
        let entity_type = entity.entity_type().clone();
        if entity_type.addons.iter().any(|name| name == product) {
            return self.start_addon(player, producer, product);
        }
        if !entity_type.products.iter().any(|name| name == product) {
            return false;
        }

        let product = if let Some(unit) = self.metadata.entity_type(product) {
            Product::Unit(unit)
        } else if let Some(upgrade) = self.metadata.upgrade_type(product) {
            if self.committed_upgrade_level(player, &upgrade.name) >= upgrade.max_level {
                return false;
            }
            Product::Upgrade(upgrade)
        } else {
            return false;
        };
        let job = ProductionJob::new(product, player);
        let Some((line, owner)) = self.line_and_player(producer, player) else {
            return false;
        };
        line.start_production(job, owner)
    }

    /// Cancel a queued job. Returns `false` if there is no such job.
    pub fn cancel_production(&mut self, player: PlayerIndex, producer: ElementId, slot: usize) -> bool {
        if self.element(producer).map(ScenarioElement::owner) != Some(Some(player)) {
            return false;
        }
        let Some((line, owner)) = self.line_and_player(producer, player) else {
            return false;
        };
        let Some(outcome) = line.cancel(slot, owner) else {
            return false;
        };
        self.apply_job_outcome(producer, player, outcome);
        true
    }

    fn start_addon(&mut self, player: PlayerIndex, producer: ElementId, addon_name: &str) -> bool {
        let Some(entity) = self.entity(producer) else {
            return false;
        };
        let anchored = entity
            .motion()
            .map_or(true, |motion| motion.state() == MotionState::Fixed);
        let idle = entity.production().is_some_and(ProductionLine::is_idle);
        if !anchored || !idle || entity.addon().is_some() {
            return false;
        }
        let Some(anchor) = entity.body().area() else {
            return false;
        };
        let Some(addon_type) = self.metadata.entity_type(addon_name) else {
            return false;
        };
        let size = addon_type.footprint.size();
        let two = Fixed::from_num(2);
        let position = Vec2Fixed::new(anchor.right() + size.x / two, anchor.bottom() - size.y / two);

        let mut job = ProductionJob::new(Product::Addon(addon_type), player);
        let Some(owner) = self.players[player.slot()].as_mut() else {
            return false;
        };
        if !job.lock_resources(owner) {
            return false;
        }
        let Some(addon) = self.create_element(addon_name, Some(player), true) else {
            self.refund(player, &mut job);
            return false;
        };
        let id = self.admit(addon);
        if !self.attach_to_map(id, position) {
            self.retire(id);
            self.refund(player, &mut job);
            tracing::trace!(producer = %producer, "no room for addon");
            return false;
        }
        job.set_addon(id);
        let queued = self
            .line_and_player(producer, player)
            .is_some_and(|(line, owner)| line.start_production(job, owner));
        if !queued {
            self.dispose(id);
            return false;
        }
        tracing::debug!(producer = %producer, addon = %id, "addon construction started");
        true
    }

    fn refund(&mut self, player: PlayerIndex, job: &mut ProductionJob) {
        if let Some(owner) = self.players[player.slot()].as_mut() {
            job.abort(owner);
        }
    }

    fn line_and_player(
        &mut self,
        producer: ElementId,
        player: PlayerIndex,
    ) -> Option<(&mut ProductionLine, &mut Player)> {
        let key = self.registry.get(&producer).copied()?;
        let line = self
            .elements
            .get_mut(key)?
            .as_entity_mut()?
            .production_mut()?;
        let owner = self.players[player.slot()].as_mut()?;
        Some((line, owner))
    }

    fn continue_production(&mut self, producer: ElementId) {
        let Some(owner) = self.element(producer).and_then(ScenarioElement::owner) else {
            return;
        };
        let Some((line, player)) = self.line_and_player(producer, owner) else {
            return;
        };
        if let Some(outcome) = line.continue_production(player) {
            self.apply_job_outcome(producer, owner, outcome);
        }
    }

    fn apply_job_outcome(&mut self, producer: ElementId, owner: PlayerIndex, outcome: JobOutcome) {
        match outcome {
            JobOutcome::SpawnUnit {
                entity_type,
                supply,
            } => {
                let created = self.create_element(&entity_type.name, Some(owner), false);
                let anchor = self.entity(producer).and_then(|e| e.body().area());
                let (Some(element), Some(anchor)) = (created, anchor) else {
                    tracing::warn!(producer = %producer, unit = %entity_type.name, "finished unit could not be created");
                    if let Some(player) = self.player_mut(owner) {
                        player.unlock_supply(supply);
                    }
                    return;
                };
                self.pending_add.push(PendingAdd {
                    element,
                    placement: Some(Placement::Near(anchor)),
                    release_supply: Some((owner, supply)),
                });
                self.record_completion(producer, &entity_type.name);
            }
            JobOutcome::CompleteAddon(addon) => {
                let Some(entity) = self.entity_mut(addon) else {
                    return;
                };
                entity.finish_construction();
                let contribution = contribution_of(entity);
                let name = entity.entity_type().name.clone();
                if let Some(player) = self.player_mut(owner) {
                    player.update_contribution(addon, contribution);
                }
                if let Some(building) = self.entity_mut(producer) {
                    building.set_addon(Some(addon));
                }
                self.record_completion(producer, &name);
            }
            JobOutcome::CompleteUpgrade(upgrade_type) => {
                let name = upgrade_type.name.clone();
                self.complete_upgrade(owner, upgrade_type);
                self.record_completion(producer, &name);
            }
            JobOutcome::DestroyAddon(addon) => self.dispose(addon),
            JobOutcome::Refunded => {}
        }
    }

    fn complete_upgrade(&mut self, owner: PlayerIndex, upgrade_type: Arc<crate::metadata::UpgradeType>) {
        if let Some(id) = self.player(owner).and_then(|p| p.upgrade(&upgrade_type.name)) {
            if let Some(ElementKind::Upgrade(upgrade)) = self.element_mut(id).map(ScenarioElement::kind_mut) {
                upgrade.level_up();
            }
            return;
        }
        for pending in &mut self.pending_add {
            if pending.element.owner() == Some(owner)
                && pending.element.type_name() == upgrade_type.name
            {
                if let ElementKind::Upgrade(upgrade) = pending.element.kind_mut() {
                    upgrade.level_up();
                    return;
                }
            }
        }
        let mut element = ScenarioElement::upgrade(upgrade_type, owner);
        if let ElementKind::Upgrade(upgrade) = element.kind_mut() {
            upgrade.level_up();
        }
        if self.iterating {
            self.add_element_next_frame(element, None);
        } else {
            self.admit(element);
        }
    }

    fn record_completion(&mut self, producer: ElementId, product: &str) {
        tracing::debug!(producer = %producer, product, "production completed");
        self.events.completed.push(Completion {
            producer,
            product: product.to_owned(),
        });
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Give a command to one of the player's elements.
    ///
    /// Returns `false` if the recipient is not the player's, or cannot carry
    /// out this kind of command. Production commands act immediately; other
    /// commands replace the recipient's active execution.
    ///
    /// # Panics
    ///
    /// Panics if called during [`update`](Self::update).
    pub fn issue_command(&mut self, player: PlayerIndex, command: Command) -> bool {
        assert!(!self.updating, "commands cannot be issued during a frame update");
        let recipient = command.recipient();
        let Some(element) = self.element(recipient) else {
            return false;
        };
        if element.owner() != Some(player) {
            return false;
        }
        let Some(entity) = element.as_entity() else {
            return false;
        };
        let capable = match &command {
            Command::Move { .. } | Command::TakeOff { .. } | Command::Land { .. } => {
                entity.motion().is_some()
            }
            Command::Attack { .. } => entity.armour().has_weapons(),
            Command::Stop { .. } => true,
            Command::StartProduction { producer, product } => {
                return self.start_production(player, *producer, product);
            }
            Command::CancelProduction { producer, slot } => {
                return self.cancel_production(player, *producer, *slot);
            }
        };
        if !capable {
            return false;
        }
        tracing::trace!(player = %player, ?command, "command issued");
        let Some(execution) = command.into_execution() else {
            return false;
        };
        self.executions.insert(recipient, execution);
        true
    }

    // ---------------------------------------------------------------------
    // Frame update
    // ---------------------------------------------------------------------

    /// Advance the simulation by one frame.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly.
    pub fn update(&mut self) -> FrameEvents {
        assert!(!self.updating, "Scenario::update called while already updating");
        self.updating = true;
        self.events = FrameEvents {
            frame: self.frame,
            ..FrameEvents::default()
        };

        self.continue_executions();

        self.iterating = true;
        let ids: Vec<ElementId> = self.registry.keys().copied().collect();
        for id in ids {
            if !self.pending_remove.contains(&id) {
                self.update_element(id);
            }
        }
        self.iterating = false;

        self.frame += 1;

        self.apply_pending();
        self.updating = false;

        if cfg!(debug_assertions) && tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                frame = self.frame,
                digest = format_args!("{:#018x}", self.state_digest()),
                "frame complete"
            );
        }
        std::mem::take(&mut self.events)
    }

    fn continue_executions(&mut self) {
        let recipients: Vec<ElementId> = self.executions.keys().copied().collect();
        for recipient in recipients {
            let Some(mut execution) = self.executions.remove(&recipient) else {
                continue;
            };
            if !self.registry.contains_key(&recipient) {
                continue;
            }
            match execution.continue_execution(self) {
                ExecutionStatus::Continue => {
                    self.executions.entry(recipient).or_insert(execution);
                }
                ExecutionStatus::Done => {
                    tracing::trace!(entity = %recipient, "command execution finished");
                }
            }
        }
    }

    fn update_element(&mut self, id: ElementId) {
        match self.element(id).map(ScenarioElement::kind) {
            Some(ElementKind::Entity(_)) => self.update_entity(id),
            Some(ElementKind::Missile(_)) => self.update_missile(id),
            _ => {}
        }
    }

    fn update_entity(&mut self, id: ElementId) {
        let Some(key) = self.registry.get(&id).copied() else {
            return;
        };
        let Some(element) = self.elements.get_mut(key) else {
            return;
        };
        let attached = element.is_attached();
        let Some(entity) = element.as_entity_mut() else {
            return;
        };
        if entity.armour().is_dead() {
            tracing::debug!(entity = %id, "entity destroyed");
            self.detach_from_map(id);
            self.remove_element_next_frame(id);
            return;
        }
        if !attached {
            return;
        }

        let (body, motion) = entity.parts_mut();
        if let Some(motion) = motion {
            motion.update(body, id, self.path_finder.as_mut());
        }
        let moved = body.take_moved();
        let area = entity.body().area();
        let operational = entity.is_operational();
        let armed = entity.armour().has_weapons();
        let attacking = entity.armour().target().is_some();
        let moving = entity.motion().is_some_and(MotionControl::is_moving);
        let producing = entity.production().is_some_and(|line| !line.is_idle());
        if let Some(area) = area.filter(|_| moved) {
            for &object in element.map_objects() {
                self.spatial.update_box(object, area);
            }
        }

        if operational && armed {
            if attacking {
                self.continue_attack(id);
            } else if !moving && !self.executions.contains_key(&id) {
                if let Some(enemy) = self.select_enemy(id) {
                    if self.start_attack(id, enemy) {
                        self.continue_attack(id);
                    }
                }
            }
        }
        if operational && producing {
            self.continue_production(id);
        }
    }

    fn apply_pending(&mut self) {
        let removals = std::mem::take(&mut self.pending_remove);
        for id in removals {
            if !self.registry.contains_key(&id) {
                continue;
            }
            self.detach_from_map(id);
            self.retire(id);
        }

        let additions = std::mem::take(&mut self.pending_add);
        for pending in additions {
            self.admit_pending(pending);
        }
    }

    fn admit_pending(&mut self, pending: PendingAdd) {
        let PendingAdd {
            element,
            placement,
            release_supply,
        } = pending;
        if let Some((owner, supply)) = release_supply {
            if let Some(player) = self.player_mut(owner) {
                player.unlock_supply(supply);
            }
        }
        let type_name = element.type_name().to_owned();
        let refund = release_supply.and_then(|(owner, _)| {
            let entity_type = element.as_entity()?.entity_type();
            Some((owner, entity_type.mineral_cost, entity_type.gas_cost))
        });
        let id = self.admit(element);
        let placed = match placement {
            None => true,
            Some(Placement::At(position)) => self.attach_to_map(id, position),
            Some(Placement::Near(anchor)) => self.attach_near(id, &anchor),
        };
        if !placed {
            tracing::warn!(element = %id, kind = %type_name, "no room to place new element");
            self.retire(id);
            if let Some((owner, minerals, gas)) = refund {
                if let Some(player) = self.player_mut(owner) {
                    player.give_resources(minerals, gas);
                }
            }
        }
    }

    /// Attach an entity at the first free position around `anchor`.
    fn attach_near(&mut self, id: ElementId, anchor: &RectFixed) -> bool {
        let Some(size) = self.entity(id).map(|e| e.body().size()) else {
            return false;
        };
        let two = Fixed::from_num(2);
        let center = anchor.center();
        for ring in 0..SPAWN_RINGS {
            let gap_x = size.x * Fixed::from_num(ring);
            let gap_y = size.y * Fixed::from_num(ring);
            let candidates = [
                Vec2Fixed::new(center.x, anchor.bottom() + size.y / two + gap_y),
                Vec2Fixed::new(anchor.right() + size.x / two + gap_x, center.y),
                Vec2Fixed::new(center.x, anchor.top() - size.y / two - gap_y),
                Vec2Fixed::new(anchor.left() - size.x / two - gap_x, center.y),
            ];
            for position in candidates {
                if self.attach_to_map(id, position) {
                    return true;
                }
            }
        }
        false
    }

    // ---------------------------------------------------------------------
    // State digest
    // ---------------------------------------------------------------------

    /// FNV-1a digest over every stored field of the scenario.
    #[must_use]
    pub fn state_digest(&self) -> u64 {
        let mut hasher = StateHasher::new();
        self.visit_state(&mut hasher);
        hasher.finish()
    }

    /// Per-field digests, for diffing two points in time.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self)
    }
}

impl Stored for Scenario {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("frame", &self.frame);
        visitor.visit("next_id", &self.next_id);
        for player in self.players.iter().flatten() {
            player.visit_scoped(&format!("player{}", player.index().get()), visitor);
        }
        for (id, key) in &self.registry {
            if let Some(element) = self.elements.get(*key) {
                element.visit_scoped(&format!("element{}", id.raw()), visitor);
            }
        }
        visitor.visit("pending_remove", &self.pending_remove);
    }
}

fn contribution_of(entity: &Entity) -> SupplyContribution {
    if entity.is_under_construction() {
        return SupplyContribution::default();
    }
    SupplyContribution {
        used: entity.entity_type().supply_cost,
        provided: entity.entity_type().supply_provided,
    }
}

/// Add an element to its owner's holdings.
fn enroll(players: &mut [Option<Player>; MAX_PLAYERS], id: ElementId, element: &ScenarioElement) {
    if let ElementKind::StartLocation(start) = element.kind() {
        if let Some(player) = players[start.player().slot()].as_mut() {
            player.set_start_location(Some(id));
        }
    }
    let Some(player) = element.owner().and_then(|o| players[o.slot()].as_mut()) else {
        return;
    };
    match element.kind() {
        ElementKind::Entity(entity) => {
            player.register_entity(id, entity.entity_type().class, contribution_of(entity));
        }
        ElementKind::Upgrade(upgrade) => player.register_upgrade(&upgrade.upgrade_type().name, id),
        _ => {}
    }
}

fn attach_resource(
    node: &mut ResourceNode,
    owner: ElementId,
    position: Vec2Fixed,
    (width, height): (u32, u32),
    path_finder: &mut dyn PathFinder,
) -> Option<RectFixed> {
    let quad = QuadPos::containing(position);
    let area = quad.area(width, height);
    if !path_finder.reserve(Layer::Ground, owner, &area) {
        return None;
    }
    node.set_position(Some(quad));
    Some(area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::GridPathFinder;

    fn p(index: u8) -> PlayerIndex {
        PlayerIndex::new(index).unwrap()
    }

    fn scenario() -> Scenario {
        let map = MapInfo::new("proving ground", 32, 32);
        let (width, height) = map.cell_size();
        let context = KernelContext::new(
            Arc::new(Metadata::builtin()),
            Box::new(GridPathFinder::new(width, height)),
        );
        Scenario::new(map, KernelConfig::default(), context)
    }

    #[test]
    fn test_admit_assigns_sequential_ids() {
        let mut scenario = scenario();
        let first = scenario.admit(ScenarioElement::mineral_field(100));
        let second = scenario.admit(ScenarioElement::mineral_field(100));
        assert_eq!(first, ElementId::new(0));
        assert_eq!(second, ElementId::new(1));

        scenario.retire(first);
        let third = scenario.admit(ScenarioElement::mineral_field(100));
        assert_eq!(third, ElementId::new(2));
        assert_eq!(scenario.element_ids().collect::<Vec<_>>(), vec![second, third]);
    }

    #[test]
    #[should_panic(expected = "still owns map objects")]
    fn test_retire_attached_element_panics() {
        let mut scenario = scenario();
        let id = scenario.spawn("Marine", None, Vec2Fixed::from_ints(10, 10)).unwrap();
        scenario.retire(id);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_admit_twice_panics() {
        let mut scenario = scenario();
        let id = scenario.admit(ScenarioElement::mineral_field(100));
        let copy = scenario.element(id).unwrap().clone();
        scenario.admit(copy);
    }

    #[test]
    fn test_unplaceable_finished_unit_is_refunded() {
        let map = MapInfo::new("walled in", 32, 32);
        let (width, height) = map.cell_size();
        let mut grid = GridPathFinder::new(width, height);
        let barracks_cells = (32..48, 34..46);
        let depot_cells = (94..106, 96..104);
        for y in 0..height {
            for x in 0..width {
                let open = |(xs, ys): &(std::ops::Range<u32>, std::ops::Range<u32>)| {
                    xs.contains(&x) && ys.contains(&y)
                };
                grid.set_blocked(x, y, !open(&barracks_cells) && !open(&depot_cells));
            }
        }
        let context = KernelContext::new(Arc::new(Metadata::builtin()), Box::new(grid));
        let mut scenario = Scenario::new(map, KernelConfig::default(), context);
        scenario.add_player(p(0));
        let barracks = scenario
            .spawn("Barracks", Some(p(0)), Vec2Fixed::from_ints(40, 40))
            .unwrap();
        scenario
            .spawn("SupplyDepot", Some(p(0)), Vec2Fixed::from_ints(100, 100))
            .unwrap();

        assert!(scenario.start_production(p(0), barracks, "Marine"));
        assert_eq!(scenario.player(p(0)).unwrap().minerals(), 4950);

        let mut completed = 0;
        for _ in 0..400 {
            completed += scenario.update().completed.len();
        }

        assert_eq!(completed, 1);
        let owner = scenario.player(p(0)).unwrap();
        assert_eq!(owner.minerals(), 5000);
        assert_eq!(owner.used_supply(), 0);
        assert_eq!(owner.locked_supply(), 0);
        assert_eq!(owner.units().count(), 0);
        assert!(scenario.entity(barracks).unwrap().production().unwrap().is_idle());
    }

    #[test]
    fn test_spawn_on_occupied_ground_leaves_nothing() {
        let mut scenario = scenario();
        let position = Vec2Fixed::from_ints(40, 40);
        assert!(scenario.spawn("SupplyDepot", None, position).is_some());
        assert!(scenario.spawn("Marine", None, position).is_none());
        assert_eq!(scenario.element_count(), 1);
    }

    #[test]
    fn test_retired_element_returned_without_id() {
        let mut scenario = scenario();
        let id = scenario.spawn("Marine", Some(p(0)), Vec2Fixed::from_ints(10, 10)).unwrap();
        assert_eq!(scenario.detach_from_map(id), Some(Vec2Fixed::from_ints(10, 10)));
        let element = scenario.retire(id);
        assert_eq!(element.id(), None);
        assert!(scenario.element(id).is_none());
        assert!(scenario.spatial().is_empty());
    }

    #[test]
    fn test_dead_entity_removed_at_end_of_frame() {
        let mut scenario = scenario();
        let id = scenario.spawn("Marine", None, Vec2Fixed::from_ints(10, 10)).unwrap();
        scenario.entity_mut(id).unwrap().armour_mut().set_hp(Fixed::ZERO);

        let events = scenario.update();
        assert_eq!(events.retired, vec![id]);
        assert!(scenario.element(id).is_none());
        assert_eq!(scenario.frame(), 1);
    }

    #[test]
    fn test_marines_trade_fire_until_both_fall() {
        let mut scenario = scenario();
        let left = scenario.spawn("Marine", Some(p(0)), Vec2Fixed::from_ints(20, 20)).unwrap();
        let right = scenario.spawn("Marine", Some(p(1)), Vec2Fixed::from_ints(30, 20)).unwrap();

        let mut dealt = BTreeMap::new();
        for _ in 0..150 {
            for impact in scenario.update().impacts {
                *dealt.entry(impact.target).or_insert(Fixed::ZERO) += impact.damage;
            }
        }
        assert!(scenario.element(left).is_none());
        assert!(scenario.element(right).is_none());
        assert_eq!(dealt.get(&left), Some(&Fixed::from_num(40)));
        assert_eq!(dealt.get(&right), Some(&Fixed::from_num(40)));
    }

    #[test]
    fn test_barracks_trains_marine() {
        let mut scenario = scenario();
        assert!(scenario.add_player(p(0)));
        scenario.spawn("CommandCenter", Some(p(0)), Vec2Fixed::from_ints(20, 20)).unwrap();
        let barracks = scenario.spawn("Barracks", Some(p(0)), Vec2Fixed::from_ints(60, 20)).unwrap();

        assert!(scenario.start_production(p(0), barracks, "Marine"));
        assert_eq!(scenario.player(p(0)).unwrap().minerals(), 4950);
        assert!(!scenario.start_production(p(0), barracks, "Wraith"));

        let mut completed = Vec::new();
        for _ in 0..360 {
            completed.extend(scenario.update().completed);
        }
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].product, "Marine");

        let player = scenario.player(p(0)).unwrap();
        let units: Vec<ElementId> = player.units().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(player.used_supply(), 1);
        assert_eq!(player.locked_supply(), 0);
        assert!(scenario.entity(units[0]).unwrap().position().is_some());
    }

    #[test]
    fn test_destroying_producer_refunds_queue() {
        let mut scenario = scenario();
        scenario.add_player(p(0));
        let barracks = scenario.spawn("Barracks", Some(p(0)), Vec2Fixed::from_ints(60, 20)).unwrap();
        assert!(scenario.start_production(p(0), barracks, "Marine"));
        assert!(scenario.start_production(p(0), barracks, "Marine"));
        assert_eq!(scenario.player(p(0)).unwrap().minerals(), 4900);

        scenario.detach_from_map(barracks);
        scenario.retire(barracks);
        assert_eq!(scenario.player(p(0)).unwrap().minerals(), 5000);
        assert_eq!(scenario.player(p(0)).unwrap().buildings().count(), 0);
    }

    #[test]
    fn test_take_off_blocked_by_air_traffic() {
        let mut scenario = scenario();
        scenario.add_player(p(0));
        let barracks = scenario.spawn("Barracks", Some(p(0)), Vec2Fixed::from_ints(60, 40)).unwrap();
        scenario.spawn("Wraith", Some(p(0)), Vec2Fixed::from_ints(60, 38)).unwrap();

        assert!(scenario.issue_command(p(0), Command::TakeOff { entity: barracks }));
        scenario.update();
        let motion = scenario.entity(barracks).unwrap().motion().unwrap();
        assert_eq!(motion.state(), MotionState::Fixed);
    }

    #[test]
    fn test_take_off_and_land() {
        let mut scenario = scenario();
        scenario.add_player(p(0));
        let barracks = scenario.spawn("Barracks", Some(p(0)), Vec2Fixed::from_ints(60, 40)).unwrap();

        assert!(scenario.issue_command(p(0), Command::TakeOff { entity: barracks }));
        scenario.update();
        let state = |s: &Scenario| s.entity(barracks).unwrap().motion().unwrap().state();
        assert_eq!(state(&scenario), MotionState::TakingOff);
        for _ in 0..72 {
            scenario.update();
        }
        assert_eq!(state(&scenario), MotionState::InAir);
        assert_eq!(
            scenario.entity(barracks).unwrap().position(),
            Some(Vec2Fixed::from_ints(60, 38))
        );

        assert!(scenario.issue_command(p(0), Command::Land { entity: barracks, to_fixed: true }));
        for _ in 0..73 {
            scenario.update();
        }
        assert_eq!(state(&scenario), MotionState::Fixed);
    }

    #[test]
    fn test_commands_rejected_for_foreign_elements() {
        let mut scenario = scenario();
        let marine = scenario.spawn("Marine", Some(p(1)), Vec2Fixed::from_ints(10, 10)).unwrap();
        let command = Command::Move {
            entity: marine,
            target: Vec2Fixed::from_ints(20, 10),
        };
        assert!(!scenario.issue_command(p(0), command.clone()));
        assert!(scenario.issue_command(p(1), command));
        assert!(scenario.has_execution(marine));
    }

    #[test]
    fn test_move_command_reaches_target() {
        let mut scenario = scenario();
        let marine = scenario.spawn("Marine", Some(p(0)), Vec2Fixed::from_ints(10, 10)).unwrap();
        let target = Vec2Fixed::from_ints(14, 10);
        assert!(scenario.issue_command(p(0), Command::Move { entity: marine, target }));
        for _ in 0..40 {
            scenario.update();
        }
        assert_eq!(scenario.entity(marine).unwrap().position(), Some(target));
        assert!(!scenario.has_execution(marine));
    }

    #[test]
    fn test_spatial_index_follows_moving_unit() {
        let mut scenario = scenario();
        let start = Vec2Fixed::from_ints(10, 10);
        let target = Vec2Fixed::from_ints(20, 10);
        let marine = scenario.spawn("Marine", Some(p(0)), start).unwrap();
        assert_eq!(scenario.spatial().query_point(start), vec![marine]);

        assert!(scenario.issue_command(p(0), Command::Move { entity: marine, target }));
        for _ in 0..80 {
            scenario.update();
        }

        assert!(scenario.spatial().query_point(start).is_empty());
        assert_eq!(scenario.spatial().query_point(target), vec![marine]);
        assert!(!scenario.entity_mut(marine).unwrap().parts_mut().0.take_moved());
    }

    #[test]
    fn test_set_owner_moves_holdings() {
        let mut scenario = scenario();
        scenario.add_player(p(0));
        scenario.add_player(p(1));
        let depot = scenario.spawn("SupplyDepot", Some(p(0)), Vec2Fixed::from_ints(40, 40)).unwrap();
        assert_eq!(scenario.player(p(0)).unwrap().total_supply(), 8);

        assert!(scenario.set_owner(depot, Some(p(1))));
        assert_eq!(scenario.player(p(0)).unwrap().total_supply(), 0);
        assert_eq!(scenario.player(p(1)).unwrap().total_supply(), 8);
    }

    #[test]
    fn test_identical_runs_share_digest() {
        let run = || {
            let mut scenario = scenario();
            scenario.spawn("Marine", Some(p(0)), Vec2Fixed::from_ints(20, 20));
            scenario.spawn("Vulture", Some(p(1)), Vec2Fixed::from_ints(34, 20));
            for _ in 0..60 {
                scenario.update();
            }
            scenario.state_digest()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_snapshot_diff_names_changed_fields() {
        let mut scenario = scenario();
        let marine = scenario.spawn("Marine", Some(p(0)), Vec2Fixed::from_ints(10, 10)).unwrap();
        let before = scenario.snapshot();
        scenario.entity_mut(marine).unwrap().armour_mut().set_hp(Fixed::from_num(12));
        let changed = before.diff(&scenario.snapshot());
        assert_eq!(changed, vec!["element0/entity/armour/hp".to_string()]);
    }
}
