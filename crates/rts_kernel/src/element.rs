//! Scenario elements: identity, ownership and map footprints.
//!
//! Every simulated object is a [`ScenarioElement`]. An element starts
//! unregistered (no ID), receives an ID when the scenario admits it, may be
//! attached to the map (it then owns at least one map object in the spatial
//! index), and must be detached again before it can be retired.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::combat::Missile;
use crate::entity::Entity;
use crate::math::QuadPos;
use crate::metadata::UpgradeType;
use crate::spatial::MapObjectKey;
use crate::storage::{Field, StateVisitor, Stored};

/// Number of player slots in a scenario.
pub const MAX_PLAYERS: usize = 8;

/// Mineral field footprint in quad tiles.
pub const MINERAL_FIELD_QUADS: (u32, u32) = (2, 1);

/// Vespene geyser footprint in quad tiles.
pub const VESPENE_GEYSER_QUADS: (u32, u32) = (4, 2);

/// Base area reserved around a start location, in quad tiles.
pub const START_LOCATION_QUADS: (u32, u32) = (4, 3);

/// Type name of mineral field elements.
pub const MINERAL_FIELD_TYPE: &str = "MineralField";

/// Type name of vespene geyser elements.
pub const VESPENE_GEYSER_TYPE: &str = "VespeneGeyser";

/// Type name of start location elements.
pub const START_LOCATION_TYPE: &str = "StartLocation";

/// Identifier assigned to an element while it is registered with a scenario.
///
/// IDs are handed out sequentially and never reused within a scenario.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ElementId(u32);

impl ElementId {
    /// Wrap a raw ID.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a player slot, `0..MAX_PLAYERS`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PlayerIndex(u8);

impl PlayerIndex {
    /// Create a player index. Returns `None` if out of range.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_PLAYERS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Slot number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Slot number as an array index.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    /// Every valid player index in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_PLAYERS as u8).map(Self)
    }
}

impl fmt::Display for PlayerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A mineral field or vespene geyser.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    amount: Field<u32>,
    position: Field<Option<QuadPos>>,
}

impl ResourceNode {
    /// Create a node holding `amount` resources.
    #[must_use]
    pub fn new(amount: u32) -> Self {
        Self {
            amount: Field::with_value("amount", amount),
            position: Field::new("position"),
        }
    }

    /// Remaining resources.
    #[must_use]
    pub fn amount(&self) -> u32 {
        self.amount.get()
    }

    /// Remove up to `requested` resources, returning how many were taken.
    pub fn harvest(&mut self, requested: u32) -> u32 {
        let taken = requested.min(self.amount.get());
        self.amount.write(self.amount.get() - taken);
        taken
    }

    /// Top-left quad tile while attached.
    #[must_use]
    pub fn position(&self) -> Option<QuadPos> {
        self.position.get()
    }

    pub(crate) fn set_position(&mut self, position: Option<QuadPos>) -> Option<QuadPos> {
        self.position.write(position)
    }
}

/// Marker for the base position of a player.
#[derive(Debug, Clone)]
pub struct StartLocation {
    player: PlayerIndex,
    position: Field<Option<QuadPos>>,
}

impl StartLocation {
    /// Create a start location for a player.
    #[must_use]
    pub fn new(player: PlayerIndex) -> Self {
        Self {
            player,
            position: Field::new("position"),
        }
    }

    /// Player whose base starts here.
    #[must_use]
    pub fn player(&self) -> PlayerIndex {
        self.player
    }

    /// Top-left quad tile of the base area while attached.
    #[must_use]
    pub fn position(&self) -> Option<QuadPos> {
        self.position.get()
    }

    pub(crate) fn set_position(&mut self, position: Option<QuadPos>) -> Option<QuadPos> {
        self.position.write(position)
    }
}

/// A researched upgrade owned by a player.
#[derive(Debug, Clone)]
pub struct Upgrade {
    upgrade_type: Arc<UpgradeType>,
    level: Field<u32>,
}

impl Upgrade {
    /// Create an upgrade at level zero.
    #[must_use]
    pub fn new(upgrade_type: Arc<UpgradeType>) -> Self {
        Self {
            upgrade_type,
            level: Field::new("level"),
        }
    }

    /// Upgrade descriptor.
    #[must_use]
    pub fn upgrade_type(&self) -> &Arc<UpgradeType> {
        &self.upgrade_type
    }

    /// Researched level.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level.get()
    }

    /// Bonus granted at the current level.
    #[must_use]
    pub fn bonus(&self) -> u32 {
        self.level.get() * self.upgrade_type.bonus_per_level
    }

    /// Raise the level by one, up to the descriptor's maximum.
    pub fn level_up(&mut self) -> bool {
        if self.level.get() >= self.upgrade_type.max_level {
            return false;
        }
        self.level.write(self.level.get() + 1);
        true
    }
}

/// Variant data of a scenario element.
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Unit, building or addon.
    Entity(Box<Entity>),
    /// Weapon projectile.
    Missile(Box<Missile>),
    /// Mineral resource node.
    MineralField(ResourceNode),
    /// Vespene gas resource node.
    VespeneGeyser(ResourceNode),
    /// Player start marker.
    StartLocation(StartLocation),
    /// Player upgrade. Never on the map.
    Upgrade(Upgrade),
}

/// Any object simulated by a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioElement {
    id: Option<ElementId>,
    type_name: String,
    owner: Field<Option<PlayerIndex>>,
    map_objects: Vec<MapObjectKey>,
    kind: ElementKind,
}

impl ScenarioElement {
    /// Create an unregistered, neutral element.
    #[must_use]
    pub fn new(type_name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            owner: Field::new("owner"),
            map_objects: Vec::new(),
            kind,
        }
    }

    /// Create a mineral field element.
    #[must_use]
    pub fn mineral_field(amount: u32) -> Self {
        Self::new(MINERAL_FIELD_TYPE, ElementKind::MineralField(ResourceNode::new(amount)))
    }

    /// Create a vespene geyser element.
    #[must_use]
    pub fn vespene_geyser(amount: u32) -> Self {
        Self::new(VESPENE_GEYSER_TYPE, ElementKind::VespeneGeyser(ResourceNode::new(amount)))
    }

    /// Create a start location element.
    #[must_use]
    pub fn start_location(player: PlayerIndex) -> Self {
        Self::new(START_LOCATION_TYPE, ElementKind::StartLocation(StartLocation::new(player)))
    }

    /// Create an upgrade element owned by a player.
    #[must_use]
    pub fn upgrade(upgrade_type: Arc<UpgradeType>, owner: PlayerIndex) -> Self {
        let name = upgrade_type.name.clone();
        Self::new(name, ElementKind::Upgrade(Upgrade::new(upgrade_type))).with_owner(Some(owner))
    }

    /// Set the owner of an element that has not been admitted yet.
    ///
    /// # Panics
    ///
    /// Panics if the element is already registered; use
    /// [`Scenario::set_owner`](crate::scenario::Scenario::set_owner) instead.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<PlayerIndex>) -> Self {
        assert!(
            self.id.is_none(),
            "owner of registered element {:?} must be changed through its scenario",
            self.id
        );
        self.owner.write(owner);
        self
    }

    /// ID while registered, `None` otherwise.
    #[must_use]
    pub fn id(&self) -> Option<ElementId> {
        self.id
    }

    /// Whether the element is registered with a scenario.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }

    /// Name of the element's type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Owning player, `None` for neutral elements.
    #[must_use]
    pub fn owner(&self) -> Option<PlayerIndex> {
        self.owner.get()
    }

    /// Map objects currently owned.
    #[must_use]
    pub fn map_objects(&self) -> &[MapObjectKey] {
        &self.map_objects
    }

    /// Whether the element has at least one map object.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.map_objects.is_empty()
    }

    /// Variant data.
    #[must_use]
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Mutable variant data.
    pub fn kind_mut(&mut self) -> &mut ElementKind {
        &mut self.kind
    }

    /// Entity data, if this element is an entity.
    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match &self.kind {
            ElementKind::Entity(entity) => Some(&**entity),
            _ => None,
        }
    }

    /// Mutable entity data, if this element is an entity.
    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.kind {
            ElementKind::Entity(entity) => Some(&mut **entity),
            _ => None,
        }
    }

    /// Missile data, if this element is a missile.
    #[must_use]
    pub fn as_missile(&self) -> Option<&Missile> {
        match &self.kind {
            ElementKind::Missile(missile) => Some(&**missile),
            _ => None,
        }
    }

    /// Resource node data for mineral fields and geysers.
    #[must_use]
    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match &self.kind {
            ElementKind::MineralField(node) | ElementKind::VespeneGeyser(node) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn set_id(&mut self, id: Option<ElementId>) {
        self.id = id;
    }

    pub(crate) fn set_owner(&mut self, owner: Option<PlayerIndex>) -> Option<PlayerIndex> {
        self.owner.write(owner)
    }

    pub(crate) fn push_map_object(&mut self, key: MapObjectKey) {
        self.map_objects.push(key);
    }

    pub(crate) fn take_map_objects(&mut self) -> Vec<MapObjectKey> {
        std::mem::take(&mut self.map_objects)
    }
}

impl Stored for ScenarioElement {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("type", &self.type_name);
        self.owner.accept(visitor);
        visitor.visit("map_objects", &self.map_objects.len());
        match &self.kind {
            ElementKind::Entity(entity) => entity.visit_scoped("entity", visitor),
            ElementKind::Missile(missile) => missile.visit_scoped("missile", visitor),
            ElementKind::MineralField(node) | ElementKind::VespeneGeyser(node) => {
                node.amount.accept(visitor);
                node.position.accept(visitor);
            }
            ElementKind::StartLocation(start) => {
                visitor.visit("player", &start.player);
                start.position.accept(visitor);
            }
            ElementKind::Upgrade(upgrade) => upgrade.level.accept(visitor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_index_range() {
        assert!(PlayerIndex::new(0).is_some());
        assert!(PlayerIndex::new(7).is_some());
        assert!(PlayerIndex::new(8).is_none());
        assert_eq!(PlayerIndex::all().count(), MAX_PLAYERS);
    }

    #[test]
    fn test_new_element_is_unregistered_and_neutral() {
        let element = ScenarioElement::mineral_field(1500);
        assert_eq!(element.id(), None);
        assert_eq!(element.owner(), None);
        assert!(!element.is_attached());
        assert_eq!(element.as_resource().map(ResourceNode::amount), Some(1500));
    }

    #[test]
    fn test_harvest_never_goes_negative() {
        let mut node = ResourceNode::new(10);
        assert_eq!(node.harvest(8), 8);
        assert_eq!(node.harvest(8), 2);
        assert_eq!(node.amount(), 0);
    }

    #[test]
    fn test_upgrade_levels_are_capped() {
        let upgrade_type = Arc::new(UpgradeType {
            name: "Plating".into(),
            max_level: 2,
            bonus_per_level: 3,
            ..UpgradeType::default()
        });
        let mut upgrade = Upgrade::new(upgrade_type);
        assert!(upgrade.level_up());
        assert!(upgrade.level_up());
        assert!(!upgrade.level_up());
        assert_eq!(upgrade.bonus(), 6);
    }

    #[test]
    fn test_element_id_display() {
        assert_eq!(ElementId::new(42).to_string(), "#42");
        assert_eq!(PlayerIndex::new(3).map(|p| p.to_string()), Some("P3".into()));
    }
}
