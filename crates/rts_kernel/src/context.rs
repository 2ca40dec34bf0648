//! Collaborators handed to a scenario at construction.

use std::fmt;
use std::sync::Arc;

use crate::combat::{Armour, Weapon, WeaponKind};
use crate::config::KernelConfig;
use crate::economy::ProductionLine;
use crate::element::{ElementKind, PlayerIndex, ScenarioElement};
use crate::entity::Entity;
use crate::metadata::{EntityType, Metadata};
use crate::motion::{MotionControl, MotionProfile, MotionState};
use crate::pathfinding::PathFinder;

/// Parameters for creating an element.
#[derive(Debug, Clone, Copy)]
pub struct SpawnContext<'a> {
    /// Owner of the new element.
    pub owner: Option<PlayerIndex>,
    /// Whether the element starts under construction.
    pub under_construction: bool,
    /// Kernel constants.
    pub config: &'a KernelConfig,
}

/// Creates elements by type name.
pub trait ElementFactory: fmt::Debug + Send + Sync {
    /// Build an unregistered element, or `None` if the type is unknown.
    fn create_element(&self, type_name: &str, spawn: &SpawnContext<'_>) -> Option<ScenarioElement>;
}

/// Builds entities from metadata descriptors.
#[derive(Debug, Clone)]
pub struct MetadataFactory {
    metadata: Arc<Metadata>,
}

impl MetadataFactory {
    /// Create a factory over a metadata registry.
    #[must_use]
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self { metadata }
    }

    fn weapons(&self, entity_type: &EntityType) -> Option<Vec<Weapon>> {
        entity_type
            .weapons
            .iter()
            .map(|name| {
                let weapon_type = self.metadata.weapon_type(name)?;
                let missile_type = self.metadata.missile_type(&weapon_type.missile)?;
                let kind = self
                    .metadata
                    .custom_weapon(name)
                    .map_or(WeaponKind::Standard, WeaponKind::Custom);
                Some(Weapon::new(weapon_type, missile_type, kind))
            })
            .collect()
    }
}

impl ElementFactory for MetadataFactory {
    fn create_element(&self, type_name: &str, spawn: &SpawnContext<'_>) -> Option<ScenarioElement> {
        let entity_type = self.metadata.entity_type(type_name)?;
        let Some(weapons) = self.weapons(&entity_type) else {
            tracing::warn!(entity = type_name, "entity references an unknown weapon or missile");
            return None;
        };
        let armour = Armour::new(&entity_type, weapons);

        let initial = if entity_type.flying {
            Some(MotionState::InAir)
        } else if entity_type.can_lift_off {
            Some(MotionState::Fixed)
        } else if entity_type.is_mobile() {
            Some(MotionState::OnGround)
        } else {
            None
        };
        let motion = initial.map(|state| {
            let profile = MotionProfile {
                speed: entity_type.speed,
                vtol_frames: spawn.config.vtol_frames,
                altitude: spawn.config.vtol_altitude,
                repath_after: spawn.config.repath_after_blocked_frames,
            };
            MotionControl::new(state, profile)
        });
        let production = entity_type
            .is_producer()
            .then(|| ProductionLine::new(spawn.config.production_line_capacity));

        let entity = Entity::new(entity_type, armour, motion, production)
            .under_construction(spawn.under_construction);
        Some(
            ScenarioElement::new(type_name, ElementKind::Entity(Box::new(entity)))
                .with_owner(spawn.owner),
        )
    }
}

/// Everything a scenario consumes from outside the kernel.
#[derive(Debug)]
pub struct KernelContext {
    /// Type descriptors.
    pub metadata: Arc<Metadata>,
    /// Element factory used by production.
    pub factory: Arc<dyn ElementFactory>,
    /// Movement validity and path search.
    pub path_finder: Box<dyn PathFinder>,
}

impl KernelContext {
    /// Context with a [`MetadataFactory`] over `metadata`.
    #[must_use]
    pub fn new(metadata: Arc<Metadata>, path_finder: Box<dyn PathFinder>) -> Self {
        let factory = Arc::new(MetadataFactory::new(metadata.clone()));
        Self {
            metadata,
            factory,
            path_finder,
        }
    }

    /// Replace the element factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ElementFactory>) -> Self {
        self.factory = factory;
        self
    }
}
