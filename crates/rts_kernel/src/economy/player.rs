//! Player resource accounting and supply.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::KernelConfig;
use crate::element::{ElementId, PlayerIndex};
use crate::metadata::EntityClass;
use crate::storage::{Field, StateVisitor, Stored};

/// Supply an element takes and gives.
///
/// Entities under construction contribute nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SupplyContribution {
    /// Supply consumed.
    pub used: u32,
    /// Supply provided.
    pub provided: u32,
}

/// Resources, supply and holdings of one player slot.
#[derive(Debug, Clone)]
pub struct Player {
    index: PlayerIndex,
    supply_cap: u32,
    start_location: Field<Option<ElementId>>,
    minerals: Field<u32>,
    gas: Field<u32>,
    locked_supply: Field<u32>,
    buildings: BTreeSet<ElementId>,
    addons: BTreeSet<ElementId>,
    units: BTreeSet<ElementId>,
    upgrades: BTreeMap<String, ElementId>,
    contributions: BTreeMap<ElementId, SupplyContribution>,
    /// `(used without locked, provided)`; cleared whenever holdings change.
    supply_cache: Cell<Option<(u32, u32)>>,
}

impl Player {
    /// Create a player with the configured starting resources.
    #[must_use]
    pub fn new(index: PlayerIndex, config: &KernelConfig) -> Self {
        Self {
            index,
            supply_cap: config.supply_cap,
            start_location: Field::new("start_location"),
            minerals: Field::with_value("minerals", config.starting_minerals),
            gas: Field::with_value("gas", config.starting_gas),
            locked_supply: Field::new("locked_supply"),
            buildings: BTreeSet::new(),
            addons: BTreeSet::new(),
            units: BTreeSet::new(),
            upgrades: BTreeMap::new(),
            contributions: BTreeMap::new(),
            supply_cache: Cell::new(None),
        }
    }

    /// Player slot.
    #[must_use]
    pub fn index(&self) -> PlayerIndex {
        self.index
    }

    /// Start location element.
    #[must_use]
    pub fn start_location(&self) -> Option<ElementId> {
        self.start_location.get()
    }

    /// Mineral balance.
    #[must_use]
    pub fn minerals(&self) -> u32 {
        self.minerals.get()
    }

    /// Vespene gas balance.
    #[must_use]
    pub fn gas(&self) -> u32 {
        self.gas.get()
    }

    /// Supply reserved by running production jobs.
    #[must_use]
    pub fn locked_supply(&self) -> u32 {
        self.locked_supply.get()
    }

    /// Completed buildings and buildings under construction.
    pub fn buildings(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.buildings.iter().copied()
    }

    /// Owned addons.
    pub fn addons(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.addons.iter().copied()
    }

    /// Owned units.
    pub fn units(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.units.iter().copied()
    }

    /// Upgrade element researched under `name`.
    #[must_use]
    pub fn upgrade(&self, name: &str) -> Option<ElementId> {
        self.upgrades.get(name).copied()
    }

    /// Deduct both amounts, or nothing if either balance is too low.
    pub fn take_resources(&mut self, minerals: u32, gas: u32) -> bool {
        if minerals > self.minerals.get() || gas > self.gas.get() {
            return false;
        }
        self.minerals.write(self.minerals.get() - minerals);
        self.gas.write(self.gas.get() - gas);
        true
    }

    /// Add to both balances.
    pub fn give_resources(&mut self, minerals: u32, gas: u32) {
        self.minerals.write(self.minerals.get().saturating_add(minerals));
        self.gas.write(self.gas.get().saturating_add(gas));
    }

    /// Supply consumed by holdings plus locked supply.
    #[must_use]
    pub fn used_supply(&self) -> u32 {
        self.supply_totals().0 + self.locked_supply.get()
    }

    /// Supply provided by holdings, capped at the hard limit.
    #[must_use]
    pub fn total_supply(&self) -> u32 {
        self.supply_totals().1.min(self.supply_cap)
    }

    /// Reserve supply for a job. Fails if it would exceed the total.
    pub fn lock_supply(&mut self, amount: u32) -> bool {
        if self.used_supply() + amount > self.total_supply() {
            return false;
        }
        self.locked_supply.write(self.locked_supply.get() + amount);
        true
    }

    /// Return previously locked supply.
    pub fn unlock_supply(&mut self, amount: u32) {
        self.locked_supply
            .write(self.locked_supply.get().saturating_sub(amount));
    }

    pub(crate) fn set_start_location(&mut self, start: Option<ElementId>) {
        self.start_location.write(start);
    }

    pub(crate) fn register_entity(
        &mut self,
        id: ElementId,
        class: EntityClass,
        contribution: SupplyContribution,
    ) {
        match class {
            EntityClass::Unit => self.units.insert(id),
            EntityClass::Building => self.buildings.insert(id),
            EntityClass::Addon => self.addons.insert(id),
        };
        self.contributions.insert(id, contribution);
        self.supply_cache.set(None);
    }

    pub(crate) fn update_contribution(&mut self, id: ElementId, contribution: SupplyContribution) {
        if let Some(entry) = self.contributions.get_mut(&id) {
            *entry = contribution;
            self.supply_cache.set(None);
        }
    }

    pub(crate) fn register_upgrade(&mut self, name: &str, id: ElementId) {
        self.upgrades.insert(name.to_owned(), id);
    }

    pub(crate) fn unregister(&mut self, id: ElementId) {
        self.units.remove(&id);
        self.buildings.remove(&id);
        self.addons.remove(&id);
        self.upgrades.retain(|_, upgrade| *upgrade != id);
        if self.contributions.remove(&id).is_some() {
            self.supply_cache.set(None);
        }
    }

    fn supply_totals(&self) -> (u32, u32) {
        if let Some(totals) = self.supply_cache.get() {
            return totals;
        }
        let totals = self
            .contributions
            .values()
            .fold((0, 0), |(used, provided), c| (used + c.used, provided + c.provided));
        self.supply_cache.set(Some(totals));
        totals
    }
}

impl Stored for Player {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        self.start_location.accept(visitor);
        self.minerals.accept(visitor);
        self.gas.accept(visitor);
        self.locked_supply.accept(visitor);
        visitor.visit("buildings", &self.buildings);
        visitor.visit("addons", &self.addons);
        visitor.visit("units", &self.units);
        visitor.visit("upgrades", &self.upgrades);
        visitor.visit("contributions", &self.contributions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(PlayerIndex::new(0).unwrap(), &KernelConfig::default())
    }

    fn depot(provided: u32) -> SupplyContribution {
        SupplyContribution { used: 0, provided }
    }

    #[test]
    fn test_starting_balances() {
        let player = player();
        assert_eq!(player.minerals(), 5000);
        assert_eq!(player.gas(), 5000);
        assert_eq!(player.used_supply(), 0);
        assert_eq!(player.total_supply(), 0);
    }

    #[test]
    fn test_take_resources_is_atomic() {
        let mut player = player();
        assert!(!player.take_resources(100, 6000));
        assert_eq!(player.minerals(), 5000);
        assert_eq!(player.gas(), 5000);
        assert!(player.take_resources(100, 50));
        assert_eq!(player.minerals(), 4900);
        assert_eq!(player.gas(), 4950);
    }

    #[test]
    fn test_lock_supply_respects_total() {
        let mut player = player();
        player.register_entity(ElementId::new(1), EntityClass::Building, depot(8));
        assert!(player.lock_supply(6));
        assert!(!player.lock_supply(3));
        assert!(player.lock_supply(2));
        assert_eq!(player.used_supply(), 8);
        player.unlock_supply(8);
        assert_eq!(player.used_supply(), 0);
    }

    #[test]
    fn test_total_supply_is_capped() {
        let mut player = player();
        for id in 0..30 {
            player.register_entity(ElementId::new(id), EntityClass::Building, depot(8));
        }
        assert_eq!(player.total_supply(), 200);
    }

    #[test]
    fn test_cache_invalidated_on_change() {
        let mut player = player();
        let id = ElementId::new(4);
        player.register_entity(id, EntityClass::Building, SupplyContribution::default());
        assert_eq!(player.total_supply(), 0);
        player.update_contribution(id, depot(10));
        assert_eq!(player.total_supply(), 10);
        player.unregister(id);
        assert_eq!(player.total_supply(), 0);
        assert_eq!(player.buildings().count(), 0);
    }
}
