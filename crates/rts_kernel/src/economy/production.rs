//! Production jobs.
//!
//! ```text
//! Unstarted --lock_resources--> ResourcesLocked --start--> Running --continue_job...--> Finished
//!                                      |                      |
//!                                      +-------abort----------+--> Aborted
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::economy::player::Player;
use crate::element::{ElementId, PlayerIndex};
use crate::metadata::{EntityType, UpgradeType};
use crate::storage::{Field, StateVisitor, Stored};

/// What a job produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Product {
    /// A unit spawned next to the producer.
    Unit(Arc<EntityType>),
    /// An addon built attached to the producer.
    Addon(Arc<EntityType>),
    /// One level of an upgrade.
    Upgrade(Arc<UpgradeType>),
}

impl Product {
    /// Name of the produced type.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unit(entity) | Self::Addon(entity) => &entity.name,
            Self::Upgrade(upgrade) => &upgrade.name,
        }
    }

    /// Mineral cost.
    #[must_use]
    pub fn mineral_cost(&self) -> u32 {
        match self {
            Self::Unit(entity) | Self::Addon(entity) => entity.mineral_cost,
            Self::Upgrade(upgrade) => upgrade.mineral_cost,
        }
    }

    /// Vespene gas cost.
    #[must_use]
    pub fn gas_cost(&self) -> u32 {
        match self {
            Self::Unit(entity) | Self::Addon(entity) => entity.gas_cost,
            Self::Upgrade(upgrade) => upgrade.gas_cost,
        }
    }

    /// Supply locked while the job runs. Only units take supply.
    #[must_use]
    pub fn supply_cost(&self) -> u32 {
        match self {
            Self::Unit(entity) => entity.supply_cost,
            Self::Addon(_) | Self::Upgrade(_) => 0,
        }
    }

    /// Frames of progress needed.
    #[must_use]
    pub fn build_time(&self) -> u32 {
        match self {
            Self::Unit(entity) | Self::Addon(entity) => entity.build_time,
            Self::Upgrade(upgrade) => upgrade.build_time,
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobState {
    /// Nothing taken from the player yet.
    #[default]
    Unstarted,
    /// Resources taken, supply not yet locked.
    ResourcesLocked,
    /// Progressing.
    Running,
    /// Progress reached the build time.
    Finished,
    /// Cancelled.
    Aborted,
}

/// What the owner of a job has to do after it finished or was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Create a unit. Its supply stays locked until the unit is admitted.
    SpawnUnit {
        /// Unit type.
        entity_type: Arc<EntityType>,
        /// Supply to unlock on admission.
        supply: u32,
    },
    /// The addon finished construction.
    CompleteAddon(ElementId),
    /// The upgrade gains a level.
    CompleteUpgrade(Arc<UpgradeType>),
    /// The half-built addon must be destroyed. Nothing is refunded.
    DestroyAddon(ElementId),
    /// Locked resources and supply went back to the player.
    Refunded,
}

/// One queued production order.
#[derive(Debug, Clone)]
pub struct ProductionJob {
    product: Product,
    owner: PlayerIndex,
    state: Field<JobState>,
    progress: Field<u32>,
    addon: Field<Option<ElementId>>,
}

impl ProductionJob {
    /// Create an unstarted job.
    #[must_use]
    pub fn new(product: Product, owner: PlayerIndex) -> Self {
        Self {
            product,
            owner,
            state: Field::new("state"),
            progress: Field::new("progress"),
            addon: Field::new("addon"),
        }
    }

    /// Product of this job.
    #[must_use]
    pub fn product(&self) -> &Product {
        &self.product
    }

    /// Player paying for the job.
    #[must_use]
    pub fn owner(&self) -> PlayerIndex {
        self.owner
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Frames of progress made.
    #[must_use]
    pub fn progress(&self) -> u32 {
        self.progress.get()
    }

    /// The addon element being built, for addon jobs.
    #[must_use]
    pub fn addon(&self) -> Option<ElementId> {
        self.addon.get()
    }

    /// Take the product's cost from the player.
    ///
    /// Fails, leaving the job unstarted and the balances untouched, if the
    /// player cannot afford it.
    pub fn lock_resources(&mut self, player: &mut Player) -> bool {
        if self.state.get() != JobState::Unstarted {
            return false;
        }
        if !player.take_resources(self.product.mineral_cost(), self.product.gas_cost()) {
            return false;
        }
        self.state.write(JobState::ResourcesLocked);
        true
    }

    /// Lock the product's supply and begin progressing.
    ///
    /// Fails, keeping the resources locked, if there is not enough supply.
    pub fn start(&mut self, player: &mut Player) -> bool {
        if self.state.get() != JobState::ResourcesLocked {
            return false;
        }
        let supply = self.product.supply_cost();
        if supply > 0 && !player.lock_supply(supply) {
            return false;
        }
        self.state.write(JobState::Running);
        tracing::trace!(product = self.product.name(), owner = %self.owner, "production job started");
        true
    }

    /// Advance one frame. Returns `true` once the build time is reached.
    pub fn continue_job(&mut self) -> bool {
        if self.state.get() != JobState::Running {
            return self.state.get() == JobState::Finished;
        }
        let progress = self.progress.get() + 1;
        self.progress.write(progress);
        if progress >= self.product.build_time() {
            self.state.write(JobState::Finished);
            return true;
        }
        false
    }

    /// Completion hook of a finished job.
    #[must_use]
    pub fn finish(&self) -> Option<JobOutcome> {
        if self.state.get() != JobState::Finished {
            return None;
        }
        let outcome = match &self.product {
            Product::Unit(entity_type) => JobOutcome::SpawnUnit {
                entity_type: entity_type.clone(),
                supply: entity_type.supply_cost,
            },
            Product::Addon(_) => JobOutcome::CompleteAddon(self.addon.get()?),
            Product::Upgrade(upgrade) => JobOutcome::CompleteUpgrade(upgrade.clone()),
        };
        Some(outcome)
    }

    /// Cancel the job, giving back whatever it still holds.
    ///
    /// An addon job instead asks for its half-built addon to be destroyed.
    pub fn abort(&mut self, player: &mut Player) -> JobOutcome {
        let state = self.state.write(JobState::Aborted);
        if let (Product::Addon(_), Some(addon)) = (&self.product, self.addon.get()) {
            return JobOutcome::DestroyAddon(addon);
        }
        match state {
            JobState::ResourcesLocked | JobState::Running | JobState::Finished => {
                player.give_resources(self.product.mineral_cost(), self.product.gas_cost());
            }
            JobState::Unstarted | JobState::Aborted => {}
        }
        if matches!(state, JobState::Running | JobState::Finished) {
            player.unlock_supply(self.product.supply_cost());
        }
        JobOutcome::Refunded
    }

    pub(crate) fn set_addon(&mut self, addon: ElementId) {
        self.addon.write(Some(addon));
    }
}

impl Stored for ProductionJob {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("product", &self.product.name());
        visitor.visit("owner", &self.owner);
        self.state.accept(visitor);
        self.progress.accept(visitor);
        self.addon.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::metadata::EntityClass;
    use crate::economy::player::SupplyContribution;

    fn owner() -> PlayerIndex {
        PlayerIndex::new(0).unwrap()
    }

    fn player(minerals: u32, supply: u32) -> Player {
        let config = KernelConfig {
            starting_minerals: minerals,
            ..KernelConfig::default()
        };
        let mut player = Player::new(owner(), &config);
        player.register_entity(
            ElementId::new(1),
            EntityClass::Building,
            SupplyContribution {
                used: 0,
                provided: supply,
            },
        );
        player
    }

    fn unit(minerals: u32, supply: u32, build_time: u32) -> Product {
        Product::Unit(Arc::new(EntityType {
            name: "Trooper".into(),
            class: EntityClass::Unit,
            mineral_cost: minerals,
            supply_cost: supply,
            build_time,
            ..EntityType::default()
        }))
    }

    #[test]
    fn test_lock_resources_fails_when_poor() {
        let mut player = player(50, 10);
        let mut job = ProductionJob::new(unit(100, 1, 10), owner());
        assert!(!job.lock_resources(&mut player));
        assert_eq!(player.minerals(), 50);
        assert_eq!(job.state(), JobState::Unstarted);
    }

    #[test]
    fn test_start_fails_without_supply_but_keeps_resources() {
        let mut player = player(500, 1);
        let mut job = ProductionJob::new(unit(100, 2, 10), owner());
        assert!(job.lock_resources(&mut player));
        assert!(!job.start(&mut player));
        assert_eq!(job.state(), JobState::ResourcesLocked);
        assert_eq!(player.minerals(), 400);
        assert_eq!(player.locked_supply(), 0);
    }

    #[test]
    fn test_job_runs_to_completion() {
        let mut player = player(500, 10);
        let mut job = ProductionJob::new(unit(100, 2, 3), owner());
        assert!(job.lock_resources(&mut player));
        assert!(job.start(&mut player));
        assert_eq!(player.used_supply(), 2);
        assert!(!job.continue_job());
        assert!(!job.continue_job());
        assert!(job.continue_job());
        match job.finish() {
            Some(JobOutcome::SpawnUnit { supply, .. }) => assert_eq!(supply, 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_abort_refunds_everything() {
        let mut player = player(500, 10);
        let mut job = ProductionJob::new(unit(100, 2, 30), owner());
        job.lock_resources(&mut player);
        job.start(&mut player);
        job.continue_job();
        assert_eq!(job.abort(&mut player), JobOutcome::Refunded);
        assert_eq!(player.minerals(), 500);
        assert_eq!(player.used_supply(), 0);
    }

    #[test]
    fn test_abort_addon_destroys_instead_of_refunding() {
        let mut player = player(500, 10);
        let addon_type = Arc::new(EntityType {
            name: "Annex".into(),
            class: EntityClass::Addon,
            mineral_cost: 50,
            build_time: 10,
            ..EntityType::default()
        });
        let mut job = ProductionJob::new(Product::Addon(addon_type), owner());
        job.lock_resources(&mut player);
        job.start(&mut player);
        job.set_addon(ElementId::new(7));
        assert_eq!(job.abort(&mut player), JobOutcome::DestroyAddon(ElementId::new(7)));
        assert_eq!(player.minerals(), 450);
    }
}
