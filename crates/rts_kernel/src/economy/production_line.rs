//! Bounded production queue of a producer building.

use crate::economy::player::Player;
use crate::economy::production::{JobOutcome, JobState, ProductionJob};
use crate::economy::ring_buffer::FixedRing;
use crate::storage::{StateVisitor, Stored};

/// FIFO of production jobs. The head job is the one progressing.
#[derive(Debug, Clone)]
pub struct ProductionLine {
    jobs: FixedRing<ProductionJob>,
}

impl ProductionLine {
    /// Create an idle line holding at most `capacity` jobs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: FixedRing::new(capacity),
        }
    }

    /// Maximum number of queued jobs.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.jobs.capacity()
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The progressing job.
    #[must_use]
    pub fn current(&self) -> Option<&ProductionJob> {
        self.jobs.front()
    }

    /// Progress of the head job; `None` while idle.
    #[must_use]
    pub fn progress(&self) -> Option<u32> {
        self.current().map(ProductionJob::progress)
    }

    /// Queued jobs, head first.
    pub fn jobs(&self) -> impl Iterator<Item = &ProductionJob> + '_ {
        self.jobs.iter()
    }

    /// Queue a job, taking its resources unless already taken.
    ///
    /// Rejects the job when the line is full or the player cannot pay.
    pub fn start_production(&mut self, mut job: ProductionJob, player: &mut Player) -> bool {
        if self.jobs.is_full() {
            return false;
        }
        if job.state() == JobState::Unstarted && !job.lock_resources(player) {
            return false;
        }
        match self.jobs.push_back(job) {
            Ok(()) => true,
            Err(mut job) => {
                job.abort(player);
                false
            }
        }
    }

    /// Advance the head job by one frame.
    ///
    /// A head job still waiting for supply retries starting. When the head
    /// job finishes it is removed and its completion outcome returned; the
    /// next job becomes the head.
    pub fn continue_production(&mut self, player: &mut Player) -> Option<JobOutcome> {
        let head = self.jobs.front_mut()?;
        if head.state() == JobState::ResourcesLocked && !head.start(player) {
            return None;
        }
        if !head.continue_job() {
            return None;
        }
        let finished = self.jobs.pop_front()?;
        tracing::debug!(product = finished.product().name(), "production job finished");
        finished.finish()
    }

    /// Cancel the job in `slot`. Returns `None` if the slot is empty.
    pub fn cancel(&mut self, slot: usize, player: &mut Player) -> Option<JobOutcome> {
        let mut job = self.jobs.remove(slot)?;
        Some(job.abort(player))
    }

    /// Cancel every job, newest first.
    pub fn abort_all(&mut self, player: &mut Player) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(self.jobs.len());
        while let Some(slot) = self.jobs.len().checked_sub(1) {
            if let Some(outcome) = self.cancel(slot, player) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

impl Stored for ProductionLine {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("item_count", &self.jobs.len());
        for (slot, job) in self.jobs.iter().enumerate() {
            job.visit_scoped(&format!("job{slot}"), visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::KernelConfig;
    use crate::economy::player::SupplyContribution;
    use crate::economy::production::Product;
    use crate::element::{ElementId, PlayerIndex};
    use crate::metadata::{EntityClass, EntityType};

    fn owner() -> PlayerIndex {
        PlayerIndex::new(1).unwrap()
    }

    fn player(supply: u32) -> Player {
        let mut player = Player::new(owner(), &KernelConfig::default());
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

    fn job(build_time: u32) -> ProductionJob {
        let product = Product::Unit(Arc::new(EntityType {
            name: "Trooper".into(),
            class: EntityClass::Unit,
            mineral_cost: 50,
            supply_cost: 1,
            build_time,
            ..EntityType::default()
        }));
        ProductionJob::new(product, owner())
    }

    #[test]
    fn test_rejects_at_capacity() {
        let mut player = player(10);
        let mut line = ProductionLine::new(2);
        assert!(line.start_production(job(5), &mut player));
        assert!(line.start_production(job(5), &mut player));
        assert!(!line.start_production(job(5), &mut player));
        assert_eq!(line.item_count(), 2);
        assert_eq!(player.minerals(), 4900);
    }

    #[test]
    fn test_progress_only_while_busy() {
        let mut player = player(10);
        let mut line = ProductionLine::new(5);
        assert_eq!(line.progress(), None);
        line.start_production(job(2), &mut player);
        assert_eq!(line.progress(), Some(0));
        assert!(line.continue_production(&mut player).is_none());
        assert_eq!(line.progress(), Some(1));
    }

    #[test]
    fn test_completion_rotates_queue() {
        let mut player = player(10);
        let mut line = ProductionLine::new(5);
        line.start_production(job(2), &mut player);
        line.start_production(job(4), &mut player);

        assert!(line.continue_production(&mut player).is_none());
        let outcome = line.continue_production(&mut player);
        assert!(matches!(outcome, Some(JobOutcome::SpawnUnit { supply: 1, .. })));
        assert_eq!(line.item_count(), 1);
        assert_eq!(line.progress(), Some(0));

        for _ in 0..3 {
            assert!(line.continue_production(&mut player).is_none());
        }
        assert!(line.continue_production(&mut player).is_some());
        assert!(line.is_idle());
        assert_eq!(line.progress(), None);
    }

    #[test]
    fn test_head_waits_for_supply() {
        let mut player = player(0);
        let mut line = ProductionLine::new(5);
        line.start_production(job(1), &mut player);
        assert!(line.continue_production(&mut player).is_none());
        assert_eq!(line.current().map(ProductionJob::state), Some(JobState::ResourcesLocked));

        player.update_contribution(
            ElementId::new(1),
            SupplyContribution {
                used: 0,
                provided: 2,
            },
        );
        assert!(line.continue_production(&mut player).is_some());
    }

    #[test]
    fn test_cancel_refunds() {
        let mut player = player(10);
        let mut line = ProductionLine::new(5);
        line.start_production(job(9), &mut player);
        line.start_production(job(9), &mut player);
        assert_eq!(line.cancel(1, &mut player), Some(JobOutcome::Refunded));
        assert_eq!(line.cancel(3, &mut player), None);
        line.abort_all(&mut player);
        assert!(line.is_idle());
        assert_eq!(player.minerals(), 5000);
    }
}
