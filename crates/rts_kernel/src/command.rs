//! Player commands and their per-frame executions.
//!
//! Production commands take effect when issued. Every other command becomes a
//! [`CommandExecution`] that the scenario drives once per frame, before any
//! element is updated, until it reports [`ExecutionStatus::Done`]. An entity
//! has at most one execution; a new command replaces the old one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::math::Vec2Fixed;
use crate::motion::MotionControl;
use crate::scenario::Scenario;

/// An order given by a player to one of their elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Walk or fly to a position.
    Move {
        /// Entity to move.
        entity: ElementId,
        /// Destination.
        target: Vec2Fixed,
    },
    /// Stop moving and attacking.
    Stop {
        /// Entity to stop.
        entity: ElementId,
    },
    /// Attack an entity, approaching it when out of range.
    Attack {
        /// Attacker.
        entity: ElementId,
        /// Entity to attack.
        target: ElementId,
    },
    /// Lift a fixed building off the ground.
    TakeOff {
        /// Building to lift.
        entity: ElementId,
    },
    /// Land a lifted building below its current position.
    Land {
        /// Building to land.
        entity: ElementId,
        /// Whether to anchor the building after touching down.
        to_fixed: bool,
    },
    /// Queue a unit or upgrade, or start building an addon.
    StartProduction {
        /// Producer building.
        producer: ElementId,
        /// Name of the unit, upgrade or addon type.
        product: String,
    },
    /// Cancel a queued job.
    CancelProduction {
        /// Producer building.
        producer: ElementId,
        /// Queue slot, 0 being the job in progress.
        slot: usize,
    },
}

impl Command {
    /// Element the command is addressed to.
    #[must_use]
    pub fn recipient(&self) -> ElementId {
        match self {
            Self::Move { entity, .. }
            | Self::Stop { entity }
            | Self::Attack { entity, .. }
            | Self::TakeOff { entity }
            | Self::Land { entity, .. } => *entity,
            Self::StartProduction { producer, .. } | Self::CancelProduction { producer, .. } => {
                *producer
            }
        }
    }

    /// The execution driving this command, for commands that span frames.
    #[must_use]
    pub fn into_execution(self) -> Option<Box<dyn CommandExecution>> {
        let execution: Box<dyn CommandExecution> = match self {
            Self::Move { entity, target } => Box::new(MoveExecution {
                entity,
                target,
                started: false,
            }),
            Self::Stop { entity } => Box::new(StopExecution { entity }),
            Self::Attack { entity, target } => Box::new(AttackExecution { entity, target }),
            Self::TakeOff { entity } => Box::new(TakeOffExecution { entity }),
            Self::Land { entity, to_fixed } => Box::new(LandExecution { entity, to_fixed }),
            Self::StartProduction { .. } | Self::CancelProduction { .. } => return None,
        };
        Some(execution)
    }
}

/// Whether an execution wants to run again next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Keep the execution.
    Continue,
    /// Drop the execution.
    Done,
}

/// A command in progress.
pub trait CommandExecution: fmt::Debug + Send {
    /// Entity the execution acts on.
    fn recipient(&self) -> ElementId;

    /// Run one frame's worth of the command.
    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus;
}

fn is_moving(scenario: &Scenario, entity: ElementId) -> bool {
    scenario
        .entity(entity)
        .and_then(|e| e.motion())
        .is_some_and(MotionControl::is_moving)
}

#[derive(Debug)]
struct MoveExecution {
    entity: ElementId,
    target: Vec2Fixed,
    started: bool,
}

impl CommandExecution for MoveExecution {
    fn recipient(&self) -> ElementId {
        self.entity
    }

    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus {
        if !self.started {
            self.started = true;
            scenario.clear_attack(self.entity);
            if !scenario.start_moving(self.entity, self.target) {
                tracing::trace!(entity = %self.entity, "no path to move target");
                return ExecutionStatus::Done;
            }
            return ExecutionStatus::Continue;
        }
        if is_moving(scenario, self.entity) {
            ExecutionStatus::Continue
        } else {
            ExecutionStatus::Done
        }
    }
}

#[derive(Debug)]
struct StopExecution {
    entity: ElementId,
}

impl CommandExecution for StopExecution {
    fn recipient(&self) -> ElementId {
        self.entity
    }

    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus {
        scenario.stop_moving(self.entity);
        scenario.clear_attack(self.entity);
        ExecutionStatus::Done
    }
}

#[derive(Debug)]
struct AttackExecution {
    entity: ElementId,
    target: ElementId,
}

impl CommandExecution for AttackExecution {
    fn recipient(&self) -> ElementId {
        self.entity
    }

    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus {
        let Some((_, target_position)) = scenario.target_info(self.target) else {
            scenario.clear_attack(self.entity);
            scenario.stop_moving(self.entity);
            return ExecutionStatus::Done;
        };
        let Some(attacker) = scenario.entity(self.entity) else {
            return ExecutionStatus::Done;
        };
        if attacker.armour().target() == Some(self.target) {
            return ExecutionStatus::Continue;
        }
        if scenario.start_attack(self.entity, self.target) {
            scenario.stop_moving(self.entity);
            return ExecutionStatus::Continue;
        }
        if !is_moving(scenario, self.entity)
            && !scenario.start_moving(self.entity, target_position)
        {
            tracing::trace!(entity = %self.entity, target = %self.target, "attack target unreachable");
            return ExecutionStatus::Done;
        }
        ExecutionStatus::Continue
    }
}

#[derive(Debug)]
struct TakeOffExecution {
    entity: ElementId,
}

impl CommandExecution for TakeOffExecution {
    fn recipient(&self) -> ElementId {
        self.entity
    }

    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus {
        scenario.take_off(self.entity);
        ExecutionStatus::Done
    }
}

#[derive(Debug)]
struct LandExecution {
    entity: ElementId,
    to_fixed: bool,
}

impl CommandExecution for LandExecution {
    fn recipient(&self) -> ElementId {
        self.entity
    }

    fn continue_execution(&mut self, scenario: &mut Scenario) -> ExecutionStatus {
        scenario.land(self.entity, self.to_fixed);
        ExecutionStatus::Done
    }
}
