//! Advancing an entity along a computed path.

use crate::element::ElementId;
use crate::math::{Fixed, RectFixed, Vec2Fixed};
use crate::pathfinding::{Layer, PathFinder};
use crate::storage::{Field, StateVisitor, Stored};

/// Result of one tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStep {
    /// The entity advanced to the contained position, which is now reserved.
    Moved(Vec2Fixed),
    /// The next position is reserved by someone else; the entity waits.
    Blocked,
    /// No waypoints remain.
    Arrived,
}

/// Follows a list of waypoints on one movement layer.
///
/// Each step reserves the entity's next area through the [`PathFinder`]; when
/// the reservation fails the tracker waits, and after enough blocked frames it
/// asks for a fresh path to the same destination.
#[derive(Debug, Clone)]
pub struct PathTracker {
    layer: Layer,
    destination: Field<Vec2Fixed>,
    /// Remaining waypoints, next waypoint last.
    waypoints: Field<Vec<Vec2Fixed>>,
    blocked_frames: Field<u32>,
}

impl PathTracker {
    /// Start tracking `path` towards `destination`.
    #[must_use]
    pub fn new(layer: Layer, destination: Vec2Fixed, mut path: Vec<Vec2Fixed>) -> Self {
        path.reverse();
        Self {
            layer,
            destination: Field::with_value("destination", destination),
            waypoints: Field::with_value("waypoints", path),
            blocked_frames: Field::new("blocked_frames"),
        }
    }

    /// Layer the tracker moves on.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Final destination.
    #[must_use]
    pub fn destination(&self) -> Vec2Fixed {
        self.destination.get()
    }

    /// Number of waypoints not yet reached.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.waypoints.read().len()
    }

    /// Consecutive frames the tracker has been blocked.
    #[must_use]
    pub fn blocked_frames(&self) -> u32 {
        self.blocked_frames.get()
    }

    /// Advance by at most `speed` cells.
    pub fn step(
        &mut self,
        owner: ElementId,
        position: Vec2Fixed,
        speed: Fixed,
        size: Vec2Fixed,
        repath_after: u32,
        path_finder: &mut dyn PathFinder,
    ) -> TrackStep {
        let Some(&next) = self.waypoints.read().last() else {
            return TrackStep::Arrived;
        };

        let delta = next - position;
        let distance = delta.length();
        let (target, reached) = if distance <= speed {
            (next, true)
        } else {
            (position + delta.scale(speed / distance), false)
        };

        if path_finder.reserve(self.layer, owner, &RectFixed::centered(target, size)) {
            if reached {
                self.waypoints.modify(|waypoints| {
                    waypoints.pop();
                });
            }
            if self.blocked_frames.get() != 0 {
                self.blocked_frames.write(0);
            }
            return TrackStep::Moved(target);
        }

        let mut blocked = self.blocked_frames.get() + 1;
        if blocked >= repath_after {
            blocked = 0;
            if let Some(mut path) =
                path_finder.find_path(self.layer, position, self.destination.get())
            {
                tracing::trace!(owner = %owner, waypoints = path.len(), "path tracker repathed");
                path.reverse();
                self.waypoints.write(path);
            }
        }
        self.blocked_frames.write(blocked);
        TrackStep::Blocked
    }
}

impl Stored for PathTracker {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        visitor.visit("layer", &self.layer);
        self.destination.accept(visitor);
        self.waypoints.accept(visitor);
        self.blocked_frames.accept(visitor);
    }
}
