//! Motion control: the ground/air movement state machine.
//!
//! ```text
//!            unfix                 begin_take_off
//!   OnGround <----- Fixed ---------------------------> TakingOff
//!      |  fix  ----->  ^                                  |
//!      |               | (land to fixed)                  | VTOL done
//!      +<--------------+--- Landing <------------ InAir <-+
//!         VTOL done                   begin_land
//! ```
//!
//! Take-off and landing swap reservations between the ground and air layers:
//! the destination layer is reserved first and the source layer is released
//! only once that succeeded, so a failed swap leaves the entity untouched.

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::entity::Body;
use crate::math::{Fixed, RectFixed, Vec2Fixed};
use crate::path_tracker::{PathTracker, TrackStep};
use crate::pathfinding::{Layer, PathFinder};
use crate::storage::{Field, StateVisitor, Stored};

/// State of a [`MotionControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionState {
    /// Landed and anchored; cannot move.
    Fixed,
    /// Landed and free to move on the ground.
    OnGround,
    /// Rising from the ground.
    TakingOff,
    /// Airborne and free to move.
    InAir,
    /// Descending to the ground.
    Landing,
}

impl MotionState {
    /// Layer on which an entity in this state holds its reservation.
    #[must_use]
    pub const fn layer(self) -> Layer {
        match self {
            Self::Fixed | Self::OnGround | Self::Landing => Layer::Ground,
            Self::TakingOff | Self::InAir => Layer::Air,
        }
    }

    /// Whether a take-off or landing is in progress.
    #[must_use]
    pub const fn is_vtol(self) -> bool {
        matches!(self, Self::TakingOff | Self::Landing)
    }
}

/// Constants governing one entity's motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionProfile {
    /// Cells per frame.
    pub speed: Fixed,
    /// Frames a take-off or landing lasts.
    pub vtol_frames: u32,
    /// Vertical offset between ground and air positions.
    pub altitude: Fixed,
    /// Blocked frames before a tracker searches a new path.
    pub repath_after: u32,
}

/// Per-entity movement state machine.
#[derive(Debug, Clone)]
pub struct MotionControl {
    profile: MotionProfile,
    state: Field<MotionState>,
    vtol_frame: Field<u32>,
    vtol_from: Field<Vec2Fixed>,
    vtol_to: Field<Vec2Fixed>,
    land_to_fixed: Field<bool>,
    tracker: Option<PathTracker>,
}

impl MotionControl {
    /// Create a motion control in the given initial state.
    #[must_use]
    pub fn new(initial: MotionState, profile: MotionProfile) -> Self {
        Self {
            profile,
            state: Field::with_value("state", initial),
            vtol_frame: Field::new("vtol_frame"),
            vtol_from: Field::new("vtol_from"),
            vtol_to: Field::new("vtol_to"),
            land_to_fixed: Field::new("land_to_fixed"),
            tracker: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MotionState {
        self.state.get()
    }

    /// Motion constants.
    #[must_use]
    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }

    /// Whether a path tracker is active.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.tracker.is_some()
    }

    /// The active path tracker, if any.
    #[must_use]
    pub fn tracker(&self) -> Option<&PathTracker> {
        self.tracker.as_ref()
    }

    /// Fraction of the current take-off or landing completed, in `0..=1`.
    #[must_use]
    pub fn vtol_progress(&self) -> Fixed {
        let frames = self.profile.vtol_frames.max(1);
        let progress = Fixed::from_num(self.vtol_frame.get()) / Fixed::from_num(frames);
        progress.min(Fixed::ONE)
    }

    /// `OnGround -> Fixed`. Requires the entity to be stopped.
    pub fn fix(&mut self) -> bool {
        if self.state.get() != MotionState::OnGround || self.is_moving() {
            return false;
        }
        self.transition(MotionState::Fixed);
        true
    }

    /// `Fixed -> OnGround`.
    pub fn unfix(&mut self) -> bool {
        if self.state.get() != MotionState::Fixed {
            return false;
        }
        self.transition(MotionState::OnGround);
        true
    }

    /// `Fixed -> TakingOff`.
    ///
    /// Reserves the airborne position before releasing the ground. Returns
    /// `false`, leaving the state unchanged, if the entity is not fixed, is
    /// not on the map, or the airborne position cannot be reserved.
    pub fn begin_take_off(
        &mut self,
        body: &mut Body,
        owner: ElementId,
        path_finder: &mut dyn PathFinder,
    ) -> bool {
        if self.state.get() != MotionState::Fixed {
            return false;
        }
        let Some(position) = body.position() else {
            return false;
        };
        let airborne = Vec2Fixed::new(position.x, position.y - self.profile.altitude);
        let area = RectFixed::centered(airborne, body.size());
        if !path_finder.reserve(Layer::Air, owner, &area) {
            tracing::trace!(owner = %owner, "take-off blocked by air reservation");
            return false;
        }
        path_finder.release(Layer::Ground, owner);

        self.begin_vtol(MotionState::TakingOff, position, airborne, false);
        body.set_flying(true);
        true
    }

    /// `InAir -> Landing`.
    ///
    /// Reserves the landing area before releasing the air. When `to_fixed` is
    /// set, the entity anchors itself as soon as it touches down.
    pub fn begin_land(
        &mut self,
        body: &mut Body,
        owner: ElementId,
        to_fixed: bool,
        path_finder: &mut dyn PathFinder,
    ) -> bool {
        if self.state.get() != MotionState::InAir {
            return false;
        }
        let Some(position) = body.position() else {
            return false;
        };
        let grounded = Vec2Fixed::new(position.x, position.y + self.profile.altitude);
        let area = RectFixed::centered(grounded, body.size());
        if !path_finder.reserve(Layer::Ground, owner, &area) {
            tracing::trace!(owner = %owner, "landing blocked by ground reservation");
            return false;
        }
        path_finder.release(Layer::Air, owner);

        self.stop_moving(body);
        self.begin_vtol(MotionState::Landing, position, grounded, to_fixed);
        true
    }

    /// Start following a path to `target`.
    ///
    /// Only possible while `OnGround` or `InAir`, with a non-zero speed and a
    /// path available.
    pub fn start_moving(
        &mut self,
        body: &Body,
        target: Vec2Fixed,
        path_finder: &dyn PathFinder,
    ) -> bool {
        let layer = match self.state.get() {
            MotionState::OnGround => Layer::Ground,
            MotionState::InAir => Layer::Air,
            _ => return false,
        };
        if self.profile.speed <= Fixed::ZERO {
            return false;
        }
        let Some(position) = body.position() else {
            return false;
        };
        let Some(path) = path_finder.find_path(layer, position, target) else {
            return false;
        };
        self.tracker = Some(PathTracker::new(layer, target, path));
        true
    }

    /// Drop the active path and zero the velocity.
    pub fn stop_moving(&mut self, body: &mut Body) {
        self.tracker = None;
        body.set_velocity(Vec2Fixed::ZERO);
    }

    /// Advance one frame: progress take-off/landing or step the path tracker.
    pub fn update(&mut self, body: &mut Body, owner: ElementId, path_finder: &mut dyn PathFinder) {
        let state = self.state.get();
        if state.is_vtol() {
            let frame = self.vtol_frame.get() + 1;
            self.vtol_frame.write(frame);
            let progress = self.vtol_progress();
            body.set_position(Some(self.vtol_from.get().lerp(self.vtol_to.get(), progress)));
            body.set_shadow_offset(self.shadow_at(state, progress));
            if frame >= self.profile.vtol_frames {
                self.complete_vtol(body);
            }
            return;
        }

        let Some(position) = body.position() else {
            return;
        };
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        let step = tracker.step(
            owner,
            position,
            self.profile.speed,
            body.size(),
            self.profile.repath_after,
            path_finder,
        );
        match step {
            TrackStep::Moved(next) => {
                body.set_velocity(next - position);
                body.set_position(Some(next));
            }
            TrackStep::Blocked => body.set_velocity(Vec2Fixed::ZERO),
            TrackStep::Arrived => self.stop_moving(body),
        }
    }

    /// Reserve the entity's area for its current state and place it.
    pub fn on_attach(
        &mut self,
        body: &mut Body,
        owner: ElementId,
        position: Vec2Fixed,
        path_finder: &mut dyn PathFinder,
    ) -> bool {
        let layer = self.state.get().layer();
        if !path_finder.reserve(layer, owner, &RectFixed::centered(position, body.size())) {
            return false;
        }
        body.set_position(Some(position));
        body.set_flying(layer == Layer::Air);
        true
    }

    /// Force-complete any VTOL, stop, release reservations and clear the position.
    ///
    /// Returns the last known position.
    pub fn on_detach(
        &mut self,
        body: &mut Body,
        owner: ElementId,
        path_finder: &mut dyn PathFinder,
    ) -> Option<Vec2Fixed> {
        if self.state.get().is_vtol() {
            self.complete_vtol(body);
        }
        self.stop_moving(body);
        path_finder.release(Layer::Ground, owner);
        path_finder.release(Layer::Air, owner);
        body.set_position(None)
    }

    fn begin_vtol(&mut self, state: MotionState, from: Vec2Fixed, to: Vec2Fixed, to_fixed: bool) {
        self.vtol_frame.write(0);
        self.vtol_from.write(from);
        self.vtol_to.write(to);
        self.land_to_fixed.write(to_fixed);
        self.transition(state);
    }

    fn complete_vtol(&mut self, body: &mut Body) {
        let state = self.state.get();
        self.vtol_frame.write(self.profile.vtol_frames);
        body.set_position(Some(self.vtol_to.get()));
        body.set_shadow_offset(self.shadow_at(state, Fixed::ONE));
        match state {
            MotionState::TakingOff => self.transition(MotionState::InAir),
            MotionState::Landing => {
                body.set_flying(false);
                self.transition(MotionState::OnGround);
                if self.land_to_fixed.get() {
                    self.transition(MotionState::Fixed);
                }
            }
            _ => {}
        }
    }

    fn shadow_at(&self, state: MotionState, progress: Fixed) -> Fixed {
        match state {
            MotionState::TakingOff => self.profile.altitude * progress,
            MotionState::Landing => self.profile.altitude * (Fixed::ONE - progress),
            MotionState::InAir => self.profile.altitude,
            MotionState::Fixed | MotionState::OnGround => Fixed::ZERO,
        }
    }

    fn transition(&mut self, next: MotionState) {
        let previous = self.state.write(next);
        tracing::trace!(?previous, ?next, "motion state changed");
    }
}

impl Stored for MotionControl {
    fn visit_state(&self, visitor: &mut dyn StateVisitor) {
        self.state.accept(visitor);
        self.vtol_frame.accept(visitor);
        self.vtol_from.accept(visitor);
        self.vtol_to.accept(visitor);
        self.land_to_fixed.accept(visitor);
        if let Some(tracker) = &self.tracker {
            tracker.visit_scoped("tracker", visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::GridPathFinder;

    const OWNER: ElementId = ElementId::new(1);

    fn profile() -> MotionProfile {
        MotionProfile {
            speed: Fixed::ONE,
            vtol_frames: 72,
            altitude: Fixed::from_num(2),
            repath_after: 8,
        }
    }

    fn building_at(
        grid: &mut GridPathFinder,
        position: Vec2Fixed,
    ) -> (MotionControl, Body) {
        let mut motion = MotionControl::new(MotionState::Fixed, profile());
        let mut body = Body::new(Vec2Fixed::from_ints(4, 4), false);
        assert!(motion.on_attach(&mut body, OWNER, position, grid));
        (motion, body)
    }

    #[test]
    fn test_take_off_and_land_cycle() {
        let mut grid = GridPathFinder::new(64, 64);
        let start = Vec2Fixed::from_ints(20, 20);
        let (mut motion, mut body) = building_at(&mut grid, start);

        assert!(motion.begin_take_off(&mut body, OWNER, &mut grid));
        assert_eq!(motion.state(), MotionState::TakingOff);
        assert!(grid.reservation(Layer::Ground, OWNER).is_none());
        assert!(grid.reservation(Layer::Air, OWNER).is_some());

        for _ in 0..71 {
            motion.update(&mut body, OWNER, &mut grid);
            assert_eq!(motion.state(), MotionState::TakingOff);
        }
        motion.update(&mut body, OWNER, &mut grid);
        assert_eq!(motion.state(), MotionState::InAir);
        assert_eq!(body.position(), Some(Vec2Fixed::from_ints(20, 18)));
        assert_eq!(body.shadow_offset(), Fixed::from_num(2));
        assert!(body.is_flying());

        assert!(motion.begin_land(&mut body, OWNER, true, &mut grid));
        for _ in 0..72 {
            motion.update(&mut body, OWNER, &mut grid);
        }
        assert_eq!(motion.state(), MotionState::Fixed);
        assert_eq!(body.position(), Some(start));
        assert_eq!(body.shadow_offset(), Fixed::ZERO);
        assert!(!body.is_flying());
    }

    #[test]
    fn test_vtol_interpolates_position() {
        let mut grid = GridPathFinder::new(64, 64);
        let (mut motion, mut body) = building_at(&mut grid, Vec2Fixed::from_ints(20, 20));
        assert!(motion.begin_take_off(&mut body, OWNER, &mut grid));
        for _ in 0..36 {
            motion.update(&mut body, OWNER, &mut grid);
        }
        assert_eq!(motion.vtol_progress(), Fixed::from_num(0.5));
        assert_eq!(body.position(), Some(Vec2Fixed::from_ints(20, 19)));
        assert_eq!(body.shadow_offset(), Fixed::ONE);
    }

    #[test]
    fn test_take_off_blocked_by_reserved_air() {
        let mut grid = GridPathFinder::new(64, 64);
        let (mut motion, mut body) = building_at(&mut grid, Vec2Fixed::from_ints(20, 20));
        let flyer = ElementId::new(2);
        let airborne = RectFixed::centered(Vec2Fixed::from_ints(20, 18), Vec2Fixed::from_ints(1, 1));
        assert!(grid.reserve(Layer::Air, flyer, &airborne));

        assert!(!motion.begin_take_off(&mut body, OWNER, &mut grid));
        assert_eq!(motion.state(), MotionState::Fixed);
        assert!(grid.reservation(Layer::Ground, OWNER).is_some());
        assert!(grid.reservation(Layer::Air, OWNER).is_none());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut grid = GridPathFinder::new(64, 64);
        let (mut motion, mut body) = building_at(&mut grid, Vec2Fixed::from_ints(20, 20));
        assert!(!motion.fix());
        assert!(!motion.begin_land(&mut body, OWNER, false, &mut grid));
        assert!(!motion.start_moving(&body, Vec2Fixed::from_ints(30, 30), &grid));
        assert!(motion.unfix());
        assert!(!motion.begin_take_off(&mut body, OWNER, &mut grid));
        assert!(motion.fix());
    }

    #[test]
    fn test_fix_requires_stopped() {
        let mut grid = GridPathFinder::new(64, 64);
        let mut motion = MotionControl::new(MotionState::OnGround, profile());
        let mut body = Body::new(Vec2Fixed::from_ints(1, 1), false);
        let half = Fixed::from_num(0.5);
        assert!(motion.on_attach(&mut body, OWNER, Vec2Fixed::new(half, half), &mut grid));
        assert!(motion.start_moving(&body, Vec2Fixed::from_ints(10, 0), &grid));
        assert!(!motion.fix());
        motion.stop_moving(&mut body);
        assert!(motion.fix());
    }

    #[test]
    fn test_moving_sets_velocity_until_arrival() {
        let mut grid = GridPathFinder::new(64, 64);
        let mut motion = MotionControl::new(MotionState::OnGround, profile());
        let mut body = Body::new(Vec2Fixed::from_ints(1, 1), false);
        let half = Fixed::from_num(0.5);
        let start = Vec2Fixed::new(half, half);
        let goal = Vec2Fixed::new(Fixed::from_num(3.5), half);
        assert!(motion.on_attach(&mut body, OWNER, start, &mut grid));
        assert!(motion.start_moving(&body, goal, &grid));

        motion.update(&mut body, OWNER, &mut grid);
        assert_eq!(body.velocity(), Vec2Fixed::from_ints(1, 0));
        motion.update(&mut body, OWNER, &mut grid);
        motion.update(&mut body, OWNER, &mut grid);
        assert_eq!(body.position(), Some(goal));
        motion.update(&mut body, OWNER, &mut grid);
        assert!(!motion.is_moving());
        assert_eq!(body.velocity(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_detach_mid_vtol_completes_it() {
        let mut grid = GridPathFinder::new(64, 64);
        let (mut motion, mut body) = building_at(&mut grid, Vec2Fixed::from_ints(20, 20));
        assert!(motion.begin_take_off(&mut body, OWNER, &mut grid));
        for _ in 0..10 {
            motion.update(&mut body, OWNER, &mut grid);
        }
        let last = motion.on_detach(&mut body, OWNER, &mut grid);
        assert_eq!(last, Some(Vec2Fixed::from_ints(20, 18)));
        assert_eq!(motion.state(), MotionState::InAir);
        assert_eq!(body.position(), None);
        assert_eq!(grid.reservation_count(Layer::Air), 0);
        assert_eq!(grid.reservation_count(Layer::Ground), 0);
    }
}
