//! Movement validity collaborator.
//!
//! The kernel never computes walkability itself. Motion control and path
//! trackers ask a [`PathFinder`] whether an area is walkable, reserve the area
//! an element occupies, and request paths. [`GridPathFinder`] is a reference
//! implementation on a cell grid using a deterministic A* search.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::math::{Fixed, RectFixed, Vec2Fixed};

/// Movement layer. Ground and air reservations never interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Ground units and grounded buildings.
    Ground,
    /// Flyers and lifted buildings.
    Air,
}

impl Layer {
    const fn index(self) -> usize {
        match self {
            Self::Ground => 0,
            Self::Air => 1,
        }
    }
}

/// Answers movement questions for the kernel.
///
/// Every element holds at most one reservation per layer. Reserving again on
/// the same layer moves the reservation; a failed reservation leaves the
/// previous one in place.
pub trait PathFinder: fmt::Debug + Send {
    /// Whether the area is inside the map and passable on the layer.
    fn is_walkable(&self, layer: Layer, area: &RectFixed) -> bool;

    /// Whether `owner` could reserve the area without overlapping another reservation.
    fn can_reserve(&self, layer: Layer, owner: ElementId, area: &RectFixed) -> bool;

    /// Reserve the area for `owner`, replacing its previous reservation on the layer.
    fn reserve(&mut self, layer: Layer, owner: ElementId, area: &RectFixed) -> bool;

    /// Drop the reservation held by `owner` on the layer, if any.
    fn release(&mut self, layer: Layer, owner: ElementId);

    /// Waypoints leading from `from` to `to`, excluding the start position.
    fn find_path(&self, layer: Layer, from: Vec2Fixed, to: Vec2Fixed) -> Option<Vec<Vec2Fixed>>;

    /// Terrain height level at a position. Higher is higher ground.
    fn ground_level(&self, position: Vec2Fixed) -> u8;
}

/// Cell grid with per-layer reservations.
#[derive(Debug, Clone)]
pub struct GridPathFinder {
    width: u32,
    height: u32,
    blocked: Vec<bool>,
    levels: Vec<u8>,
    reservations: [BTreeMap<ElementId, RectFixed>; 2],
}

impl GridPathFinder {
    /// Create an open grid with every cell walkable and at level zero.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "GridPathFinder width must be positive");
        assert!(height > 0, "GridPathFinder height must be positive");

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            blocked: vec![false; cell_count],
            levels: vec![0; cell_count],
            reservations: [BTreeMap::new(), BTreeMap::new()],
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    /// Mark a cell as blocked or open. Out-of-bounds cells are ignored.
    pub fn set_blocked(&mut self, x: u32, y: u32, blocked: bool) {
        if self.in_bounds(i64::from(x), i64::from(y)) {
            let index = self.index(x, y);
            self.blocked[index] = blocked;
        }
    }

    /// Set the terrain level of every cell in a rectangle of cells.
    pub fn set_level(&mut self, x: u32, y: u32, width: u32, height: u32, level: u8) {
        for cy in y..y.saturating_add(height) {
            for cx in x..x.saturating_add(width) {
                if self.in_bounds(i64::from(cx), i64::from(cy)) {
                    let index = self.index(cx, cy);
                    self.levels[index] = level;
                }
            }
        }
    }

    /// Whether a single cell is passable on the ground.
    #[must_use]
    pub fn is_cell_open(&self, x: i64, y: i64) -> bool {
        self.in_bounds(x, y) && !self.blocked[self.index(x as u32, y as u32)]
    }

    /// Current reservation of an element on a layer.
    #[must_use]
    pub fn reservation(&self, layer: Layer, owner: ElementId) -> Option<RectFixed> {
        self.reservations[layer.index()].get(&owner).copied()
    }

    /// Number of reservations held on a layer.
    #[must_use]
    pub fn reservation_count(&self, layer: Layer) -> usize {
        self.reservations[layer.index()].len()
    }

    fn covered_cells(area: &RectFixed) -> (i64, i64, i64, i64) {
        let x0 = area.left().floor().to_num::<i64>();
        let y0 = area.top().floor().to_num::<i64>();
        let x1 = area.right().ceil().to_num::<i64>();
        let y1 = area.bottom().ceil().to_num::<i64>();
        (x0, y0, x1, y1)
    }

    fn cell_of(position: Vec2Fixed) -> (i64, i64) {
        (
            position.x.floor().to_num::<i64>(),
            position.y.floor().to_num::<i64>(),
        )
    }

    fn cell_center(x: i64, y: i64) -> Vec2Fixed {
        let half = Fixed::from_num(0.5);
        Vec2Fixed::new(Fixed::from_num(x) + half, Fixed::from_num(y) + half)
    }

    fn find_ground_path(&self, from: Vec2Fixed, to: Vec2Fixed) -> Option<Vec<Vec2Fixed>> {
        let start = Self::cell_of(from);
        let goal = Self::cell_of(to);
        if !self.is_cell_open(goal.0, goal.1) {
            return None;
        }
        if start == goal {
            return Some(vec![to]);
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: BTreeMap<(i64, i64), (i64, i64)> = BTreeMap::new();
        let mut g_score: BTreeMap<(i64, i64), u32> = BTreeMap::new();

        g_score.insert(start, 0);
        open_set.push(SearchNode {
            cell: start,
            f_score: chebyshev(start, goal),
        });

        while let Some(current) = open_set.pop() {
            if current.cell == goal {
                let mut cells = vec![goal];
                let mut cursor = goal;
                while let Some(&previous) = came_from.get(&cursor) {
                    if previous == start {
                        break;
                    }
                    cells.push(previous);
                    cursor = previous;
                }
                cells.reverse();
                let mut path: Vec<Vec2Fixed> = cells
                    .iter()
                    .map(|&(x, y)| Self::cell_center(x, y))
                    .collect();
                if let Some(last) = path.last_mut() {
                    *last = to;
                }
                return Some(path);
            }

            let current_g = g_score.get(&current.cell).copied().unwrap_or(u32::MAX);
            if current.f_score > current_g.saturating_add(chebyshev(current.cell, goal)) {
                continue;
            }

            for &(dx, dy) in &DIRECTIONS {
                let next = (current.cell.0 + dx, current.cell.1 + dy);
                if !self.is_cell_open(next.0, next.1) {
                    continue;
                }
                // No corner cutting.
                if dx != 0
                    && dy != 0
                    && !(self.is_cell_open(current.cell.0 + dx, current.cell.1)
                        && self.is_cell_open(current.cell.0, current.cell.1 + dy))
                {
                    continue;
                }

                let tentative_g = current_g + 1;
                if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, current.cell);
                    g_score.insert(next, tentative_g);
                    open_set.push(SearchNode {
                        cell: next,
                        f_score: tentative_g + chebyshev(next, goal),
                    });
                }
            }
        }

        None
    }
}

impl PathFinder for GridPathFinder {
    fn is_walkable(&self, layer: Layer, area: &RectFixed) -> bool {
        if area.is_empty() {
            return false;
        }
        let (x0, y0, x1, y1) = Self::covered_cells(area);
        if !self.in_bounds(x0, y0) || !self.in_bounds(x1 - 1, y1 - 1) {
            return false;
        }
        match layer {
            Layer::Air => true,
            Layer::Ground => (y0..y1).all(|y| (x0..x1).all(|x| self.is_cell_open(x, y))),
        }
    }

    fn can_reserve(&self, layer: Layer, owner: ElementId, area: &RectFixed) -> bool {
        self.is_walkable(layer, area)
            && self.reservations[layer.index()]
                .iter()
                .all(|(holder, reserved)| *holder == owner || !reserved.intersects(area))
    }

    fn reserve(&mut self, layer: Layer, owner: ElementId, area: &RectFixed) -> bool {
        if !self.can_reserve(layer, owner, area) {
            return false;
        }
        self.reservations[layer.index()].insert(owner, *area);
        true
    }

    fn release(&mut self, layer: Layer, owner: ElementId) {
        self.reservations[layer.index()].remove(&owner);
    }

    fn find_path(&self, layer: Layer, from: Vec2Fixed, to: Vec2Fixed) -> Option<Vec<Vec2Fixed>> {
        match layer {
            Layer::Air => {
                let (x, y) = Self::cell_of(to);
                self.in_bounds(x, y).then(|| vec![to])
            }
            Layer::Ground => self.find_ground_path(from, to),
        }
    }

    fn ground_level(&self, position: Vec2Fixed) -> u8 {
        let (x, y) = Self::cell_of(position);
        if self.in_bounds(x, y) {
            self.levels[self.index(x as u32, y as u32)]
        } else {
            0
        }
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[inline]
fn chebyshev(a: (i64, i64), b: (i64, i64)) -> u32 {
    let dx = a.0.abs_diff(b.0);
    let dy = a.1.abs_diff(b.1);
    dx.max(dy) as u32
}

/// A node in the A* open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchNode {
    cell: (i64, i64),
    f_score: u32,
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f_score, ties broken by row then column.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| (other.cell.1, other.cell.0).cmp(&(self.cell.1, self.cell.0)))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
