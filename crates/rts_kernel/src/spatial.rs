//! Spatial index of map objects.
//!
//! Map objects are the collision/visual footprints of scenario elements. The
//! index buckets them on a coarse grid so point, rectangle and radius queries
//! only inspect nearby objects. Query results are owner IDs in ascending
//! order, so callers iterate them deterministically.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::element::ElementId;
use crate::math::{Fixed, RectFixed, Vec2Fixed, QUAD_TILE_CELLS};

new_key_type! {
    /// Handle to a map object inside the [`SpatialIndex`].
    pub struct MapObjectKey;
}

/// Bucket edge length in cells.
const BUCKET_CELLS: i32 = 4 * QUAD_TILE_CELLS;

/// Footprint of an element on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapObject {
    /// Element owning the footprint.
    pub owner: ElementId,
    /// Axis-aligned bounding box in cells.
    pub bounding_box: RectFixed,
}

/// Bucketed index of map objects.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    objects: SlotMap<MapObjectKey, MapObject>,
    buckets: BTreeMap<(i32, i32), BTreeSet<MapObjectKey>>,
}

impl SpatialIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed map objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the index holds no map objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up a map object. Returns `None` for a removed object.
    #[must_use]
    pub fn get(&self, key: MapObjectKey) -> Option<&MapObject> {
        self.objects.get(key)
    }

    /// Create a map object and index it.
    pub fn insert(&mut self, owner: ElementId, bounding_box: RectFixed) -> MapObjectKey {
        let key = self.objects.insert(MapObject {
            owner,
            bounding_box,
        });
        self.link(key, &bounding_box);
        key
    }

    /// Destroy a map object, removing it from the index.
    pub fn remove(&mut self, key: MapObjectKey) -> Option<MapObject> {
        let object = self.objects.remove(key)?;
        self.unlink(key, &object.bounding_box);
        Some(object)
    }

    /// Move a map object to a new bounding box.
    ///
    /// The entry is unlinked from its old buckets before the box changes and
    /// relinked after, so queries never observe a half-updated entry.
    /// Returns `false` if the object no longer exists.
    pub fn update_box(&mut self, key: MapObjectKey, bounding_box: RectFixed) -> bool {
        let Some(old_box) = self.objects.get(key).map(|o| o.bounding_box) else {
            return false;
        };
        if old_box == bounding_box {
            return true;
        }
        self.unlink(key, &old_box);
        if let Some(object) = self.objects.get_mut(key) {
            object.bounding_box = bounding_box;
        }
        self.link(key, &bounding_box);
        true
    }

    /// Owners of map objects containing the point.
    #[must_use]
    pub fn query_point(&self, point: Vec2Fixed) -> Vec<ElementId> {
        let bucket = bucket_of(point);
        let mut owners = BTreeSet::new();
        if let Some(keys) = self.buckets.get(&bucket) {
            for &key in keys {
                let object = &self.objects[key];
                if object.bounding_box.contains(point) {
                    owners.insert(object.owner);
                }
            }
        }
        owners.into_iter().collect()
    }

    /// Owners of map objects overlapping the rectangle.
    #[must_use]
    pub fn query_rect(&self, area: &RectFixed) -> Vec<ElementId> {
        self.collect(area, |object| object.bounding_box.intersects(area))
    }

    /// Owners of map objects within `quad_tile_radius` quad tiles of `center`.
    #[must_use]
    pub fn query_radius(&self, center: Vec2Fixed, quad_tile_radius: u32) -> Vec<ElementId> {
        let radius = Fixed::from_num(quad_tile_radius) * Fixed::from_num(QUAD_TILE_CELLS);
        let search = RectFixed::new(
            Vec2Fixed::new(center.x - radius, center.y - radius),
            Vec2Fixed::new(radius + radius, radius + radius),
        );
        let radius_sq = radius * radius;
        self.collect(&search, |object| {
            closest_point(&object.bounding_box, center).distance_squared(center) <= radius_sq
        })
    }

    fn collect(&self, area: &RectFixed, keep: impl Fn(&MapObject) -> bool) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        let mut owners = BTreeSet::new();
        for bucket in buckets_of(area) {
            let Some(keys) = self.buckets.get(&bucket) else {
                continue;
            };
            for &key in keys {
                if !seen.insert(key) {
                    continue;
                }
                let object = &self.objects[key];
                if keep(object) {
                    owners.insert(object.owner);
                }
            }
        }
        owners.into_iter().collect()
    }

    fn link(&mut self, key: MapObjectKey, area: &RectFixed) {
        for bucket in buckets_of(area) {
            self.buckets.entry(bucket).or_default().insert(key);
        }
    }

    fn unlink(&mut self, key: MapObjectKey, area: &RectFixed) {
        for bucket in buckets_of(area) {
            if let Some(keys) = self.buckets.get_mut(&bucket) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.buckets.remove(&bucket);
                }
            }
        }
    }
}

fn bucket_of(point: Vec2Fixed) -> (i32, i32) {
    let size = Fixed::from_num(BUCKET_CELLS);
    (
        (point.x / size).floor().to_num::<i32>(),
        (point.y / size).floor().to_num::<i32>(),
    )
}

fn buckets_of(area: &RectFixed) -> impl Iterator<Item = (i32, i32)> {
    let (x0, y0) = bucket_of(area.origin);
    let (x1, y1) = bucket_of(Vec2Fixed::new(area.right(), area.bottom()));
    (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (x, y)))
}

fn closest_point(area: &RectFixed, point: Vec2Fixed) -> Vec2Fixed {
    Vec2Fixed::new(
        point.x.clamp(area.left(), area.right()),
        point.y.clamp(area.top(), area.bottom()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> RectFixed {
        RectFixed::new(Vec2Fixed::from_ints(x, y), Vec2Fixed::from_ints(w, h))
    }

    fn id(raw: u32) -> ElementId {
        ElementId::new(raw)
    }

    #[test]
    fn test_point_and_rect_queries() {
        let mut index = SpatialIndex::new();
        index.insert(id(1), rect(0, 0, 4, 4));
        index.insert(id(2), rect(10, 10, 4, 4));

        assert_eq!(index.query_point(Vec2Fixed::from_ints(1, 1)), vec![id(1)]);
        assert!(index.query_point(Vec2Fixed::from_ints(5, 5)).is_empty());
        assert_eq!(index.query_rect(&rect(0, 0, 20, 20)), vec![id(1), id(2)]);
        assert_eq!(index.query_rect(&rect(12, 12, 1, 1)), vec![id(2)]);
    }

    #[test]
    fn test_objects_spanning_buckets_reported_once() {
        let mut index = SpatialIndex::new();
        index.insert(id(7), rect(10, 10, 40, 40));
        assert_eq!(index.query_rect(&rect(0, 0, 64, 64)), vec![id(7)]);
    }

    #[test]
    fn test_results_sorted_by_owner() {
        let mut index = SpatialIndex::new();
        for raw in [9, 3, 5] {
            index.insert(id(raw), rect(0, 0, 2, 2));
        }
        assert_eq!(index.query_point(Vec2Fixed::from_ints(1, 1)), vec![id(3), id(5), id(9)]);
    }

    #[test]
    fn test_update_box_moves_entry() {
        let mut index = SpatialIndex::new();
        let key = index.insert(id(1), rect(0, 0, 2, 2));
        assert!(index.update_box(key, rect(100, 100, 2, 2)));
        assert!(index.query_point(Vec2Fixed::from_ints(1, 1)).is_empty());
        assert_eq!(index.query_point(Vec2Fixed::from_ints(101, 101)), vec![id(1)]);
    }

    #[test]
    fn test_remove_and_stale_keys() {
        let mut index = SpatialIndex::new();
        let key = index.insert(id(1), rect(0, 0, 2, 2));
        assert!(index.remove(key).is_some());
        assert!(index.remove(key).is_none());
        assert!(!index.update_box(key, rect(1, 1, 1, 1)));
        assert!(index.is_empty());
        assert!(index.query_rect(&rect(0, 0, 10, 10)).is_empty());
    }

    #[test]
    fn test_radius_query_in_quad_tiles() {
        let mut index = SpatialIndex::new();
        // One quad tile is four cells.
        index.insert(id(1), rect(10, 0, 1, 1));
        index.insert(id(2), rect(20, 0, 1, 1));
        let found = index.query_radius(Vec2Fixed::from_ints(0, 0), 3);
        assert_eq!(found, vec![id(1)]);
        let found = index.query_radius(Vec2Fixed::from_ints(0, 0), 5);
        assert_eq!(found, vec![id(1), id(2)]);
    }
}
