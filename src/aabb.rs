// ==============================================================================
// aabb.rs - TAGGED BOUNDING BOX
// ------------------------------------------------------------------------------
// Thin wrapper around parry's Aabb, the currency of the spatial tree:
// - `id` maps a box back to the terrain triangle it bounds (None for boxes
//   that only bound other boxes)
// - helpers the split heuristics need: extent, axis midpoint, volume,
//   longest axis
//
// The invalid/empty sentinel is parry's inverted box (mins > maxs); merging
// anything into it yields that thing's box.
// ==============================================================================

use parry3d::bounding_volume::{Aabb, BoundingVolume};
use parry3d::math::{Point, Real};
use parry3d::shape::Triangle;

#[derive(Clone, Copy, Debug)]
pub struct TaggedAabb {
    pub aabb: Aabb,
    /// Originating triangle index, if this box bounds a single triangle.
    pub id: Option<usize>,
}

impl TaggedAabb {
    #[inline]
    pub fn new(mins: Point<Real>, maxs: Point<Real>) -> Self {
        Self {
            aabb: Aabb::new(mins, maxs),
            id: None,
        }
    }

    #[inline]
    pub fn invalid() -> Self {
        Self {
            aabb: Aabb::new_invalid(),
            id: None,
        }
    }

    pub fn from_triangle(tri: &Triangle, id: usize) -> Self {
        let mins = Point::new(
            tri.a.x.min(tri.b.x).min(tri.c.x),
            tri.a.y.min(tri.b.y).min(tri.c.y),
            tri.a.z.min(tri.b.z).min(tri.c.z),
        );
        let maxs = Point::new(
            tri.a.x.max(tri.b.x).max(tri.c.x),
            tri.a.y.max(tri.b.y).max(tri.c.y),
            tri.a.z.max(tri.b.z).max(tri.c.z),
        );
        Self {
            aabb: Aabb::new(mins, maxs),
            id: Some(id),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.aabb.mins[i] <= self.aabb.maxs[i])
    }

    #[inline]
    pub fn merge(&mut self, other: &TaggedAabb) {
        self.aabb.merge(&other.aabb);
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.aabb.intersects(other)
    }

    /// Extent along one axis (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn extent(&self, axis: usize) -> Real {
        self.aabb.maxs[axis] - self.aabb.mins[axis]
    }

    /// Midpoint coordinate along one axis.
    #[inline]
    pub fn mid(&self, axis: usize) -> Real {
        (self.aabb.mins[axis] + self.aabb.maxs[axis]) * 0.5
    }

    #[inline]
    pub fn volume(&self) -> Real {
        let e = self.aabb.maxs - self.aabb.mins;
        e.x * e.y * e.z
    }

    /// Axis of greatest extent.
    pub fn longest_axis(&self) -> usize {
        let e = self.aabb.maxs - self.aabb.mins;
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_triangle_bounds_all_vertices() {
        let tri = Triangle::new(
            Point::new(1.0, -2.0, 0.5),
            Point::new(-1.0, 3.0, 0.0),
            Point::new(0.0, 0.0, 2.0),
        );
        let b = TaggedAabb::from_triangle(&tri, 7);
        assert_eq!(b.id, Some(7));
        assert_eq!(b.aabb.mins, Point::new(-1.0, -2.0, 0.0));
        assert_eq!(b.aabb.maxs, Point::new(1.0, 3.0, 2.0));
        assert!(b.is_valid());
    }

    #[test]
    fn invalid_sentinel_merges_to_identity() {
        let mut b = TaggedAabb::invalid();
        assert!(!b.is_valid());
        let other = TaggedAabb::new(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 1.0, 1.0));
        b.merge(&other);
        assert!(b.is_valid());
        assert_eq!(b.aabb.mins, other.aabb.mins);
        assert_eq!(b.aabb.maxs, other.aabb.maxs);
    }

    #[test]
    fn longest_axis_and_midpoint() {
        let b = TaggedAabb::new(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 4.0, 2.0));
        assert_eq!(b.longest_axis(), 1);
        assert_eq!(b.mid(1), 2.0);
        assert_eq!(b.extent(2), 2.0);
        assert_eq!(b.volume(), 8.0);
    }
}
