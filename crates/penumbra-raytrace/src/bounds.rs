use glam::Vec3;

use crate::accel::Aabb;

/// Axis-aligned volume the ray tracer works in.
///
/// Corners are kept ordered: `min <= max` componentwise.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SceneBounds {
    min: Vec3,
    max: Vec3,
}

impl SceneBounds {
    /// Bounds spanning two corners, in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Cube of half-size `half_extent` around the origin.
    pub fn cube(half_extent: f32) -> Self {
        Self::new(Vec3::splat(-half_extent), Vec3::splat(half_extent))
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn overlaps(&self, aabb: &Aabb) -> bool {
        let (lo, hi) = (Vec3::from(aabb.min), Vec3::from(aabb.max));
        lo.cmple(self.max).all() && hi.cmpge(self.min).all()
    }

    /// Longest distance a ray starting at `origin` travels through the bounds.
    pub fn ray_extent(&self, origin: Vec3) -> f32 {
        origin.distance(self.center()) + self.diagonal()
    }
}

impl Default for SceneBounds {
    fn default() -> Self {
        Self::cube(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_ordered() {
        let b = SceneBounds::new(Vec3::new(10.0, -10.0, 3.0), Vec3::new(-10.0, 10.0, -3.0));
        assert_eq!(b.min(), Vec3::new(-10.0, -10.0, -3.0));
        assert_eq!(b.max(), Vec3::new(10.0, 10.0, 3.0));
    }

    #[test]
    fn overlap_is_inclusive() {
        let b = SceneBounds::cube(5.0);
        let touching = Aabb {
            min: [5.0, 0.0, 0.0],
            max: [6.0, 1.0, 1.0],
        };
        let outside = Aabb {
            min: [5.1, 0.0, 0.0],
            max: [6.0, 1.0, 1.0],
        };
        assert!(b.overlaps(&touching));
        assert!(!b.overlaps(&outside));
        assert!(b.contains_point(Vec3::ZERO));
    }

    #[test]
    fn ray_extent_covers_volume() {
        let b = SceneBounds::cube(1.0);
        let eye = Vec3::new(0.0, 0.0, 10.0);
        assert!(b.ray_extent(eye) >= 10.0 + b.diagonal() * 0.5);
    }
}
