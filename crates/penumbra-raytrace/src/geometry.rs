use glam::{Mat4, Vec3};

use crate::accel::Aabb;
use crate::mask::SceneMask;

/// A scene triangle tagged with the category it belongs to.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub mask: SceneMask,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, mask: SceneMask) -> Self {
        Self { v0, v1, v2, mask }
    }

    pub fn aabb(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        b.grow_point(self.v0.to_array());
        b.grow_point(self.v1.to_array());
        b.grow_point(self.v2.to_array());
        b
    }

    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Geometric normal following the winding order; zero for degenerate triangles.
    pub fn normal(&self) -> Vec3 {
        (self.v1 - self.v0)
            .cross(self.v2 - self.v0)
            .normalize_or_zero()
    }
}

/// Triangle soup handed over by the scene graph.
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    triangles: Vec<Triangle>,
}

impl SceneGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn push(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    /// Two triangles over corners given counter-clockwise.
    pub fn add_quad(&mut self, corners: [Vec3; 4], mask: SceneMask) {
        let [a, b, c, d] = corners;
        self.push(Triangle::new(a, b, c, mask));
        self.push(Triangle::new(a, c, d, mask));
    }

    /// Closed box with outward-facing triangles.
    pub fn add_box(&mut self, min: Vec3, max: Vec3, mask: SceneMask) {
        let (lo, hi) = (min.min(max), min.max(max));
        let corner = |x: bool, y: bool, z: bool| {
            Vec3::new(
                if x { hi.x } else { lo.x },
                if y { hi.y } else { lo.y },
                if z { hi.z } else { lo.z },
            )
        };

        let faces = [
            // +x, -x
            [(true, false, false), (true, true, false), (true, true, true), (true, false, true)],
            [(false, false, false), (false, false, true), (false, true, true), (false, true, false)],
            // +y, -y
            [(false, true, false), (false, true, true), (true, true, true), (true, true, false)],
            [(false, false, false), (true, false, false), (true, false, true), (false, false, true)],
            // +z, -z
            [(false, false, true), (true, false, true), (true, true, true), (false, true, true)],
            [(false, false, false), (false, true, false), (true, true, false), (true, false, false)],
        ];
        for face in faces {
            let [a, b, c, d] = face.map(|(x, y, z)| corner(x, y, z));
            self.add_quad([a, b, c, d], mask);
        }
    }

    /// Bounds of every triangle, or `None` when empty.
    pub fn bounds(&self) -> Option<Aabb> {
        if self.triangles.is_empty() {
            return None;
        }
        let mut b = Aabb::EMPTY;
        for t in &self.triangles {
            b.grow(&t.aabb());
        }
        Some(b)
    }
}

/// Camera used to generate primary rays.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewParams {
    pub eye: Vec3,
    pub inverse_view_projection: Mat4,
}

impl ViewParams {
    /// Right-handed perspective camera looking from `eye` at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y_radians: f32, aspect: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let projection = Mat4::perspective_rh(fov_y_radians, aspect.max(f32::EPSILON), 0.01, 1000.0);
        Self {
            eye,
            inverse_view_projection: (projection * view).inverse(),
        }
    }
}

impl Default for ViewParams {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            std::f32::consts::FRAC_PI_4,
            1.0,
        )
    }
}
