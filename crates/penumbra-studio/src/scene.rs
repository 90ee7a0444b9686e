use std::sync::Arc;

use glam::Vec3;
use penumbra_raytrace::{
    DirectionalLight, LightSource, PointLight, SceneBounds, SceneGeometry, SceneMask, ViewParams,
};

/// Demo content: a unit box resting on a virtual ground plane, lit by a sun
/// and a soft point lamp.
pub struct DemoScene {
    pub bounds: SceneBounds,
    pub geometry: SceneGeometry,
    pub lights: Vec<(u32, Arc<dyn LightSource>)>,
}

impl DemoScene {
    pub fn new() -> Self {
        let mut geometry = SceneGeometry::new();
        geometry.add_box(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0), SceneMask::OPAQUE);
        geometry.add_box(
            Vec3::new(1.5, 0.0, 0.5),
            Vec3::new(2.5, 0.6, 1.5),
            SceneMask::TRANSLUCENT,
        );
        geometry.add_quad(
            [
                Vec3::new(-6.0, 0.0, 6.0),
                Vec3::new(6.0, 0.0, 6.0),
                Vec3::new(6.0, 0.0, -6.0),
                Vec3::new(-6.0, 0.0, -6.0),
            ],
            SceneMask::VIRTUAL,
        );

        let sun: Arc<dyn LightSource> =
            Arc::new(DirectionalLight::new(Vec3::new(-0.4, -1.0, -0.3), 1.5).with_soften(0.05));
        let lamp: Arc<dyn LightSource> = Arc::new(PointLight {
            shadow_soften: 0.2,
            ..PointLight::new(Vec3::new(3.0, 4.0, 2.0), 4.0)
        });

        Self {
            bounds: SceneBounds::new(Vec3::new(-6.0, -0.5, -6.0), Vec3::new(6.0, 6.0, 6.0)),
            geometry,
            lights: vec![(0, sun), (1, lamp)],
        }
    }

    /// Camera orbiting the box; `angle` in radians.
    pub fn view(angle: f32, aspect: f32) -> ViewParams {
        let eye = Vec3::new(angle.cos() * 7.0, 4.0, angle.sin() * 7.0);
        ViewParams::look_at(eye, Vec3::new(0.0, 0.8, 0.0), Vec3::Y, 0.9, aspect)
    }
}

impl Default for DemoScene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_fits_bounds() {
        let scene = DemoScene::new();
        let extent = scene.geometry.bounds().unwrap();
        assert!(scene.bounds.overlaps(&extent));
        assert_eq!(scene.geometry.len(), 12 + 12 + 2);
    }

    #[test]
    fn view_looks_at_box() {
        let a = DemoScene::view(0.0, 1.5);
        let b = DemoScene::view(1.0, 1.5);
        assert_ne!(a.eye, b.eye);
        assert!((a.eye.length() - b.eye.length()).abs() < 1e-4);
    }
}
