use std::fmt;

use glam::Vec3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LightKind {
    /// Parallel rays travelling along [`LightSource::direction`].
    Directional,
    /// Rays emitted from [`LightSource::position`].
    Point,
}

/// A light owned by the scene graph.
///
/// The renderer only reads it. Implementations may use interior mutability
/// (e.g. a light dragged in the viewer); changes are picked up through
/// [`LightSource::snapshot`] the next time a shadow is requested.
pub trait LightSource: fmt::Debug + Send + Sync {
    fn kind(&self) -> LightKind;

    /// World-space position; ignored for directional lights.
    fn position(&self) -> Vec3;

    /// Direction light travels in; ignored for point lights.
    fn direction(&self) -> Vec3;

    fn intensity(&self) -> f32;

    /// Angular spread used to jitter shadow rays; 0 gives hard shadows.
    fn shadow_soften(&self) -> f32 {
        0.0
    }

    /// Offset along the surface normal before tracing toward the light.
    fn shadow_bias(&self) -> f32 {
        1e-3
    }

    /// Every parameter affecting a shadow, for cache-key comparison.
    fn snapshot(&self) -> LightState {
        LightState {
            kind: self.kind(),
            position: self.position(),
            direction: self.direction(),
            intensity: self.intensity(),
            shadow_soften: self.shadow_soften(),
            shadow_bias: self.shadow_bias(),
        }
    }
}

/// Parameters of a light at one point in time.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightState {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub intensity: f32,
    pub shadow_soften: f32,
    pub shadow_bias: f32,
}

impl LightState {
    /// `xyz` = position (point) or normalized travel direction (directional), `w` = kind.
    pub(crate) fn light_vector(&self) -> [f32; 4] {
        match self.kind {
            LightKind::Directional => self.direction.normalize_or_zero().extend(0.0).to_array(),
            LightKind::Point => self.position.extend(1.0).to_array(),
        }
    }

    pub(crate) fn light_params(&self) -> [f32; 4] {
        [self.intensity, self.shadow_soften, self.shadow_bias, 0.0]
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub intensity: f32,
    pub shadow_soften: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            intensity,
            shadow_soften: 0.0,
        }
    }

    pub fn with_soften(self, shadow_soften: f32) -> Self {
        Self {
            shadow_soften,
            ..self
        }
    }
}

impl LightSource for DirectionalLight {
    fn kind(&self) -> LightKind {
        LightKind::Directional
    }

    fn position(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn direction(&self) -> Vec3 {
        self.direction
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn shadow_soften(&self) -> f32 {
        self.shadow_soften
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub intensity: f32,
    pub shadow_soften: f32,
    pub shadow_bias: f32,
}

impl PointLight {
    pub fn new(position: Vec3, intensity: f32) -> Self {
        Self {
            position,
            intensity,
            shadow_soften: 0.0,
            shadow_bias: 1e-3,
        }
    }
}

impl LightSource for PointLight {
    fn kind(&self) -> LightKind {
        LightKind::Point
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn direction(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn shadow_soften(&self) -> f32 {
        self.shadow_soften
    }

    fn shadow_bias(&self) -> f32 {
        self.shadow_bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_captures_parameters() {
        let light = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), 3.0).with_soften(0.1);
        let state = light.snapshot();
        assert_eq!(state.kind, LightKind::Directional);
        assert_eq!(state.intensity, 3.0);
        assert_eq!(state.light_vector(), [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(state.light_params(), [3.0, 0.1, 1e-3, 0.0]);
    }

    #[test]
    fn moved_light_changes_snapshot() {
        let mut light = PointLight::new(Vec3::new(1.0, 2.0, 3.0), 1.0);
        let before = light.snapshot();
        light.position.x += 0.5;
        assert_ne!(light.snapshot(), before);
        assert_eq!(light.snapshot().light_vector(), [1.5, 2.0, 3.0, 1.0]);
    }
}
