//! Ray-traced shadows and global illumination.
//!
//! [`RayTracingRenderer`] owns the scene-wide state (bounds, illumination
//! parameters, geometry, view) and one [`LightSourceShadow`] unit per
//! registered light. Every pass is recorded through `penumbra_compute`
//! pipelines into a caller-provided command buffer; textures handed back are
//! only populated once that buffer has been committed and has completed.

mod accel;
mod bounds;
mod error;
mod geometry;
mod illumination;
mod light;
mod mask;
mod renderer;
mod shadow;

pub mod kernels;

pub use accel::{AccelerationStructure, Aabb, Bvh, BvhNode, GpuTriangle};
pub use bounds::SceneBounds;
pub use error::{RayTracingError, Result};
pub use geometry::{SceneGeometry, Triangle, ViewParams};
pub use illumination::{GlobalIlluminationParam, IlluminationResult};
pub use light::{DirectionalLight, LightKind, LightSource, LightState, PointLight};
pub use mask::SceneMask;
pub use renderer::{FrameOutputs, RayTracingRenderer, RendererConfig, REQUIRED_CAPABILITIES};
pub use shadow::{LightSourceShadow, ShadowKey};
