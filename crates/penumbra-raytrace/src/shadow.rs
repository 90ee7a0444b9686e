use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use penumbra_compute::device::{TextureDesc, TextureFormat};
use penumbra_compute::{CommandBuffer, ComputePipeline, GpuDevice};

use crate::accel::AccelerationStructure;
use crate::bounds::SceneBounds;
use crate::error::Result;
use crate::geometry::ViewParams;
use crate::light::{LightSource, LightState};
use crate::mask::SceneMask;

/// What a cached shadow texture was produced from.
///
/// `generation` covers every scene-wide input (bounds, illumination
/// parameters, geometry, view, resolution).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShadowKey {
    pub mask: SceneMask,
    pub generation: u64,
    pub light: LightState,
}

/// Matches `ShadowUniform` in `shadow.wgsl` (160 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct ShadowUniform {
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz: eye, w: ray extent.
    pub eye: [f32; 4],
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub light_vector: [f32; 4],
    /// intensity, soften, bias, unused.
    pub light_params: [f32; 4],
    pub resolution: [u32; 2],
    pub mask: u32,
    pub samples: u32,
}

/// Inputs shared by every light's shadow pass within one generation.
pub(crate) struct ShadowPass<'a, D: GpuDevice> {
    pub pipeline: &'a ComputePipeline<D>,
    pub accel: &'a AccelerationStructure<D>,
    pub bounds: &'a SceneBounds,
    pub view: &'a ViewParams,
    pub resolution: [u32; 2],
    pub samples: u32,
}

struct ShadowTexture<D: GpuDevice> {
    texture: D::Texture,
    key: ShadowKey,
}

/// Shadow state of one registered light.
///
/// Holds at most one texture, the one for the last requested key.
pub struct LightSourceShadow<D: GpuDevice> {
    index: u32,
    light: Arc<dyn LightSource>,
    cached: Option<ShadowTexture<D>>,
    regenerations: u64,
}

impl<D: GpuDevice> LightSourceShadow<D> {
    pub fn new(index: u32, light: Arc<dyn LightSource>) -> Self {
        Self {
            index,
            light,
            cached: None,
            regenerations: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn light(&self) -> &Arc<dyn LightSource> {
        &self.light
    }

    /// Key a shadow for `mask` would be cached under right now.
    pub fn key(&self, mask: SceneMask, generation: u64) -> ShadowKey {
        ShadowKey {
            mask,
            generation,
            light: self.light.snapshot(),
        }
    }

    /// The cached texture, if it was produced for `key`.
    pub fn cached(&self, key: &ShadowKey) -> Option<&D::Texture> {
        self.cached
            .as_ref()
            .filter(|cached| cached.key == *key)
            .map(|cached| &cached.texture)
    }

    /// Number of shadow textures this unit has generated.
    pub fn regenerations(&self) -> u64 {
        self.regenerations
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Returns the shadow for `key`, recording a new shadow pass unless cached.
    ///
    /// A regenerated shadow always lives in a fresh texture; handles returned
    /// earlier stay valid but are never returned again.
    pub(crate) fn shadow(
        &mut self,
        pass: ShadowPass<'_, D>,
        command_buffer: &mut CommandBuffer<D>,
        key: ShadowKey,
    ) -> Result<D::Texture> {
        if let Some(texture) = self.cached(&key) {
            log::trace!("light {}: shadow cache hit ({:?})", self.index, key.mask);
            return Ok(texture.clone());
        }

        let device = pass.pipeline.device();
        let [width, height] = pass.resolution;
        let texture = device.create_texture(&TextureDesc::storage(
            format!("shadow {}", self.index),
            width,
            height,
            TextureFormat::R32Float,
        ));

        let uniform = ShadowUniform {
            inv_view_proj: pass.view.inverse_view_projection.to_cols_array_2d(),
            eye: pass
                .view
                .eye
                .extend(pass.bounds.ray_extent(pass.view.eye))
                .to_array(),
            bounds_min: pass.bounds.min().extend(0.0).to_array(),
            bounds_max: pass.bounds.max().extend(0.0).to_array(),
            light_vector: key.light.light_vector(),
            light_params: key.light.light_params(),
            resolution: pass.resolution,
            mask: key.mask.bits(),
            samples: pass.samples.max(1),
        };

        let mut encoder = pass.pipeline.encoder(command_buffer)?;
        encoder.push_parameter_state(format!("shadow {}", self.index))?;
        encoder.set_target_texture(&texture, 0)?;
        encoder.set_buffer(pass.accel.nodes(), 0, 0)?;
        encoder.set_buffer(pass.accel.triangles(), 0, 1)?;
        encoder.set_parameter(&uniform)?;
        encoder.set_data_size(pass.resolution)?;
        encoder.dispatch()?;
        drop(encoder);

        self.regenerations += 1;
        log::debug!(
            "light {}: shadow regenerated ({:?}, generation {}, {width}x{height})",
            self.index,
            key.mask,
            key.generation
        );

        self.cached = Some(ShadowTexture {
            texture: texture.clone(),
            key,
        });
        Ok(texture)
    }
}

impl<D: GpuDevice> fmt::Debug for LightSourceShadow<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightSourceShadow")
            .field("index", &self.index)
            .field("light", &self.light)
            .field("cached", &self.cached.as_ref().map(|c| c.key))
            .finish()
    }
}
