//! Progressive global illumination.
//!
//! Each frame traces a few ambient-occlusion and bounce rays per pixel and
//! blends them into a running average held in two ping-pong textures. The
//! average restarts whenever anything it depends on changes.

use bytemuck::{Pod, Zeroable};
use penumbra_compute::device::{TextureDesc, TextureFormat};
use penumbra_compute::{CommandBuffer, ComputePipeline, GpuDevice};

use crate::accel::AccelerationStructure;
use crate::bounds::SceneBounds;
use crate::error::Result;
use crate::geometry::ViewParams;
use crate::light::LightState;
use crate::mask::SceneMask;

/// Illumination controls, supplied by the caller per frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlobalIlluminationParam {
    /// Ambient light reaching fully unoccluded surfaces.
    pub ambient_density: f32,
    /// Maximum distance an occluder is searched for.
    pub ambient_radius: f32,
    /// Scale applied to the final illumination.
    pub illumination_strength: f32,
    pub samples_per_frame: u32,
    /// Path length including the primary hit; 1 disables indirect bounces.
    pub bounce_depth: u32,
}

impl Default for GlobalIlluminationParam {
    fn default() -> Self {
        Self {
            ambient_density: 0.3,
            ambient_radius: 1.0,
            illumination_strength: 1.0,
            samples_per_frame: 4,
            bounce_depth: 2,
        }
    }
}

/// Latest accumulated illumination.
#[derive(Debug)]
pub struct IlluminationResult<D: GpuDevice> {
    pub texture: D::Texture,
    /// Frames averaged into `texture`, this one included.
    pub frame_count: u32,
}

impl<D: GpuDevice> Clone for IlluminationResult<D> {
    fn clone(&self) -> Self {
        Self {
            texture: self.texture.clone(),
            frame_count: self.frame_count,
        }
    }
}

/// Matches `IlluminationUniform` in `illumination.wgsl` (128 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct IlluminationUniform {
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz: eye, w: ray extent.
    pub eye: [f32; 4],
    /// density, radius, strength, blend weight of this frame.
    pub ambient: [f32; 4],
    pub resolution: [u32; 2],
    pub mask: u32,
    pub samples: u32,
    pub bounce_depth: u32,
    pub frame: u32,
    pub light_count: u32,
    pub _pad: u32,
}

/// Light record in the illumination kernel's light buffer (32 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct GpuLight {
    pub vector: [f32; 4],
    pub params: [f32; 4],
}

impl From<&LightState> for GpuLight {
    fn from(state: &LightState) -> Self {
        Self {
            vector: state.light_vector(),
            params: state.light_params(),
        }
    }
}

/// Everything a running average depends on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IlluminationKey {
    pub generation: u64,
    pub mask: SceneMask,
    pub lights: Vec<(u32, LightState)>,
}

/// Inputs of one accumulation step.
pub(crate) struct IlluminationPass<'a, D: GpuDevice> {
    pub pipeline: &'a ComputePipeline<D>,
    pub accel: &'a AccelerationStructure<D>,
    pub bounds: &'a SceneBounds,
    pub view: &'a ViewParams,
    pub params: &'a GlobalIlluminationParam,
    pub resolution: [u32; 2],
}

pub(crate) struct IlluminationAccumulator<D: GpuDevice> {
    key: Option<IlluminationKey>,
    /// `[history, target]`; swapped after every step.
    textures: Option<[D::Texture; 2]>,
    frame_count: u32,
}

impl<D: GpuDevice> IlluminationAccumulator<D> {
    pub fn new() -> Self {
        Self {
            key: None,
            textures: None,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Drops the running average; the next step starts over.
    pub fn reset(&mut self) {
        if self.textures.is_some() {
            log::debug!("illumination accumulation reset after {} frames", self.frame_count);
        }
        self.key = None;
        self.textures = None;
        self.frame_count = 0;
    }

    /// Records one accumulation step and returns the updated average.
    pub fn step(
        &mut self,
        pass: IlluminationPass<'_, D>,
        command_buffer: &mut CommandBuffer<D>,
        key: IlluminationKey,
        lights: &[GpuLight],
    ) -> Result<IlluminationResult<D>> {
        if self.key.as_ref() != Some(&key) {
            self.reset();
        }

        let device = pass.pipeline.device();
        let [width, height] = pass.resolution;
        let [history, target] = self.textures.get_or_insert_with(|| {
            [0, 1].map(|i| {
                device.create_texture(&TextureDesc::storage(
                    format!("illumination {i}"),
                    width,
                    height,
                    TextureFormat::Rgba16Float,
                ))
            })
        });

        let mut light_records = lights.to_vec();
        if light_records.is_empty() {
            light_records.push(GpuLight::zeroed());
        }
        let light_buffer = device.create_buffer(
            "illumination lights",
            bytemuck::cast_slice(&light_records),
            penumbra_compute::device::BufferUsage::STORAGE,
        );

        let params = pass.params;
        let frame = self.frame_count;
        let uniform = IlluminationUniform {
            inv_view_proj: pass.view.inverse_view_projection.to_cols_array_2d(),
            eye: pass
                .view
                .eye
                .extend(pass.bounds.ray_extent(pass.view.eye))
                .to_array(),
            ambient: [
                params.ambient_density,
                params.ambient_radius,
                params.illumination_strength,
                1.0 / (frame as f32 + 1.0),
            ],
            resolution: pass.resolution,
            mask: key.mask.bits(),
            samples: params.samples_per_frame.max(1),
            bounce_depth: params.bounce_depth.max(1),
            frame,
            light_count: lights.len() as u32,
            _pad: 0,
        };

        let mut encoder = pass.pipeline.encoder(command_buffer)?;
        encoder.set_target_texture(target, 0)?;
        encoder.set_texture(history, 1)?;
        encoder.set_buffer(pass.accel.nodes(), 0, 0)?;
        encoder.set_buffer(pass.accel.triangles(), 0, 1)?;
        encoder.set_buffer(&light_buffer, 0, 2)?;
        encoder.set_parameter(&uniform)?;
        encoder.set_data_size(pass.resolution)?;
        encoder.dispatch()?;
        drop(encoder);

        let result = IlluminationResult {
            texture: target.clone(),
            frame_count: frame + 1,
        };
        std::mem::swap(history, target);
        self.frame_count = frame + 1;
        self.key = Some(key);

        log::trace!("illumination frame {} recorded", self.frame_count);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<IlluminationUniform>(), 128);
        assert_eq!(std::mem::size_of::<GpuLight>(), 32);
    }

    #[test]
    fn keys_differ_by_mask_and_lights() {
        let base = IlluminationKey {
            generation: 1,
            mask: SceneMask::ALL,
            lights: Vec::new(),
        };
        let masked = IlluminationKey {
            mask: SceneMask::OPAQUE,
            ..base.clone()
        };
        assert_ne!(base, masked);
        assert_eq!(base, base.clone());
    }
}
