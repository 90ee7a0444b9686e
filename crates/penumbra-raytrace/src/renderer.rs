use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use penumbra_compute::device::Capabilities;
use penumbra_compute::{CommandBuffer, CommandQueue, ComputePipeline, GpuDevice};

use crate::accel::AccelerationStructure;
use crate::bounds::SceneBounds;
use crate::error::{RayTracingError, Result};
use crate::geometry::{SceneGeometry, ViewParams};
use crate::illumination::{
    GlobalIlluminationParam, GpuLight, IlluminationAccumulator, IlluminationKey, IlluminationPass,
    IlluminationResult,
};
use crate::kernels::{ILLUMINATION_KERNEL, SHADOW_KERNEL};
use crate::light::LightSource;
use crate::mask::SceneMask;
use crate::shadow::{LightSourceShadow, ShadowPass};

/// Device features the ray tracing kernels need (BVH traversal runs in compute).
pub const REQUIRED_CAPABILITIES: Capabilities = Capabilities::COMPUTE
    .union(Capabilities::STORAGE_TEXTURE)
    .union(Capabilities::FLOAT32_STORAGE);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RendererConfig {
    /// Size of every shadow and illumination texture.
    pub resolution: [u32; 2],

    /// Shadow rays per pixel; only useful with soft lights.
    pub shadow_samples: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            resolution: [1024, 1024],
            shadow_samples: 1,
        }
    }
}

/// Textures produced for one frame by [`RayTracingRenderer::render`].
pub struct FrameOutputs<D: GpuDevice> {
    pub shadows: BTreeMap<u32, D::Texture>,
    pub illumination: IlluminationResult<D>,
}

impl<D: GpuDevice> fmt::Debug for FrameOutputs<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameOutputs")
            .field("shadows", &self.shadows)
            .field("illumination_frames", &self.illumination.frame_count)
            .finish()
    }
}

/// Ray traced shadows and global illumination over a bounded scene.
///
/// Scene-wide inputs (bounds, illumination parameters, geometry, view,
/// resolution) share one generation counter: every write bumps it, and every
/// cached shadow or illumination average from an older generation is stale.
/// Light registrations only affect their own shadow unit and the
/// illumination average.
///
/// Meant to be driven from one thread per frame.
pub struct RayTracingRenderer<D: GpuDevice> {
    device: Arc<D>,
    config: RendererConfig,
    shadow_pipeline: ComputePipeline<D>,
    illumination_pipeline: ComputePipeline<D>,

    scene_bounds: SceneBounds,
    global_illum: GlobalIlluminationParam,
    geometry: SceneGeometry,
    view: ViewParams,
    generation: u64,

    /// `None` until first needed or after bounds/geometry changed.
    accel: Option<AccelerationStructure<D>>,
    lights: BTreeMap<u32, LightSourceShadow<D>>,
    illumination: IlluminationAccumulator<D>,
}

impl<D: GpuDevice> RayTracingRenderer<D> {
    pub fn new(queue: &CommandQueue<D>) -> Result<Self> {
        Self::with_config(queue, RendererConfig::default())
    }

    /// Creates the shadow and illumination pipelines on the queue's device.
    pub fn with_config(queue: &CommandQueue<D>, config: RendererConfig) -> Result<Self> {
        let device = queue.device();

        let missing = REQUIRED_CAPABILITIES.difference(device.capabilities());
        if !missing.is_empty() {
            log::error!("device `{}` lacks {:?}", device.label(), missing);
            return Err(RayTracingError::DeviceInitialization {
                device: device.label().to_owned(),
                missing,
            });
        }

        let shadow_pipeline = ComputePipeline::new(device, SHADOW_KERNEL, true)?;
        let illumination_pipeline = ComputePipeline::new(device, ILLUMINATION_KERNEL, true)?;

        log::info!(
            "ray tracing renderer ready on `{}` ({}x{})",
            device.label(),
            config.resolution[0],
            config.resolution[1]
        );

        Ok(Self {
            device: Arc::clone(device),
            config,
            shadow_pipeline,
            illumination_pipeline,
            scene_bounds: SceneBounds::default(),
            global_illum: GlobalIlluminationParam::default(),
            geometry: SceneGeometry::default(),
            view: ViewParams::default(),
            generation: 0,
            accel: None,
            lights: BTreeMap::new(),
            illumination: IlluminationAccumulator::new(),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Current scene generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames averaged into the current illumination result; 0 after an
    /// invalidation until the next step.
    pub fn illumination_frames(&self) -> u32 {
        self.illumination.frame_count()
    }

    // ── scene-wide state ──────────────────────────────────────────────────

    pub fn scene_bounds(&self) -> SceneBounds {
        self.scene_bounds
    }

    pub fn set_scene_bounds(&mut self, bounds: SceneBounds) {
        self.scene_bounds = bounds;
        self.accel = None;
        self.invalidate("scene bounds");
    }

    pub fn global_illum(&self) -> GlobalIlluminationParam {
        self.global_illum
    }

    pub fn set_global_illum(&mut self, params: GlobalIlluminationParam) {
        self.global_illum = params;
        self.invalidate("global illumination parameters");
    }

    pub fn scene_geometry(&self) -> &SceneGeometry {
        &self.geometry
    }

    pub fn set_scene_geometry(&mut self, geometry: SceneGeometry) {
        self.geometry = geometry;
        self.accel = None;
        self.invalidate("scene geometry");
    }

    pub fn view(&self) -> &ViewParams {
        &self.view
    }

    pub fn set_view(&mut self, view: ViewParams) {
        self.view = view;
        self.invalidate("view");
    }

    /// Changes the size of every texture produced from now on.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.resolution = [width.max(1), height.max(1)];
        self.invalidate("resolution");
    }

    fn invalidate(&mut self, cause: &str) {
        self.generation = self.generation.wrapping_add(1);
        for unit in self.lights.values_mut() {
            unit.invalidate();
        }
        self.illumination.reset();
        log::debug!("{cause} changed; generation {}", self.generation);
    }

    // ── lights ────────────────────────────────────────────────────────────

    /// Registers `light` at `index`, replacing (and discarding the shadow of)
    /// any light already there.
    pub fn set_light_source(&mut self, light: Arc<dyn LightSource>, index: u32) {
        let replaced = self
            .lights
            .insert(index, LightSourceShadow::new(index, light))
            .is_some();
        self.illumination.reset();
        log::debug!(
            "light {index} {}",
            if replaced { "replaced" } else { "registered" }
        );
    }

    pub fn remove_light_source(&mut self, index: u32) -> Option<Arc<dyn LightSource>> {
        let removed = self.lights.remove(&index)?;
        self.illumination.reset();
        log::debug!("light {index} removed");
        Some(Arc::clone(removed.light()))
    }

    pub fn light_source(&self, index: u32) -> Option<&Arc<dyn LightSource>> {
        self.lights.get(&index).map(LightSourceShadow::light)
    }

    /// Registered indices in ascending order.
    pub fn light_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.lights.keys().copied()
    }

    /// The shadow unit of the light at `index`.
    pub fn light_shadow(&self, index: u32) -> Option<&LightSourceShadow<D>> {
        self.lights.get(&index)
    }

    // ── passes ────────────────────────────────────────────────────────────

    /// Shadow texture of the light at `index`, restricted to `mask`.
    ///
    /// Returns the cached texture when mask, scene generation and light
    /// parameters are unchanged; otherwise records a shadow pass into
    /// `command_buffer` and returns a new texture that is populated once the
    /// buffer completes.
    pub fn shadow_for_light_source(
        &mut self,
        command_buffer: &mut CommandBuffer<D>,
        index: u32,
        mask: SceneMask,
    ) -> Result<D::Texture> {
        let unit = self
            .lights
            .get(&index)
            .ok_or(RayTracingError::UnknownLightIndex { index })?;
        let key = unit.key(mask, self.generation);
        if let Some(texture) = unit.cached(&key) {
            log::trace!("light {index}: shadow cache hit");
            return Ok(texture.clone());
        }

        let accel = ensure_accel(
            &mut self.accel,
            &self.device,
            &self.geometry,
            &self.scene_bounds,
            self.generation,
        );
        let pass = ShadowPass {
            pipeline: &self.shadow_pipeline,
            accel,
            bounds: &self.scene_bounds,
            view: &self.view,
            resolution: self.config.resolution,
            samples: self.config.shadow_samples,
        };
        let unit = self
            .lights
            .get_mut(&index)
            .ok_or(RayTracingError::UnknownLightIndex { index })?;
        unit.shadow(pass, command_buffer, key)
    }

    /// Records one progressive illumination step restricted to `mask`.
    pub fn global_illumination(
        &mut self,
        command_buffer: &mut CommandBuffer<D>,
        mask: SceneMask,
    ) -> Result<IlluminationResult<D>> {
        let snapshots: Vec<_> = self
            .lights
            .iter()
            .map(|(&index, unit)| (index, unit.light().snapshot()))
            .collect();
        let records: Vec<GpuLight> = snapshots.iter().map(|(_, state)| GpuLight::from(state)).collect();
        let key = IlluminationKey {
            generation: self.generation,
            mask,
            lights: snapshots,
        };

        let accel = ensure_accel(
            &mut self.accel,
            &self.device,
            &self.geometry,
            &self.scene_bounds,
            self.generation,
        );
        let pass = IlluminationPass {
            pipeline: &self.illumination_pipeline,
            accel,
            bounds: &self.scene_bounds,
            view: &self.view,
            params: &self.global_illum,
            resolution: self.config.resolution,
        };
        self.illumination.step(pass, command_buffer, key, &records)
    }

    /// Shadows for every registered light (ascending index) plus one
    /// illumination step, all recorded into `command_buffer`.
    pub fn render(
        &mut self,
        command_buffer: &mut CommandBuffer<D>,
        mask: SceneMask,
    ) -> Result<FrameOutputs<D>> {
        let indices: Vec<u32> = self.light_indices().collect();
        let mut shadows = BTreeMap::new();
        for index in indices {
            let texture = self.shadow_for_light_source(command_buffer, index, mask)?;
            shadows.insert(index, texture);
        }
        let illumination = self.global_illumination(command_buffer, mask)?;

        Ok(FrameOutputs {
            shadows,
            illumination,
        })
    }
}

/// Acceleration structure for `generation`, building it if missing.
///
/// The build uploads synchronously, so it is complete before any dependent
/// dispatch is recorded.
fn ensure_accel<'a, D: GpuDevice>(
    slot: &'a mut Option<AccelerationStructure<D>>,
    device: &D,
    geometry: &SceneGeometry,
    bounds: &SceneBounds,
    generation: u64,
) -> &'a AccelerationStructure<D> {
    slot.get_or_insert_with(|| AccelerationStructure::build(device, geometry, bounds, generation))
}

impl<D: GpuDevice> fmt::Debug for RayTracingRenderer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayTracingRenderer")
            .field("config", &self.config)
            .field("scene_bounds", &self.scene_bounds)
            .field("global_illum", &self.global_illum)
            .field("generation", &self.generation)
            .field("lights", &self.lights.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use penumbra_compute::device::{
        HeadlessDevice, HeadlessInit, HeadlessTexture, RecordedBinding, TextureFormat,
    };
    use penumbra_compute::{BindingSlot, ComputeError};

    use super::*;
    use crate::kernels::KERNEL_NAMES;
    use crate::light::{DirectionalLight, PointLight};

    fn queue() -> CommandQueue<HeadlessDevice> {
        let device = HeadlessDevice::new(HeadlessInit::with_kernels(KERNEL_NAMES));
        CommandQueue::new(Arc::new(device), "render")
    }

    fn renderer(queue: &CommandQueue<HeadlessDevice>) -> RayTracingRenderer<HeadlessDevice> {
        let config = RendererConfig {
            resolution: [64, 48],
            shadow_samples: 2,
        };
        let mut renderer = RayTracingRenderer::with_config(queue, config).unwrap();
        renderer.set_scene_bounds(SceneBounds::cube(10.0));

        let mut geometry = SceneGeometry::new();
        geometry.add_box(Vec3::splat(-1.0), Vec3::splat(1.0), SceneMask::OPAQUE);
        geometry.add_quad(
            [
                Vec3::new(-8.0, -1.0, 8.0),
                Vec3::new(8.0, -1.0, 8.0),
                Vec3::new(8.0, -1.0, -8.0),
                Vec3::new(-8.0, -1.0, -8.0),
            ],
            SceneMask::VIRTUAL,
        );
        renderer.set_scene_geometry(geometry);
        renderer
    }

    fn sun() -> Arc<dyn LightSource> {
        Arc::new(DirectionalLight::new(Vec3::new(-0.3, -1.0, -0.2), 2.0))
    }

    fn lamp() -> Arc<dyn LightSource> {
        Arc::new(PointLight::new(Vec3::new(2.0, 4.0, 1.0), 5.0))
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn missing_capability_fails_construction() {
        let init = HeadlessInit {
            capabilities: Capabilities::COMPUTE | Capabilities::RAY_QUERY,
            ..HeadlessInit::with_kernels(KERNEL_NAMES)
        };
        let q = CommandQueue::new(Arc::new(HeadlessDevice::new(init)), "q");

        match RayTracingRenderer::new(&q) {
            Err(RayTracingError::DeviceInitialization { device, missing }) => {
                assert_eq!(device, "headless");
                assert_eq!(
                    missing,
                    Capabilities::STORAGE_TEXTURE | Capabilities::FLOAT32_STORAGE
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_kernel_fails_construction() {
        let device = HeadlessDevice::new(HeadlessInit::with_kernels([SHADOW_KERNEL]));
        let q = CommandQueue::new(Arc::new(device), "q");

        assert!(matches!(
            RayTracingRenderer::new(&q),
            Err(RayTracingError::Compute(ComputeError::KernelNotFound { .. }))
        ));
    }

    // ── light registry ────────────────────────────────────────────────────

    #[test]
    fn unknown_index_is_reported() {
        let q = queue();
        let mut r = renderer(&q);
        let mut cb = q.command_buffer("frame");
        r.set_light_source(sun(), 0);

        assert_eq!(
            r.shadow_for_light_source(&mut cb, 3, SceneMask::ALL),
            Err(RayTracingError::UnknownLightIndex { index: 3 })
        );
        assert_eq!(cb.dispatch_count(), 0);
    }

    #[test]
    fn indices_need_not_be_contiguous() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 7);
        r.set_light_source(lamp(), 2);

        assert_eq!(r.light_indices().collect::<Vec<_>>(), vec![2, 7]);
        assert!(r.remove_light_source(7).is_some());
        assert!(r.remove_light_source(7).is_none());
        assert_eq!(r.light_indices().collect::<Vec<_>>(), vec![2]);
    }

    // ── shadow caching ────────────────────────────────────────────────────

    #[test]
    fn bounds_change_regenerates_shadow() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_scene_bounds(SceneBounds::cube(10.0));
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");

        let t0 = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        let again = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        assert_eq!(t0, again);
        assert_eq!(cb.dispatch_count(), 1);

        r.set_scene_bounds(SceneBounds::cube(5.0));
        let t1 = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        assert_ne!(t0, t1);
        assert_eq!(cb.dispatch_count(), 2);
    }

    #[test]
    fn mask_change_forces_regeneration() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");

        let all = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        let opaque = r.shadow_for_light_source(&mut cb, 0, SceneMask::OPAQUE).unwrap();
        assert_ne!(all, opaque);
        let opaque_again = r.shadow_for_light_source(&mut cb, 0, SceneMask::OPAQUE).unwrap();
        assert_eq!(opaque, opaque_again);
        assert_eq!(r.light_shadow(0).unwrap().regenerations(), 2);
    }

    #[test]
    fn global_illum_change_invalidates_every_light() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        r.set_light_source(lamp(), 1);
        let mut cb = q.command_buffer("frame");

        let before: Vec<HeadlessTexture> = (0..2)
            .map(|i| r.shadow_for_light_source(&mut cb, i, SceneMask::ALL).unwrap())
            .collect();

        r.set_global_illum(GlobalIlluminationParam {
            samples_per_frame: 16,
            ..r.global_illum()
        });

        for (i, old) in before.iter().enumerate() {
            let new = r.shadow_for_light_source(&mut cb, i as u32, SceneMask::ALL).unwrap();
            assert_ne!(&new, old);
        }
    }

    #[test]
    fn replacing_a_light_leaves_other_shadows_cached() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        r.set_light_source(lamp(), 1);
        let mut cb = q.command_buffer("frame");

        let sun_shadow = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        let lamp_shadow = r.shadow_for_light_source(&mut cb, 1, SceneMask::ALL).unwrap();

        r.set_light_source(Arc::new(PointLight::new(Vec3::new(-3.0, 4.0, 0.0), 5.0)), 1);
        assert_eq!(
            r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap(),
            sun_shadow
        );
        assert_ne!(
            r.shadow_for_light_source(&mut cb, 1, SceneMask::ALL).unwrap(),
            lamp_shadow
        );
    }

    #[test]
    fn shadow_pass_binds_target_and_acceleration_structure() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(lamp(), 4);
        let mut cb = q.command_buffer("frame");

        let texture = r.shadow_for_light_source(&mut cb, 4, SceneMask::OPAQUE).unwrap();
        cb.commit().unwrap();

        assert_eq!(texture.desc().format, TextureFormat::R32Float);
        assert_eq!((texture.desc().width, texture.desc().height), (64, 48));

        let dispatches = q.device().submitted_dispatches();
        assert_eq!(dispatches.len(), 1);
        let shadow = &dispatches[0];
        assert_eq!(shadow.kernel, SHADOW_KERNEL);
        assert_eq!(shadow.label, "shadow 4");
        assert_eq!(shadow.groups, [8, 6, 1]);
        assert_eq!(
            shadow.binding(BindingSlot::texture(0)),
            Some(&RecordedBinding::TargetTexture(texture))
        );
        // Aux parameter, BVH nodes, BVH triangles.
        for slot in 0..3 {
            assert!(shadow.binding(BindingSlot::buffer(slot)).is_some());
        }
    }

    #[test]
    fn acceleration_structure_is_shared_between_lights() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        r.set_light_source(lamp(), 1);
        let mut cb = q.command_buffer("frame");

        r.render(&mut cb, SceneMask::ALL).unwrap();
        cb.commit().unwrap();

        let dispatches = q.device().submitted_dispatches();
        assert_eq!(dispatches.len(), 3);
        let nodes: Vec<_> = dispatches
            .iter()
            .map(|d| d.binding(BindingSlot::buffer(1)).and_then(RecordedBinding::buffer).cloned())
            .collect();
        assert!(nodes.iter().all(|n| n.is_some() && *n == nodes[0]));
    }

    #[test]
    fn moved_light_is_detected_through_snapshot() {
        #[derive(Debug)]
        struct Movable(std::sync::Mutex<Vec3>);

        impl LightSource for Movable {
            fn kind(&self) -> crate::light::LightKind {
                crate::light::LightKind::Point
            }
            fn position(&self) -> Vec3 {
                *self.0.lock().unwrap()
            }
            fn direction(&self) -> Vec3 {
                Vec3::ZERO
            }
            fn intensity(&self) -> f32 {
                1.0
            }
        }

        let q = queue();
        let mut r = renderer(&q);
        let light = Arc::new(Movable(std::sync::Mutex::new(Vec3::new(0.0, 5.0, 0.0))));
        r.set_light_source(light.clone(), 0);
        let mut cb = q.command_buffer("frame");

        let before = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        *light.0.lock().unwrap() = Vec3::new(1.0, 5.0, 0.0);
        let after = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn committed_buffer_is_rejected() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");
        cb.commit().unwrap();

        assert!(matches!(
            r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL),
            Err(RayTracingError::Compute(ComputeError::InvalidCommandBuffer { .. }))
        ));
        assert!(r.light_shadow(0).unwrap().regenerations() == 0);
    }

    // ── global illumination ───────────────────────────────────────────────

    #[test]
    fn illumination_accumulates_until_invalidated() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");

        let first = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        let second = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        let third = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(
            (first.frame_count, second.frame_count, third.frame_count),
            (1, 2, 3)
        );
        assert_ne!(first.texture, second.texture);
        assert_eq!(first.texture, third.texture);

        r.set_view(ViewParams::look_at(
            Vec3::new(4.0, 3.0, 6.0),
            Vec3::ZERO,
            Vec3::Y,
            1.0,
            4.0 / 3.0,
        ));
        let restarted = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(restarted.frame_count, 1);
        assert_ne!(restarted.texture, first.texture);
        assert_ne!(restarted.texture, second.texture);
    }

    #[test]
    fn scene_bounds_and_global_illum_restart_accumulation() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");

        r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        let before = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(r.illumination_frames(), 2);

        r.set_scene_bounds(SceneBounds::cube(5.0));
        assert_eq!(r.illumination_frames(), 0);
        let after_bounds = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(after_bounds.frame_count, 1);
        assert_ne!(after_bounds.texture, before.texture);

        r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        r.set_global_illum(GlobalIlluminationParam {
            ambient_radius: 2.5,
            ..r.global_illum()
        });
        assert_eq!(r.illumination_frames(), 0);
        let after_gi = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(after_gi.frame_count, 1);
        assert_ne!(after_gi.texture, after_bounds.texture);
        assert_eq!(r.illumination_frames(), 1);
    }

    #[test]
    fn illumination_reads_history_and_writes_target() {
        let q = queue();
        let mut r = renderer(&q);
        let mut cb = q.command_buffer("frame");

        let first = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        let second = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        cb.commit().unwrap();

        let dispatches = q.device().submitted_dispatches();
        let step = &dispatches[1];
        assert_eq!(step.kernel, ILLUMINATION_KERNEL);
        assert_eq!(
            step.binding(BindingSlot::texture(0)).and_then(RecordedBinding::texture),
            Some(&second.texture)
        );
        assert_eq!(
            step.binding(BindingSlot::texture(1)).and_then(RecordedBinding::texture),
            Some(&first.texture)
        );
        // Light buffer after the aux parameter and both BVH buffers.
        assert!(step.binding(BindingSlot::buffer(3)).is_some());
    }

    #[test]
    fn light_registration_restarts_accumulation() {
        let q = queue();
        let mut r = renderer(&q);
        let mut cb = q.command_buffer("frame");

        r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        r.set_light_source(lamp(), 0);
        let result = r.global_illumination(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(result.frame_count, 1);
    }

    #[test]
    fn render_produces_every_shadow() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 3);
        r.set_light_source(lamp(), 1);
        let mut cb = q.command_buffer("frame");

        let outputs = r.render(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(outputs.shadows.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(outputs.illumination.frame_count, 1);

        let again = r.render(&mut cb, SceneMask::ALL).unwrap();
        assert_eq!(again.shadows, outputs.shadows);
        assert_eq!(again.illumination.frame_count, 2);
    }

    #[test]
    fn resize_changes_texture_size() {
        let q = queue();
        let mut r = renderer(&q);
        r.set_light_source(sun(), 0);
        let mut cb = q.command_buffer("frame");

        r.resize(32, 16);
        let texture = r.shadow_for_light_source(&mut cb, 0, SceneMask::ALL).unwrap();
        assert_eq!((texture.desc().width, texture.desc().height), (32, 16));
    }
}
