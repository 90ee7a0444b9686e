use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result as AnyResult};
use wgpu::util::DeviceExt;

use super::desc::{
    AddressMode, BindingLimits, BufferUsage, Capabilities, FilterMode, SamplerDesc, TextureDesc,
    TextureUsage,
};
use super::init::WgpuInit;
use super::kernel::KernelLibrary;
use super::{Dispatch, GpuDevice, SubmissionIndex};
use crate::binding::Binding;
use crate::error::{ComputeError, Result};

/// Texture plus its default view; equality is allocation identity.
#[derive(Debug, Clone)]
pub struct WgpuTexture {
    id: u64,
    texture: Arc<wgpu::Texture>,
    view: Arc<wgpu::TextureView>,
}

impl WgpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View covering the whole texture, for compositing passes.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl PartialEq for WgpuTexture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct WgpuSampler {
    id: u64,
    sampler: Arc<wgpu::Sampler>,
}

impl WgpuSampler {
    pub fn raw(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

impl PartialEq for WgpuSampler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct WgpuBuffer {
    id: u64,
    buffer: Arc<wgpu::Buffer>,
}

impl WgpuBuffer {
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl PartialEq for WgpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug)]
pub struct WgpuKernel {
    name: String,
    pipeline: wgpu::ComputePipeline,
    workgroup_size: [u32; 2],
}

impl WgpuKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct LoadedLibrary {
    library: KernelLibrary,
    module: wgpu::ShaderModule,
}

/// wgpu-backed device.
///
/// Owns handles to a `wgpu::Device`/`wgpu::Queue` pair created elsewhere (or by
/// [`WgpuDevice::request`]) plus the kernel libraries registered on it.
pub struct WgpuDevice {
    label: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,
    limits: BindingLimits,
    libraries: Vec<LoadedLibrary>,
    next_id: AtomicU64,
    submissions: AtomicU64,
}

impl WgpuDevice {
    /// Wraps an existing device/queue pair.
    pub fn from_parts(
        label: impl Into<String>,
        device: wgpu::Device,
        queue: wgpu::Queue,
        capabilities: Capabilities,
    ) -> Self {
        let wgpu_limits = device.limits();
        let limits = BindingLimits {
            textures: wgpu_limits
                .max_sampled_textures_per_shader_stage
                .saturating_add(wgpu_limits.max_storage_textures_per_shader_stage),
            samplers: wgpu_limits.max_samplers_per_shader_stage,
            buffers: wgpu_limits
                .max_storage_buffers_per_shader_stage
                .saturating_add(wgpu_limits.max_uniform_buffers_per_shader_stage),
        }
        .clamped();
        let limits = BindingLimits {
            buffers: limits.buffers.min(BindingLimits::default().buffers),
            ..limits
        };

        Self {
            label: label.into(),
            device,
            queue,
            capabilities,
            limits,
            libraries: Vec::new(),
            next_id: AtomicU64::new(1),
            submissions: AtomicU64::new(0),
        }
    }

    /// Creates a headless (surface-less) device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn request(init: WgpuInit) -> AnyResult<Self> {
        let WgpuInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let capabilities = adapter_capabilities(&adapter);
        log::info!(
            "using adapter {} ({:?}), capabilities {:?}",
            info.name,
            info.backend,
            capabilities
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("penumbra device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        Ok(Self::from_parts(info.name, device, queue, capabilities))
    }

    /// Compiles `library` and makes its entry points resolvable.
    pub fn with_library(mut self, library: KernelLibrary) -> Self {
        self.register_library(library);
        self
    }

    pub fn with_libraries(mut self, libraries: impl IntoIterator<Item = KernelLibrary>) -> Self {
        for library in libraries {
            self.register_library(library);
        }
        self
    }

    fn register_library(&mut self, library: KernelLibrary) {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(library.label.as_ref()),
                source: wgpu::ShaderSource::Wgsl(library.source.clone()),
            });
        log::debug!(
            "registered kernel library `{}` ({} entry points)",
            library.label,
            library.entry_points.len()
        );
        self.libraries.push(LoadedLibrary { library, module });
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("label", &self.label)
            .field("capabilities", &self.capabilities)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn adapter_capabilities(adapter: &wgpu::Adapter) -> Capabilities {
    let mut caps = Capabilities::empty();
    let downlevel = adapter.get_downlevel_capabilities();
    if downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        // r32float / rgba16float / rgba32float storage writes are core WebGPU.
        caps |= Capabilities::COMPUTE | Capabilities::STORAGE_TEXTURE | Capabilities::FLOAT32_STORAGE;
    }
    if adapter.features().contains(wgpu::Features::EXPERIMENTAL_RAY_QUERY) {
        caps |= Capabilities::RAY_QUERY;
    }
    caps
}

fn texture_usages(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    out
}

impl GpuDevice for WgpuDevice {
    type Texture = WgpuTexture;
    type Sampler = WgpuSampler;
    type Buffer = WgpuBuffer;
    type Kernel = WgpuKernel;
    type Recorder = wgpu::CommandEncoder;

    fn label(&self) -> &str {
        &self.label
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn binding_limits(&self) -> BindingLimits {
        self.limits
    }

    fn load_kernel(&self, function: &str, aux_parameter: bool) -> Result<WgpuKernel> {
        let Some((loaded, entry)) = self
            .libraries
            .iter()
            .find_map(|l| l.library.find(function).map(|e| (l, e)))
        else {
            return Err(ComputeError::KernelNotFound {
                function: function.to_owned(),
                device: self.label.clone(),
            });
        };

        // Layout is derived from the shader, so binding numbers must follow
        // the slot mapping in `crate::binding`.
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(function),
                layout: None,
                module: &loaded.module,
                entry_point: Some(function),
                compilation_options: Default::default(),
                cache: None,
            });

        log::debug!(
            "kernel `{function}` loaded from `{}` (workgroup {:?}, aux parameter: {aux_parameter})",
            loaded.library.label,
            entry.workgroup_size
        );

        Ok(WgpuKernel {
            name: function.to_owned(),
            pipeline,
            workgroup_size: entry.workgroup_size,
        })
    }

    fn thread_execution_width(&self, kernel: &WgpuKernel) -> [u32; 2] {
        kernel.workgroup_size
    }

    fn create_recorder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn create_texture(&self, desc: &TextureDesc) -> WgpuTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: texture_usages(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        WgpuTexture {
            id: self.allocate_id(),
            texture: Arc::new(texture),
            view: Arc::new(view),
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> WgpuSampler {
        let filter = match desc.filter {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let address_mode = match desc.address_mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label.as_str()),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        });

        WgpuSampler {
            id: self.allocate_id(),
            sampler: Arc::new(sampler),
        }
    }

    fn create_buffer(&self, label: &str, contents: &[u8], usage: BufferUsage) -> WgpuBuffer {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: buffer_usages(usage),
            });

        WgpuBuffer {
            id: self.allocate_id(),
            buffer: Arc::new(buffer),
        }
    }

    fn record_dispatch(
        &self,
        recorder: &mut wgpu::CommandEncoder,
        dispatch: Dispatch<'_, Self>,
    ) -> Result<()> {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = dispatch
            .state
            .iter()
            .map(|(slot, binding)| wgpu::BindGroupEntry {
                binding: slot.binding_number(),
                resource: match binding {
                    Binding::TargetTexture(t) | Binding::Texture(t) => {
                        wgpu::BindingResource::TextureView(t.view())
                    }
                    Binding::Sampler(s) => wgpu::BindingResource::Sampler(s.raw()),
                    Binding::Buffer { buffer, offset } => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: buffer.raw(),
                            offset: *offset,
                            size: None,
                        })
                    }
                },
            })
            .collect();

        // Validation failures must come back as errors, not reach the
        // uncaptured-error handler; nothing is recorded when the group is invalid.
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = (!entries.is_empty()).then(|| {
            let layout = dispatch.kernel.pipeline.get_bind_group_layout(0);
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(dispatch.label),
                layout: &layout,
                entries: &entries,
            })
        });
        if let Some(error) = pollster::block_on(scope.pop()) {
            log::debug!("`{}`: bind group rejected: {error}", dispatch.kernel.name);
            return Err(ComputeError::InvalidBinding {
                kernel: dispatch.kernel.name.clone(),
                message: error.to_string(),
            });
        }

        let mut pass = recorder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(dispatch.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&dispatch.kernel.pipeline);
        if let Some(bind_group) = &bind_group {
            pass.set_bind_group(0, bind_group, &[]);
        }
        let [x, y, z] = dispatch.groups;
        pass.dispatch_workgroups(x, y, z);

        Ok(())
    }

    fn submit(&self, recorder: wgpu::CommandEncoder) -> SubmissionIndex {
        self.queue.submit(std::iter::once(recorder.finish()));
        SubmissionIndex(self.submissions.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::command::CommandQueue;
    use crate::device::TextureFormat;
    use crate::pipeline::ComputePipeline;

    const FILL_WGSL: &str = "
@group(0) @binding(0) var target_tex: texture_storage_2d<rgba16float, write>;

@compute @workgroup_size(8, 8)
fn fill(@builtin(global_invocation_id) id: vec3<u32>) {
    textureStore(target_tex, vec2<i32>(id.xy), vec4<f32>(1.0));
}
";

    /// A wgpu device with the `fill` kernel, or `None` on machines without an adapter.
    fn device() -> Option<Arc<WgpuDevice>> {
        let init = WgpuInit {
            force_fallback_adapter: true,
            ..WgpuInit::default()
        };
        let device = pollster::block_on(WgpuDevice::request(init))
            .or_else(|_| pollster::block_on(WgpuDevice::request(WgpuInit::default())))
            .ok()?;
        let library = KernelLibrary::wgsl("fill", FILL_WGSL).entry_point("fill", [8, 8]);
        Some(Arc::new(device.with_library(library)))
    }

    fn target(device: &WgpuDevice, label: &str) -> WgpuTexture {
        device.create_texture(&TextureDesc::storage(label, 16, 16, TextureFormat::Rgba16Float))
    }

    // ── bind group validation ─────────────────────────────────────────────

    #[test]
    fn undeclared_binding_is_an_error() {
        let Some(device) = device() else {
            eprintln!("no wgpu adapter; skipping");
            return;
        };
        let queue = CommandQueue::new(Arc::clone(&device), "q");
        let pipeline = ComputePipeline::new(&device, "fill", false).unwrap();
        let mut cb = queue.command_buffer("cb");
        let out = target(&device, "out");
        let extra = target(&device, "extra");

        let mut encoder = pipeline.encoder(&mut cb).unwrap();
        encoder.set_target_texture(&out, 0).unwrap();
        // Inside the texture slot limit, but not declared by `fill`.
        encoder.set_texture(&extra, 3).unwrap();
        encoder.set_data_size([16, 16]).unwrap();

        match encoder.dispatch() {
            Err(ComputeError::InvalidBinding { kernel, .. }) => assert_eq!(kernel, "fill"),
            other => panic!("unexpected: {other:?}"),
        }
        drop(encoder);

        // The failed dispatch recorded nothing; the buffer is still usable.
        let mut encoder = pipeline.encoder(&mut cb).unwrap();
        encoder.set_target_texture(&out, 0).unwrap();
        encoder.set_data_size([16, 16]).unwrap();
        encoder.dispatch().unwrap();
        drop(encoder);
        assert_eq!(cb.dispatch_count(), 1);
        cb.commit().unwrap();
    }
}
