use super::desc::{BindingLimits, Capabilities};

/// Bootstrap parameters for [`super::WgpuDevice::request`].
///
/// Keep this structure minimal. Add flags only when a concrete backend
/// requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Discrete GPUs are preferred for ray tracing workloads.
    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter (e.g. llvmpipe / WARP) when available.
    pub force_fallback_adapter: bool,

    /// Features requested on top of the ones the adapter reports as optional.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// Configuration of a [`super::HeadlessDevice`].
#[derive(Debug, Clone)]
pub struct HeadlessInit {
    pub label: String,
    pub capabilities: Capabilities,
    pub limits: BindingLimits,

    /// Threads per group reported for every kernel.
    pub thread_execution_width: [u32; 2],

    /// Kernel function names the device can resolve.
    pub kernels: Vec<String>,
}

impl HeadlessInit {
    /// Default headless device exporting `kernels`.
    pub fn with_kernels<I, S>(kernels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kernels: kernels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl Default for HeadlessInit {
    fn default() -> Self {
        Self {
            label: "headless".to_owned(),
            capabilities: Capabilities::all(),
            limits: BindingLimits::default(),
            thread_execution_width: [8, 8],
            kernels: Vec::new(),
        }
    }
}
