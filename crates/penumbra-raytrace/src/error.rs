use penumbra_compute::ComputeError;
use penumbra_compute::device::Capabilities;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RayTracingError {
    /// The device lacks a capability the renderer's kernels need.
    #[error("device `{device}` cannot run the ray tracing kernels (missing {missing:?})")]
    DeviceInitialization {
        device: String,
        missing: Capabilities,
    },

    #[error("no light source registered at index {index}")]
    UnknownLightIndex { index: u32 },

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

pub type Result<T, E = RayTracingError> = std::result::Result<T, E>;
