//! GPU device abstraction.
//!
//! This module is responsible for:
//! - the [`GpuDevice`] trait every backend implements
//! - resource descriptors shared by all backends
//! - the wgpu backend ([`WgpuDevice`]) and the headless backend ([`HeadlessDevice`])
//!
//! Devices are created outside of this crate's core types and handed to them
//! as `Arc<D>`; pipelines and command buffers never own device creation.

mod desc;
mod gpu;
mod headless;
mod init;
mod kernel;

use std::fmt;

pub use desc::{
    AddressMode, BindingLimits, BufferUsage, Capabilities, FilterMode, SamplerDesc, TextureDesc,
    TextureFormat, TextureUsage,
};
pub use gpu::{WgpuBuffer, WgpuDevice, WgpuKernel, WgpuSampler, WgpuTexture};
pub use headless::{
    HeadlessBuffer, HeadlessDevice, HeadlessKernel, HeadlessRecorder, HeadlessSampler,
    HeadlessTexture, RecordedBinding, RecordedDispatch,
};
pub use init::{HeadlessInit, WgpuInit};
pub use kernel::{EntryPoint, KernelLibrary};

use crate::binding::ParameterState;
use crate::error::Result;

/// Monotonic index of a submitted command buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubmissionIndex(pub u64);

impl fmt::Display for SubmissionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One compute dispatch, fully resolved and validated by the encoder.
///
/// `state` holds physical slots (aux parameter offset already applied).
pub struct Dispatch<'a, D: GpuDevice> {
    pub label: &'a str,
    pub kernel: &'a D::Kernel,
    pub state: &'a ParameterState<D>,
    pub groups: [u32; 3],
}

/// A GPU device able to run compute kernels.
///
/// Handle types are cheap to clone and compare by resource identity: two
/// handles are equal only if they refer to the same allocation.
pub trait GpuDevice: Send + Sync + Sized + 'static {
    type Texture: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Sampler: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Buffer: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Kernel: fmt::Debug + Send + Sync;
    type Recorder: Send;

    /// Human readable device name (adapter name for hardware devices).
    fn label(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn binding_limits(&self) -> BindingLimits;

    /// Resolves `function` in the device's kernel library.
    ///
    /// Fails with [`crate::ComputeError::KernelNotFound`] when no registered
    /// library exports an entry point of that name.
    fn load_kernel(&self, function: &str, aux_parameter: bool) -> Result<Self::Kernel>;

    /// Threads per group along x and y for `kernel`.
    fn thread_execution_width(&self, kernel: &Self::Kernel) -> [u32; 2];

    fn create_recorder(&self, label: &str) -> Self::Recorder;

    fn create_texture(&self, desc: &TextureDesc) -> Self::Texture;

    fn create_sampler(&self, desc: &SamplerDesc) -> Self::Sampler;

    fn create_buffer(&self, label: &str, contents: &[u8], usage: BufferUsage) -> Self::Buffer;

    /// Records one dispatch into `recorder`. Nothing executes until submission.
    fn record_dispatch(&self, recorder: &mut Self::Recorder, dispatch: Dispatch<'_, Self>)
    -> Result<()>;

    /// Submits recorded work; completion is signaled asynchronously by the backend.
    fn submit(&self, recorder: Self::Recorder) -> SubmissionIndex;
}
