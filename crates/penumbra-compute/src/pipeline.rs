use std::fmt;
use std::sync::Arc;

use crate::command::CommandBuffer;
use crate::device::GpuDevice;
use crate::encoder::ComputeEncoder;
use crate::error::{ComputeError, Result};

struct Inner<D: GpuDevice> {
    device: Arc<D>,
    name: String,
    kernel: D::Kernel,
    has_aux_parameter: bool,
    thread_execution_width: [u32; 2],
}

/// A compiled compute kernel.
///
/// Immutable once built; clones share the same kernel and may be used from
/// any number of encoders and frames.
pub struct ComputePipeline<D: GpuDevice> {
    inner: Arc<Inner<D>>,
}

impl<D: GpuDevice> ComputePipeline<D> {
    /// Resolves `function` on `device`.
    ///
    /// `has_aux_parameter` reserves buffer slot 0 for a typed parameter
    /// block (see [`ComputeEncoder::set_parameter`]).
    pub fn new(device: &Arc<D>, function: &str, has_aux_parameter: bool) -> Result<Self> {
        let kernel = device.load_kernel(function, has_aux_parameter)?;
        let thread_execution_width = device
            .thread_execution_width(&kernel)
            .map(|w| w.max(1));

        log::debug!(
            "compute pipeline `{function}` created on `{}` (threads {:?}, aux parameter: {has_aux_parameter})",
            device.label(),
            thread_execution_width
        );

        Ok(Self {
            inner: Arc::new(Inner {
                device: Arc::clone(device),
                name: function.to_owned(),
                kernel,
                has_aux_parameter,
                thread_execution_width,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn has_aux_parameter(&self) -> bool {
        self.inner.has_aux_parameter
    }

    /// Threads per group along x and y.
    pub fn thread_execution_width(&self) -> [u32; 2] {
        self.inner.thread_execution_width
    }

    pub fn device(&self) -> &Arc<D> {
        &self.inner.device
    }

    pub(crate) fn kernel(&self) -> &D::Kernel {
        &self.inner.kernel
    }

    /// Opens a compute encoding scope on `command_buffer`.
    ///
    /// Fails with [`ComputeError::InvalidCommandBuffer`] when the buffer was
    /// committed, already has an open scope, or belongs to another device.
    pub fn encoder<'cb>(
        &self,
        command_buffer: &'cb mut CommandBuffer<D>,
    ) -> Result<ComputeEncoder<'cb, D>> {
        if !Arc::ptr_eq(command_buffer.device(), &self.inner.device) {
            log::error!(
                "pipeline `{}` cannot encode into `{}`: device mismatch",
                self.inner.name,
                command_buffer.label()
            );
            return Err(ComputeError::InvalidCommandBuffer {
                label: command_buffer.label().to_owned(),
                state: command_buffer.state(),
            });
        }
        command_buffer.begin_encoding()?;
        log::trace!(
            "encoder `{}` opened on `{}`",
            self.inner.name,
            command_buffer.label()
        );
        Ok(ComputeEncoder::new(self.clone(), command_buffer))
    }
}

impl<D: GpuDevice> Clone for ComputePipeline<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: GpuDevice> fmt::Debug for ComputePipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("name", &self.inner.name)
            .field("has_aux_parameter", &self.inner.has_aux_parameter)
            .field("thread_execution_width", &self.inner.thread_execution_width)
            .finish()
    }
}
