use std::fmt;

use crate::binding::{Binding, BindingSlot, ParameterState};
use crate::command::CommandBuffer;
use crate::device::{BufferUsage, Dispatch, GpuDevice};
use crate::error::{ComputeError, Result};
use crate::pipeline::ComputePipeline;

/// Logical 2D work extent of a dispatch, in threads.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct DataSize {
    pub width: u32,
    pub height: u32,
}

impl DataSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<[u32; 2]> for DataSize {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encodes exactly one dispatch of a [`ComputePipeline`].
///
/// Bindings always go to the top of a stack of [`ParameterState`]s. The stack
/// starts with a base frame named after the kernel; that frame is never popped.
///
/// The encoder holds its command buffer's encoding scope until [`dispatch`]
/// is called or the encoder is dropped. Every call after `dispatch` fails with
/// [`ComputeError::EncoderClosed`], including after a failed dispatch.
///
/// [`dispatch`]: ComputeEncoder::dispatch
pub struct ComputeEncoder<'cb, D: GpuDevice> {
    pipeline: ComputePipeline<D>,
    command_buffer: &'cb mut CommandBuffer<D>,
    base: ParameterState<D>,
    pushed: Vec<ParameterState<D>>,
    data_size: DataSize,
    closed: bool,
}

impl<'cb, D: GpuDevice> ComputeEncoder<'cb, D> {
    pub(crate) fn new(pipeline: ComputePipeline<D>, command_buffer: &'cb mut CommandBuffer<D>) -> Self {
        let base = ParameterState::new(pipeline.name());
        Self {
            pipeline,
            command_buffer,
            base,
            pushed: Vec::new(),
            data_size: DataSize::default(),
            closed: false,
        }
    }

    pub fn pipeline(&self) -> &ComputePipeline<D> {
        &self.pipeline
    }

    pub fn data_size(&self) -> DataSize {
        self.data_size
    }

    /// The parameter state bindings currently go to.
    pub fn active_state(&self) -> &ParameterState<D> {
        self.pushed.last().unwrap_or(&self.base)
    }

    /// Height of the state stack; 1 when only the base frame is present.
    pub fn depth(&self) -> usize {
        self.pushed.len() + 1
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ── bindings ──────────────────────────────────────────────────────────

    /// Binds the texture the kernel writes.
    pub fn set_target_texture(&mut self, texture: &D::Texture, index: u32) -> Result<()> {
        self.bind(BindingSlot::texture(index), Binding::TargetTexture(texture.clone()))
    }

    pub fn set_texture(&mut self, texture: &D::Texture, index: u32) -> Result<()> {
        self.bind(BindingSlot::texture(index), Binding::Texture(texture.clone()))
    }

    pub fn set_sampler_state(&mut self, sampler: &D::Sampler, index: u32) -> Result<()> {
        self.bind(BindingSlot::sampler(index), Binding::Sampler(sampler.clone()))
    }

    /// Binds `buffer` at caller slot `index`.
    ///
    /// With an aux parameter declared, caller slot `i` is buffer slot `i + 1`.
    pub fn set_buffer(&mut self, buffer: &D::Buffer, offset: u64, index: u32) -> Result<()> {
        let index = if self.pipeline.has_aux_parameter() {
            index.saturating_add(1)
        } else {
            index
        };
        self.bind(
            BindingSlot::buffer(index),
            Binding::Buffer {
                buffer: buffer.clone(),
                offset,
            },
        )
    }

    /// Uploads `value` as the kernel's aux parameter block.
    pub fn set_parameter<T: bytemuck::Pod>(&mut self, value: &T) -> Result<()> {
        self.ensure_open()?;
        if !self.pipeline.has_aux_parameter() {
            return Err(ComputeError::ParameterNotDeclared {
                kernel: self.pipeline.name().to_owned(),
            });
        }

        let label = format!("{} parameter", self.pipeline.name());
        let buffer = self.pipeline.device().create_buffer(
            &label,
            bytemuck::bytes_of(value),
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        );
        self.bind(BindingSlot::buffer(0), Binding::Buffer { buffer, offset: 0 })
    }

    pub fn set_data_size(&mut self, size: impl Into<DataSize>) -> Result<()> {
        self.ensure_open()?;
        self.data_size = size.into();
        Ok(())
    }

    fn bind(&mut self, slot: BindingSlot, binding: Binding<D>) -> Result<()> {
        self.ensure_open()?;
        let state = self.pushed.last_mut().unwrap_or(&mut self.base);
        state.bind(slot, binding);
        Ok(())
    }

    // ── state stack ───────────────────────────────────────────────────────

    /// Pushes a copy of the active bindings under `name`.
    pub fn push_parameter_state(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let frame = self.active_state().fork(name);
        log::trace!(
            "`{}`: push parameter state `{}` (depth {})",
            self.pipeline.name(),
            frame.name(),
            self.depth() + 1
        );
        self.pushed.push(frame);
        Ok(())
    }

    /// Discards the top frame, restoring the bindings active before its push.
    pub fn pop_parameter_state(&mut self) -> Result<()> {
        self.ensure_open()?;
        let frame = self.pushed.pop().ok_or(ComputeError::StateStackUnderflow)?;
        log::trace!(
            "`{}`: pop parameter state `{}` (depth {})",
            self.pipeline.name(),
            frame.name(),
            self.depth()
        );
        Ok(())
    }

    // ── dispatch ──────────────────────────────────────────────────────────

    /// Records one dispatch covering [`Self::data_size`] with the active bindings.
    ///
    /// Thread-group counts round up; kernels must ignore threads outside the
    /// extent. Closes the encoder whether or not recording succeeds.
    pub fn dispatch(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let result = self.record();
        self.command_buffer.end_encoding();
        if let Err(err) = &result {
            log::debug!("`{}`: dispatch rejected: {err}", self.pipeline.name());
        }
        result
    }

    fn record(&mut self) -> Result<()> {
        let DataSize { width, height } = self.data_size;
        if self.data_size.is_empty() {
            return Err(ComputeError::InvalidDispatchSize { width, height });
        }

        let state = self.pushed.last().unwrap_or(&self.base);

        let limits = self.pipeline.device().binding_limits();
        if let Some((slot, _)) = state.iter().find(|(slot, _)| !limits.contains(*slot)) {
            return Err(ComputeError::BindingOutOfRange {
                slot,
                limit: limits.slots(slot.kind),
            });
        }

        if self.pipeline.has_aux_parameter() && state.get(BindingSlot::buffer(0)).is_none() {
            return Err(ComputeError::MissingParameter {
                kernel: self.pipeline.name().to_owned(),
            });
        }

        let [tx, ty] = self.pipeline.thread_execution_width();
        let groups = [width.div_ceil(tx), height.div_ceil(ty), 1];
        log::trace!(
            "`{}`: dispatch {} as {:?} groups ({} bindings)",
            self.pipeline.name(),
            self.data_size,
            groups,
            state.len()
        );

        self.command_buffer.record_dispatch(Dispatch {
            label: state.name(),
            kernel: self.pipeline.kernel(),
            state,
            groups,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ComputeError::EncoderClosed {
                kernel: self.pipeline.name().to_owned(),
            });
        }
        Ok(())
    }
}

impl<D: GpuDevice> Drop for ComputeEncoder<'_, D> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "encoder `{}` dropped without dispatch; nothing recorded into `{}`",
                self.pipeline.name(),
                self.command_buffer.label()
            );
            self.command_buffer.end_encoding();
        }
    }
}

impl<D: GpuDevice> fmt::Debug for ComputeEncoder<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeEncoder")
            .field("pipeline", &self.pipeline.name())
            .field("depth", &self.depth())
            .field("data_size", &self.data_size)
            .field("closed", &self.closed)
            .finish()
    }
}
