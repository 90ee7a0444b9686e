use std::fmt;
use std::sync::Arc;

use crate::device::{Dispatch, GpuDevice, SubmissionIndex};
use crate::error::{ComputeError, Result};

/// Hands out command buffers against one shared device.
pub struct CommandQueue<D: GpuDevice> {
    device: Arc<D>,
    label: String,
}

impl<D: GpuDevice> CommandQueue<D> {
    pub fn new(device: Arc<D>, label: impl Into<String>) -> Self {
        Self {
            device,
            label: label.into(),
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Starts a new, empty command buffer.
    pub fn command_buffer(&self, label: impl Into<String>) -> CommandBuffer<D> {
        let label = label.into();
        let recorder = self.device.create_recorder(&label);
        log::trace!("queue `{}`: command buffer `{label}` created", self.label);
        CommandBuffer {
            label,
            device: Arc::clone(&self.device),
            recorder: Some(recorder),
            state: CommandBufferState::Recording,
            dispatch_count: 0,
        }
    }
}

impl<D: GpuDevice> Clone for CommandQueue<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            label: self.label.clone(),
        }
    }
}

impl<D: GpuDevice + fmt::Debug> fmt::Debug for CommandQueue<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("label", &self.label)
            .field("device", &self.device)
            .finish()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandBufferState {
    /// Accepts new encoders.
    Recording,
    /// A compute encoding scope is open.
    Encoding,
    /// Submitted; no further work may be recorded.
    Committed,
}

/// A batch of recorded GPU work.
///
/// Work recorded here runs only after [`CommandBuffer::commit`]; completion is
/// signaled asynchronously by the backend and never awaited by this crate.
pub struct CommandBuffer<D: GpuDevice> {
    label: String,
    device: Arc<D>,
    recorder: Option<D::Recorder>,
    state: CommandBufferState,
    dispatch_count: u32,
}

impl<D: GpuDevice> CommandBuffer<D> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Dispatches recorded so far.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count
    }

    /// Submits the recorded work. The buffer cannot be reused afterwards.
    pub fn commit(&mut self) -> Result<SubmissionIndex> {
        let recorder = match (self.state, self.recorder.take()) {
            (CommandBufferState::Recording, Some(recorder)) => recorder,
            (state, recorder) => {
                self.recorder = recorder;
                return Err(self.invalid(state));
            }
        };

        self.state = CommandBufferState::Committed;
        let index = self.device.submit(recorder);
        log::debug!(
            "command buffer `{}` committed as {index} ({} dispatches)",
            self.label,
            self.dispatch_count
        );
        Ok(index)
    }

    fn invalid(&self, state: CommandBufferState) -> ComputeError {
        ComputeError::InvalidCommandBuffer {
            label: self.label.clone(),
            state,
        }
    }

    pub(crate) fn begin_encoding(&mut self) -> Result<()> {
        match self.state {
            CommandBufferState::Recording => {
                self.state = CommandBufferState::Encoding;
                Ok(())
            }
            state => Err(self.invalid(state)),
        }
    }

    pub(crate) fn end_encoding(&mut self) {
        if self.state == CommandBufferState::Encoding {
            self.state = CommandBufferState::Recording;
        }
    }

    pub(crate) fn record_dispatch(&mut self, dispatch: Dispatch<'_, D>) -> Result<()> {
        let state = self.state;
        let Some(recorder) = self.recorder.as_mut() else {
            return Err(self.invalid(state));
        };
        self.device.record_dispatch(recorder, dispatch)?;
        self.dispatch_count += 1;
        Ok(())
    }
}

impl<D: GpuDevice> fmt::Debug for CommandBuffer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("dispatch_count", &self.dispatch_count)
            .finish_non_exhaustive()
    }
}
