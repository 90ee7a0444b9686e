use crate::binding::BindingSlot;
use crate::command::CommandBufferState;

/// Errors surfaced by pipelines, encoders and command buffers.
///
/// None of these are retried internally; a failed dispatch leaves its encoder
/// closed and the caller re-encodes from a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("kernel function `{function}` not found on device `{device}`")]
    KernelNotFound { function: String, device: String },

    #[error("command buffer `{label}` is not encodable (state: {state:?})")]
    InvalidCommandBuffer {
        label: String,
        state: CommandBufferState,
    },

    #[error("parameter state stack underflow: the base state cannot be popped")]
    StateStackUnderflow,

    #[error("invalid dispatch size {width}x{height}")]
    InvalidDispatchSize { width: u32, height: u32 },

    #[error("binding {slot} is out of range ({limit} slots available)")]
    BindingOutOfRange { slot: BindingSlot, limit: u32 },

    #[error("encoder for kernel `{kernel}` is closed")]
    EncoderClosed { kernel: String },

    /// The backend rejected the bound resources (e.g. a slot the kernel does
    /// not declare, or a resource of the wrong type).
    #[error("kernel `{kernel}` rejected its bindings: {message}")]
    InvalidBinding { kernel: String, message: String },

    #[error("kernel `{kernel}` does not declare an aux parameter")]
    ParameterNotDeclared { kernel: String },

    #[error("kernel `{kernel}` declares an aux parameter that was never set")]
    MissingParameter { kernel: String },
}

pub type Result<T, E = ComputeError> = std::result::Result<T, E>;
