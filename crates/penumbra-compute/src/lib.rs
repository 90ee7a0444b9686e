//! Penumbra compute crate.
//!
//! This crate owns the generic compute-dispatch machinery used by higher layers:
//! devices, command buffers, compute pipelines and their single-use encoders.

pub mod device;
pub mod logging;

mod binding;
mod command;
mod encoder;
mod error;
mod pipeline;

pub use binding::{
    Binding, BindingSlot, ParameterState, SlotKind, BUFFER_BINDING_BASE, SAMPLER_BINDING_BASE,
};
pub use command::{CommandBuffer, CommandBufferState, CommandQueue};
pub use device::{GpuDevice, SubmissionIndex};
pub use encoder::{ComputeEncoder, DataSize};
pub use error::{ComputeError, Result};
pub use pipeline::ComputePipeline;
