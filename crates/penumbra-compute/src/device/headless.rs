//! A device without a GPU.
//!
//! Allocates identity-only handles, validates kernels and bindings the same way
//! the wgpu backend does, and records every dispatch and submission so callers
//! can inspect what would have run. Used by tests and by tools running on
//! machines without an adapter.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::desc::{BindingLimits, BufferUsage, Capabilities, SamplerDesc, TextureDesc};
use super::init::HeadlessInit;
use super::{Dispatch, GpuDevice, SubmissionIndex};
use crate::binding::{Binding, BindingSlot};
use crate::error::{ComputeError, Result};

#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    id: u64,
    desc: Arc<TextureDesc>,
}

impl HeadlessTexture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

impl PartialEq for HeadlessTexture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessSampler {
    id: u64,
    desc: Arc<SamplerDesc>,
}

impl HeadlessSampler {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl PartialEq for HeadlessSampler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Buffer whose contents stay readable on the CPU.
#[derive(Clone)]
pub struct HeadlessBuffer {
    id: u64,
    label: Arc<str>,
    usage: BufferUsage,
    contents: Arc<[u8]>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

impl PartialEq for HeadlessBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for HeadlessBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessBuffer")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("size", &self.contents.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessKernel {
    name: String,
    aux_parameter: bool,
    thread_execution_width: [u32; 2],
}

impl HeadlessKernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_aux_parameter(&self) -> bool {
        self.aux_parameter
    }
}

/// Resource reference captured at record time.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedBinding {
    TargetTexture(HeadlessTexture),
    Texture(HeadlessTexture),
    Sampler(HeadlessSampler),
    Buffer { buffer: HeadlessBuffer, offset: u64 },
}

impl RecordedBinding {
    /// The texture behind a texture or target binding.
    pub fn texture(&self) -> Option<&HeadlessTexture> {
        match self {
            Self::TargetTexture(t) | Self::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&HeadlessBuffer> {
        match self {
            Self::Buffer { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    pub label: String,
    pub kernel: String,
    pub groups: [u32; 3],
    pub bindings: Vec<(BindingSlot, RecordedBinding)>,
}

impl RecordedDispatch {
    pub fn binding(&self, slot: BindingSlot) -> Option<&RecordedBinding> {
        self.bindings
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, binding)| binding)
    }
}

/// Work recorded into one command buffer.
#[derive(Debug, Default)]
pub struct HeadlessRecorder {
    label: String,
    dispatches: Vec<RecordedDispatch>,
}

impl HeadlessRecorder {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dispatches(&self) -> &[RecordedDispatch] {
        &self.dispatches
    }
}

#[derive(Debug, Default)]
struct Journal {
    submissions: Vec<(SubmissionIndex, HeadlessRecorder)>,
}

pub struct HeadlessDevice {
    init: HeadlessInit,
    next_id: AtomicU64,
    textures_created: AtomicU64,
    journal: Mutex<Journal>,
}

impl HeadlessDevice {
    pub fn new(init: HeadlessInit) -> Self {
        let init = HeadlessInit {
            limits: init.limits.clamped(),
            ..init
        };
        log::debug!(
            "headless device `{}` created ({} kernels, {:?})",
            init.label,
            init.kernels.len(),
            init.capabilities
        );
        Self {
            init,
            next_id: AtomicU64::new(1),
            textures_created: AtomicU64::new(0),
            journal: Mutex::new(Journal::default()),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Total number of textures allocated so far.
    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::Relaxed)
    }

    pub fn submission_count(&self) -> usize {
        self.journal.lock().submissions.len()
    }

    /// Every dispatch submitted so far, in submission and record order.
    pub fn submitted_dispatches(&self) -> Vec<RecordedDispatch> {
        self.journal
            .lock()
            .submissions
            .iter()
            .flat_map(|(_, recorder)| recorder.dispatches.iter().cloned())
            .collect()
    }
}

impl fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDevice")
            .field("label", &self.init.label)
            .field("capabilities", &self.init.capabilities)
            .finish_non_exhaustive()
    }
}

impl GpuDevice for HeadlessDevice {
    type Texture = HeadlessTexture;
    type Sampler = HeadlessSampler;
    type Buffer = HeadlessBuffer;
    type Kernel = HeadlessKernel;
    type Recorder = HeadlessRecorder;

    fn label(&self) -> &str {
        &self.init.label
    }

    fn capabilities(&self) -> Capabilities {
        self.init.capabilities
    }

    fn binding_limits(&self) -> BindingLimits {
        self.init.limits
    }

    fn load_kernel(&self, function: &str, aux_parameter: bool) -> Result<HeadlessKernel> {
        if !self.init.kernels.iter().any(|k| k == function) {
            return Err(ComputeError::KernelNotFound {
                function: function.to_owned(),
                device: self.init.label.clone(),
            });
        }
        Ok(HeadlessKernel {
            name: function.to_owned(),
            aux_parameter,
            thread_execution_width: self.init.thread_execution_width,
        })
    }

    fn thread_execution_width(&self, kernel: &HeadlessKernel) -> [u32; 2] {
        kernel.thread_execution_width
    }

    fn create_recorder(&self, label: &str) -> HeadlessRecorder {
        HeadlessRecorder {
            label: label.to_owned(),
            dispatches: Vec::new(),
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> HeadlessTexture {
        self.textures_created.fetch_add(1, Ordering::Relaxed);
        HeadlessTexture {
            id: self.allocate_id(),
            desc: Arc::new(desc.clone()),
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> HeadlessSampler {
        HeadlessSampler {
            id: self.allocate_id(),
            desc: Arc::new(desc.clone()),
        }
    }

    fn create_buffer(&self, label: &str, contents: &[u8], usage: BufferUsage) -> HeadlessBuffer {
        HeadlessBuffer {
            id: self.allocate_id(),
            label: label.into(),
            usage,
            contents: contents.into(),
        }
    }

    fn record_dispatch(
        &self,
        recorder: &mut HeadlessRecorder,
        dispatch: Dispatch<'_, Self>,
    ) -> Result<()> {
        let bindings = dispatch
            .state
            .iter()
            .map(|(slot, binding)| {
                let recorded = match binding {
                    Binding::TargetTexture(t) => RecordedBinding::TargetTexture(t.clone()),
                    Binding::Texture(t) => RecordedBinding::Texture(t.clone()),
                    Binding::Sampler(s) => RecordedBinding::Sampler(s.clone()),
                    Binding::Buffer { buffer, offset } => RecordedBinding::Buffer {
                        buffer: buffer.clone(),
                        offset: *offset,
                    },
                };
                (slot, recorded)
            })
            .collect();

        recorder.dispatches.push(RecordedDispatch {
            label: dispatch.label.to_owned(),
            kernel: dispatch.kernel.name.clone(),
            groups: dispatch.groups,
            bindings,
        });
        Ok(())
    }

    fn submit(&self, recorder: HeadlessRecorder) -> SubmissionIndex {
        let mut journal = self.journal.lock();
        let index = SubmissionIndex(journal.submissions.len() as u64 + 1);
        log::trace!(
            "headless submit {index} `{}` ({} dispatches)",
            recorder.label,
            recorder.dispatches.len()
        );
        journal.submissions.push((index, recorder));
        index
    }
}
