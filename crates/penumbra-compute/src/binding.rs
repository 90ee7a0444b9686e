//! Resource bindings and named parameter states.
//!
//! Textures, samplers and buffers live in separate slot namespaces. Backends
//! map a slot to a physical binding number inside bind group 0:
//!
//! ```text
//! texture slot i  -> binding i
//! sampler slot i  -> binding SAMPLER_BINDING_BASE + i
//! buffer slot i   -> binding BUFFER_BINDING_BASE + i
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::device::GpuDevice;

/// First physical binding number of the sampler namespace.
pub const SAMPLER_BINDING_BASE: u32 = 8;

/// First physical binding number of the buffer namespace.
pub const BUFFER_BINDING_BASE: u32 = 12;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SlotKind {
    Texture,
    Sampler,
    Buffer,
}

/// A slot index within one namespace.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BindingSlot {
    pub kind: SlotKind,
    pub index: u32,
}

impl BindingSlot {
    pub const fn texture(index: u32) -> Self {
        Self { kind: SlotKind::Texture, index }
    }

    pub const fn sampler(index: u32) -> Self {
        Self { kind: SlotKind::Sampler, index }
    }

    pub const fn buffer(index: u32) -> Self {
        Self { kind: SlotKind::Buffer, index }
    }

    /// Physical binding number in bind group 0.
    pub const fn binding_number(self) -> u32 {
        match self.kind {
            SlotKind::Texture => self.index,
            SlotKind::Sampler => SAMPLER_BINDING_BASE.saturating_add(self.index),
            SlotKind::Buffer => BUFFER_BINDING_BASE.saturating_add(self.index),
        }
    }
}

impl fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SlotKind::Texture => "texture",
            SlotKind::Sampler => "sampler",
            SlotKind::Buffer => "buffer",
        };
        write!(f, "{kind}[{}]", self.index)
    }
}

/// A resource bound to a slot.
pub enum Binding<D: GpuDevice> {
    /// Texture the kernel writes (storage texture).
    TargetTexture(D::Texture),
    /// Texture the kernel reads.
    Texture(D::Texture),
    Sampler(D::Sampler),
    Buffer { buffer: D::Buffer, offset: u64 },
}

impl<D: GpuDevice> Binding<D> {
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::TargetTexture(_) | Self::Texture(_) => SlotKind::Texture,
            Self::Sampler(_) => SlotKind::Sampler,
            Self::Buffer { .. } => SlotKind::Buffer,
        }
    }
}

impl<D: GpuDevice> Clone for Binding<D> {
    fn clone(&self) -> Self {
        match self {
            Self::TargetTexture(t) => Self::TargetTexture(t.clone()),
            Self::Texture(t) => Self::Texture(t.clone()),
            Self::Sampler(s) => Self::Sampler(s.clone()),
            Self::Buffer { buffer, offset } => Self::Buffer {
                buffer: buffer.clone(),
                offset: *offset,
            },
        }
    }
}

impl<D: GpuDevice> PartialEq for Binding<D> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::TargetTexture(a), Self::TargetTexture(b)) => a == b,
            (Self::Texture(a), Self::Texture(b)) => a == b,
            (Self::Sampler(a), Self::Sampler(b)) => a == b,
            (
                Self::Buffer { buffer: a, offset: oa },
                Self::Buffer { buffer: b, offset: ob },
            ) => a == b && oa == ob,
            _ => false,
        }
    }
}

impl<D: GpuDevice> fmt::Debug for Binding<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetTexture(t) => f.debug_tuple("TargetTexture").field(t).finish(),
            Self::Texture(t) => f.debug_tuple("Texture").field(t).finish(),
            Self::Sampler(s) => f.debug_tuple("Sampler").field(s).finish(),
            Self::Buffer { buffer, offset } => f
                .debug_struct("Buffer")
                .field("buffer", buffer)
                .field("offset", offset)
                .finish(),
        }
    }
}

/// A named set of slot bindings; one frame of an encoder's state stack.
pub struct ParameterState<D: GpuDevice> {
    name: String,
    bindings: BTreeMap<BindingSlot, Binding<D>>,
}

impl<D: GpuDevice> ParameterState<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, slot: BindingSlot) -> Option<&Binding<D>> {
        self.bindings.get(&slot)
    }

    /// Bindings in slot order (textures, then samplers, then buffers).
    pub fn iter(&self) -> impl Iterator<Item = (BindingSlot, &Binding<D>)> {
        self.bindings.iter().map(|(slot, binding)| (*slot, binding))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// True if both states bind the same resources to the same slots,
    /// regardless of their names.
    pub fn same_bindings(&self, other: &Self) -> bool {
        self.bindings == other.bindings
    }

    /// Binds `binding` at `slot`, returning what it replaced.
    pub(crate) fn bind(&mut self, slot: BindingSlot, binding: Binding<D>) -> Option<Binding<D>> {
        debug_assert_eq!(slot.kind, binding.kind());
        self.bindings.insert(slot, binding)
    }

    /// A copy of this state's bindings under a new name.
    pub(crate) fn fork(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: self.bindings.clone(),
        }
    }
}

impl<D: GpuDevice> Clone for ParameterState<D> {
    fn clone(&self) -> Self {
        self.fork(self.name.clone())
    }
}

impl<D: GpuDevice> PartialEq for ParameterState<D> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.bindings == other.bindings
    }
}

impl<D: GpuDevice> fmt::Debug for ParameterState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterState")
            .field("name", &self.name)
            .field("bindings", &self.bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessDevice, HeadlessInit, SamplerDesc, TextureDesc, TextureFormat};

    fn device() -> HeadlessDevice {
        HeadlessDevice::new(HeadlessInit::default())
    }

    // ── slots ─────────────────────────────────────────────────────────────

    #[test]
    fn namespaces_do_not_overlap() {
        assert_eq!(BindingSlot::texture(0).binding_number(), 0);
        assert_eq!(BindingSlot::texture(7).binding_number(), 7);
        assert_eq!(BindingSlot::sampler(0).binding_number(), SAMPLER_BINDING_BASE);
        assert_eq!(BindingSlot::buffer(2).binding_number(), BUFFER_BINDING_BASE + 2);
    }

    #[test]
    fn slot_display() {
        assert_eq!(BindingSlot::buffer(3).to_string(), "buffer[3]");
        assert_eq!(BindingSlot::sampler(1).to_string(), "sampler[1]");
    }

    #[test]
    fn slots_order_by_namespace() {
        assert!(BindingSlot::texture(9) < BindingSlot::sampler(0));
        assert!(BindingSlot::sampler(9) < BindingSlot::buffer(0));
    }

    // ── states ────────────────────────────────────────────────────────────

    #[test]
    fn bind_replaces_previous_binding() {
        let dev = device();
        let a = dev.create_texture(&TextureDesc::storage("a", 1, 1, TextureFormat::R32Float));
        let b = dev.create_texture(&TextureDesc::storage("b", 1, 1, TextureFormat::R32Float));

        let mut state = ParameterState::<HeadlessDevice>::new("base");
        assert!(state.bind(BindingSlot::texture(0), Binding::Texture(a.clone())).is_none());
        let old = state.bind(BindingSlot::texture(0), Binding::Texture(b.clone()));

        assert_eq!(old, Some(Binding::Texture(a)));
        assert_eq!(state.get(BindingSlot::texture(0)), Some(&Binding::Texture(b)));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn target_and_plain_texture_differ() {
        let dev = device();
        let t = dev.create_texture(&TextureDesc::storage("t", 1, 1, TextureFormat::R32Float));
        assert_ne!(
            Binding::<HeadlessDevice>::TargetTexture(t.clone()),
            Binding::Texture(t)
        );
    }

    #[test]
    fn fork_keeps_bindings_and_renames() {
        let dev = device();
        let sampler = dev.create_sampler(&SamplerDesc::default());

        let mut base = ParameterState::<HeadlessDevice>::new("base");
        base.bind(BindingSlot::sampler(1), Binding::Sampler(sampler));

        let forked = base.fork("pass");
        assert_eq!(forked.name(), "pass");
        assert!(forked.same_bindings(&base));
        assert_ne!(forked, base);
    }
}
