//! Backend-independent resource descriptors.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::binding::{BindingSlot, SlotKind, BUFFER_BINDING_BASE, SAMPLER_BINDING_BASE};

macro_rules! bit_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr;)* }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self(1 << $bit);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn all() -> Self {
                Self(0 $(| (1 << $bit))*)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut set = f.debug_set();
                $(if self.contains(Self::$flag) {
                    set.entry(&format_args!(stringify!($flag)));
                })*
                set.finish()
            }
        }
    };
}

bit_set! {
    /// Device feature flags relevant to compute and ray tracing.
    Capabilities {
        /// Compute shaders can be dispatched.
        COMPUTE = 0;
        /// Kernels may write storage textures.
        STORAGE_TEXTURE = 1;
        /// 32-bit float formats are usable as storage textures.
        FLOAT32_STORAGE = 2;
        /// Hardware ray queries are available (optional for software traversal).
        RAY_QUERY = 3;
    }
}

bit_set! {
    TextureUsage {
        SAMPLED = 0;
        STORAGE = 1;
        COPY_SRC = 2;
        COPY_DST = 3;
    }
}

bit_set! {
    BufferUsage {
        UNIFORM = 0;
        STORAGE = 1;
        COPY_DST = 2;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    R32Float,
    Rgba16Float,
    Rgba32Float,
    Rgba8Unorm,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R32Float | Self::Rgba8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    pub(crate) const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R32Float => wgpu::TextureFormat::R32Float,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// 2D texture description.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Texture a kernel writes and later passes (or the compositor) sample.
    pub fn storage(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            usage: TextureUsage::STORAGE | TextureUsage::SAMPLED | TextureUsage::COPY_SRC,
        }
    }

    pub fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct SamplerDesc {
    pub label: String,
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

/// Number of slots available per binding namespace.
///
/// Slot counts never exceed the physical binding ranges reserved for each
/// namespace (see [`crate::SAMPLER_BINDING_BASE`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BindingLimits {
    pub textures: u32,
    pub samplers: u32,
    pub buffers: u32,
}

impl BindingLimits {
    pub const fn slots(&self, kind: SlotKind) -> u32 {
        match kind {
            SlotKind::Texture => self.textures,
            SlotKind::Sampler => self.samplers,
            SlotKind::Buffer => self.buffers,
        }
    }

    pub const fn contains(&self, slot: BindingSlot) -> bool {
        slot.index < self.slots(slot.kind)
    }

    /// Clamps every namespace to its reserved physical range.
    pub fn clamped(self) -> Self {
        Self {
            textures: self.textures.min(SAMPLER_BINDING_BASE),
            samplers: self.samplers.min(BUFFER_BINDING_BASE - SAMPLER_BINDING_BASE),
            buffers: self.buffers,
        }
    }
}

impl Default for BindingLimits {
    fn default() -> Self {
        Self {
            textures: 8,
            samplers: 4,
            buffers: 8,
        }
    }
}
