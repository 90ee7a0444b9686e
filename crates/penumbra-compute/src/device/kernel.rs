use std::borrow::Cow;

/// A compute entry point exported by a kernel library.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EntryPoint {
    pub name: Cow<'static, str>,

    /// Must match `@workgroup_size(x, y)` in the source.
    pub workgroup_size: [u32; 2],
}

impl EntryPoint {
    pub fn new(name: impl Into<Cow<'static, str>>, workgroup_size: [u32; 2]) -> Self {
        Self {
            name: name.into(),
            workgroup_size,
        }
    }
}

/// WGSL source plus the entry points it exports.
///
/// Libraries are registered on a [`super::WgpuDevice`] up front; kernels are
/// then resolved by entry point name, the way compiled functions are looked up
/// in a device's default library.
#[derive(Debug, Clone)]
pub struct KernelLibrary {
    pub label: Cow<'static, str>,
    pub source: Cow<'static, str>,
    pub entry_points: Vec<EntryPoint>,
}

impl KernelLibrary {
    pub fn wgsl(label: impl Into<Cow<'static, str>>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            entry_points: Vec::new(),
        }
    }

    pub fn entry_point(mut self, name: impl Into<Cow<'static, str>>, workgroup_size: [u32; 2]) -> Self {
        self.entry_points.push(EntryPoint::new(name, workgroup_size));
        self
    }

    pub fn find(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|e| e.name == name)
    }
}
