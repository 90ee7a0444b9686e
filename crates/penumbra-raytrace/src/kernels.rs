//! WGSL kernels used by the renderer.
//!
//! Each kernel lives in its own library so the two entry points never share
//! a derived bind group layout. Register [`kernel_libraries`] on a
//! `WgpuDevice` before constructing a [`crate::RayTracingRenderer`].

use penumbra_compute::device::KernelLibrary;

use crate::accel::MAX_DEPTH;

/// Shadow visibility for one light; aux parameter `ShadowUniform`.
pub const SHADOW_KERNEL: &str = "shadow_intersect";

/// Progressive illumination step; aux parameter `IlluminationUniform`.
pub const ILLUMINATION_KERNEL: &str = "illumination_accumulate";

pub const KERNEL_NAMES: [&str; 2] = [SHADOW_KERNEL, ILLUMINATION_KERNEL];

pub const WORKGROUP_SIZE: [u32; 2] = [8, 8];

const COMMON_WGSL: &str = include_str!("kernels/common.wgsl");
const SHADOW_WGSL: &str = include_str!("kernels/shadow.wgsl");
const ILLUMINATION_WGSL: &str = include_str!("kernels/illumination.wgsl");

/// Shared constants and helpers every kernel source starts with.
fn prelude() -> String {
    format!("const STACK_SIZE: u32 = {MAX_DEPTH}u;\n{COMMON_WGSL}")
}

pub fn kernel_libraries() -> Vec<KernelLibrary> {
    let prelude = prelude();
    vec![
        KernelLibrary::wgsl("shadow", format!("{prelude}\n{SHADOW_WGSL}"))
            .entry_point(SHADOW_KERNEL, WORKGROUP_SIZE),
        KernelLibrary::wgsl("illumination", format!("{prelude}\n{ILLUMINATION_WGSL}"))
            .entry_point(ILLUMINATION_KERNEL, WORKGROUP_SIZE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kernel_is_exported_once() {
        let libraries = kernel_libraries();
        for name in KERNEL_NAMES {
            let exporters = libraries.iter().filter(|l| l.find(name).is_some()).count();
            assert_eq!(exporters, 1, "{name}");
        }
    }

    #[test]
    fn traversal_stack_matches_bvh_depth() {
        let declaration = format!("const STACK_SIZE: u32 = {MAX_DEPTH}u;");
        for library in kernel_libraries() {
            assert!(library.source.starts_with(&declaration), "{}", library.label);
            assert!(library.source.contains("array<u32, STACK_SIZE>"));
        }
    }

    #[test]
    fn sources_declare_entry_points() {
        for library in kernel_libraries() {
            for entry in &library.entry_points {
                assert!(library.source.contains(&format!("fn {}(", entry.name)));
                assert!(library.source.contains("@workgroup_size(8, 8)"));
            }
        }
    }
}
