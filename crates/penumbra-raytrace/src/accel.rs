//! Software acceleration structure.
//!
//! A binned-SAH BVH is built on the CPU over the triangles overlapping the
//! scene bounds and uploaded as two storage buffers:
//! - 32-byte nodes, root at index 0
//! - 64-byte triangles in leaf order, carrying their scene mask
//!
//! Kernels traverse it with a fixed-size stack (see `kernels/common.wgsl`).

use bytemuck::{Pod, Zeroable};
use penumbra_compute::GpuDevice;
use penumbra_compute::device::BufferUsage;

use crate::bounds::SceneBounds;
use crate::geometry::{SceneGeometry, Triangle};

const NUM_BINS: usize = 12;
const TRAVERSAL_COST: f32 = 1.0;
const INTERSECT_COST: f32 = 1.0;
const MAX_LEAF_SIZE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    #[inline]
    pub fn grow_point(&mut self, p: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    #[inline]
    pub fn grow(&mut self, other: &Aabb) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    /// Surface area; zero for an empty box.
    #[inline]
    pub fn area(&self) -> f32 {
        let d = [0, 1, 2].map(|i| (self.max[i] - self.min[i]).max(0.0));
        2.0 * (d[0] * d[1] + d[1] * d[2] + d[2] * d[0])
    }
}

/// GPU BVH node (32 bytes).
///
/// Internal node: `left_or_first` = left child (right child follows it), `count` = 0.
/// Leaf: `left_or_first` = first triangle, `count` > 0.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub aabb_min: [f32; 3],
    pub left_or_first: u32,
    pub aabb_max: [f32; 3],
    pub count: u32,
}

impl BvhNode {
    fn leaf(bounds: &Aabb, first: usize, count: usize) -> Self {
        Self {
            aabb_min: bounds.min,
            left_or_first: first as u32,
            aabb_max: bounds.max,
            count: count as u32,
        }
    }

    fn internal(bounds: &Aabb, left: usize) -> Self {
        Self {
            aabb_min: bounds.min,
            left_or_first: left as u32,
            aabb_max: bounds.max,
            count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// GPU triangle (64 bytes): vertices, scene mask and geometric normal.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 3],
    pub mask: u32,
    pub v1: [f32; 3],
    pub _pad0: u32,
    pub v2: [f32; 3],
    pub _pad1: u32,
    pub normal: [f32; 3],
    pub _pad2: u32,
}

impl From<&Triangle> for GpuTriangle {
    fn from(t: &Triangle) -> Self {
        Self {
            v0: t.v0.to_array(),
            mask: t.mask.bits(),
            v1: t.v1.to_array(),
            _pad0: 0,
            v2: t.v2.to_array(),
            _pad1: 0,
            normal: t.normal().to_array(),
            _pad2: 0,
        }
    }
}

/// CPU-side BVH over a triangle list.
#[derive(Debug, Clone)]
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Triangle indices in leaf order; leaves index into this list.
    pub tri_indices: Vec<usize>,
}

/// Deepest tree kernels can traverse; also the size of their traversal
/// stack (`STACK_SIZE` in the WGSL prelude).
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Copy, Clone)]
struct Split {
    axis: usize,
    position: f32,
    cost: f32,
}

struct Task {
    node: usize,
    start: usize,
    end: usize,
    /// Root is depth 1.
    depth: usize,
}

/// Depth of the subtree that median splits produce over `count` triangles.
fn median_depth(count: usize) -> usize {
    let mut remaining = count;
    let mut depth = 1;
    while remaining > MAX_LEAF_SIZE {
        remaining = remaining.div_ceil(2);
        depth += 1;
    }
    depth
}

struct Builder {
    aabbs: Vec<Aabb>,
    centroids: Vec<[f32; 3]>,
    indices: Vec<usize>,
    nodes: Vec<BvhNode>,
}

impl Builder {
    fn new(triangles: &[Triangle]) -> Self {
        Self {
            aabbs: triangles.iter().map(Triangle::aabb).collect(),
            centroids: triangles.iter().map(|t| t.centroid().to_array()).collect(),
            indices: (0..triangles.len()).collect(),
            nodes: Vec::with_capacity(2 * triangles.len()),
        }
    }

    fn bounds(&self, start: usize, end: usize) -> (Aabb, Aabb) {
        let mut bounds = Aabb::EMPTY;
        let mut centroid_bounds = Aabb::EMPTY;
        for &idx in &self.indices[start..end] {
            bounds.grow(&self.aabbs[idx]);
            centroid_bounds.grow_point(self.centroids[idx]);
        }
        (bounds, centroid_bounds)
    }

    fn run(mut self) -> Bvh {
        self.nodes.push(BvhNode::zeroed());
        let mut tasks = vec![Task {
            node: 0,
            start: 0,
            end: self.indices.len(),
            depth: 1,
        }];

        while let Some(task) = tasks.pop() {
            let Task { node, start, end, depth } = task;
            let count = end - start;
            let (bounds, centroid_bounds) = self.bounds(start, end);

            if count <= MAX_LEAF_SIZE || depth >= MAX_DEPTH {
                self.nodes[node] = BvhNode::leaf(&bounds, start, count);
                continue;
            }

            let Some(mid) = self.split(start, end, depth, &bounds, &centroid_bounds) else {
                self.nodes[node] = BvhNode::leaf(&bounds, start, count);
                continue;
            };

            let left = self.nodes.len();
            self.nodes.push(BvhNode::zeroed());
            self.nodes.push(BvhNode::zeroed());
            self.nodes[node] = BvhNode::internal(&bounds, left);

            // Left child is processed first.
            tasks.push(Task {
                node: left + 1,
                start: mid,
                end,
                depth: depth + 1,
            });
            tasks.push(Task {
                node: left,
                start,
                end: mid,
                depth: depth + 1,
            });
        }

        Bvh {
            nodes: self.nodes,
            tri_indices: self.indices,
        }
    }

    /// Reorders `start..end` and returns the split point, or `None` for a leaf.
    ///
    /// Takes the SAH split unless one of its children could no longer be
    /// finished within [`MAX_DEPTH`]; then, and when every axis is
    /// degenerate, falls back to an object median.
    fn split(
        &mut self,
        start: usize,
        end: usize,
        depth: usize,
        bounds: &Aabb,
        centroid_bounds: &Aabb,
    ) -> Option<usize> {
        let count = end - start;
        let leaf_cost = count as f32 * INTERSECT_COST * bounds.area();
        let sah = best_sah_split(&self.indices[start..end], &self.aabbs, &self.centroids, centroid_bounds);

        if let Some(split) = sah {
            if split.cost >= leaf_cost {
                return None;
            }
            let centroids = &self.centroids;
            let below = partition(&mut self.indices[start..end], |&idx| {
                centroids[idx][split.axis] < split.position
            });
            if below > 0 && below < count && depth + median_depth(below.max(count - below)) <= MAX_DEPTH {
                log::trace!(
                    "bvh sah split at depth {depth}: axis {} at {} (cost {})",
                    split.axis,
                    split.position,
                    split.cost
                );
                return Some(start + below);
            }
        }

        Some(self.median_split(start, end, centroid_bounds))
    }

    fn median_split(&mut self, start: usize, end: usize, centroid_bounds: &Aabb) -> usize {
        let extent = [0, 1, 2].map(|i| centroid_bounds.max[i] - centroid_bounds.min[i]);
        let axis = (0..3).fold(0, |best, i| if extent[i] > extent[best] { i } else { best });
        let half = (end - start) / 2;
        let centroids = &self.centroids;
        self.indices[start..end].select_nth_unstable_by(half, |&a, &b| {
            centroids[a][axis].total_cmp(&centroids[b][axis])
        });
        start + half
    }
}

impl Bvh {
    /// Builds a BVH over `triangles`, never deeper than [`MAX_DEPTH`].
    ///
    /// An empty input yields a single node with an empty box and no
    /// triangles; traversal treats it as a miss.
    pub fn build(triangles: &[Triangle]) -> Self {
        if triangles.is_empty() {
            return Self {
                nodes: vec![BvhNode::internal(&Aabb::EMPTY, 0)],
                tri_indices: Vec::new(),
            };
        }
        Builder::new(triangles).run()
    }

    /// Triangles in leaf order, packed for upload.
    pub fn gpu_triangles(&self, triangles: &[Triangle]) -> Vec<GpuTriangle> {
        self.tri_indices
            .iter()
            .map(|&idx| GpuTriangle::from(&triangles[idx]))
            .collect()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[BvhNode], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf() || node.left_or_first == 0 {
                return 1;
            }
            let left = node.left_or_first as usize;
            1 + walk(nodes, left).max(walk(nodes, left + 1))
        }
        walk(&self.nodes, 0)
    }
}

/// Binned SAH over all three axes; `None` when every axis is degenerate.
fn best_sah_split(
    indices: &[usize],
    aabbs: &[Aabb],
    centroids: &[[f32; 3]],
    centroid_bounds: &Aabb,
) -> Option<Split> {
    let mut best: Option<Split> = None;

    for axis in 0..3 {
        let lo = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - lo;
        if extent < 1e-8 {
            continue;
        }

        let mut bin_bounds = [Aabb::EMPTY; NUM_BINS];
        let mut bin_counts = [0usize; NUM_BINS];
        for &idx in indices {
            let bin = (((centroids[idx][axis] - lo) / extent * NUM_BINS as f32) as usize).min(NUM_BINS - 1);
            bin_bounds[bin].grow(&aabbs[idx]);
            bin_counts[bin] += 1;
        }

        // below[i]: weighted area of bins 0..=i.
        let mut below = [0.0f32; NUM_BINS];
        let mut acc = Aabb::EMPTY;
        let mut n = 0;
        for i in 0..NUM_BINS {
            acc.grow(&bin_bounds[i]);
            n += bin_counts[i];
            below[i] = n as f32 * acc.area();
        }

        let mut acc = Aabb::EMPTY;
        let mut n = 0;
        for i in (1..NUM_BINS).rev() {
            acc.grow(&bin_bounds[i]);
            n += bin_counts[i];
            let cost = TRAVERSAL_COST + INTERSECT_COST * (below[i - 1] + n as f32 * acc.area());
            if best.is_none_or(|b| cost < b.cost) {
                best = Some(Split {
                    axis,
                    position: lo + extent * i as f32 / NUM_BINS as f32,
                    cost,
                });
            }
        }
    }

    best
}

/// Moves elements matching `pred` to the front; returns how many matched.
fn partition<T>(slice: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut matched = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(matched, i);
            matched += 1;
        }
    }
    matched
}

/// BVH buffers uploaded for one scene generation.
pub struct AccelerationStructure<D: GpuDevice> {
    generation: u64,
    nodes: D::Buffer,
    triangles: D::Buffer,
    node_count: usize,
    triangle_count: usize,
}

impl<D: GpuDevice> AccelerationStructure<D> {
    /// Builds and uploads the BVH over the triangles of `geometry` overlapping `bounds`.
    ///
    /// Uploads complete before this returns, so any dispatch recorded later
    /// sees the finished structure.
    pub fn build(device: &D, geometry: &SceneGeometry, bounds: &SceneBounds, generation: u64) -> Self {
        let culled: Vec<Triangle> = geometry
            .triangles()
            .iter()
            .filter(|t| bounds.overlaps(&t.aabb()))
            .copied()
            .collect();

        let bvh = Bvh::build(&culled);
        let mut gpu_triangles = bvh.gpu_triangles(&culled);
        let triangle_count = gpu_triangles.len();
        if gpu_triangles.is_empty() {
            // Storage buffers cannot be empty.
            gpu_triangles.push(GpuTriangle::zeroed());
        }

        log::debug!(
            "acceleration structure built: {} of {} triangles inside bounds, {} nodes, depth {}",
            triangle_count,
            geometry.len(),
            bvh.nodes.len(),
            bvh.depth()
        );

        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        Self {
            generation,
            nodes: device.create_buffer("bvh nodes", bytemuck::cast_slice(&bvh.nodes), usage),
            triangles: device.create_buffer(
                "bvh triangles",
                bytemuck::cast_slice(&gpu_triangles),
                usage,
            ),
            node_count: bvh.nodes.len(),
            triangle_count,
        }
    }

    /// Scene generation this structure was built for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn nodes(&self) -> &D::Buffer {
        &self.nodes
    }

    pub fn triangles(&self) -> &D::Buffer {
        &self.triangles
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Triangles inside the scene bounds (padding excluded).
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use penumbra_compute::device::{HeadlessDevice, HeadlessInit};

    use super::*;
    use crate::mask::SceneMask;

    fn tri(cx: f32, cy: f32, cz: f32) -> Triangle {
        Triangle::new(
            Vec3::new(cx - 0.5, cy - 0.5, cz),
            Vec3::new(cx + 0.5, cy - 0.5, cz),
            Vec3::new(cx, cy + 0.5, cz),
            SceneMask::OPAQUE,
        )
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn gpu_records_match_wgsl_sizes() {
        assert_eq!(std::mem::size_of::<BvhNode>(), 32);
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 64);
    }

    // ── build ─────────────────────────────────────────────────────────────

    #[test]
    fn empty_input_yields_empty_root() {
        let bvh = Bvh::build(&[]);
        assert_eq!(bvh.nodes.len(), 1);
        assert!(!bvh.nodes[0].is_leaf());
        assert_eq!(bvh.nodes[0].left_or_first, 0);
        assert!(bvh.tri_indices.is_empty());
    }

    #[test]
    fn few_triangles_make_a_single_leaf() {
        let bvh = Bvh::build(&[tri(0.0, 0.0, 0.0), tri(1.0, 0.0, 0.0), tri(2.0, 0.0, 0.0)]);
        assert_eq!(bvh.nodes.len(), 1);
        assert_eq!(bvh.nodes[0].count, 3);
    }

    #[test]
    fn many_triangles_build_a_tree() {
        let tris: Vec<Triangle> = (0..100).map(|i| tri(i as f32 * 2.0, 0.0, 0.0)).collect();
        let bvh = Bvh::build(&tris);

        assert!(bvh.nodes.len() > 1);
        assert!(bvh.depth() > 2);

        let mut sorted = bvh.tri_indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());

        let root = &bvh.nodes[0];
        assert!(root.aabb_min[0] < 0.0);
        assert!(root.aabb_max[0] > 198.0);

        let leaf_total: u32 = bvh.nodes.iter().filter(|n| n.is_leaf()).map(|n| n.count).sum();
        assert_eq!(leaf_total, 100);
    }

    #[test]
    fn skewed_input_stays_within_traversal_depth() {
        // Exponentially spaced triangles make SAH peel one off per level.
        let tris: Vec<Triangle> = (0..200).map(|i| tri(1.2f32.powi(i), 0.0, 0.0)).collect();
        let bvh = Bvh::build(&tris);

        assert!(bvh.depth() <= MAX_DEPTH, "depth {}", bvh.depth());
        let leaf_total: u32 = bvh.nodes.iter().filter(|n| n.is_leaf()).map(|n| n.count).sum();
        assert_eq!(leaf_total, 200);
    }

    #[test]
    fn median_depth_halves_until_leaf_size() {
        assert_eq!(median_depth(1), 1);
        assert_eq!(median_depth(MAX_LEAF_SIZE), 1);
        assert_eq!(median_depth(MAX_LEAF_SIZE + 1), 2);
        assert_eq!(median_depth(64), 5);
    }

    #[test]
    fn packed_triangles_keep_mask_and_order() {
        let mut tris: Vec<Triangle> = (0..20).map(|i| tri(i as f32, 0.0, 0.0)).collect();
        tris[7].mask = SceneMask::VIRTUAL;
        let bvh = Bvh::build(&tris);
        let packed = bvh.gpu_triangles(&tris);

        for (slot, &idx) in bvh.tri_indices.iter().enumerate() {
            assert_eq!(packed[slot].v0, tris[idx].v0.to_array());
            assert_eq!(packed[slot].mask, tris[idx].mask.bits());
        }
        assert_eq!(packed[0].normal, [0.0, 0.0, 1.0]);
    }

    // ── upload ────────────────────────────────────────────────────────────

    #[test]
    fn build_culls_to_scene_bounds() {
        let device = HeadlessDevice::new(HeadlessInit::default());
        let mut geometry = SceneGeometry::new();
        geometry.push(tri(0.0, 0.0, 0.0));
        geometry.push(tri(50.0, 0.0, 0.0));

        let accel = AccelerationStructure::build(&device, &geometry, &SceneBounds::cube(10.0), 3);
        assert_eq!(accel.generation(), 3);
        assert_eq!(accel.triangle_count(), 1);
        assert_eq!(accel.triangles().contents().len(), 64);
        assert_eq!(accel.nodes().contents().len(), 32 * accel.node_count());
    }

    #[test]
    fn empty_scene_uploads_padding() {
        let device = HeadlessDevice::new(HeadlessInit::default());
        let accel = AccelerationStructure::build(&device, &SceneGeometry::new(), &SceneBounds::default(), 0);
        assert_eq!(accel.triangle_count(), 0);
        assert_eq!(accel.triangles().contents().len(), 64);
        assert_eq!(accel.node_count(), 1);
    }
}
