use std::mem;

use tracing::{debug, error, info, warn};

use crate::config::PatchLayout;

/// How the written index total compares with the precomputed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTotal {
    Exact,
    Overflow,
    Short,
}

/// Compares the index total actually written with the allocated one and
/// logs any difference. The written count is authoritative either way.
pub fn settle_index_total(allocated: usize, written: usize) -> IndexTotal {
    if written > allocated {
        error!(
            "Index buffer overflow: allocated {} indices but wrote {}, using the written count",
            allocated, written
        );
        IndexTotal::Overflow
    } else if written < allocated {
        warn!(
            "Index buffer allocated {} indices but only {} were written, shrinking",
            allocated, written
        );
        IndexTotal::Short
    } else {
        IndexTotal::Exact
    }
}

/// LOD of a neighbouring patch relative to the patch being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborBucket {
    Coarser = 0,
    Same = 1,
    Finer = 2,
}

impl NeighborBucket {
    pub const ALL: [NeighborBucket; 3] = [
        NeighborBucket::Coarser,
        NeighborBucket::Same,
        NeighborBucket::Finer,
    ];

    /// A missing neighbour (grid border) counts as `Same`.
    pub fn classify(own_lod: u32, neighbor_lod: Option<u32>) -> Self {
        match neighbor_lod {
            Some(lod) if lod > own_lod => NeighborBucket::Coarser,
            Some(lod) if lod < own_lod => NeighborBucket::Finer,
            _ => NeighborBucket::Same,
        }
    }

    /// Vertex stride along the shared edge, matching the neighbour's own
    /// stride when it is one level away.
    pub fn edge_stride(self, own_stride: usize, patch_edge: usize) -> usize {
        match self {
            NeighborBucket::Coarser => (own_stride * 2).min(patch_edge),
            NeighborBucket::Same => own_stride,
            NeighborBucket::Finer => (own_stride / 2).max(1),
        }
    }
}

/// Lookup key of one precomputed index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LodKey {
    pub lod: u32,
    pub right: NeighborBucket,
    pub upper: NeighborBucket,
}

impl LodKey {
    pub fn new(lod: u32, right: NeighborBucket, upper: NeighborBucket) -> Self {
        Self { lod, right, upper }
    }

    /// Uniform LOD with no neighbour adjustment.
    pub fn uniform(lod: u32) -> Self {
        Self::new(lod, NeighborBucket::Same, NeighborBucket::Same)
    }

    /// Position within a patch's block of `max_lods * 9` variants.
    #[inline]
    pub fn packed(&self) -> usize {
        ((self.lod.max(1) as usize - 1) * 3 + self.right as usize) * 3 + self.upper as usize
    }

    /// Grid spacing between interior vertices at this LOD.
    pub fn stride(&self) -> usize {
        1usize << (self.lod.max(1) - 1)
    }

    /// Every key of a layout, in packed order.
    pub fn all(layout: &PatchLayout) -> impl Iterator<Item = LodKey> {
        let max_lods = layout.max_lods();
        (1..=max_lods).flat_map(|lod| {
            NeighborBucket::ALL.into_iter().flat_map(move |right| {
                NeighborBucket::ALL
                    .into_iter()
                    .map(move |upper| LodKey::new(lod, right, upper))
            })
        })
    }
}

/// Sub-range of the global index buffer holding one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantRange {
    pub index_offset: u32,
    pub index_count: u32,
}

impl VariantRange {
    pub fn byte_offset(&self) -> u64 {
        self.index_offset as u64 * mem::size_of::<u32>() as u64
    }

    pub fn byte_len(&self) -> u64 {
        self.index_count as u64 * mem::size_of::<u32>() as u64
    }
}

/// Index lists of every patch at every (LOD, right bucket, upper bucket),
/// concatenated into one buffer. Built once and never mutated afterwards.
pub struct PatchLodTable {
    layout: PatchLayout,
    patch_count: usize,
    ranges: Vec<VariantRange>,
    indices: Vec<u32>,
    index_total: usize,
}

impl PatchLodTable {
    /// Precomputes all variants for patches at `origins` (grid `(x, z)` of
    /// each patch's lower corner) in a grid `grid_width` vertices wide.
    pub fn build(layout: PatchLayout, grid_width: usize, origins: &[(usize, usize)]) -> Self {
        let edge = layout.patch_edge();
        let per_patch = layout.variants_per_patch();

        let allocated: usize = origins.len()
            * LodKey::all(&layout)
                .map(|key| expected_index_count(edge, key))
                .sum::<usize>();

        let mut indices = Vec::with_capacity(allocated);
        let mut ranges = Vec::with_capacity(origins.len() * per_patch);
        for &origin in origins {
            for key in LodKey::all(&layout) {
                let offset = indices.len();
                append_variant(&mut indices, grid_width, origin, edge, key);
                let count = indices.len() - offset;
                let expected = expected_index_count(edge, key);
                if count != expected {
                    error!(
                        "Variant {:?} of patch at {:?} has {} indices, expected {}",
                        key, origin, count, expected
                    );
                }
                ranges.push(VariantRange {
                    index_offset: offset as u32,
                    index_count: count as u32,
                });
            }
        }

        let written = indices.len();
        if settle_index_total(allocated, written) == IndexTotal::Short {
            indices.shrink_to_fit();
        }

        info!(
            "Precomputed {} LOD variants for {} patches ({} indices)",
            ranges.len(),
            origins.len(),
            written
        );

        Self {
            layout,
            patch_count: origins.len(),
            ranges,
            indices,
            index_total: written,
        }
    }

    pub fn layout(&self) -> &PatchLayout {
        &self.layout
    }

    pub fn patch_count(&self) -> usize {
        self.patch_count
    }

    pub fn variant_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total indices across all variants, as written.
    pub fn index_total(&self) -> usize {
        self.index_total
    }

    pub fn variant(&self, patch: usize, key: LodKey) -> VariantRange {
        self.ranges[patch * self.layout.variants_per_patch() + key.packed()]
    }

    pub fn ranges(&self) -> &[VariantRange] {
        &self.ranges
    }

    /// The global index buffer; empty once released after upload.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn variant_indices(&self, patch: usize, key: LodKey) -> &[u32] {
        let range = self.variant(patch, key);
        let start = range.index_offset as usize;
        &self.indices[start..start + range.index_count as usize]
    }

    pub fn release_indices(&mut self) {
        debug!("Releasing {} CPU-side indices", self.indices.len());
        self.indices = Vec::new();
    }
}

/// Edge strides of a variant: (interior, right edge, upper edge).
pub fn variant_strides(edge: usize, key: LodKey) -> (usize, usize, usize) {
    let stride = key.stride().min(edge);
    (
        stride,
        key.right.edge_stride(stride, edge),
        key.upper.edge_stride(stride, edge),
    )
}

/// Number of indices `append_variant` emits for a key.
pub fn expected_index_count(edge: usize, key: LodKey) -> usize {
    let (s, r, u) = variant_strides(edge, key);
    let inner_cells = (edge - s) / s;
    let triangles = 2 * inner_cells * inner_cells + 2 * inner_cells + edge / r + edge / u;
    triangles * 3
}

/// Triangulates one patch variant as a triangle list, counter-clockwise
/// seen from above.
///
/// Cells away from the right (+z) and upper (+x) edges are plain quads at
/// the patch stride. The L-shaped band along those two edges is zipped
/// between the inner path (patch stride) and the outer path, whose strides
/// follow the neighbour buckets. Left and lower edges always keep the patch
/// stride, so each shared edge is decided by exactly one of its patches.
fn append_variant(
    out: &mut Vec<u32>,
    grid_width: usize,
    origin: (usize, usize),
    edge: usize,
    key: LodKey,
) {
    let (s, r, u) = variant_strides(edge, key);
    let (px, pz) = origin;
    let index = |x: usize, z: usize| ((pz + z) + (px + x) * grid_width) as u32;
    let inner = edge - s;

    for x in (0..inner).step_by(s) {
        for z in (0..inner).step_by(s) {
            out.extend_from_slice(&[
                index(x, z),
                index(x, z + s),
                index(x + s, z + s),
                index(x, z),
                index(x + s, z + s),
                index(x + s, z),
            ]);
        }
    }

    // Both paths are parameterised by their projection onto the outer
    // L: 0..edge along the right edge, edge..2*edge along the upper edge.
    let mut inner_path: Vec<((usize, usize), usize)> = Vec::with_capacity(2 * inner / s + 1);
    for x in (0..inner).step_by(s) {
        inner_path.push(((x, inner), x));
    }
    inner_path.push(((inner, inner), edge));
    for z in (0..inner).step_by(s).rev() {
        inner_path.push(((inner, z), 2 * edge - z));
    }

    let mut outer_path: Vec<((usize, usize), usize)> = Vec::with_capacity(edge / r + edge / u + 1);
    for x in (0..edge).step_by(r) {
        outer_path.push(((x, edge), x));
    }
    outer_path.push(((edge, edge), edge));
    for z in (0..edge).step_by(u).rev() {
        outer_path.push(((edge, z), 2 * edge - z));
    }

    let (mut i, mut j) = (0, 0);
    let (last_i, last_j) = (inner_path.len() - 1, outer_path.len() - 1);
    while i < last_i || j < last_j {
        let (a, b) = (inner_path[i].0, outer_path[j].0);
        let take_outer = j < last_j && (i == last_i || outer_path[j + 1].1 <= inner_path[i + 1].1);
        let c = if take_outer {
            j += 1;
            outer_path[j].0
        } else {
            i += 1;
            inner_path[i].0
        };
        out.extend_from_slice(&[index(a.0, a.1), index(b.0, b.1), index(c.0, c.1)]);
    }
}
