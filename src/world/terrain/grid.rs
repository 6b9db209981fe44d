use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;
use tracing::{debug, info};

use super::height_source::HeightSource;
use crate::config::{PatchLayout, TerrainSettings};
use crate::utils::math::{encode_normal, normalize_or_up};

/// Per-vertex entry of the vertex buffer: world position plus the geomorph
/// offset a shader blends in near a LOD switch.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub morph: f32,
}

/// Inputs the grid is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    pub width_scale: f32,
    pub height_scale: f32,
    pub water_level: f32,
    pub offset: [f32; 3],
    pub texture_detail: f32,
    pub layout: PatchLayout,
}

impl From<&TerrainSettings> for GridParams {
    fn from(settings: &TerrainSettings) -> Self {
        Self {
            width_scale: settings.width_scale,
            height_scale: settings.height_scale,
            water_level: settings.water_level,
            offset: settings.offset,
            texture_detail: settings.texture_detail,
            layout: settings.layout,
        }
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self::from(&TerrainSettings::default())
    }
}

/// The vertex grid of a terrain.
///
/// `x` runs along the depth (image rows) and `z` along the width (image
/// columns); vertex `(x, z)` lives at index `z + x * width`. Both dimensions
/// are padded so that `dimension - 1` is a multiple of the patch edge.
pub struct HeightGrid {
    width: usize,
    depth: usize,
    params: GridParams,

    vertices: Vec<TerrainVertex>,
    normals: Vec<[f32; 3]>,
    lod_levels: Vec<u8>,
    lod_steps: Vec<u16>,

    // Upload-only attributes, released once the renderer holds them.
    tex_coords: Vec<[f32; 2]>,
    normal_map_coords: Vec<[f32; 2]>,
    geomorph_helpers: Vec<[f32; 3]>,
}

/// Smallest `n * edge + 1` that is at least `size`.
pub fn padded_dimension(size: usize, edge: usize) -> usize {
    let size = size.max(2);
    let rest = (size - 1) % edge;
    if rest == 0 {
        size
    } else {
        size + edge - rest
    }
}

impl HeightGrid {
    /// Samples `source` into a padded vertex grid and computes normals and
    /// texture coordinates. LOD metadata is assigned separately.
    pub fn build<S: HeightSource + ?Sized>(source: &S, params: GridParams) -> Self {
        let edge = params.layout.patch_edge();
        let src_width = source.width();
        let src_depth = source.height();
        let width = padded_dimension(src_width, edge);
        let depth = padded_dimension(src_depth, edge);
        let count = width * depth;

        let water_height = -params.water_level - params.height_scale / 2.0;
        let mut vertices = Vec::with_capacity(count);
        for x in 0..depth {
            for z in 0..width {
                let height = match source.sample(x, z) {
                    Some(sample) => sample as f32 * params.height_scale + water_height,
                    None => water_height,
                };
                vertices.push(TerrainVertex {
                    position: [
                        params.width_scale * x as f32 + params.offset[0],
                        height + params.offset[1],
                        params.width_scale * z as f32 + params.offset[2],
                    ],
                    morph: 0.0,
                });
            }
        }

        let mut grid = Self {
            width,
            depth,
            params,
            vertices,
            normals: vec![[0.0, 1.0, 0.0]; count],
            lod_levels: vec![1; count],
            lod_steps: vec![1; count],
            tex_coords: Vec::new(),
            normal_map_coords: Vec::new(),
            geomorph_helpers: Vec::new(),
        };

        for x in 0..depth {
            for z in 0..width {
                grid.refresh_normal(x, z);
            }
        }
        grid.tex_coords = grid.generate_tex_coords();
        grid.normal_map_coords = grid.generate_normal_map_coords();

        info!(
            "Built height grid {}x{} from {}x{} source ({} vertices)",
            width, depth, src_width, src_depth, count
        );
        grid
    }

    /// Tags every vertex with the coarsest LOD level it stays active at.
    ///
    /// Levels are visited finest first so a later, coarser level overwrites.
    pub fn assign_lod_levels(&mut self) {
        let max_lods = self.params.layout.max_lods();
        for lod in 1..=max_lods {
            let delta = 1usize << (lod - 1);
            for x in (0..self.depth).step_by(delta) {
                for z in (0..self.width).step_by(delta) {
                    let index = self.index(x, z);
                    self.lod_levels[index] = lod as u8;
                    self.lod_steps[index] = delta as u16;
                }
            }
        }
        self.geomorph_helpers = self.generate_geomorph_helpers();
        debug!("Assigned LOD levels 1..={} to {} vertices", max_lods, self.vertex_count());
    }

    // **** dimensions and addressing ****

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn layout(&self) -> &PatchLayout {
        &self.params.layout
    }

    pub fn width_scale(&self) -> f32 {
        self.params.width_scale
    }

    #[inline]
    pub fn index(&self, x: usize, z: usize) -> usize {
        z + x * self.width
    }

    /// Nearest in-grid coordinates.
    pub fn clamp_coords(&self, x: i64, z: i64) -> (usize, usize) {
        (
            x.clamp(0, self.depth as i64 - 1) as usize,
            z.clamp(0, self.width as i64 - 1) as usize,
        )
    }

    pub fn contains(&self, x: i64, z: i64) -> bool {
        0 <= x && x < self.depth as i64 && 0 <= z && z < self.width as i64
    }

    // **** vertex attributes ****

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    /// Vertex at the nearest in-grid coordinates.
    pub fn vertex(&self, x: i64, z: i64) -> TerrainVertex {
        let (x, z) = self.clamp_coords(x, z);
        self.vertices[self.index(x, z)]
    }

    #[inline]
    pub fn height(&self, x: usize, z: usize) -> f32 {
        self.vertices[self.index(x, z)].position[1]
    }

    pub fn set_height(&mut self, x: usize, z: usize, value: f32) {
        let index = self.index(x, z);
        self.vertices[index].position[1] = value;
    }

    pub fn morph(&self, x: usize, z: usize) -> f32 {
        self.vertices[self.index(x, z)].morph
    }

    pub fn set_morph(&mut self, x: usize, z: usize, value: f32) {
        let index = self.index(x, z);
        self.vertices[index].morph = value;
    }

    pub fn normal(&self, x: usize, z: usize) -> [f32; 3] {
        self.normals[self.index(x, z)]
    }

    pub fn lod_level(&self, x: usize, z: usize) -> u32 {
        self.lod_levels[self.index(x, z)] as u32
    }

    pub fn lod_step(&self, x: usize, z: usize) -> usize {
        self.lod_steps[self.index(x, z)] as usize
    }

    /// Whether the vertex takes part in meshes rendered at `lod`.
    pub fn is_active(&self, x: usize, z: usize, lod: u32) -> bool {
        let stride = 1usize << (lod.max(1) - 1);
        x % stride == 0 && z % stride == 0
    }

    /// Normal from the height differences to the existing axis neighbours.
    ///
    /// Each neighbour adds its one-sided slope to x or z and `width_scale`
    /// to y, so border vertices fall back to one-sided differences.
    pub fn compute_normal(&self, x: usize, z: usize) -> [f32; 3] {
        let ws = self.params.width_scale;
        let h = self.height(x, z);
        let mut normal = Vector3::new(0.0f32, 0.0, 0.0);

        if x + 1 < self.depth {
            normal.x += h - self.height(x + 1, z);
            normal.y += ws;
        }
        if x > 0 {
            normal.x += self.height(x - 1, z) - h;
            normal.y += ws;
        }
        if z + 1 < self.width {
            normal.z += h - self.height(x, z + 1);
            normal.y += ws;
        }
        if z > 0 {
            normal.z += self.height(x, z - 1) - h;
            normal.y += ws;
        }

        normalize_or_up(normal).into()
    }

    pub fn refresh_normal(&mut self, x: usize, z: usize) {
        let normal = self.compute_normal(x, z);
        let index = self.index(x, z);
        self.normals[index] = normal;
    }

    /// Normal map texels, `(n + 1) / 2` per component.
    pub fn encoded_normals(&self, range: std::ops::Range<usize>) -> Vec<[f32; 3]> {
        self.normals[range].iter().map(|n| encode_normal(*n)).collect()
    }

    // **** continuous queries ****

    /// Grid-space coordinates of a world position.
    fn to_grid_space(&self, world_x: f32, world_z: f32) -> (f32, f32) {
        let ws = self.params.width_scale;
        (
            (world_x - self.params.offset[0]) / ws,
            (world_z - self.params.offset[2]) / ws,
        )
    }

    /// Lower cell corner and fractions for bilinear lookups; outside the
    /// grid the nearest cell is used.
    fn cell(&self, world_x: f32, world_z: f32) -> (usize, usize, f32, f32) {
        let (fx, fz) = self.to_grid_space(world_x, world_z);
        let max_x = self.depth.saturating_sub(2) as f32;
        let max_z = self.width.saturating_sub(2) as f32;
        let ix = fx.floor().clamp(0.0, max_x);
        let iz = fz.floor().clamp(0.0, max_z);
        let dx = (fx - ix).clamp(0.0, 1.0);
        let dz = (fz - iz).clamp(0.0, 1.0);
        (ix as usize, iz as usize, dx, dz)
    }

    /// Interpolated height at a world position.
    pub fn height_at(&self, world_x: f32, world_z: f32) -> f32 {
        let (x, z, dx, dz) = self.cell(world_x, world_z);
        let (x1, z1) = ((x + 1).min(self.depth - 1), (z + 1).min(self.width - 1));
        let h00 = self.height(x, z);
        let h10 = self.height(x1, z);
        let h01 = self.height(x, z1);
        let h11 = self.height(x1, z1);

        (h00 * (1.0 - dx) + h10 * dx) * (1.0 - dz) + (h01 * (1.0 - dx) + h11 * dx) * dz
    }

    /// Interpolated normal at a world position. Not renormalised, so grid
    /// points return the stored normal exactly.
    pub fn normal_at(&self, world_x: f32, world_z: f32) -> [f32; 3] {
        let (x, z, dx, dz) = self.cell(world_x, world_z);
        let (x1, z1) = ((x + 1).min(self.depth - 1), (z + 1).min(self.width - 1));
        let n00 = self.normal(x, z);
        let n10 = self.normal(x1, z);
        let n01 = self.normal(x, z1);
        let n11 = self.normal(x1, z1);

        let mut out = [0.0f32; 3];
        for axis in 0..3 {
            out[axis] = (n00[axis] * (1.0 - dx) + n10[axis] * dx) * (1.0 - dz)
                + (n01[axis] * (1.0 - dx) + n11[axis] * dx) * dz;
        }
        out
    }

    // **** texture coordinates and geomorph helpers ****

    pub fn tex_coords(&self) -> &[[f32; 2]] {
        &self.tex_coords
    }

    pub fn normal_map_coords(&self) -> &[[f32; 2]] {
        &self.normal_map_coords
    }

    pub fn geomorph_helpers(&self) -> &[[f32; 3]] {
        &self.geomorph_helpers
    }

    /// Tiled texture coordinates, `(z, x) * texture_detail`.
    pub fn generate_tex_coords(&self) -> Vec<[f32; 2]> {
        let detail = self.params.texture_detail;
        let mut coords = Vec::with_capacity(self.vertex_count());
        for x in 0..self.depth {
            for z in 0..self.width {
                coords.push([z as f32 * detail, x as f32 * detail]);
            }
        }
        coords
    }

    /// Normal map coordinates addressing the centre of each texel.
    pub fn generate_normal_map_coords(&self) -> Vec<[f32; 2]> {
        let mut coords = Vec::with_capacity(self.vertex_count());
        for x in 0..self.depth {
            for z in 0..self.width {
                coords.push([
                    (z as f32 + 0.5) / self.width as f32,
                    (x as f32 + 0.5) / self.depth as f32,
                ]);
            }
        }
        coords
    }

    /// Patch centre (world x, world z) and LOD level of every vertex.
    pub fn generate_geomorph_helpers(&self) -> Vec<[f32; 3]> {
        let edge = self.params.layout.patch_edge();
        let ws = self.params.width_scale;
        let last_patch_x = ((self.depth - 1) / edge).max(1) - 1;
        let last_patch_z = ((self.width - 1) / edge).max(1) - 1;
        let center_offset = (edge / 2) as f32 * ws;

        let mut helpers = Vec::with_capacity(self.vertex_count());
        for x in 0..self.depth {
            for z in 0..self.width {
                let patch_x = (x / edge).min(last_patch_x);
                let patch_z = (z / edge).min(last_patch_z);
                helpers.push([
                    (patch_x * edge) as f32 * ws + center_offset + self.params.offset[0],
                    (patch_z * edge) as f32 * ws + center_offset + self.params.offset[2],
                    self.lod_level(x, z) as f32,
                ]);
            }
        }
        helpers
    }

    pub fn set_texture_detail(&mut self, detail: f32) {
        self.params.texture_detail = detail;
        if !self.tex_coords.is_empty() {
            self.tex_coords = self.generate_tex_coords();
        }
    }

    /// Drops the attributes that only exist to be uploaded.
    pub fn release_upload_scratch(&mut self) {
        self.tex_coords = Vec::new();
        self.normal_map_coords = Vec::new();
        self.geomorph_helpers = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::terrain::height_source::RawHeightSource;

    fn params(edge: u32, lods: u32) -> GridParams {
        GridParams {
            water_level: -0.5,
            layout: PatchLayout::new(edge, lods).unwrap(),
            ..GridParams::default()
        }
    }

    #[test]
    fn test_padded_dimension() {
        assert_eq!(padded_dimension(5, 4), 5);
        assert_eq!(padded_dimension(6, 4), 9);
        assert_eq!(padded_dimension(9, 4), 9);
        assert_eq!(padded_dimension(10, 8), 17);
        assert_eq!(padded_dimension(33, 32), 33);
    }

    #[test]
    fn test_build_pads_with_water_height() {
        let source = RawHeightSource::from_heights(6, 5, vec![2; 30]);
        let grid = HeightGrid::build(&source, params(4, 3));
        assert_eq!(grid.width(), 9);
        assert_eq!(grid.depth(), 5);
        // In-bounds: 2 * 1 + 0.5 - 0.5.
        assert_eq!(grid.height(4, 5), 2.0);
        // Padding: -water_level - height_scale / 2.
        assert_eq!(grid.height(4, 6), 0.0);
        assert_eq!(grid.height(0, 8), 0.0);
    }

    #[test]
    fn test_positions_follow_scale_and_offset() {
        let source = RawHeightSource::from_heights(5, 5, vec![0; 25]);
        let grid = HeightGrid::build(
            &source,
            GridParams {
                width_scale: 2.0,
                offset: [10.0, 1.0, -4.0],
                ..params(4, 3)
            },
        );
        let v = grid.vertex(3, 1);
        assert_eq!(v.position, [16.0, 1.0, -2.0]);
    }

    #[test]
    fn test_flat_grid_normals_point_up() {
        let source = RawHeightSource::from_heights(5, 5, vec![7; 25]);
        let grid = HeightGrid::build(&source, params(4, 3));
        for x in 0..5 {
            for z in 0..5 {
                assert_eq!(grid.normal(x, z), [0.0, 1.0, 0.0]);
            }
        }
    }

    #[test]
    fn test_lod_levels_and_steps() {
        let source = RawHeightSource::from_heights(9, 9, vec![0; 81]);
        let mut grid = HeightGrid::build(&source, params(4, 3));
        grid.assign_lod_levels();
        assert_eq!(grid.lod_level(0, 0), 3);
        assert_eq!(grid.lod_level(4, 8), 3);
        assert_eq!(grid.lod_level(2, 4), 2);
        assert_eq!(grid.lod_level(2, 2), 2);
        assert_eq!(grid.lod_level(1, 4), 1);
        assert_eq!(grid.lod_level(3, 3), 1);
        for x in 0..9 {
            for z in 0..9 {
                let level = grid.lod_level(x, z);
                assert_eq!(grid.lod_step(x, z), 1 << (level - 1));
                for lod in 1..=level {
                    assert!(grid.is_active(x, z, lod));
                }
                if level < 3 {
                    assert!(!grid.is_active(x, z, level + 1));
                }
            }
        }
    }

    #[test]
    fn test_coordinates_and_helpers() {
        let source = RawHeightSource::from_heights(9, 9, vec![0; 81]);
        let mut grid = HeightGrid::build(&source, params(4, 3));
        grid.assign_lod_levels();

        assert_eq!(grid.tex_coords()[grid.index(2, 3)], [3.0, 2.0]);
        assert_eq!(grid.normal_map_coords()[grid.index(0, 8)], [8.5 / 9.0, 0.5 / 9.0]);
        // Vertex (5, 1) sits in patch (1, 0) centred at (6, 2).
        assert_eq!(grid.geomorph_helpers()[grid.index(5, 1)], [6.0, 2.0, 1.0]);
        // The last row belongs to the last patch.
        assert_eq!(grid.geomorph_helpers()[grid.index(8, 8)], [6.0, 6.0, 3.0]);

        grid.release_upload_scratch();
        assert!(grid.tex_coords().is_empty());
        assert!(grid.geomorph_helpers().is_empty());
        grid.set_texture_detail(2.0);
        assert!(grid.tex_coords().is_empty());
        assert_eq!(grid.generate_tex_coords()[grid.index(1, 1)], [2.0, 2.0]);
    }

    #[test]
    fn test_height_at_clamps_outside_grid() {
        let source = RawHeightSource::from_fn(5, 5, |x, z| (x * 5 + z) as u8);
        let grid = HeightGrid::build(&source, params(4, 3));
        assert_eq!(grid.height_at(-3.0, -7.0), grid.height(0, 0));
        assert_eq!(grid.height_at(40.0, 40.0), grid.height(4, 4));
        assert_eq!(grid.height_at(4.0, 2.0), grid.height(4, 2));
    }
}
