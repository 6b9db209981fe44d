use std::ops::Range;

use cgmath::Vector3;
use tracing::{debug, info, warn};

use super::dirty::DirtyRanges;
use super::geomorph::GeomorphEngine;
use super::grid::{GridParams, HeightGrid, TerrainVertex};
use super::height_source::HeightSource;
use super::lod_table::PatchLodTable;
use super::patch::{limit_level_gradient, PatchNode};
use crate::config::TerrainSettings;
use crate::rendering::{BufferKind, DrawCall, NoShading, RenderBackend, ShadingStage, ViewingVolume};
use crate::utils::math::BoundingBox;

/// A loaded terrain: the vertex grid, its patches and their precomputed
/// index variants, plus the backend holding the GPU copies.
///
/// Out-of-grid coordinates given to any method are clamped, never rejected.
/// Edits and rendering must be serialised by the caller.
pub struct TerrainSurface<B: RenderBackend, S: ShadingStage = NoShading> {
    settings: TerrainSettings,
    grid: HeightGrid,
    patches: Vec<PatchNode>,
    patch_grid_width: usize,
    patch_grid_depth: usize,
    table: PatchLodTable,
    base_distance: f32,
    inv_inc_distance: f32,
    backend: B,
    shading: Option<S>,
}

impl<B: RenderBackend> TerrainSurface<B, NoShading> {
    /// Builds the terrain from `source` and uploads it through `backend`.
    pub fn load<H: HeightSource + ?Sized>(settings: TerrainSettings, source: &H, backend: B) -> Self {
        Self::assemble(settings, source, backend, None)
    }
}

impl<B: RenderBackend, S: ShadingStage> TerrainSurface<B, S> {
    /// Like `load`, with a shading stage that receives the terrain uniforms
    /// and the normal map binding.
    pub fn load_with_shading<H: HeightSource + ?Sized>(
        settings: TerrainSettings,
        source: &H,
        backend: B,
        shading: S,
    ) -> Self {
        Self::assemble(settings, source, backend, Some(shading))
    }

    fn assemble<H: HeightSource + ?Sized>(
        settings: TerrainSettings,
        source: &H,
        backend: B,
        shading: Option<S>,
    ) -> Self {
        let (grid, patches, patch_grid_width, patch_grid_depth, table) = build_terrain(&settings, source);
        let mut surface = Self {
            settings,
            grid,
            patches,
            patch_grid_width,
            patch_grid_depth,
            table,
            base_distance: 0.0,
            inv_inc_distance: 0.0,
            backend,
            shading,
        };
        surface.upload_all();
        surface
    }

    /// Rebuilds everything from `source` with new settings, re-uploading
    /// all buffers.
    pub fn reload<H: HeightSource + ?Sized>(&mut self, settings: TerrainSettings, source: &H) {
        let (grid, patches, patch_grid_width, patch_grid_depth, table) = build_terrain(&settings, source);
        self.settings = settings;
        self.grid = grid;
        self.patches = patches;
        self.patch_grid_width = patch_grid_width;
        self.patch_grid_depth = patch_grid_depth;
        self.table = table;
        self.upload_all();
    }

    fn upload_all(&mut self) {
        let grid = &self.grid;
        self.backend
            .upload(BufferKind::Vertices, bytemuck::cast_slice(grid.vertices()));
        self.backend
            .upload(BufferKind::TexCoords, bytemuck::cast_slice(grid.tex_coords()));
        self.backend.upload(
            BufferKind::NormalMapCoords,
            bytemuck::cast_slice(grid.normal_map_coords()),
        );
        self.backend
            .upload(BufferKind::Geomorph, bytemuck::cast_slice(grid.geomorph_helpers()));
        let normal_map = grid.encoded_normals(0..grid.vertex_count());
        self.backend
            .upload(BufferKind::NormalMap, bytemuck::cast_slice(&normal_map));
        self.backend
            .upload(BufferKind::Indices, bytemuck::cast_slice(self.table.indices()));

        if let Some(shading) = self.shading.as_mut() {
            let bands = &self.settings.shading;
            shading.set_uniform("snowStartHeight", bands.snow_start_height);
            shading.set_uniform("snowBlend", bands.snow_blend);
            shading.set_uniform("grassStartHeight", bands.grass_start_height);
            shading.set_uniform("grassBlend", bands.grass_blend);
            shading.set_uniform("sandStartHeight", bands.sand_start_height);
            shading.set_uniform("sandBlend", bands.sand_blend);
            shading.bind_texture(
                "normalMap",
                BufferKind::NormalMap,
                self.grid.width() as u32,
                self.grid.depth() as u32,
            );
        }

        let lod = self.settings.lod;
        self.set_lod_switch_distance(lod.base_distance, lod.increment_distance);

        for (index, patch) in self.patches.iter_mut().enumerate() {
            patch.resolve_variant(None, None, &self.table, index);
        }

        self.grid.release_upload_scratch();
        self.table.release_indices();

        info!(
            "Terrain loaded: {}x{} vertices, {} patches ({}x{}), {} variants, {} indices",
            self.grid.width(),
            self.grid.depth(),
            self.patches.len(),
            self.patch_grid_depth,
            self.patch_grid_width,
            self.table.variant_count(),
            self.table.index_total()
        );
    }

    // **** accessors ****

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn grid(&self) -> &HeightGrid {
        &self.grid
    }

    pub fn patches(&self) -> &[PatchNode] {
        &self.patches
    }

    pub fn lod_table(&self) -> &PatchLodTable {
        &self.table
    }

    /// Patches along x and along z.
    pub fn patch_grid_size(&self) -> (usize, usize) {
        (self.patch_grid_depth, self.patch_grid_width)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn shading(&self) -> Option<&S> {
        self.shading.as_ref()
    }

    pub fn base_distance(&self) -> f32 {
        self.base_distance
    }

    pub fn inv_inc_distance(&self) -> f32 {
        self.inv_inc_distance
    }

    pub fn bounding_boxes(&self) -> Vec<BoundingBox> {
        self.patches.iter().map(|p| *p.bounds()).collect()
    }

    // **** queries ****

    pub fn height_at(&self, world_x: f32, world_z: f32) -> f32 {
        self.grid.height_at(world_x, world_z)
    }

    pub fn normal_at(&self, world_x: f32, world_z: f32) -> [f32; 3] {
        self.grid.normal_at(world_x, world_z)
    }

    pub fn vertex(&self, x: i64, z: i64) -> TerrainVertex {
        self.grid.vertex(x, z)
    }

    /// Raw buffer index of `(x, z)`, without clamping.
    pub fn coord_to_index(&self, x: usize, z: usize) -> usize {
        self.grid.index(x, z)
    }

    /// Patch owning vertex `(x, z)`; shared edge vertices resolve to the
    /// lower patch.
    pub fn patch_index_for_vertex(&self, x: usize, z: usize) -> usize {
        let edge = self.grid.layout().patch_edge();
        let px = (x.saturating_sub(1) / edge).min(self.patch_grid_depth - 1);
        let pz = (z.saturating_sub(1) / edge).min(self.patch_grid_width - 1);
        pz + px * self.patch_grid_width
    }

    /// Every patch whose footprint, edges included, meets the block.
    fn patches_touching(&self, xs: Range<usize>, zs: Range<usize>) -> Vec<usize> {
        let edge = self.grid.layout().patch_edge();
        let px_range = xs.start.saturating_sub(1) / edge
            ..=((xs.end - 1) / edge).min(self.patch_grid_depth - 1);
        let pz_range = zs.start.saturating_sub(1) / edge
            ..=((zs.end - 1) / edge).min(self.patch_grid_width - 1);
        let mut touched = Vec::new();
        for px in px_range {
            for pz in pz_range.clone() {
                touched.push(pz + px * self.patch_grid_width);
            }
        }
        touched
    }

    // **** configuration ****

    /// Sets the LOD switch distances. An increment shorter than a patch
    /// diagonal could change LOD twice across one patch, so it is raised
    /// to that minimum.
    pub fn set_lod_switch_distance(&mut self, base_distance: f32, increment_distance: f32) {
        let edge_length = self.grid.layout().patch_edge() as f32 * self.grid.width_scale();
        let min_squared = edge_length * edge_length * 2.0;
        let increment = if increment_distance * increment_distance < min_squared {
            let minimum = min_squared.sqrt();
            warn!(
                "LOD increment distance {} is too low, using the minimum {}",
                increment_distance, minimum
            );
            minimum
        } else {
            increment_distance
        };

        self.base_distance = base_distance;
        self.inv_inc_distance = 1.0 / increment;
        self.settings.lod.base_distance = base_distance;
        self.settings.lod.increment_distance = increment;

        if let Some(shading) = self.shading.as_mut() {
            shading.set_uniform("baseDistance", self.base_distance);
            shading.set_uniform("invIncDistance", self.inv_inc_distance);
        }
    }

    /// Changes the texture tiling density and re-uploads texture coordinates.
    pub fn set_texture_detail(&mut self, detail: f32) {
        self.settings.texture_detail = detail;
        self.grid.set_texture_detail(detail);
        let coords = self.grid.generate_tex_coords();
        self.backend
            .update(BufferKind::TexCoords, 0, bytemuck::cast_slice(&coords));
    }

    // **** per frame ****

    /// Selects every patch's LOD variant for the current viewer position.
    ///
    /// Levels are chosen for all patches first and capped so that adjacent
    /// patches differ by at most one level. Each patch then classifies its
    /// neighbours against those levels in row-major order.
    pub fn calc_lod<V: ViewingVolume + ?Sized>(&mut self, view: &V) {
        let position = view.position();
        let max_lods = self.grid.layout().max_lods();
        let (base, inv_inc) = (self.base_distance, self.inv_inc_distance);

        let mut levels: Vec<u32> = self
            .patches
            .iter_mut()
            .map(|patch| patch.select_level(position, base, inv_inc, max_lods))
            .collect();

        // Steep neighbours can sit several increments apart; the table only
        // stitches to a neighbour one level away.
        limit_level_gradient(&mut levels, self.patch_grid_width, self.patch_grid_depth);
        for (patch, &level) in self.patches.iter_mut().zip(&levels) {
            patch.limit_level(level);
        }

        for (index, patch) in self.patches.iter_mut().enumerate() {
            let right = patch.right().map(|n| levels[n]);
            let upper = patch.upper().map(|n| levels[n]);
            patch.resolve_variant(right, upper, &self.table, index);
        }
    }

    /// Issues one draw per patch, front to back along `view_direction`.
    /// Returns the number of draws.
    pub fn render(&mut self, view_direction: Vector3<f32>) -> usize {
        let (depth, width) = (self.patch_grid_depth, self.patch_grid_width);
        let forward_x = view_direction.x >= 0.0;
        let forward_z = view_direction.z >= 0.0;

        for i in 0..depth {
            let px = if forward_x { i } else { depth - 1 - i };
            for j in 0..width {
                let pz = if forward_z { j } else { width - 1 - j };
                let range = self.patches[pz + px * width].active_range();
                self.backend.draw_indexed(DrawCall {
                    byte_offset: range.byte_offset(),
                    index_count: range.index_count,
                });
            }
        }
        depth * width
    }

    /// `calc_lod` followed by `render` for one viewer.
    pub fn draw_frame<V: ViewingVolume + ?Sized>(&mut self, view: &V) -> usize {
        self.calc_lod(view);
        self.render(view.direction())
    }

    // **** edits ****

    /// Sets the world height of vertex `(x, z)`, clamped into the grid.
    pub fn set_height(&mut self, x: i64, z: i64, value: f32) {
        let (x, z) = self.grid.clamp_coords(x, z);
        self.grid.set_height(x, z, value);

        let mut dirty_vertices = DirtyRanges::new();
        GeomorphEngine::refresh_after_point_edit(&mut self.grid, x, z, &mut dirty_vertices);

        let mut dirty_normals = DirtyRanges::new();
        let (x0, z0) = (x.saturating_sub(1), z.saturating_sub(1));
        let (x1, z1) = ((x + 1).min(self.grid.depth() - 1), (z + 1).min(self.grid.width() - 1));
        for (nx, nz) in [(x, z), (x0, z), (x1, z), (x, z0), (x, z1)] {
            self.grid.refresh_normal(nx, nz);
            dirty_normals.mark(self.grid.index(nx, nz));
        }

        self.flush(&dirty_vertices, &dirty_normals);

        for index in self.patches_touching(x..x + 1, z..z + 1) {
            self.patches[index].update_bounding_geometry(value);
        }
    }

    /// Writes a `depth`-row by `width`-column block of heights starting at
    /// `(x, z)`; `values` is row-major. The block is clipped to the grid.
    pub fn set_height_region(&mut self, x: i64, z: i64, width: usize, depth: usize, values: &[f32]) {
        if values.len() < width.saturating_mul(depth) {
            warn!(
                "Region {}x{} at ({}, {}) has only {} values, missing cells keep their height",
                depth,
                width,
                x,
                z,
                values.len()
            );
        }

        let clip = |start: i64, len: usize, limit: usize| -> Range<usize> {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let len = i64::try_from(len).unwrap_or(i64::MAX);
            let lo = start.clamp(0, limit) as usize;
            let hi = start.saturating_add(len).clamp(0, limit) as usize;
            lo..hi
        };
        let xs = clip(x, depth, self.grid.depth());
        let zs = clip(z, width, self.grid.width());
        if xs.is_empty() || zs.is_empty() {
            debug!("Region {}x{} at ({}, {}) lies outside the grid", depth, width, x, z);
            return;
        }
        if xs.len() != depth || zs.len() != width {
            debug!(
                "Region {}x{} at ({}, {}) clipped to x {:?}, z {:?}",
                depth, width, x, z, xs, zs
            );
        }

        for gx in xs.clone() {
            for gz in zs.clone() {
                let row = (gx as i64).abs_diff(x) as usize;
                let col = (gz as i64).abs_diff(z) as usize;
                let cell = row.checked_mul(width).and_then(|r| r.checked_add(col));
                if let Some(&value) = cell.and_then(|i| values.get(i)) {
                    self.grid.set_height(gx, gz, value);
                }
            }
        }

        let max_delta = self.grid.layout().max_delta();
        let mut dirty_vertices = DirtyRanges::new();
        GeomorphEngine::refresh_region(
            &mut self.grid,
            xs.start.saturating_sub(max_delta)..xs.end + max_delta,
            zs.start.saturating_sub(max_delta)..zs.end + max_delta,
            &mut dirty_vertices,
        );

        let mut dirty_normals = DirtyRanges::new();
        let normal_xs = xs.start.saturating_sub(1)..(xs.end + 1).min(self.grid.depth());
        let normal_zs = zs.start.saturating_sub(1)..(zs.end + 1).min(self.grid.width());
        for gx in normal_xs {
            for gz in normal_zs.clone() {
                self.grid.refresh_normal(gx, gz);
                dirty_normals.mark(self.grid.index(gx, gz));
            }
        }

        self.flush(&dirty_vertices, &dirty_normals);

        for index in self.patches_touching(xs, zs) {
            self.patches[index].recompute_bounding_geometry(&self.grid);
        }
    }

    /// Pushes changed vertices and normal map texels to the backend, one
    /// update per contiguous run.
    fn flush(&mut self, vertices: &DirtyRanges, normals: &DirtyRanges) {
        for run in vertices.runs() {
            let offset = (run.start * BufferKind::Vertices.stride()) as u64;
            let data = &self.grid.vertices()[run];
            self.backend
                .update(BufferKind::Vertices, offset, bytemuck::cast_slice(data));
        }
        for run in normals.runs() {
            let offset = (run.start * BufferKind::NormalMap.stride()) as u64;
            let texels = self.grid.encoded_normals(run);
            self.backend
                .update(BufferKind::NormalMap, offset, bytemuck::cast_slice(&texels));
        }
    }
}

/// Grid, patches and LOD table for one load.
fn build_terrain<H: HeightSource + ?Sized>(
    settings: &TerrainSettings,
    source: &H,
) -> (HeightGrid, Vec<PatchNode>, usize, usize, PatchLodTable) {
    let layout = settings.layout;
    let edge = layout.patch_edge();

    let mut grid = HeightGrid::build(source, GridParams::from(settings));
    grid.assign_lod_levels();
    GeomorphEngine::refresh_all(&mut grid);

    let patch_grid_width = (grid.width() - 1) / edge;
    let patch_grid_depth = (grid.depth() - 1) / edge;
    let mut patches = Vec::with_capacity(patch_grid_width * patch_grid_depth);
    for px in 0..patch_grid_depth {
        for pz in 0..patch_grid_width {
            let entry = pz + px * patch_grid_width;
            let right = (pz + 1 < patch_grid_width).then_some(entry + 1);
            let upper = (px + 1 < patch_grid_depth).then_some(entry + patch_grid_width);
            patches.push(PatchNode::new((px * edge, pz * edge), edge, right, upper, &grid));
        }
    }

    let origins: Vec<(usize, usize)> = patches.iter().map(PatchNode::origin).collect();
    let table = PatchLodTable::build(layout, grid.width(), &origins);

    (grid, patches, patch_grid_width, patch_grid_depth, table)
}
