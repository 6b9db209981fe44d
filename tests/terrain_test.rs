use std::collections::BTreeSet;

use cgmath::{Point3, Vector3};

use heightfield_terrain::rendering::{BufferKind, Camera, RecordingBackend, RecordingShading, Viewpoint};
use heightfield_terrain::world::terrain::{GeomorphEngine, LodKey, TerrainVertex};
use heightfield_terrain::{PatchLayout, RawHeightSource, TerrainSettings, TerrainSurface};

/// Settings whose heights equal the raw samples (water level cancels the
/// half-scale shift).
fn settings(edge: u32, lods: u32) -> TerrainSettings {
    TerrainSettings {
        water_level: -0.5,
        ..TerrainSettings::default()
    }
    .with_layout(PatchLayout::new(edge, lods).unwrap())
    .with_lod(10.0, 64.0)
}

fn load(size: usize, edge: u32, lods: u32, f: impl FnMut(usize, usize) -> u8) -> TerrainSurface<RecordingBackend> {
    let source = RawHeightSource::from_fn(size, size, f);
    TerrainSurface::load(settings(edge, lods), &source, RecordingBackend::new())
}

fn bumpy(x: usize, z: usize) -> u8 {
    ((x * 7 + z * 11 + x * z) % 17) as u8
}

#[test]
fn test_peak_scenario() {
    let surface = load(5, 4, 3, |x, z| if (x, z) == (2, 2) { 10 } else { 0 });
    assert_eq!(surface.vertex(2, 2).position[1], 10.0);

    // Symmetric neighbours cancel at the peak itself.
    let peak = surface.normal_at(2.0, 2.0);
    assert_eq!(peak, [0.0, 1.0, 0.0]);

    // Around it the surface tilts: each neighbour's normal leans away from
    // the raised point along the axis it lies on.
    assert!(surface.normal_at(1.0, 2.0)[0] < 0.0);
    assert!(surface.normal_at(3.0, 2.0)[0] > 0.0);
    assert!(surface.normal_at(2.0, 1.0)[2] < 0.0);
    assert!(surface.normal_at(2.0, 3.0)[2] > 0.0);

    let expected = (10.0 + 0.0 + 0.0 + 0.0) / 4.0;
    assert_eq!(surface.height_at(2.5, 2.5), expected);
}

#[test]
fn test_queries_at_grid_points_are_exact() {
    let surface = load(9, 4, 3, bumpy);
    let grid = surface.grid();
    for x in 0..grid.depth() {
        for z in 0..grid.width() {
            let v = surface.vertex(x as i64, z as i64);
            assert_eq!(surface.height_at(v.position[0], v.position[2]), v.position[1]);
            assert_eq!(surface.normal_at(v.position[0], v.position[2]), grid.normal(x, z));
        }
    }
}

#[test]
fn test_single_patch_variant_table() {
    let surface = load(5, 4, 3, bumpy);
    let table = surface.lod_table();
    assert_eq!(surface.patches().len(), 1);
    assert_eq!(table.variant_count(), 27);

    let total: usize = table.ranges().iter().map(|r| r.index_count as usize).sum();
    assert_eq!(total, table.index_total());

    let mut spans: Vec<(u64, u64)> = table
        .ranges()
        .iter()
        .map(|r| (r.byte_offset(), r.byte_offset() + r.byte_len()))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlapping ranges {:?}", pair);
    }
    let uploaded = surface.backend().buffer(BufferKind::Indices).map(<[u8]>::len);
    assert_eq!(uploaded, Some(total * 4));
}

#[test]
fn test_lod_switches_at_configured_distances() {
    let mut surface = load(5, 4, 3, bumpy);
    let center = surface.patches()[0].bounds().center();

    surface.calc_lod(&Viewpoint::at(center + Vector3::new(0.0, 10.0, 0.0)));
    assert_eq!(surface.patches()[0].selection().level, 1);

    surface.calc_lod(&Viewpoint::at(center + Vector3::new(0.0, 74.0, 0.0)));
    assert_eq!(surface.patches()[0].selection().level, 2);

    surface.calc_lod(&Viewpoint::at(center + Vector3::new(0.0, 10_000.0, 0.0)));
    assert_eq!(surface.patches()[0].selection().level, 3);
}

#[test]
fn test_short_increment_is_raised_to_minimum() {
    let mut surface = load(9, 4, 3, bumpy);
    surface.set_lod_switch_distance(5.0, 1.0);
    let minimum = (4.0f32 * 4.0 * 2.0).sqrt();
    assert_eq!(surface.base_distance(), 5.0);
    assert_eq!(surface.inv_inc_distance(), 1.0 / minimum);

    surface.set_lod_switch_distance(5.0, 100.0);
    assert_eq!(surface.inv_inc_distance(), 1.0 / 100.0);
}

#[test]
fn test_set_height_is_idempotent() {
    let mut surface = load(17, 8, 4, bumpy);
    surface.set_height(6, 9, 42.0);
    let vertices: Vec<TerrainVertex> = surface.grid().vertices().to_vec();
    let normals = surface.grid().normals().to_vec();
    let bounds = surface.bounding_boxes();

    surface.set_height(6, 9, 42.0);
    assert_eq!(surface.grid().vertices(), vertices.as_slice());
    assert_eq!(surface.grid().normals(), normals.as_slice());
    assert_eq!(surface.bounding_boxes(), bounds);
}

#[test]
fn test_region_edit_matches_sequential_edits() {
    let mut region = load(17, 8, 4, bumpy);
    let mut sequential = load(17, 8, 4, bumpy);

    let (x, z, width, depth) = (5i64, 6i64, 4usize, 3usize);
    let values: Vec<f32> = (0..width * depth).map(|i| 20.0 + i as f32 * 1.5).collect();
    region.set_height_region(x, z, width, depth, &values);
    for row in 0..depth {
        for col in 0..width {
            sequential.set_height(x + row as i64, z + col as i64, values[row * width + col]);
        }
    }

    assert_eq!(region.grid().vertices(), sequential.grid().vertices());
    assert_eq!(region.grid().normals(), sequential.grid().normals());
    assert_eq!(region.vertex(x + 2, z + 3).position[1], values[2 * width + 3]);
}

#[test]
fn test_clipped_region_matches_sequential_edits() {
    let mut region = load(9, 4, 3, bumpy);
    let mut sequential = load(9, 4, 3, bumpy);

    // A 3x3 block hanging off the upper-right corner.
    let values: Vec<f32> = (0..9).map(|i| i as f32).collect();
    region.set_height_region(7, 7, 3, 3, &values);
    for (gx, gz, value) in [(7, 7, 0.0), (7, 8, 1.0), (8, 7, 3.0), (8, 8, 4.0)] {
        sequential.set_height(gx, gz, value);
    }
    assert_eq!(region.grid().vertices(), sequential.grid().vertices());
    assert_eq!(region.grid().normals(), sequential.grid().normals());

    // Entirely outside: nothing changes.
    let before = region.grid().vertices().to_vec();
    region.set_height_region(-10, 3, 2, 2, &[1.0; 4]);
    assert_eq!(region.grid().vertices(), before.as_slice());
}

#[test]
fn test_edits_keep_geomorph_and_backend_in_sync() {
    let mut surface = load(17, 8, 4, bumpy);
    surface.set_height(8, 8, 30.0);
    surface.set_height(-3, 40, 12.0);
    surface.set_height_region(10, 2, 5, 5, &[7.5; 25]);

    let grid = surface.grid();
    assert_eq!(grid.height(0, 16), 12.0);
    for x in 0..grid.depth() {
        for z in 0..grid.width() {
            assert_eq!(grid.morph(x, z), GeomorphEngine::compute_offset(grid, x, z));
        }
    }

    let mirrored: Vec<TerrainVertex> = surface.backend().buffer_as(BufferKind::Vertices);
    assert_eq!(mirrored.as_slice(), grid.vertices());
    let texels: Vec<[f32; 3]> = surface.backend().buffer_as(BufferKind::NormalMap);
    assert_eq!(texels, grid.encoded_normals(0..grid.vertex_count()));
}

#[test]
fn test_region_edit_recomputes_patch_bounds() {
    let mut surface = load(17, 8, 4, bumpy);
    surface.set_height_region(0, 0, 17, 17, &[3.0; 17 * 17]);
    for bounds in surface.bounding_boxes() {
        assert_eq!(bounds.min[1], 3.0);
        assert_eq!(bounds.max[1], 3.0);
    }
}

#[test]
fn test_texture_detail_reuploads_coordinates() {
    let mut surface = load(9, 4, 3, bumpy);
    surface.set_texture_detail(0.25);
    let coords: Vec<[f32; 2]> = surface.backend().buffer_as(BufferKind::TexCoords);
    let index = surface.coord_to_index(4, 8);
    assert_eq!(coords[index], [2.0, 1.0]);
    assert_eq!(surface.settings().texture_detail, 0.25);
}

/// Vertex coordinates referenced by one patch's active variant.
fn active_vertices(surface: &TerrainSurface<RecordingBackend>, patch: usize) -> Vec<(usize, usize)> {
    let indices: Vec<u32> = surface.backend().buffer_as(BufferKind::Indices);
    let range = surface.patches()[patch].active_range();
    let start = range.index_offset as usize;
    let width = surface.grid().width();
    indices[start..start + range.index_count as usize]
        .iter()
        .map(|&i| (i as usize / width, i as usize % width))
        .collect()
}

/// Every pair of adjacent patches must agree on which vertices of their
/// shared edge they use; otherwise the mesh has a T-junction.
fn assert_shared_edges_match(surface: &TerrainSurface<RecordingBackend>, edge: usize) {
    for (index, patch) in surface.patches().iter().enumerate() {
        let (ox, oz) = patch.origin();
        let own = active_vertices(surface, index);
        if let Some(right) = patch.right() {
            let level_gap = patch.selection().level.abs_diff(surface.patches()[right].selection().level);
            assert!(level_gap <= 1, "patches {} and {} are {} levels apart", index, right, level_gap);
            let ours: BTreeSet<usize> = own.iter().filter(|v| v.1 == oz + edge).map(|v| v.0).collect();
            let theirs: BTreeSet<usize> = active_vertices(surface, right)
                .iter()
                .filter(|v| v.1 == oz + edge)
                .map(|v| v.0)
                .collect();
            assert_eq!(ours, theirs, "right edge of patch {}", index);
        }
        if let Some(upper) = patch.upper() {
            let level_gap = patch.selection().level.abs_diff(surface.patches()[upper].selection().level);
            assert!(level_gap <= 1, "patches {} and {} are {} levels apart", index, upper, level_gap);
            let ours: BTreeSet<usize> = own.iter().filter(|v| v.0 == ox + edge).map(|v| v.1).collect();
            let theirs: BTreeSet<usize> = active_vertices(surface, upper)
                .iter()
                .filter(|v| v.0 == ox + edge)
                .map(|v| v.1)
                .collect();
            assert_eq!(ours, theirs, "upper edge of patch {}", index);
        }
    }
}

#[test]
fn test_selected_variants_share_edge_vertices() {
    let mut surface = load(65, 8, 4, |x, z| ((x + z) / 16) as u8);
    surface.set_lod_switch_distance(4.0, 1.0);

    for eye in [Point3::new(3.0, 5.0, 3.0), Point3::new(40.0, 2.0, 20.0), Point3::new(70.0, 30.0, 64.0)] {
        surface.calc_lod(&Viewpoint::at(eye));
        let levels: BTreeSet<u32> = surface.patches().iter().map(|p| p.selection().level).collect();
        assert!(levels.len() > 1, "viewpoint {:?} selects a single level", eye);
        assert_shared_edges_match(&surface, 8);
    }
}

#[test]
fn test_steep_neighbour_stays_one_level_away() {
    // Patch 1 (+z of patch 0) holds a 255-high mesa; the shared edge at
    // z = 8 stays flat.
    let mut surface = load(17, 8, 4, |x, z| if z > 8 && x < 8 { 255 } else { 0 });
    surface.set_lod_switch_distance(1.0, 1.0);

    let eye = surface.patches()[0].bounds().center();
    surface.calc_lod(&Viewpoint::at(eye));
    let levels: Vec<u32> = surface.patches().iter().map(|p| p.selection().level).collect();
    // By distance alone the mesa would be drawn at level 4.
    assert_eq!(levels, vec![1, 2, 1, 1]);
    assert_shared_edges_match(&surface, 8);

    // Far away every patch drops to the coarsest level again.
    surface.calc_lod(&Viewpoint::at(Point3::new(8.0, 10_000.0, 8.0)));
    assert!(surface.patches().iter().all(|p| p.selection().level == 4));
    assert_shared_edges_match(&surface, 8);
}

#[test]
fn test_short_region_values_leave_missing_cells() {
    let mut region = load(17, 8, 4, bumpy);
    let mut sequential = load(17, 8, 4, bumpy);
    let original = load(17, 8, 4, bumpy);

    // A 3-row by 4-column block with only seven values: row 0 and the
    // first three cells of row 1.
    let (x, z, width, depth) = (6i64, 5i64, 4usize, 3usize);
    let values: Vec<f32> = (0..7).map(|i| 40.0 + i as f32).collect();
    region.set_height_region(x, z, width, depth, &values);
    for (i, &value) in values.iter().enumerate() {
        sequential.set_height(x + (i / width) as i64, z + (i % width) as i64, value);
    }

    assert_eq!(region.vertex(x + 1, z + 2).position[1], 46.0);
    assert_eq!(region.vertex(x + 1, z + 3).position[1], original.vertex(x + 1, z + 3).position[1]);
    for col in 0..width as i64 {
        assert_eq!(region.vertex(x + 2, z + col).position[1], original.vertex(x + 2, z + col).position[1]);
    }

    assert_eq!(region.grid().vertices(), sequential.grid().vertices());
    assert_eq!(region.grid().normals(), sequential.grid().normals());
    let grid = region.grid();
    for gx in 0..grid.depth() {
        for gz in 0..grid.width() {
            assert_eq!(grid.morph(gx, gz), GeomorphEngine::compute_offset(grid, gx, gz));
        }
    }
    let mirrored: Vec<TerrainVertex> = region.backend().buffer_as(BufferKind::Vertices);
    assert_eq!(mirrored.as_slice(), grid.vertices());

    // Huge dimensions are clipped without overflowing.
    region.set_height_region(0, 0, usize::MAX, usize::MAX, &[1.0]);
    assert_eq!(region.vertex(0, 0).position[1], 1.0);
    assert_eq!(region.vertex(0, 1).position[1], sequential.vertex(0, 1).position[1]);
}

#[test]
fn test_frame_draws_every_patch_within_index_buffer() {
    let source = RawHeightSource::from_fn(33, 33, bumpy);
    let mut surface = TerrainSurface::load_with_shading(
        settings(8, 4),
        &source,
        RecordingBackend::new(),
        RecordingShading::new(),
    );
    let camera = Camera::looking_at(Point3::new(-10.0, 20.0, 40.0), Point3::new(16.0, 0.0, 16.0));
    assert_eq!(surface.draw_frame(&camera), 16);

    let buffer_len = surface.backend().buffer(BufferKind::Indices).map_or(0, <[u8]>::len) as u64;
    let draws = surface.backend().draws();
    assert_eq!(draws.len(), 16);
    for draw in draws {
        assert!(draw.index_count > 0);
        assert!(draw.byte_offset + draw.index_count as u64 * 4 <= buffer_len);
    }
    // Looking towards +x and -z: the first draw is the lowest-x, highest-z patch.
    let first = surface.patches()[3].active_range();
    assert_eq!(draws[0].byte_offset, first.byte_offset());
    let expected: Vec<u64> = (0..4)
        .flat_map(|px| (0..4).rev().map(move |pz| pz + px * 4))
        .map(|i| surface.patches()[i].active_range().byte_offset())
        .collect();
    let issued: Vec<u64> = draws.iter().map(|d| d.byte_offset).collect();
    assert_eq!(issued, expected);

    let uniform = surface.shading().and_then(|s| s.uniform("invIncDistance"));
    assert_eq!(uniform, Some(1.0 / 64.0));
    assert!(surface.lod_table().variant(0, LodKey::uniform(4)).index_count > 0);
}
