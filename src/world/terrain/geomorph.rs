use std::ops::Range;

use super::dirty::DirtyRanges;
use super::grid::HeightGrid;

/// Computes the height a vertex morphs towards when its patch switches to
/// the next coarser LOD.
///
/// A vertex first active at stride `delta` disappears at stride `2 * delta`;
/// the coarser mesh then interpolates it from the two stride-`2 * delta`
/// vertices on either side (horizontal, vertical or diagonal). The stored
/// offset is that midpoint minus the vertex's own height.
pub struct GeomorphEngine;

impl GeomorphEngine {
    pub fn compute_offset(grid: &HeightGrid, x: usize, z: usize) -> f32 {
        let delta = grid.lod_step(x, z);
        let (dx, dz) = if delta < grid.layout().max_delta() {
            (x % (delta * 2), z % (delta * 2))
        } else {
            (0, 0)
        };

        let (x, z) = (x as i64, z as i64);
        let (dx, dz) = (dx as i64, dz as i64);
        let forward = grid.vertex(x + dx, z + dz).position[1];
        let backward = grid.vertex(x - dx, z - dz).position[1];

        (forward + backward) / 2.0 - grid.vertex(x, z).position[1]
    }

    pub fn refresh(grid: &mut HeightGrid, x: usize, z: usize) {
        let offset = Self::compute_offset(grid, x, z);
        grid.set_morph(x, z, offset);
    }

    pub fn refresh_all(grid: &mut HeightGrid) {
        for x in 0..grid.depth() {
            for z in 0..grid.width() {
                Self::refresh(grid, x, z);
            }
        }
    }

    /// Recomputes every offset that reads the height of `(x, z)`.
    ///
    /// Only finer vertices reference it: at each stride below its own, the
    /// axis neighbours and the two main-diagonal neighbours interpolate
    /// across it.
    pub fn refresh_after_point_edit(
        grid: &mut HeightGrid,
        x: usize,
        z: usize,
        dirty: &mut DirtyRanges,
    ) {
        Self::refresh(grid, x, z);
        dirty.mark(grid.index(x, z));

        let (depth, width) = (grid.depth(), grid.width());
        let mut delta = grid.lod_step(x, z) / 2;
        while delta >= 1 {
            let mut neighbours: [Option<(usize, usize)>; 6] = [None; 6];
            if x >= delta {
                neighbours[0] = Some((x - delta, z));
            }
            if x + delta < depth {
                neighbours[1] = Some((x + delta, z));
            }
            if z >= delta {
                neighbours[2] = Some((x, z - delta));
            }
            if z + delta < width {
                neighbours[3] = Some((x, z + delta));
            }
            if x >= delta && z >= delta {
                neighbours[4] = Some((x - delta, z - delta));
            }
            if x + delta < depth && z + delta < width {
                neighbours[5] = Some((x + delta, z + delta));
            }

            for (nx, nz) in neighbours.into_iter().flatten() {
                Self::refresh(grid, nx, nz);
                dirty.mark(grid.index(nx, nz));
            }
            delta /= 2;
        }
    }

    /// Recomputes offsets over a rectangle, clipped to the grid.
    pub fn refresh_region(
        grid: &mut HeightGrid,
        xs: Range<usize>,
        zs: Range<usize>,
        dirty: &mut DirtyRanges,
    ) {
        let xs = xs.start.min(grid.depth())..xs.end.min(grid.depth());
        let zs = zs.start.min(grid.width())..zs.end.min(grid.width());
        for x in xs {
            for z in zs.clone() {
                Self::refresh(grid, x, z);
                dirty.mark(grid.index(x, z));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchLayout;
    use crate::world::terrain::grid::GridParams;
    use crate::world::terrain::height_source::RawHeightSource;

    fn grid_from(heights: impl FnMut(usize, usize) -> u8) -> HeightGrid {
        let source = RawHeightSource::from_fn(9, 9, heights);
        let mut grid = HeightGrid::build(
            &source,
            GridParams {
                water_level: -0.5,
                layout: PatchLayout::new(4, 3).unwrap(),
                ..GridParams::default()
            },
        );
        grid.assign_lod_levels();
        GeomorphEngine::refresh_all(&mut grid);
        grid
    }

    #[test]
    fn test_offsets_vanish_on_planes() {
        let grid = grid_from(|x, z| (x * 2 + z) as u8);
        for x in 0..9 {
            for z in 0..9 {
                assert_eq!(grid.morph(x, z), 0.0, "vertex ({}, {})", x, z);
            }
        }
    }

    #[test]
    fn test_offset_uses_matching_neighbours() {
        // A bump at (1, 0): finest level, odd x, even z, so it morphs to
        // the average of (0, 0) and (2, 0).
        let grid = grid_from(|x, z| if (x, z) == (1, 0) { 6 } else { 0 });
        assert_eq!(grid.morph(1, 0), -6.0);

        // Diagonal case: (1, 1) averages (0, 0) and (2, 2).
        let grid = grid_from(|x, z| if (x, z) == (2, 2) { 8 } else { 0 });
        assert_eq!(grid.morph(1, 1), 4.0);
        assert_eq!(grid.morph(3, 3), 4.0);
        // (1, 3) interpolates along the other diagonal and ignores (2, 2).
        assert_eq!(grid.morph(1, 3), 0.0);
        // (2, 2) itself is a level-2 vertex between (0, 0) and (4, 4).
        assert_eq!(grid.morph(2, 2), -8.0);
    }

    #[test]
    fn test_coarsest_vertices_never_morph() {
        let grid = grid_from(|x, z| ((x * 7 + z * 3) % 11) as u8);
        for x in (0..9).step_by(4) {
            for z in (0..9).step_by(4) {
                assert_eq!(grid.morph(x, z), 0.0);
            }
        }
    }

    #[test]
    fn test_point_edit_refresh_matches_full_recompute() {
        let mut grid = grid_from(|x, z| ((x * 5 + z * 3) % 7) as u8);
        let mut dirty = DirtyRanges::new();
        grid.set_height(4, 4, 25.0);
        GeomorphEngine::refresh_after_point_edit(&mut grid, 4, 4, &mut dirty);

        let incremental: Vec<f32> = grid.vertices().iter().map(|v| v.morph).collect();
        GeomorphEngine::refresh_all(&mut grid);
        let full: Vec<f32> = grid.vertices().iter().map(|v| v.morph).collect();
        assert_eq!(incremental, full);
        assert!(dirty.contains(grid.index(4, 4)));
        assert!(dirty.contains(grid.index(2, 2)));
        assert!(dirty.contains(grid.index(3, 4)));
        assert!(!dirty.contains(grid.index(3, 5)));
    }
}
