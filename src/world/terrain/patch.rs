use cgmath::Point3;

use super::grid::HeightGrid;
use super::lod_table::{LodKey, NeighborBucket, PatchLodTable, VariantRange};
use crate::utils::math::BoundingBox;

/// LOD state a patch draws with this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodSelection {
    pub level: u32,
    pub right: NeighborBucket,
    pub upper: NeighborBucket,
}

impl LodSelection {
    pub fn key(&self) -> LodKey {
        LodKey::new(self.level, self.right, self.upper)
    }
}

impl Default for LodSelection {
    fn default() -> Self {
        Self {
            level: 1,
            right: NeighborBucket::Same,
            upper: NeighborBucket::Same,
        }
    }
}

/// LOD level for a viewer `distance` away from a patch.
pub fn lod_for_distance(distance: f32, base_distance: f32, inv_inc_distance: f32, max_lods: u32) -> u32 {
    if distance <= base_distance {
        return 1;
    }
    let steps = ((distance - base_distance) * inv_inc_distance).floor();
    if steps >= (max_lods - 1) as f32 {
        max_lods
    } else {
        1 + steps.max(0.0) as u32
    }
}

/// Caps every level of a row-major `width` x `depth` patch grid so that
/// edge-adjacent patches end up at most one level apart.
///
/// A coarser neighbour only has a variant for exactly one level up, so a
/// wider gap would leave a T-junction on the shared edge. Levels are only
/// ever lowered: one forward and one backward sweep give every patch the
/// minimum over all patches of their level plus the patch-grid distance.
pub fn limit_level_gradient(levels: &mut [u32], width: usize, depth: usize) {
    debug_assert_eq!(levels.len(), width * depth);
    for px in 0..depth {
        for pz in 0..width {
            let i = pz + px * width;
            if pz > 0 {
                levels[i] = levels[i].min(levels[i - 1] + 1);
            }
            if px > 0 {
                levels[i] = levels[i].min(levels[i - width] + 1);
            }
        }
    }
    for px in (0..depth).rev() {
        for pz in (0..width).rev() {
            let i = pz + px * width;
            if pz + 1 < width {
                levels[i] = levels[i].min(levels[i + 1] + 1);
            }
            if px + 1 < depth {
                levels[i] = levels[i].min(levels[i + width] + 1);
            }
        }
    }
}

/// Runtime state of one square patch of the grid.
///
/// Neighbours are indices into the surface's patch array; the right
/// neighbour lies towards +z, the upper one towards +x.
#[derive(Debug, Clone)]
pub struct PatchNode {
    origin: (usize, usize),
    edge: usize,
    bounds: BoundingBox,
    right: Option<usize>,
    upper: Option<usize>,
    selection: LodSelection,
    active: VariantRange,
}

impl PatchNode {
    pub fn new(
        origin: (usize, usize),
        edge: usize,
        right: Option<usize>,
        upper: Option<usize>,
        grid: &HeightGrid,
    ) -> Self {
        let mut node = Self {
            origin,
            edge,
            bounds: BoundingBox::empty(),
            right,
            upper,
            selection: LodSelection::default(),
            active: VariantRange::default(),
        };
        node.recompute_bounding_geometry(grid);
        node
    }

    /// Grid `(x, z)` of the lower corner.
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn right(&self) -> Option<usize> {
        self.right
    }

    pub fn upper(&self) -> Option<usize> {
        self.upper
    }

    pub fn selection(&self) -> LodSelection {
        self.selection
    }

    pub fn active_range(&self) -> VariantRange {
        self.active
    }

    /// Whether vertex `(x, z)` lies on the patch, edges included.
    pub fn covers(&self, x: usize, z: usize) -> bool {
        let (ox, oz) = self.origin;
        (ox..=ox + self.edge).contains(&x) && (oz..=oz + self.edge).contains(&z)
    }

    /// First pass of LOD selection: picks the level from the distance to
    /// the bounding box centre. Buckets are resolved once every patch has
    /// a level.
    pub fn select_level(
        &mut self,
        view_position: Point3<f32>,
        base_distance: f32,
        inv_inc_distance: f32,
        max_lods: u32,
    ) -> u32 {
        let distance = self.bounds.distance_to_center(view_position);
        self.selection.level = lod_for_distance(distance, base_distance, inv_inc_distance, max_lods);
        self.selection.level
    }

    /// Lowers the selected level to at most `level`.
    pub fn limit_level(&mut self, level: u32) -> u32 {
        self.selection.level = self.selection.level.min(level);
        self.selection.level
    }

    /// Second pass: classifies the neighbours' levels selected this frame
    /// and activates the matching precomputed variant.
    pub fn resolve_variant(
        &mut self,
        right_level: Option<u32>,
        upper_level: Option<u32>,
        table: &PatchLodTable,
        patch_index: usize,
    ) -> VariantRange {
        let level = self.selection.level;
        self.selection.right = NeighborBucket::classify(level, right_level);
        self.selection.upper = NeighborBucket::classify(level, upper_level);
        self.active = table.variant(patch_index, self.selection.key());
        self.active
    }

    pub fn update_bounding_geometry(&mut self, height: f32) {
        self.bounds.expand_height(height);
    }

    pub fn recompute_bounding_geometry(&mut self, grid: &HeightGrid) {
        let (ox, oz) = self.origin;
        let mut bounds = BoundingBox::empty();
        for x in ox..=(ox + self.edge).min(grid.depth() - 1) {
            for z in oz..=(oz + self.edge).min(grid.width() - 1) {
                bounds.expand_point(grid.vertex(x as i64, z as i64).position);
            }
        }
        self.bounds = bounds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchLayout;
    use crate::world::terrain::grid::GridParams;
    use crate::world::terrain::height_source::RawHeightSource;

    fn grid() -> HeightGrid {
        let source = RawHeightSource::from_fn(9, 9, |x, z| (x + z) as u8);
        HeightGrid::build(
            &source,
            GridParams {
                water_level: -0.5,
                layout: PatchLayout::new(4, 3).unwrap(),
                ..GridParams::default()
            },
        )
    }

    #[test]
    fn test_lod_for_distance_thresholds() {
        assert_eq!(lod_for_distance(0.0, 10.0, 1.0 / 32.0, 3), 1);
        assert_eq!(lod_for_distance(10.0, 10.0, 1.0 / 32.0, 3), 1);
        assert_eq!(lod_for_distance(41.9, 10.0, 1.0 / 32.0, 3), 1);
        assert_eq!(lod_for_distance(42.0, 10.0, 1.0 / 32.0, 3), 2);
        assert_eq!(lod_for_distance(74.0, 10.0, 1.0 / 32.0, 3), 3);
        assert_eq!(lod_for_distance(1.0e9, 10.0, 1.0 / 32.0, 3), 3);
    }

    #[test]
    fn test_level_gradient_is_capped_at_one_step() {
        // 3 wide, 2 deep.
        let mut levels = vec![1, 4, 4, 5, 5, 1];
        limit_level_gradient(&mut levels, 3, 2);
        assert_eq!(levels, vec![1, 2, 2, 2, 2, 1]);

        let mut single = vec![3];
        limit_level_gradient(&mut single, 1, 1);
        assert_eq!(single, vec![3]);

        let mut column = vec![4, 4, 1, 4];
        limit_level_gradient(&mut column, 1, 4);
        assert_eq!(column, vec![3, 2, 1, 2]);
    }

    #[test]
    fn test_limit_level_only_lowers() {
        let grid = grid();
        let mut node = PatchNode::new((0, 0), 4, None, None, &grid);
        let far = node.bounds().center() + cgmath::Vector3::new(0.0, 1000.0, 0.0);
        assert_eq!(node.select_level(far, 1.0, 0.25, 3), 3);
        assert_eq!(node.limit_level(5), 3);
        assert_eq!(node.limit_level(2), 2);
        assert_eq!(node.selection().level, 2);
    }

    #[test]
    fn test_bounds_cover_footprint() {
        let grid = grid();
        let node = PatchNode::new((4, 0), 4, Some(3), None, &grid);
        assert_eq!(node.bounds().min, [4.0, 4.0, 0.0]);
        assert_eq!(node.bounds().max, [8.0, 12.0, 4.0]);
        assert!(node.covers(4, 4));
        assert!(node.covers(8, 0));
        assert!(!node.covers(3, 0));
    }

    #[test]
    fn test_update_bounds_expands_height_only() {
        let grid = grid();
        let mut node = PatchNode::new((0, 0), 4, None, None, &grid);
        node.update_bounding_geometry(-20.0);
        node.update_bounding_geometry(3.0);
        assert_eq!(node.bounds().min, [0.0, -20.0, 0.0]);
        assert_eq!(node.bounds().max, [4.0, 8.0, 4.0]);
        node.recompute_bounding_geometry(&grid);
        assert_eq!(node.bounds().min, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_resolve_variant_uses_neighbour_levels() {
        let grid = grid();
        let layout = *grid.layout();
        let table = PatchLodTable::build(layout, grid.width(), &[(0, 0)]);
        let mut node = PatchNode::new((0, 0), 4, None, None, &grid);

        let center = node.bounds().center();
        node.select_level(center, 1.0, 0.25, 3);
        assert_eq!(node.selection().level, 1);

        let range = node.resolve_variant(Some(2), None, &table, 0);
        assert_eq!(node.selection().right, NeighborBucket::Coarser);
        assert_eq!(node.selection().upper, NeighborBucket::Same);
        assert_eq!(range, table.variant(0, node.selection().key()));
        assert_eq!(node.active_range(), range);
    }
}
