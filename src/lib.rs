// heightfield-terrain: patch-based continuous LOD terrain
// Crack-free stitching, geomorphing and incremental edits

pub mod config;
pub mod rendering;
pub mod utils;
pub mod world;

// Re-export commonly used types for convenience
pub use config::{PatchLayout, TerrainSettings};
pub use rendering::{BufferKind, DrawCall, RenderBackend, ShadingStage, ViewingVolume};
pub use world::terrain::{
    GeomorphEngine, HeightGrid, HeightSource, LodKey, NeighborBucket, PatchLodTable, PatchNode,
    RawHeightSource, TerrainError, TerrainResult, TerrainSurface,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
