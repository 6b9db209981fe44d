pub mod terrain;

// Re-export the terrain entry points for easier access
pub use terrain::{HeightGrid, TerrainError, TerrainResult, TerrainSurface};
