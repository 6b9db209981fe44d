//! Height-field terrain with patch-based continuous LOD.
//!
//! The grid is split into square patches. Every patch precomputes one index
//! list per (own LOD, right-neighbour bucket, upper-neighbour bucket), so any
//! pair of adjacent patches can be stitched without cracks. Each frame the
//! surface picks a LOD per patch from the viewer distance and draws the
//! matching precomputed range; geomorph offsets stored in the vertex buffer
//! let a shader blend towards the coarser level instead of popping.

pub mod dirty;
pub mod geomorph;
pub mod grid;
pub mod height_source;
pub mod lod_table;
pub mod patch;
pub mod surface;

pub use dirty::DirtyRanges;
pub use geomorph::GeomorphEngine;
pub use grid::{GridParams, HeightGrid, TerrainVertex};
pub use height_source::{validate_height_source, HeightSource, RawHeightSource};
pub use lod_table::{LodKey, NeighborBucket, PatchLodTable, VariantRange};
pub use patch::{LodSelection, PatchNode};
pub use surface::TerrainSurface;

// Error types
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("Failed to load height source: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse terrain settings: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("Failed to write terrain settings: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid patch layout (edge {patch_edge}, {max_lods} LODs): {reason}")]
    InvalidLayout {
        patch_edge: u32,
        max_lods: u32,
        reason: String,
    },

    #[error("Height source {width}x{height} is too small, both sides must exceed {min}")]
    DegenerateSource { width: usize, height: usize, min: usize },

    #[error("Height source data holds {actual} bytes, expected at least {expected}")]
    TruncatedSource { expected: usize, actual: usize },
}

pub type TerrainResult<T> = Result<T, TerrainError>;
