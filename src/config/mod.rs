pub mod settings;

// Re-export commonly used types
pub use settings::{
    LodSettings, PatchLayout, ShadingBands, TerrainSettings,
    MAX_LODS, PATCH_EDGE,
    load_terrain_settings, save_terrain_settings, terrain_config_path,
};
