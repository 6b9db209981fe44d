use std::fs;
use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::world::terrain::TerrainError;

const TERRAIN_CONFIG_FILE: &str = "terrain.toml";
const ENV_PREFIX: &str = "TERRAIN";

/// Default number of grid squares along one patch edge.
pub const PATCH_EDGE: u32 = 32;
/// Default number of LOD levels; level 1 is the finest.
pub const MAX_LODS: u32 = 5;

// =============================================================================
// Patch layout
// =============================================================================

/// Patch edge length (in grid squares) and the number of LOD levels.
///
/// The coarsest stride `2^(max_lods-1)` must still tile a patch, so the edge
/// is a power of two at least that large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPatchLayout")]
pub struct PatchLayout {
    patch_edge: u32,
    max_lods: u32,
}

#[derive(Deserialize)]
struct RawPatchLayout {
    patch_edge: u32,
    max_lods: u32,
}

impl TryFrom<RawPatchLayout> for PatchLayout {
    type Error = TerrainError;

    fn try_from(raw: RawPatchLayout) -> Result<Self, Self::Error> {
        PatchLayout::new(raw.patch_edge, raw.max_lods)
    }
}

impl PatchLayout {
    pub fn new(patch_edge: u32, max_lods: u32) -> Result<Self, TerrainError> {
        let invalid = |reason: &str| TerrainError::InvalidLayout {
            patch_edge,
            max_lods,
            reason: reason.to_string(),
        };
        if patch_edge == 0 || !patch_edge.is_power_of_two() {
            return Err(invalid("patch edge must be a power of two"));
        }
        if max_lods == 0 {
            return Err(invalid("at least one LOD level is required"));
        }
        if max_lods > 16 || (1u32 << (max_lods - 1)) > patch_edge {
            return Err(invalid("coarsest LOD stride exceeds the patch edge"));
        }
        Ok(Self { patch_edge, max_lods })
    }

    pub fn patch_edge(&self) -> usize {
        self.patch_edge as usize
    }

    pub fn max_lods(&self) -> u32 {
        self.max_lods
    }

    /// Grid stride of the coarsest LOD level.
    pub fn max_delta(&self) -> usize {
        1usize << (self.max_lods - 1)
    }

    /// Number of index-buffer variants each patch carries.
    pub fn variants_per_patch(&self) -> usize {
        self.max_lods as usize * 9
    }
}

impl Default for PatchLayout {
    fn default() -> Self {
        Self {
            patch_edge: PATCH_EDGE,
            max_lods: MAX_LODS,
        }
    }
}

// =============================================================================
// LOD switching and shading
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodSettings {
    /// Distance up to which patches render at level 1.
    pub base_distance: f32,
    /// Distance between successive LOD level switches.
    pub increment_distance: f32,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            base_distance: 1.0,
            increment_distance: 100.0,
        }
    }
}

/// Height bands handed to an attached shading stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingBands {
    pub snow_start_height: f32,
    pub snow_blend: f32,
    pub grass_start_height: f32,
    pub grass_blend: f32,
    pub sand_start_height: f32,
    pub sand_blend: f32,
}

impl Default for ShadingBands {
    fn default() -> Self {
        Self {
            snow_start_height: 50.0,
            snow_blend: 20.0,
            grass_start_height: 5.0,
            grass_blend: 5.0,
            sand_start_height: -10.0,
            sand_blend: 10.0,
        }
    }
}

// =============================================================================
// Terrain settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub height_scale: f32,
    pub width_scale: f32,
    pub water_level: f32,
    pub offset: [f32; 3],
    /// Texture repeats per grid square.
    pub texture_detail: f32,
    pub lod: LodSettings,
    pub layout: PatchLayout,
    pub shading: ShadingBands,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            height_scale: 1.0,
            width_scale: 1.0,
            water_level: 10.0,
            offset: [0.0; 3],
            texture_detail: 1.0,
            lod: LodSettings::default(),
            layout: PatchLayout::default(),
            shading: ShadingBands::default(),
        }
    }
}

impl TerrainSettings {
    pub fn with_layout(mut self, layout: PatchLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_lod(mut self, base_distance: f32, increment_distance: f32) -> Self {
        self.lod = LodSettings {
            base_distance,
            increment_distance,
        };
        self
    }

    pub fn load_from(path: &Path) -> Result<Self, TerrainError> {
        let data = fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), TerrainError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }

    /// Defaults, overridden by an optional TOML file, overridden by
    /// `TERRAIN__SECTION__KEY` environment variables.
    pub fn load_layered(path: Option<&Path>) -> Result<Self, TerrainError> {
        let defaults = config::Config::try_from(&TerrainSettings::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

// Terrain configuration file management
pub fn terrain_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "heightfield", "heightfield-terrain")
        .map(|proj| proj.config_dir().join(TERRAIN_CONFIG_FILE))
}

pub fn save_terrain_settings(settings: &TerrainSettings) -> Result<(), TerrainError> {
    match terrain_config_path() {
        Some(path) => settings.save_to(&path),
        None => Ok(()),
    }
}

pub fn load_terrain_settings() -> Option<TerrainSettings> {
    let path = terrain_config_path()?;
    match TerrainSettings::load_from(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::debug!("No usable terrain settings at {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_validation() {
        assert!(PatchLayout::new(4, 3).is_ok());
        assert!(PatchLayout::new(32, 5).is_ok());
        assert!(PatchLayout::new(1, 1).is_ok());
        assert!(PatchLayout::new(0, 1).is_err());
        assert!(PatchLayout::new(6, 2).is_err());
        assert!(PatchLayout::new(4, 0).is_err());
        assert!(PatchLayout::new(4, 4).is_err());
    }

    #[test]
    fn test_layout_derived_values() {
        let layout = PatchLayout::new(16, 4).unwrap();
        assert_eq!(layout.patch_edge(), 16);
        assert_eq!(layout.max_delta(), 8);
        assert_eq!(layout.variants_per_patch(), 36);
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let settings = TerrainSettings {
            height_scale: 2.5,
            water_level: 3.0,
            ..TerrainSettings::default()
        }
        .with_layout(PatchLayout::new(8, 3).unwrap())
        .with_lod(16.0, 64.0);

        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: TerrainSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_invalid_layout_rejected_when_parsing() {
        let text = "[layout]\npatch_edge = 12\nmax_lods = 2\n";
        assert!(toml::from_str::<TerrainSettings>(text).is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: TerrainSettings = toml::from_str("height_scale = 4.0\n").unwrap();
        assert_eq!(parsed.height_scale, 4.0);
        assert_eq!(parsed.water_level, 10.0);
        assert_eq!(parsed.layout, PatchLayout::default());
    }
}
