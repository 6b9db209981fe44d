use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cgmath::{Point3, Vector3};
use tracing::{info, warn};

use heightfield_terrain::config::terrain_config_path;
use heightfield_terrain::rendering::{
    request_headless_device, Camera, CameraUniform, OffscreenTarget, RecordingBackend, RecordingShading,
    ViewingVolume, WgpuTerrainBackend,
};
use heightfield_terrain::utils::logging::init_logging;
use heightfield_terrain::world::terrain::validate_height_source;
use heightfield_terrain::{RawHeightSource, TerrainSettings, TerrainSurface, VERSION};

const SYNTHETIC_SIZE: usize = 257;
const FRAMES: usize = 8;
const SNAPSHOT_SIZE: u32 = 512;

/// Rolling hills for runs without a height map.
fn synthetic_source(size: usize) -> RawHeightSource {
    RawHeightSource::from_fn(size, size, |x, z| {
        let (fx, fz) = (x as f32, z as f32);
        let h = (fx * 0.05).sin() * 0.3 + (fz * 0.07).cos() * 0.2 + ((fx + fz) * 0.013).sin() * 0.2;
        ((h * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0) as u8
    })
}

/// Renders one frame on the GPU and saves it to `path`.
async fn render_snapshot(settings: TerrainSettings, source: &RawHeightSource, path: &Path) -> Result<()> {
    let (adapter, device, queue) = request_headless_device().await?;
    let target = OffscreenTarget::new(device.clone(), queue.clone(), SNAPSHOT_SIZE, SNAPSHOT_SIZE);
    let backend = WgpuTerrainBackend::with_adapter(&adapter, device, queue);
    let mut terrain = TerrainSurface::load(settings, source, backend);

    let ws = terrain.settings().width_scale;
    let (depth, width) = (terrain.grid().depth() as f32 * ws, terrain.grid().width() as f32 * ws);
    let centre = Point3::new(depth * 0.5, terrain.height_at(depth * 0.5, width * 0.5), width * 0.5);
    let mut camera = Camera::looking_at(centre + Vector3::new(-depth * 0.6, depth * 0.4, -width * 0.6), centre);
    camera.aspect = 1.0;

    let draws = terrain.draw_frame(&camera);
    let uniform = CameraUniform::new(&camera, terrain.base_distance(), terrain.inv_inc_distance());
    target.render(terrain.backend_mut(), &uniform)?;
    target
        .read_pixels()?
        .save(path)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    info!("Rendered {} draws to {}", draws, path.display());
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    info!("heightfield-terrain {}", VERSION);

    let config_path = env::var_os("TERRAIN_CONFIG")
        .map(PathBuf::from)
        .or_else(terrain_config_path);
    let settings = TerrainSettings::load_layered(config_path.as_deref())
        .context("Failed to load terrain settings")?;

    let mut height_map = None;
    let mut snapshot = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--gpu" => snapshot = Some(PathBuf::from(args.next().context("--gpu needs an output path")?)),
            _ => height_map = Some(arg),
        }
    }

    let source = match height_map {
        Some(path) => RawHeightSource::open(&path)
            .with_context(|| format!("Failed to open height map {}", path))?,
        None => synthetic_source(SYNTHETIC_SIZE),
    };
    validate_height_source(&source, &settings.layout).context("Unusable height source")?;

    if let Some(path) = snapshot {
        if let Err(e) = pollster::block_on(render_snapshot(settings.clone(), &source, &path)) {
            warn!("GPU snapshot failed, continuing headless: {:#}", e);
        }
    }

    let mut terrain = TerrainSurface::load_with_shading(
        settings,
        &source,
        RecordingBackend::new(),
        RecordingShading::new(),
    );

    let (depth, width) = (terrain.grid().depth() as f32, terrain.grid().width() as f32);
    let ws = terrain.settings().width_scale;
    let start = Point3::new(0.0, terrain.height_at(0.0, 0.0) + 20.0, 0.0);
    let mut camera = Camera::looking_at(start, start + Vector3::new(1.0, -0.2, 1.0));
    let step = Vector3::new(depth * ws, 0.0, width * ws) / FRAMES as f32;

    for frame in 0..FRAMES {
        let draws = terrain.draw_frame(&camera);
        let mut histogram = vec![0usize; terrain.settings().layout.max_lods() as usize];
        for patch in terrain.patches() {
            histogram[patch.selection().level as usize - 1] += 1;
        }
        let indices: u64 = terrain
            .backend()
            .draws()
            .iter()
            .map(|d| d.index_count as u64)
            .sum();
        info!(
            "Frame {}: eye ({:.1}, {:.1}, {:.1}), {} draws, {} indices, patches per LOD {:?}",
            frame,
            camera.position().x,
            camera.position().y,
            camera.position().z,
            draws,
            indices,
            histogram
        );
        terrain.backend_mut().clear_frame();
        camera.translate(step);
    }

    // Flatten a square plateau in the middle of the terrain.
    let (cx, cz) = ((depth / 2.0) as i64, (width / 2.0) as i64);
    let plateau = terrain.vertex(cx, cz).position[1] + 5.0;
    let size = 16usize;
    terrain.set_height_region(cx - 8, cz - 8, size, size, &vec![plateau; size * size]);
    let center = terrain.vertex(cx, cz).position;
    info!(
        "Plateau at ({}, {}) raised to {:.2}, {} buffer updates pushed",
        cx,
        cz,
        terrain.height_at(center[0], center[2]),
        terrain.backend().updates().len()
    );

    Ok(())
}
