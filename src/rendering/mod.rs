pub mod backend;
pub mod camera;
pub mod offscreen;
pub mod recording;
pub mod shading;
pub mod wgpu_backend;

pub use backend::{BufferKind, DrawCall, RenderBackend};
pub use camera::{Camera, CameraUniform, ViewingVolume, Viewpoint};
pub use offscreen::{request_headless_device, OffscreenTarget};
pub use recording::{BufferUpdate, RecordingBackend};
pub use shading::{NoShading, RecordingShading, ShadingStage};
pub use wgpu_backend::{TerrainVertexLayout, WgpuTerrainBackend};
