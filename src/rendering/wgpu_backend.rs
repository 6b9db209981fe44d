use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use super::backend::{BufferKind, DrawCall, RenderBackend};
use crate::utils::logging::log_adapter_info;
use crate::world::terrain::grid::TerrainVertex;

/// Vertex buffer layouts of the terrain, one slot per attribute buffer.
pub struct TerrainVertexLayout;

impl TerrainVertexLayout {
    const POSITION_MORPH: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x4];
    const TEX_COORDS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
    const NORMAL_MAP_COORDS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];
    const GEOMORPH: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x3];

    pub const SLOTS: [BufferKind; 4] = [
        BufferKind::Vertices,
        BufferKind::TexCoords,
        BufferKind::NormalMapCoords,
        BufferKind::Geomorph,
    ];

    pub fn desc() -> [wgpu::VertexBufferLayout<'static>; 4] {
        [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<TerrainVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &Self::POSITION_MORPH,
            },
            wgpu::VertexBufferLayout {
                array_stride: BufferKind::TexCoords.stride() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &Self::TEX_COORDS,
            },
            wgpu::VertexBufferLayout {
                array_stride: BufferKind::NormalMapCoords.stride() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &Self::NORMAL_MAP_COORDS,
            },
            wgpu::VertexBufferLayout {
                array_stride: BufferKind::Geomorph.stride() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &Self::GEOMORPH,
            },
        ]
    }
}

fn usage_for(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Vertices
        | BufferKind::TexCoords
        | BufferKind::NormalMapCoords
        | BufferKind::Geomorph => wgpu::BufferUsages::VERTEX,
        BufferKind::NormalMap => wgpu::BufferUsages::STORAGE,
        BufferKind::Indices => wgpu::BufferUsages::INDEX,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

/// Backend writing the terrain into wgpu buffers.
///
/// Draw calls are queued per frame and replayed into a render pass by
/// `encode`, after the caller has bound its pipeline and bind groups.
pub struct WgpuTerrainBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: HashMap<BufferKind, wgpu::Buffer>,
    frame: Vec<DrawCall>,
}

impl WgpuTerrainBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            frame: Vec::new(),
        }
    }

    pub fn with_adapter(adapter: &wgpu::Adapter, device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        log_adapter_info(adapter);
        Self::new(device, queue)
    }

    pub fn buffer(&self, kind: BufferKind) -> Option<&wgpu::Buffer> {
        self.buffers.get(&kind)
    }

    pub fn queued_draws(&self) -> &[DrawCall] {
        &self.frame
    }

    /// Replays and clears the draws queued since the last call.
    pub fn encode(&mut self, render_pass: &mut wgpu::RenderPass<'_>) {
        for (slot, kind) in TerrainVertexLayout::SLOTS.iter().enumerate() {
            match self.buffers.get(kind) {
                Some(buffer) => render_pass.set_vertex_buffer(slot as u32, buffer.slice(..)),
                None => {
                    warn!("{} not uploaded, skipping terrain draws", kind);
                    self.frame.clear();
                    return;
                }
            }
        }
        let Some(indices) = self.buffers.get(&BufferKind::Indices) else {
            warn!("Index buffer not uploaded, skipping terrain draws");
            self.frame.clear();
            return;
        };
        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);

        for call in self.frame.drain(..) {
            let first = call.first_index();
            render_pass.draw_indexed(first..first + call.index_count, 0, 0..1);
        }
    }
}

impl RenderBackend for WgpuTerrainBackend {
    fn upload(&mut self, kind: BufferKind, data: &[u8]) {
        debug!("Uploading {} ({} bytes)", kind, data.len());
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kind.label()),
            contents: data,
            usage: usage_for(kind),
        });
        self.buffers.insert(kind, buffer);
    }

    fn update(&mut self, kind: BufferKind, byte_offset: u64, data: &[u8]) {
        match self.buffers.get(&kind) {
            Some(buffer) => self.queue.write_buffer(buffer, byte_offset, data),
            None => warn!("Update of {} before upload", kind),
        }
    }

    fn draw_indexed(&mut self, call: DrawCall) {
        self.frame.push(call);
    }
}
