use std::fmt;
use std::mem;

use crate::world::terrain::grid::TerrainVertex;

/// Buffers the terrain hands to a render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// `[x, y, z, morph]` per vertex.
    Vertices,
    TexCoords,
    NormalMapCoords,
    /// Patch centre and LOD level per vertex.
    Geomorph,
    /// Encoded normals, one RGB float texel per vertex.
    NormalMap,
    Indices,
}

impl BufferKind {
    pub const ALL: [BufferKind; 6] = [
        BufferKind::Vertices,
        BufferKind::TexCoords,
        BufferKind::NormalMapCoords,
        BufferKind::Geomorph,
        BufferKind::NormalMap,
        BufferKind::Indices,
    ];

    /// Bytes per element.
    pub fn stride(self) -> usize {
        match self {
            BufferKind::Vertices => mem::size_of::<TerrainVertex>(),
            BufferKind::TexCoords | BufferKind::NormalMapCoords => mem::size_of::<[f32; 2]>(),
            BufferKind::Geomorph | BufferKind::NormalMap => mem::size_of::<[f32; 3]>(),
            BufferKind::Indices => mem::size_of::<u32>(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferKind::Vertices => "Terrain Vertex Buffer",
            BufferKind::TexCoords => "Terrain TexCoord Buffer",
            BufferKind::NormalMapCoords => "Terrain NormalMap Coord Buffer",
            BufferKind::Geomorph => "Terrain Geomorph Buffer",
            BufferKind::NormalMap => "Terrain NormalMap Buffer",
            BufferKind::Indices => "Terrain Index Buffer",
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One indexed draw over a sub-range of the index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub byte_offset: u64,
    pub index_count: u32,
}

impl DrawCall {
    pub fn first_index(&self) -> u32 {
        (self.byte_offset / mem::size_of::<u32>() as u64) as u32
    }
}

/// Owner of the GPU-side copies of the terrain buffers.
///
/// The terrain keeps its own CPU arrays; a backend only ever sees full
/// uploads at load time and sub-range updates after edits.
pub trait RenderBackend {
    fn upload(&mut self, kind: BufferKind, data: &[u8]);
    fn update(&mut self, kind: BufferKind, byte_offset: u64, data: &[u8]);
    fn draw_indexed(&mut self, call: DrawCall);
}
