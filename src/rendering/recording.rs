use std::collections::HashMap;

use tracing::error;

use super::backend::{BufferKind, DrawCall, RenderBackend};

/// A sub-range update as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUpdate {
    pub kind: BufferKind,
    pub byte_offset: u64,
    pub len: usize,
}

/// In-memory backend mirroring every buffer, for headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    buffers: HashMap<BufferKind, Vec<u8>>,
    updates: Vec<BufferUpdate>,
    draws: Vec<DrawCall>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, kind: BufferKind) -> Option<&[u8]> {
        self.buffers.get(&kind).map(Vec::as_slice)
    }

    /// Buffer contents reinterpreted as `T`.
    pub fn buffer_as<T: bytemuck::Pod>(&self, kind: BufferKind) -> Vec<T> {
        self.buffer(kind)
            .map(|bytes| {
                bytes
                    .chunks_exact(std::mem::size_of::<T>())
                    .map(bytemuck::pod_read_unaligned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn updates(&self) -> &[BufferUpdate] {
        &self.updates
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clear_frame(&mut self) {
        self.draws.clear();
    }

    pub fn clear_updates(&mut self) {
        self.updates.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn upload(&mut self, kind: BufferKind, data: &[u8]) {
        self.buffers.insert(kind, data.to_vec());
    }

    fn update(&mut self, kind: BufferKind, byte_offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffers.get_mut(&kind) else {
            error!("Update of {} before upload", kind);
            return;
        };
        let start = byte_offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            error!(
                "Update of {} at {}..{} exceeds buffer size {}",
                kind,
                start,
                end,
                buffer.len()
            );
            return;
        }
        buffer[start..end].copy_from_slice(data);
        self.updates.push(BufferUpdate {
            kind,
            byte_offset,
            len: data.len(),
        });
    }

    fn draw_indexed(&mut self, call: DrawCall) {
        self.draws.push(call);
    }
}
