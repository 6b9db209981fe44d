use std::collections::HashMap;

use super::backend::BufferKind;

/// Shader program receiving named uniforms and texture bindings.
pub trait ShadingStage {
    fn set_uniform(&mut self, name: &str, value: f32);
    /// Binds the contents of a terrain buffer as the texture `name`.
    fn bind_texture(&mut self, name: &str, source: BufferKind, width: u32, height: u32);
}

/// Stand-in used when no shading stage is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShading;

impl ShadingStage for NoShading {
    fn set_uniform(&mut self, _name: &str, _value: f32) {}

    fn bind_texture(&mut self, _name: &str, _source: BufferKind, _width: u32, _height: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub source: BufferKind,
    pub width: u32,
    pub height: u32,
}

/// Keeps the latest value of every uniform and binding it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingShading {
    uniforms: HashMap<String, f32>,
    textures: HashMap<String, TextureBinding>,
}

impl RecordingShading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(&self, name: &str) -> Option<f32> {
        self.uniforms.get(name).copied()
    }

    pub fn texture(&self, name: &str) -> Option<TextureBinding> {
        self.textures.get(name).copied()
    }
}

impl ShadingStage for RecordingShading {
    fn set_uniform(&mut self, name: &str, value: f32) {
        self.uniforms.insert(name.to_string(), value);
    }

    fn bind_texture(&mut self, name: &str, source: BufferKind, width: u32, height: u32) {
        self.textures.insert(
            name.to_string(),
            TextureBinding {
                source,
                width,
                height,
            },
        );
    }
}
