use std::fmt;
use std::path::PathBuf;

use wgpu::naga;

/// Pipeline stage a piece of shader text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// GLSL text for one stage, tagged with the identifier it was retrieved by.
///
/// The origin is echoed back in compile diagnostics so a failure can be traced
/// to the file (or built-in resource) that produced it.
#[derive(Debug, Clone)]
pub struct ShaderText {
    pub origin: String,
    pub stage: ShaderStage,
    pub source: String,
}

impl ShaderText {
    pub fn new(origin: impl Into<String>, stage: ShaderStage, source: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            stage,
            source: source.into(),
        }
    }
}

/// The vertex/fragment pair linked into the composite program.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub vertex: ShaderText,
    pub fragment: ShaderText,
}

/// Everything the renderer needs to open a window and start drawing.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title.
    pub title: String,
    /// Initial inner size of the window in physical pixels.
    pub surface_size: (u32, u32),
    pub shaders: ShaderSources,
    /// Test card image; SVG or any raster format the `image` crate decodes.
    pub testcard: PathBuf,
    /// Seeds the dithering jitter for reproducible frames.
    pub seed: Option<u64>,
    pub vsync: bool,
}
