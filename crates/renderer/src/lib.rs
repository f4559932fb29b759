//! CRT display simulator.
//!
//! A test card is cover-fit onto a resizable window and composited through a
//! 6×6 phosphor dot mask with per-frame dither:
//!
//! ```text
//!   Renderer::run ──▶ winit event loop ──▶ FrameLoop::tick()
//!                                              │
//!          ContentSource (worker) ──▶ TextureCache ──▶ uniforms ─▶ draw 6 vertices
//! ```
//!
//! Setup is all-or-nothing: shader compile, link and backend failures abort
//! with a [`RenderError`]. A test card that never decodes is not an error; the
//! simulator keeps drawing over a black placeholder.

mod compile;
mod error;
pub mod fit;
mod gpu;
mod source;
mod types;
mod window;

pub use error::RenderError;
pub use gpu::{BackendErrorCode, BackendErrorKind};
pub use types::{RendererConfig, ShaderSources, ShaderStage, ShaderText};

/// Entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and renders until it is closed.
    ///
    /// Returns `Ok(())` without drawing when no GPU adapter is available.
    pub fn run(&mut self) -> Result<(), RenderError> {
        tracing::info!(
            vertex = %self.config.shaders.vertex.origin,
            fragment = %self.config.shaders.fragment.origin,
            testcard = %self.config.testcard.display(),
            "starting crt simulator"
        );
        window::run_window(&self.config)
    }
}

/// Compiles and links the shader pair without opening a window.
///
/// Useful for checking shader edits; reports the same errors startup would.
pub fn validate_shaders(shaders: &ShaderSources) -> Result<(), RenderError> {
    let vertex = compile::compile_stage(&shaders.vertex)?;
    let fragment = compile::compile_stage(&shaders.fragment)?;
    gpu::link_stages(&vertex, &fragment)
}
