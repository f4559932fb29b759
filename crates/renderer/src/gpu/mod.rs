//! GPU side of the CRT simulator.
//!
//! - `context` owns the wgpu instance, device and surface and rebuilds the
//!   swapchain when the window resizes.
//! - `check` maps wgpu error scopes and device loss onto [`BackendErrorKind`].
//! - `pipeline` links the two GLSL stages into a render pipeline and answers
//!   name lookups against the reflected interface.
//! - `geometry` holds the two-triangle quad.
//! - `textures` owns the test card and phosphor mask textures.
//! - `uniforms` writes the per-frame uniform block by reflected offset.
//! - `state` ties everything into the per-frame [`FrameLoop`].

mod check;
mod context;
mod geometry;
mod pipeline;
mod state;
mod textures;
mod uniforms;

pub use check::{BackendErrorCode, BackendErrorKind};
pub(crate) use state::FrameLoop;

/// Links two compiled stages and confirms every name the frame loop binds
/// is present, without touching a device.
pub(crate) fn link_stages(
    vertex: &crate::compile::CompiledStage,
    fragment: &crate::compile::CompiledStage,
) -> Result<(), crate::error::RenderError> {
    let layout = pipeline::link(vertex, fragment)?;
    layout.attribute_location(uniforms::A_POS)?;
    uniforms::FrameUniforms::new(&layout)?;
    for name in [uniforms::U_INPUT, uniforms::U_DOTS] {
        layout.texture_binding(name)?;
        layout.sampler_binding(&uniforms::sampler_name(name))?;
    }
    Ok(())
}
