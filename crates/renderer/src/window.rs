use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::error::RenderError;
use crate::gpu::FrameLoop;
use crate::types::RendererConfig;

/// Opens the window and drives [`FrameLoop::tick`] once per redraw until the
/// window closes or a fatal error stops the loop.
pub(crate) fn run_window(config: &RendererConfig) -> Result<(), RenderError> {
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)?;
    let window = Arc::new(window);

    let Some(mut frames) = FrameLoop::new(Arc::clone(&window), config)? else {
        tracing::warn!("graphics capability unavailable; nothing will be rendered");
        return Ok(());
    };

    let mut failure = None;
    event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::RedrawRequested => match frames.tick(window.inner_size()) {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    tracing::debug!("surface lost or outdated; reconfiguring");
                    frames.reconfigure();
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    tracing::warn!("surface timeout; retrying next frame");
                }
                Err(err @ wgpu::SurfaceError::OutOfMemory) => {
                    tracing::error!(error = %err, "surface out of memory; stopping");
                    failure = Some(RenderError::Frame(err));
                    elwt.exit();
                }
                Err(other) => {
                    tracing::warn!(error = %other, "surface error; retrying next frame");
                }
            },
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    })?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
