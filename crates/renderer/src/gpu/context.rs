use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::RenderError;

use super::check::{backend_error, BackendErrorCode, ErrorChecker};

pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
    pub limits: wgpu::Limits,
    pub checker: ErrorChecker,
}

impl GpuContext {
    /// Creates the surface and device for `window`.
    ///
    /// Returns `Ok(None)` when no adapter can drive the surface; callers treat
    /// that as "this machine cannot display the simulator".
    pub(crate) fn new(
        window: Arc<Window>,
        initial_size: PhysicalSize<u32>,
        vsync: bool,
    ) -> Result<Option<Self>, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        let surface = instance.create_surface(window)?;

        let adapter = match pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            },
        )) {
            Ok(adapter) => adapter,
            Err(err) => {
                tracing::warn!(error = %err, "no GPU adapter can present to this window");
                return Ok(None);
            }
        };

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            max_texture = limits.max_texture_dimension_2d,
            "selected GPU adapter"
        );

        let surface_caps = surface.get_capabilities(&adapter);
        if surface_caps.formats.is_empty() {
            return Err(backend_error(
                BackendErrorCode::UnsupportedFormat,
                "surface reports no texture formats for this adapter",
            ));
        }
        if surface_caps.present_modes.is_empty() || surface_caps.alpha_modes.is_empty() {
            return Err(backend_error(
                BackendErrorCode::SurfaceUnpresentable,
                "surface reports no present or alpha modes",
            ));
        }

        let size = clamp_surface_size(initial_size, limits.max_texture_dimension_2d);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("phosphor device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))?;
        let checker = ErrorChecker::attach(&device);

        // The shader does its own gamma-space blending, so an sRGB target
        // would brighten the mask.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                let fallback = surface_caps.formats[0];
                tracing::warn!(?fallback, "no non-sRGB surface format available");
                fallback
            });

        let present_mode = select_present_mode(&surface_caps.present_modes, vsync);
        tracing::debug!(?present_mode, vsync, ?surface_format, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        checker.guarded(&device, || surface.configure(&device, &config))?;

        Ok(Some(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size,
            surface_format,
            limits,
            checker,
        }))
    }

    /// Resizes the swapchain and returns the size actually applied. Zero-area
    /// sizes are ignored.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) -> PhysicalSize<u32> {
        if new_size.width == 0 || new_size.height == 0 {
            return self.size;
        }
        let applied = clamp_surface_size(new_size, self.limits.max_texture_dimension_2d);
        self.size = applied;
        self.config.width = applied.width;
        self.config.height = applied.height;
        self.surface.configure(&self.device, &self.config);
        applied
    }

    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// Fits a window size into `[1, max]` on both axes, warning when it had to
/// shrink.
fn clamp_surface_size(size: PhysicalSize<u32>, max: u32) -> PhysicalSize<u32> {
    let applied = PhysicalSize::new(size.width.clamp(1, max), size.height.clamp(1, max));
    if applied.width < size.width || applied.height < size.height {
        tracing::warn!(
            width = size.width,
            height = size.height,
            max,
            "window exceeds GPU surface limit; clamping"
        );
    }
    applied
}

fn select_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    let find = |wanted: wgpu::PresentMode| modes.iter().copied().find(|mode| *mode == wanted);
    let fifo = find(wgpu::PresentMode::Fifo).unwrap_or(modes[0]);
    if vsync {
        fifo
    } else {
        find(wgpu::PresentMode::Immediate)
            .or_else(|| find(wgpu::PresentMode::Mailbox))
            .unwrap_or(fifo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_windows_are_clamped_to_the_limit() {
        let size = clamp_surface_size(PhysicalSize::new(9000, 600), 8192);
        assert_eq!(size, PhysicalSize::new(8192, 600));
        let size = clamp_surface_size(PhysicalSize::new(20000, 20000), 4096);
        assert_eq!(size, PhysicalSize::new(4096, 4096));
    }

    #[test]
    fn surface_sizes_within_limit_pass_through() {
        let size = clamp_surface_size(PhysicalSize::new(1920, 1080), 8192);
        assert_eq!(size, PhysicalSize::new(1920, 1080));
        let size = clamp_surface_size(PhysicalSize::new(0, 1080), 8192);
        assert_eq!(size, PhysicalSize::new(1, 1080));
    }

    #[test]
    fn vsync_prefers_fifo() {
        let modes = [wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(&modes, true), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn no_vsync_prefers_immediate_then_mailbox() {
        let modes = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox];
        assert_eq!(select_present_mode(&modes, false), wgpu::PresentMode::Mailbox);
        let modes = [wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(&modes, false), wgpu::PresentMode::Fifo);
        let modes = [
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
            wgpu::PresentMode::Fifo,
        ];
        assert_eq!(select_present_mode(&modes, false), wgpu::PresentMode::Immediate);
    }
}
