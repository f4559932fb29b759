use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::RenderError;
use crate::fit;
use crate::types::RendererConfig;

use super::context::GpuContext;
use super::geometry::GeometryBuffer;
use super::pipeline::{self, Program, ProgramManager};
use super::textures::{TextureCache, TextureUnit};
use super::uniforms::{sampler_name, FrameState, FrameUniforms};

/// Detects Idle to Resizing transitions by comparing the live window size
/// against the size the swapchain was last configured for.
#[derive(Debug, Default)]
pub(crate) struct ResizeTracker {
    backing: Option<(u32, u32)>,
}

impl ResizeTracker {
    /// Returns the new size exactly once per change. The first observation
    /// always counts as a change.
    pub fn observe(&mut self, live: (u32, u32)) -> Option<(u32, u32)> {
        if self.backing == Some(live) {
            return None;
        }
        self.backing = Some(live);
        Some(live)
    }
}

/// Per-frame dither source.
pub(crate) struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    /// Two independent values in `[0, 1)`.
    pub fn sample(&mut self) -> [f32; 2] {
        [self.rng.gen::<f32>(), self.rng.gen::<f32>()]
    }
}

/// Everything needed to draw one CRT frame, owned by the window driver.
pub(crate) struct FrameLoop {
    context: GpuContext,
    program: Program,
    geometry: GeometryBuffer,
    textures: TextureCache,
    uniforms: FrameUniforms,
    uniform_buffer: wgpu::Buffer,
    bind_groups: Vec<wgpu::BindGroup>,
    bound_generation: u64,
    resize: ResizeTracker,
    jitter: Jitter,
    out_size: (u32, u32),
    input_step: [f32; 2],
    frame_count: u64,
}

impl FrameLoop {
    /// Runs every setup step. `Ok(None)` means no adapter could be found.
    pub(crate) fn new(
        window: Arc<Window>,
        config: &RendererConfig,
    ) -> Result<Option<Self>, RenderError> {
        let size = window.inner_size();
        let Some(context) = GpuContext::new(window, size, config.vsync)? else {
            return Ok(None);
        };

        let program = ProgramManager::build(
            &context,
            &config.shaders.vertex,
            &config.shaders.fragment,
        )?;
        let uniforms = FrameUniforms::new(program.layout())?;
        let textures = TextureCache::new(&context, config.testcard.clone())?;

        let device = &context.device;
        let (geometry, uniform_buffer) = context.checker.guarded(device, || {
            let geometry = GeometryBuffer::upload(device);
            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("crt uniforms"),
                size: uniforms.bytes().len() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            (geometry, uniform_buffer)
        })?;
        let bind_groups = context.checker.guarded(device, || {
            bind(&context, &program, &textures, &uniform_buffer)
        })??;

        let out_size = (context.size.width, context.size.height);
        let input_step = fit::input_step(textures.content_size());
        tracing::info!(
            width = out_size.0,
            height = out_size.1,
            format = ?context.surface_format,
            "crt pipeline ready"
        );
        Ok(Some(Self {
            bound_generation: textures.generation(),
            context,
            program,
            geometry,
            textures,
            uniforms,
            uniform_buffer,
            bind_groups,
            resize: ResizeTracker::default(),
            jitter: Jitter::new(config.seed),
            out_size,
            input_step,
            frame_count: 0,
        }))
    }

    /// Draws one frame for the window's current `live` size.
    pub(crate) fn tick(&mut self, live: PhysicalSize<u32>) -> Result<(), wgpu::SurfaceError> {
        if live.width == 0 || live.height == 0 {
            return Ok(());
        }
        if let Some((width, height)) = self.resize.observe((live.width, live.height)) {
            tracing::debug!(width, height, "output surface resized");
            let applied = self.context.resize(live);
            self.out_size = (applied.width, applied.height);
            self.textures.request_rescale(applied.width, applied.height);
        }
        if let Some(outcome) = self.textures.poll(&self.context) {
            tracing::debug!(
                width = outcome.size.0,
                height = outcome.size.1,
                "content texture replaced"
            );
            self.input_step = outcome.step;
        }

        let state = FrameState {
            output: self.out_size,
            input_scale: fit::input_scale(self.out_size, self.textures.content_size()),
            input_step: self.input_step,
            random: self.jitter.sample(),
        };
        self.uniforms.apply(&state);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, self.uniforms.bytes());

        if self.bound_generation != self.textures.generation() {
            match bind(
                &self.context,
                &self.program,
                &self.textures,
                &self.uniform_buffer,
            ) {
                Ok(groups) => {
                    self.bind_groups = groups;
                    self.bound_generation = self.textures.generation();
                }
                Err(err) => tracing::error!(error = %err, "failed to rebind content texture"),
            }
        }

        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("crt encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("crt pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_viewport(
                0.0,
                0.0,
                self.out_size.0 as f32,
                self.out_size.1 as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&self.program.pipeline);
            for (index, group) in self.bind_groups.iter().enumerate() {
                render_pass.set_bind_group(index as u32, group, &[]);
            }
            render_pass.set_vertex_buffer(0, self.geometry.slice());
            render_pass.draw(0..self.geometry.vertex_count(), 0..1);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        self.frame_count += 1;
        if self.frame_count % 600 == 0 {
            tracing::trace!(frames = self.frame_count, "render stats");
        }
        Ok(())
    }

    /// Rebuilds the swapchain after it was lost or became outdated.
    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }
}

fn bind(
    context: &GpuContext,
    program: &Program,
    textures: &TextureCache,
    uniform_buffer: &wgpu::Buffer,
) -> Result<Vec<wgpu::BindGroup>, RenderError> {
    let layout = program.layout();
    let block = layout
        .uniform_block()
        .ok_or_else(|| RenderError::MissingBinding {
            name: "params".to_string(),
            expected: "uniform block",
        })?;

    let mut entries = vec![(
        (block.group, block.binding),
        uniform_buffer.as_entire_binding(),
    )];
    for unit in [TextureUnit::Content, TextureUnit::Mask] {
        let name = unit.uniform_name();
        let resource = textures.resource(unit);
        entries.push((
            layout.texture_binding(name)?,
            wgpu::BindingResource::TextureView(&resource.view),
        ));
        entries.push((
            layout.sampler_binding(&sampler_name(name))?,
            wgpu::BindingResource::Sampler(&resource.sampler),
        ));
    }
    Ok(pipeline::create_bind_groups(&context.device, program, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_a_resize() {
        let mut tracker = ResizeTracker::default();
        assert_eq!(tracker.observe((800, 600)), Some((800, 600)));
    }

    #[test]
    fn resize_fires_once_per_change() {
        let mut tracker = ResizeTracker::default();
        tracker.observe((800, 600));
        assert_eq!(tracker.observe((800, 600)), None);
        assert_eq!(tracker.observe((1920, 1080)), Some((1920, 1080)));
        assert_eq!(tracker.observe((1920, 1080)), None);
        assert_eq!(tracker.observe((800, 600)), Some((800, 600)));
    }

    #[test]
    fn jitter_stays_in_unit_interval() {
        let mut jitter = Jitter::new(None);
        for _ in 0..1000 {
            let [x, y] = jitter.sample();
            assert!((0.0..1.0).contains(&x), "{x}");
            assert!((0.0..1.0).contains(&y), "{y}");
        }
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let mut a = Jitter::new(Some(7));
        let mut b = Jitter::new(Some(7));
        let first: Vec<_> = (0..16).map(|_| a.sample()).collect();
        let second: Vec<_> = (0..16).map(|_| b.sample()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn jitter_components_differ() {
        let mut jitter = Jitter::new(Some(42));
        let samples: Vec<_> = (0..64).map(|_| jitter.sample()).collect();
        assert!(samples.iter().any(|[x, y]| x != y));
        assert!(samples.windows(2).any(|pair| pair[0] != pair[1]));
    }
}
