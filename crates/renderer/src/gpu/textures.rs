use std::path::PathBuf;

use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::RenderError;
use crate::fit;
use crate::source::{ContentSource, SourceEvent, SourcePoll};

use super::check::check_extent;
use super::context::GpuContext;
use super::uniforms::{U_DOTS, U_INPUT};

pub(crate) const MASK_SIZE: u32 = 6;
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Fixed texture units the composite samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureUnit {
    Content = 0,
    Mask = 1,
}

impl TextureUnit {
    pub fn uniform_name(self) -> &'static str {
        match self {
            TextureUnit::Content => U_INPUT,
            TextureUnit::Mask => U_DOTS,
        }
    }
}

/// Builds the 6×6 phosphor tile: columns cycle red/green/blue and two
/// half-rows are darkened so neighbouring triads read as separate dots.
pub(crate) fn phosphor_mask() -> Vec<u8> {
    let mut texels = Vec::with_capacity((MASK_SIZE * MASK_SIZE * 4) as usize);
    for y in 0..MASK_SIZE {
        for x in 0..MASK_SIZE {
            let dark = (y == 0 && x < 3) || (y == 3 && x >= 3);
            let v = if dark { 0 } else { 255 };
            let mut texel = [0, 0, 0, 255];
            texel[(x % 3) as usize] = v;
            texels.extend_from_slice(&texel);
        }
    }
    texels
}

/// Rescale bookkeeping for the content texture, kept free of GPU state.
///
/// Tracks the latest requested output size, the size currently being
/// rasterised, and the size last uploaded so identical requests never cause a
/// second upload.
#[derive(Debug)]
pub(crate) struct RescalePlan {
    max_dimension: u32,
    source: Option<(u32, u32)>,
    requested: Option<(u32, u32)>,
    in_flight: Option<(u32, u32)>,
    uploaded: Option<(u32, u32)>,
    rejected: Option<(u32, u32)>,
}

impl RescalePlan {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            source: None,
            requested: None,
            in_flight: None,
            uploaded: None,
            rejected: None,
        }
    }

    pub fn request(&mut self, output: (u32, u32)) {
        self.requested = Some(output);
    }

    pub fn source_decoded(&mut self, size: (u32, u32)) {
        self.source = Some(size);
    }

    /// Returns the size to rasterise next, if the latest request needs one.
    pub fn next_target(&mut self) -> Option<(u32, u32)> {
        let target = fit::cover_fit(self.requested?, self.source?);
        if self.in_flight == Some(target) {
            return None;
        }
        if self.uploaded == Some(target) || self.rejected == Some(target) {
            // Whatever is still rasterising is for a size the output has left.
            self.in_flight = None;
            return None;
        }
        if target.0 > self.max_dimension || target.1 > self.max_dimension {
            tracing::warn!(
                width = target.0,
                height = target.1,
                max = self.max_dimension,
                "cover-fit content exceeds GPU texture limit; keeping previous texture"
            );
            self.rejected = Some(target);
            self.in_flight = None;
            return None;
        }
        self.in_flight = Some(target);
        Some(target)
    }

    /// Accepts a finished raster; false means it was superseded and must be dropped.
    pub fn accept(&mut self, size: (u32, u32)) -> bool {
        if self.in_flight != Some(size) {
            return false;
        }
        self.in_flight = None;
        self.uploaded = Some(size);
        true
    }

    /// Records that the worker could not produce `size`; it is not retried.
    pub fn reject(&mut self, size: (u32, u32)) {
        if self.in_flight == Some(size) {
            self.in_flight = None;
            self.rejected = Some(size);
        }
    }
}

pub(crate) struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl TextureResource {
    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

/// Reported when a new content texture has been uploaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RescaleOutcome {
    pub size: (u32, u32),
    pub step: [f32; 2],
}

/// Owns the content (unit 0) and phosphor mask (unit 1) textures.
pub(crate) struct TextureCache {
    content: TextureResource,
    mask: TextureResource,
    plan: RescalePlan,
    source: Option<ContentSource>,
    generation: u64,
}

impl TextureCache {
    pub fn new(context: &GpuContext, testcard: PathBuf) -> Result<Self, RenderError> {
        let (content, mask) = context.checker.guarded(&context.device, || {
            (
                init_content_placeholder(&context.device, &context.queue),
                init_mask(&context.device, &context.queue),
            )
        })?;
        tracing::debug!(path = %testcard.display(), "loading test card in the background");
        let source = ContentSource::spawn(testcard)?;
        Ok(Self {
            content,
            mask,
            plan: RescalePlan::new(context.limits.max_texture_dimension_2d),
            source: Some(source),
            generation: 0,
        })
    }

    /// Records the output size the content should cover. Never blocks; the
    /// upload happens in a later [`poll`](Self::poll).
    pub fn request_rescale(&mut self, width: u32, height: u32) {
        self.plan.request((width, height));
    }

    /// Drains worker replies and schedules the next rasterisation.
    pub fn poll(&mut self, context: &GpuContext) -> Option<RescaleOutcome> {
        let mut outcome = None;
        while let Some(source) = &self.source {
            match source.poll() {
                SourcePoll::Ready(SourceEvent::Decoded { width, height }) => {
                    self.plan.source_decoded((width, height));
                }
                SourcePoll::Ready(SourceEvent::Rasterized {
                    width,
                    height,
                    pixels,
                }) => {
                    if !self.plan.accept((width, height)) {
                        tracing::trace!(width, height, "dropping superseded test card raster");
                        continue;
                    }
                    let max = context.limits.max_texture_dimension_2d;
                    if let Err(err) = check_extent(max, "test card raster", width, height) {
                        tracing::warn!(error = %err, "skipping test card upload");
                        continue;
                    }
                    self.upload_content(context, width, height, &pixels);
                    outcome = Some(RescaleOutcome {
                        size: (width, height),
                        step: fit::input_step((width, height)),
                    });
                }
                SourcePoll::Ready(SourceEvent::Failed { width, height }) => {
                    self.plan.reject((width, height));
                }
                SourcePoll::Pending => break,
                SourcePoll::Closed => {
                    tracing::warn!("test card unavailable; content stays on the placeholder");
                    self.source = None;
                }
            }
        }

        if let (Some(source), Some((width, height))) = (&self.source, self.plan.next_target()) {
            tracing::debug!(width, height, "rasterising test card");
            source.request(width, height);
        }
        outcome
    }

    pub fn content_size(&self) -> (u32, u32) {
        self.content.size()
    }

    /// Bumped every time the content texture object is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resource(&self, unit: TextureUnit) -> &TextureResource {
        match unit {
            TextureUnit::Content => &self.content,
            TextureUnit::Mask => &self.mask,
        }
    }

    fn upload_content(&mut self, context: &GpuContext, width: u32, height: u32, pixels: &[u8]) {
        let texture = context.device.create_texture_with_data(
            &context.queue,
            &content_descriptor(width, height),
            TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.content = TextureResource {
            texture,
            view,
            sampler: self.content.sampler.clone(),
        };
        self.generation += 1;
        tracing::info!(width, height, "uploaded test card texture");
    }
}

fn content_descriptor(width: u32, height: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("content texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

/// One opaque black texel so the pipeline can draw before the card arrives.
fn init_content_placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> TextureResource {
    let texture = device.create_texture_with_data(
        queue,
        &content_descriptor(1, 1),
        TextureDataOrder::LayerMajor,
        &[0, 0, 0, 255],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("content sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    TextureResource {
        texture,
        view,
        sampler,
    }
}

fn init_mask(device: &wgpu::Device, queue: &wgpu::Queue) -> TextureResource {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("phosphor mask"),
            size: wgpu::Extent3d {
                width: MASK_SIZE,
                height: MASK_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &phosphor_mask(),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("phosphor mask sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    TextureResource {
        texture,
        view,
        sampler,
    }
}
