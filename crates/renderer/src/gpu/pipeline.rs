use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::compile::{self, CompiledStage, ResourceKind, UniformBlockLayout, ENTRY_POINT};
use crate::error::RenderError;
use crate::types::ShaderText;

use super::context::GpuContext;
use super::geometry;
use super::uniforms::A_POS;

/// Where a named shader input lives once the program is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Attribute { location: u32 },
    Uniform { offset: u32 },
    Texture { group: u32, binding: u32 },
    Sampler { group: u32, binding: u32 },
}

impl Slot {
    fn describe(self) -> &'static str {
        match self {
            Slot::Attribute { .. } => "attribute",
            Slot::Uniform { .. } => "uniform",
            Slot::Texture { .. } => "texture",
            Slot::Sampler { .. } => "sampler",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformBlockSlot {
    pub group: u32,
    pub binding: u32,
    pub span: u32,
}

/// Linked interface of both stages, independent of any device.
#[derive(Debug, Default)]
pub(crate) struct ProgramLayout {
    slots: BTreeMap<String, Slot>,
    block: Option<UniformBlockSlot>,
    resources: BTreeMap<(u32, u32), ResourceKind>,
}

impl ProgramLayout {
    pub fn locate(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    pub fn uniform_block(&self) -> Option<UniformBlockSlot> {
        self.block
    }

    pub fn attribute_location(&self, name: &str) -> Result<u32, RenderError> {
        match self.locate(name) {
            Some(Slot::Attribute { location }) => Ok(location),
            _ => Err(missing(name, "attribute")),
        }
    }

    pub fn uniform_offset(&self, name: &str) -> Result<u32, RenderError> {
        match self.locate(name) {
            Some(Slot::Uniform { offset }) => Ok(offset),
            _ => Err(missing(name, "uniform")),
        }
    }

    pub fn texture_binding(&self, name: &str) -> Result<(u32, u32), RenderError> {
        match self.locate(name) {
            Some(Slot::Texture { group, binding }) => Ok((group, binding)),
            _ => Err(missing(name, "texture")),
        }
    }

    pub fn sampler_binding(&self, name: &str) -> Result<(u32, u32), RenderError> {
        match self.locate(name) {
            Some(Slot::Sampler { group, binding }) => Ok((group, binding)),
            _ => Err(missing(name, "sampler")),
        }
    }

    /// Number of bind groups the pipeline layout needs (highest group + 1).
    fn group_count(&self) -> u32 {
        let resource_max = self.resources.keys().map(|(group, _)| group + 1).max();
        let block_max = self.block.map(|block| block.group + 1);
        resource_max.max(block_max).unwrap_or(0)
    }

    fn layout_entries(&self, group: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut entries = Vec::new();
        if let Some(block) = self.block.filter(|block| block.group == group) {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(u64::from(block.span)),
                },
                count: None,
            });
        }
        for (&(_, binding), kind) in self.resources.range((group, 0)..=(group, u32::MAX)) {
            let ty = match kind {
                ResourceKind::Texture => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                ResourceKind::Sampler => {
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                }
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty,
                count: None,
            });
        }
        entries
    }
}

fn missing(name: &str, expected: &'static str) -> RenderError {
    RenderError::MissingBinding {
        name: name.to_string(),
        expected,
    }
}

/// Matches the vertex stage's outputs against the fragment stage's inputs and
/// merges the resource bindings both stages declare.
pub(crate) fn link(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<ProgramLayout, RenderError> {
    let mut problems = Vec::new();
    for stage in [vertex, fragment] {
        if !stage.interface.has_entry_point {
            problems.push(format!(
                "{} shader {} has no `{ENTRY_POINT}` entry point",
                stage.text.stage, stage.text.origin
            ));
        }
    }
    for (location, name) in &fragment.interface.inputs {
        if !vertex.interface.outputs.contains(location) {
            problems.push(format!(
                "fragment input `{name}` (location {location}) is not written by the vertex stage"
            ));
        }
    }

    let mut blocks: BTreeMap<(u32, u32), &UniformBlockLayout> = BTreeMap::new();
    let mut resources: BTreeMap<(u32, u32), &(String, ResourceKind)> = BTreeMap::new();
    for stage in [vertex, fragment] {
        for (key, block) in &stage.interface.blocks {
            match blocks.get(key) {
                Some(existing) if *existing != block => problems.push(format!(
                    "uniform block at set {}, binding {} differs between stages",
                    key.0, key.1
                )),
                _ => {
                    blocks.insert(*key, block);
                }
            }
        }
        for (key, resource) in &stage.interface.resources {
            match resources.get(key) {
                Some(existing) if *existing != resource => problems.push(format!(
                    "set {}, binding {} is bound to both `{}` and `{}`",
                    key.0, key.1, existing.0, resource.0
                )),
                _ => {
                    resources.insert(*key, resource);
                }
            }
        }
    }
    if blocks.len() > 1 {
        problems.push(format!(
            "expected at most one uniform block, found {}",
            blocks.len()
        ));
    }
    for key in blocks.keys() {
        if resources.contains_key(key) {
            problems.push(format!(
                "set {}, binding {} is bound to both a uniform block and a resource",
                key.0, key.1
            ));
        }
    }

    if !problems.is_empty() {
        return Err(RenderError::ProgramLink {
            log: problems.join("\n"),
        });
    }

    let mut layout = ProgramLayout::default();
    for (location, name) in &vertex.interface.inputs {
        layout.slots.insert(
            name.clone(),
            Slot::Attribute {
                location: *location,
            },
        );
    }
    if let Some((&(group, binding), block)) = blocks.iter().next() {
        layout.block = Some(UniformBlockSlot {
            group,
            binding,
            span: block.span,
        });
        for (name, offset) in &block.members {
            layout
                .slots
                .insert(name.clone(), Slot::Uniform { offset: *offset });
        }
    }
    for ((group, binding), (name, kind)) in resources {
        let slot = match kind {
            ResourceKind::Texture => Slot::Texture { group, binding },
            ResourceKind::Sampler => Slot::Sampler { group, binding },
        };
        if let Some(previous) = layout.slots.insert(name.clone(), slot) {
            return Err(RenderError::ProgramLink {
                log: format!(
                    "`{name}` is declared both as a {} and a {}",
                    previous.describe(),
                    slot.describe()
                ),
            });
        }
        layout.resources.insert((group, binding), *kind);
    }
    Ok(layout)
}

/// The linked program: one render pipeline plus the reflected binding slots.
pub(crate) struct Program {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    layout: ProgramLayout,
}

impl Program {
    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }
}

pub(crate) struct ProgramManager;

impl ProgramManager {
    /// Compiles both stages, links them, and creates the render pipeline.
    pub fn build(
        context: &GpuContext,
        vertex: &ShaderText,
        fragment: &ShaderText,
    ) -> Result<Program, RenderError> {
        let vertex_stage = compile::compile_stage(vertex)?;
        let fragment_stage = compile::compile_stage(fragment)?;
        let layout = link(&vertex_stage, &fragment_stage)?;
        let position = layout.attribute_location(A_POS)?;

        let device = &context.device;
        let built = context.checker.guarded(device, || {
            let bind_group_layouts: Vec<_> = (0..layout.group_count())
                .map(|group| {
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("crt bind group layout #{group}")),
                        entries: &layout.layout_entries(group),
                    })
                })
                .collect();
            let layout_refs: Vec<_> = bind_group_layouts.iter().collect();
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("crt pipeline layout"),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });

            let vertex_module = create_module(device, &vertex_stage);
            let fragment_module = create_module(device, &fragment_stage);
            let attributes = geometry::vertex_attributes(position);

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("crt pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(ENTRY_POINT),
                    buffers: &[geometry::vertex_layout(&attributes)],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(ENTRY_POINT),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: context.surface_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
            (pipeline, bind_group_layouts)
        });

        // Pipeline creation is where wgpu checks the stages against each other
        // and against the layout, so its failures are link failures.
        let (pipeline, bind_group_layouts) = built.map_err(|err| match err {
            RenderError::Backend { detail, .. } => RenderError::ProgramLink { log: detail },
            other => other,
        })?;

        tracing::info!(
            vertex = %vertex.origin,
            fragment = %fragment.origin,
            groups = bind_group_layouts.len(),
            "linked crt program"
        );
        Ok(Program {
            pipeline,
            bind_group_layouts,
            layout,
        })
    }
}

fn create_module(device: &wgpu::Device, stage: &CompiledStage) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage.text.origin.as_str()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(stage.text.source.as_str()),
            stage: stage.text.stage.to_naga(),
            defines: &[],
        },
    })
}

/// Builds one bind group per layout from the resources the caller supplies.
pub(crate) fn create_bind_groups<'a>(
    device: &wgpu::Device,
    program: &Program,
    entries: impl IntoIterator<Item = ((u32, u32), wgpu::BindingResource<'a>)>,
) -> Vec<wgpu::BindGroup> {
    let mut grouped: BTreeMap<u32, Vec<wgpu::BindGroupEntry<'a>>> = BTreeMap::new();
    for ((group, binding), resource) in entries {
        grouped
            .entry(group)
            .or_default()
            .push(wgpu::BindGroupEntry { binding, resource });
    }
    program
        .bind_group_layouts
        .iter()
        .enumerate()
        .map(|(group, layout)| {
            let entries = grouped.remove(&(group as u32)).unwrap_or_default();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("crt bind group #{group}")),
                layout,
                entries: &entries,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_stage;
    use crate::compile::tests::{fragment_text, vertex_text};
    use crate::types::ShaderStage;

    fn linked() -> ProgramLayout {
        let vertex = compile_stage(&vertex_text()).expect("vertex");
        let fragment = compile_stage(&fragment_text()).expect("fragment");
        link(&vertex, &fragment).expect("link")
    }

    #[test]
    fn locates_every_wire_name() {
        let layout = linked();
        assert_eq!(layout.attribute_location("a_pos").expect("a_pos"), 0);
        assert_eq!(layout.uniform_offset("u_inputScale").expect("scale"), 0);
        assert_eq!(layout.uniform_offset("u_inputStep").expect("step"), 8);
        assert_eq!(layout.uniform_offset("u_random").expect("random"), 16);
        assert_eq!(layout.uniform_offset("u_outSize").expect("out size"), 24);
        assert_eq!(layout.texture_binding("u_input").expect("input"), (0, 1));
        assert_eq!(layout.sampler_binding("u_inputSampler").expect("sampler"), (0, 2));
        assert_eq!(layout.texture_binding("u_dots").expect("dots"), (0, 3));
        assert_eq!(layout.sampler_binding("u_dotsSampler").expect("sampler"), (0, 4));
        assert_eq!(
            layout.uniform_block(),
            Some(UniformBlockSlot {
                group: 0,
                binding: 0,
                span: 32
            })
        );
        assert_eq!(layout.group_count(), 1);
        assert_eq!(layout.layout_entries(0).len(), 5);
    }

    #[test]
    fn missing_name_is_reported_with_expected_kind() {
        let layout = linked();
        assert!(layout.locate("u_brightness").is_none());
        let err = layout.uniform_offset("u_input").expect_err("u_input is a texture");
        assert_eq!(
            err.to_string(),
            "shader program does not expose uniform `u_input`"
        );
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let vertex = compile_stage(&vertex_text()).expect("vertex");
        let fragment = compile_stage(&ShaderText::new(
            "extra-input.frag",
            ShaderStage::Fragment,
            "#version 450\n\
             layout(location = 0) in vec2 v_uv;\n\
             layout(location = 3) in float v_glow;\n\
             layout(location = 0) out vec4 outColor;\n\
             void main() { outColor = vec4(v_uv, v_glow, 1.0); }\n",
        ))
        .expect("fragment compiles on its own");
        match link(&vertex, &fragment) {
            Err(RenderError::ProgramLink { log }) => assert!(log.contains("v_glow")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("link should fail"),
        }
    }

    #[test]
    fn conflicting_blocks_fail_to_link() {
        let vertex = compile_stage(&ShaderText::new(
            "block.vert",
            ShaderStage::Vertex,
            "#version 450\n\
             layout(location = 0) in vec2 a_pos;\n\
             layout(std140, set = 0, binding = 0) uniform Params { vec4 u_tint; } params;\n\
             void main() { gl_Position = vec4(a_pos, 0.0, 1.0) * params.u_tint; }\n",
        ))
        .expect("vertex");
        let fragment = compile_stage(&fragment_text()).expect("fragment");
        assert!(matches!(
            link(&vertex, &fragment),
            Err(RenderError::ProgramLink { .. })
        ));
    }
}
