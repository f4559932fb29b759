//! GLSL front end for the composite program.
//!
//! Shader text is parsed and validated with naga's GLSL frontend before it is
//! handed to wgpu so compile failures surface as [`RenderError::ShaderCompile`]
//! with a readable diagnostic instead of a device validation panic. The parsed
//! module doubles as the source of reflection data: which names live at which
//! vertex input, uniform block offset, or texture binding.

use std::collections::{BTreeMap, BTreeSet};

use wgpu::naga;

use crate::error::RenderError;
use crate::types::{ShaderStage, ShaderText};

/// Name of the entry point each stage must define.
pub(crate) const ENTRY_POINT: &str = "main";

/// A stage that parsed and validated cleanly.
pub(crate) struct CompiledStage {
    pub text: ShaderText,
    pub interface: StageInterface,
}

/// Layout of a `std140` uniform block as naga laid it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformBlockLayout {
    pub span: u32,
    pub members: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Texture,
    Sampler,
}

/// Everything one stage exposes to the outside world.
#[derive(Debug, Default)]
pub(crate) struct StageInterface {
    pub has_entry_point: bool,
    /// Input location → variable name.
    pub inputs: BTreeMap<u32, String>,
    pub outputs: BTreeSet<u32>,
    /// (group, binding) → block layout.
    pub blocks: BTreeMap<(u32, u32), UniformBlockLayout>,
    /// (group, binding) → (name, kind).
    pub resources: BTreeMap<(u32, u32), (String, ResourceKind)>,
}

pub(crate) fn compile_stage(text: &ShaderText) -> Result<CompiledStage, RenderError> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(text.stage.to_naga());
    let module = frontend
        .parse(&options, &text.source)
        .map_err(|errors| compile_error(text, errors.emit_to_string(&text.source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|error| compile_error(text, error.emit_to_string(&text.source)))?;

    let interface = reflect(&module, text.stage);
    tracing::debug!(
        stage = %text.stage,
        origin = %text.origin,
        inputs = interface.inputs.len(),
        blocks = interface.blocks.len(),
        resources = interface.resources.len(),
        "compiled shader stage"
    );
    Ok(CompiledStage {
        text: text.clone(),
        interface,
    })
}

fn compile_error(text: &ShaderText, log: String) -> RenderError {
    RenderError::ShaderCompile {
        stage: text.stage,
        origin: text.origin.clone(),
        log,
    }
}

fn reflect(module: &naga::Module, stage: ShaderStage) -> StageInterface {
    let mut interface = StageInterface::default();

    for (_, variable) in module.global_variables.iter() {
        let Some(binding) = &variable.binding else {
            continue;
        };
        let key = (binding.group, binding.binding);
        match (variable.space, &module.types[variable.ty].inner) {
            (naga::AddressSpace::Uniform, naga::TypeInner::Struct { members, span }) => {
                let members = members
                    .iter()
                    .filter_map(|member| Some((member.name.clone()?, member.offset)))
                    .collect();
                interface.blocks.insert(
                    key,
                    UniformBlockLayout {
                        span: *span,
                        members,
                    },
                );
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Image { .. }) => {
                if let Some(name) = &variable.name {
                    interface
                        .resources
                        .insert(key, (name.clone(), ResourceKind::Texture));
                }
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => {
                if let Some(name) = &variable.name {
                    interface
                        .resources
                        .insert(key, (name.clone(), ResourceKind::Sampler));
                }
            }
            _ => {}
        }
    }

    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.name == ENTRY_POINT && entry.stage == stage.to_naga());
    if let Some(entry) = entry {
        interface.has_entry_point = true;
        for argument in &entry.function.arguments {
            if let (Some(name), Some(naga::Binding::Location { location, .. })) =
                (&argument.name, &argument.binding)
            {
                interface.inputs.insert(*location, name.clone());
            }
        }
        if let Some(result) = &entry.function.result {
            match &result.binding {
                Some(naga::Binding::Location { location, .. }) => {
                    interface.outputs.insert(*location);
                }
                Some(_) => {}
                None => {
                    if let naga::TypeInner::Struct { members, .. } = &module.types[result.ty].inner
                    {
                        for member in members {
                            if let Some(naga::Binding::Location { location, .. }) = &member.binding
                            {
                                interface.outputs.insert(*location);
                            }
                        }
                    }
                }
            }
        }
    }

    interface
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const VERTEX: &str = include_str!("../../../shaders/crt.vert");
    pub(crate) const FRAGMENT: &str = include_str!("../../../shaders/crt.frag");

    pub(crate) fn vertex_text() -> ShaderText {
        ShaderText::new("test:crt.vert", ShaderStage::Vertex, VERTEX)
    }

    pub(crate) fn fragment_text() -> ShaderText {
        ShaderText::new("test:crt.frag", ShaderStage::Fragment, FRAGMENT)
    }

    #[test]
    fn bundled_vertex_stage_exposes_position_attribute() {
        let stage = compile_stage(&vertex_text()).expect("vertex compiles");
        assert!(stage.interface.has_entry_point);
        assert_eq!(stage.interface.inputs.get(&0).map(String::as_str), Some("a_pos"));
        assert!(stage.interface.outputs.contains(&0));
    }

    #[test]
    fn bundled_fragment_stage_reflects_uniforms_and_textures() {
        let stage = compile_stage(&fragment_text()).expect("fragment compiles");
        let interface = &stage.interface;
        assert_eq!(interface.blocks.len(), 1);
        let block = interface.blocks.values().next().expect("uniform block");
        let names: Vec<_> = block.members.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            ["u_inputScale", "u_inputStep", "u_random", "u_outSize"]
        );
        let offsets: Vec<_> = block.members.iter().map(|(_, offset)| *offset).collect();
        assert_eq!(offsets, [0, 8, 16, 24]);

        let textures: Vec<_> = interface
            .resources
            .values()
            .filter(|(_, kind)| *kind == ResourceKind::Texture)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(textures, ["u_input", "u_dots"]);
    }

    #[test]
    fn syntax_error_reports_stage_and_origin() {
        let text = ShaderText::new(
            "broken.frag",
            ShaderStage::Fragment,
            "#version 450\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = vec4(1.0) }\n",
        );
        let err = compile_stage(&text).err().expect("compile should fail");
        match &err {
            RenderError::ShaderCompile { stage, origin, log } => {
                assert_eq!(*stage, ShaderStage::Fragment);
                assert_eq!(origin, "broken.frag");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("fragment"));
        assert!(message.contains("broken.frag"));
    }

    #[test]
    fn type_error_fails_compilation() {
        let text = ShaderText::new(
            "mistyped.vert",
            ShaderStage::Vertex,
            "#version 450\nvoid main() { gl_Position = vec3(1.0); }\n",
        );
        assert!(matches!(
            compile_stage(&text),
            Err(RenderError::ShaderCompile {
                stage: ShaderStage::Vertex,
                ..
            })
        ));
    }
}
