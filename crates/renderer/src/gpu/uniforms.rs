//! Uniform names shared with the shader text, and the per-frame uniform block.
//!
//! The block is written by reflected byte offset rather than through a
//! `#[repr(C)]` mirror struct, so the shader is free to order (or pad) its
//! members however it likes as long as the names match.

use crate::error::RenderError;

use super::pipeline::ProgramLayout;

pub(crate) const A_POS: &str = "a_pos";
pub(crate) const U_INPUT: &str = "u_input";
pub(crate) const U_DOTS: &str = "u_dots";
pub(crate) const U_INPUT_SCALE: &str = "u_inputScale";
pub(crate) const U_INPUT_STEP: &str = "u_inputStep";
pub(crate) const U_RANDOM: &str = "u_random";
pub(crate) const U_OUT_SIZE: &str = "u_outSize";

/// Separate sampler paired with a texture uniform.
pub(crate) fn sampler_name(texture: &str) -> String {
    format!("{texture}Sampler")
}

/// Values computed for a single tick; nothing here outlives the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameState {
    pub output: (u32, u32),
    pub input_scale: [f32; 2],
    pub input_step: [f32; 2],
    pub random: [f32; 2],
}

pub(crate) struct FrameUniforms {
    block: Vec<u8>,
    input_scale: usize,
    input_step: usize,
    random: usize,
    out_size: usize,
}

impl FrameUniforms {
    pub fn new(layout: &ProgramLayout) -> Result<Self, RenderError> {
        let block = layout
            .uniform_block()
            .ok_or_else(|| RenderError::MissingBinding {
                name: U_INPUT_SCALE.to_string(),
                expected: "uniform block containing",
            })?;
        let offset = |name: &str| -> Result<usize, RenderError> {
            let offset = layout.uniform_offset(name)? as usize;
            if offset + VEC2_SIZE > block.span as usize {
                return Err(RenderError::ProgramLink {
                    log: format!("uniform `{name}` at offset {offset} overruns its block"),
                });
            }
            Ok(offset)
        };
        Ok(Self {
            input_scale: offset(U_INPUT_SCALE)?,
            input_step: offset(U_INPUT_STEP)?,
            random: offset(U_RANDOM)?,
            out_size: offset(U_OUT_SIZE)?,
            block: vec![0; block.span as usize],
        })
    }

    pub fn apply(&mut self, state: &FrameState) {
        let out_size = [state.output.0 as f32, state.output.1 as f32];
        self.write_vec2(self.input_scale, state.input_scale);
        self.write_vec2(self.input_step, state.input_step);
        self.write_vec2(self.random, state.random);
        self.write_vec2(self.out_size, out_size);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.block
    }

    fn write_vec2(&mut self, offset: usize, value: [f32; 2]) {
        self.block[offset..offset + VEC2_SIZE].copy_from_slice(bytemuck::bytes_of(&value));
    }
}

const VEC2_SIZE: usize = std::mem::size_of::<[f32; 2]>();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_stage;
    use crate::compile::tests::{fragment_text, vertex_text};
    use crate::gpu::pipeline::link;

    fn read_vec2(bytes: &[u8], offset: usize) -> [f32; 2] {
        let x = f32::from_ne_bytes(bytes[offset..offset + 4].try_into().expect("x"));
        let y = f32::from_ne_bytes(bytes[offset + 4..offset + 8].try_into().expect("y"));
        [x, y]
    }

    #[test]
    fn writes_each_value_at_its_reflected_offset() {
        let vertex = compile_stage(&vertex_text()).expect("vertex");
        let fragment = compile_stage(&fragment_text()).expect("fragment");
        let layout = link(&vertex, &fragment).expect("link");
        let mut uniforms = FrameUniforms::new(&layout).expect("uniforms");
        assert_eq!(uniforms.bytes().len(), 32);

        uniforms.apply(&FrameState {
            output: (1920, 1080),
            input_scale: [1.0, 0.75],
            input_step: [0.5, 0.25],
            random: [0.125, 0.875],
        });

        let bytes = uniforms.bytes();
        assert_eq!(read_vec2(bytes, 0), [1.0, 0.75]);
        assert_eq!(read_vec2(bytes, 8), [0.5, 0.25]);
        assert_eq!(read_vec2(bytes, 16), [0.125, 0.875]);
        assert_eq!(read_vec2(bytes, 24), [1920.0, 1080.0]);
    }

    #[test]
    fn sampler_names_follow_texture_names() {
        assert_eq!(sampler_name(U_INPUT), "u_inputSampler");
        assert_eq!(sampler_name(U_DOTS), "u_dotsSampler");
    }
}
