use renderer::{validate_shaders, RenderError, ShaderSources, ShaderStage, ShaderText};

const VERTEX: &str = include_str!("../../../shaders/crt.vert");
const FRAGMENT: &str = include_str!("../../../shaders/crt.frag");

fn sources(vertex: &str, fragment: &str) -> ShaderSources {
    ShaderSources {
        vertex: ShaderText::new("test.vert", ShaderStage::Vertex, vertex),
        fragment: ShaderText::new("test.frag", ShaderStage::Fragment, fragment),
    }
}

#[test]
fn bundled_shaders_validate() {
    validate_shaders(&sources(VERTEX, FRAGMENT)).expect("bundled shaders link");
}

#[test]
fn broken_fragment_reports_stage_and_origin() {
    let err = validate_shaders(&sources(VERTEX, "#version 450\nvoid main() { oops }\n"))
        .expect_err("syntax error must fail");
    match &err {
        RenderError::ShaderCompile { stage, origin, log } => {
            assert_eq!(*stage, ShaderStage::Fragment);
            assert_eq!(origin, "test.frag");
            assert!(!log.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("fragment"));
}

#[test]
fn fragment_without_mask_is_rejected() {
    let fragment = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 fragColor;
layout(std140, set = 0, binding = 0) uniform CrtParams {
    vec2 u_inputScale;
    vec2 u_inputStep;
    vec2 u_random;
    vec2 u_outSize;
} params;
layout(set = 0, binding = 1) uniform texture2D u_input;
layout(set = 0, binding = 2) uniform sampler u_inputSampler;
void main() {
    vec2 uv = v_uv * params.u_inputScale + params.u_inputStep * params.u_random;
    fragColor = texture(sampler2D(u_input, u_inputSampler), uv) + vec4(params.u_outSize, 0.0, 0.0) * 0.0;
}
"#;
    let err = validate_shaders(&sources(VERTEX, fragment)).expect_err("u_dots is required");
    assert!(
        matches!(&err, RenderError::MissingBinding { name, .. } if name == "u_dots"),
        "unexpected error: {err}"
    );
}
