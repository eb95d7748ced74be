//! GLSL templates and their compilation to WGSL.
//!
//! Fragment templates are written in GLSL so the variant tables can steer them
//! through the preprocessor. `naga` expands the defines, validates the module
//! and emits WGSL for `wgpu`. Everything here runs on the CPU, so a broken
//! variant is caught before any GPU object exists.

use super::variant::{MacroTable, ShaderFamily, ShaderVariant};
use crate::error::{PipelineError, PipelineResult};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;

/// Full-screen quad vertex shader shared by every pass.
pub const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;

/// Filter template (`FILTER_FN`, optional `SEPARABLE_DIRECTION`).
pub const FILTER_SHADER: &str = include_str!("glsl/filter.frag");

/// Anaglyph template (`ANAGLYPH_FN`).
pub const ANAGLYPH_SHADER: &str = include_str!("glsl/anaglyph.frag");

/// Entry point naga gives a GLSL fragment shader.
pub const FRAGMENT_ENTRY_POINT: &str = "main";

/// A fragment stage ready to be handed to `wgpu`.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub label: String,
    pub wgsl: String,
    pub entry_point: &'static str,
}

pub fn template(family: ShaderFamily) -> &'static str {
    match family {
        ShaderFamily::Filter => FILTER_SHADER,
        ShaderFamily::Anaglyph => ANAGLYPH_SHADER,
    }
}

/// Expands a variant's define table into its template and compiles it.
pub fn compile_variant(variant: ShaderVariant) -> PipelineResult<CompiledShader> {
    compile_fragment(&variant.to_string(), template(variant.family()), variant.macros())
}

/// Compiles a GLSL fragment shader with the given defines into WGSL.
pub fn compile_fragment(label: &str, glsl: &str, defines: MacroTable) -> PipelineResult<CompiledShader> {
    let mut frontend = Frontend::default();
    let mut options = Options::from(ShaderStage::Fragment);
    for (name, value) in defines {
        options.defines.insert(name.to_string(), value.to_string());
    }

    let module = frontend
        .parse(&options, glsl)
        .map_err(|e| PipelineError::construction(label, format!("GLSL parse error: {:?}", e)))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| PipelineError::construction(label, format!("shader validation error: {:?}", e)))?;

    let wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| PipelineError::construction(label, format!("WGSL generation error: {:?}", e)))?;

    Ok(CompiledShader {
        label: label.to_string(),
        wgsl,
        entry_point: FRAGMENT_ENTRY_POINT,
    })
}
