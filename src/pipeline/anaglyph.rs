//! Terminal stereo-combination pass.

use super::{RenderBackend, RenderPass, TextureHandle};
use crate::error::PipelineResult;
use crate::shader::{AnaglyphMethod, ShaderVariant};

/// Reads a side-by-side stereo pair and writes one anaglyph image.
///
/// The target is `floor(input width / 2)` wide and as tall as the input.
pub struct AnaglyphPass<B: RenderBackend> {
    method: AnaglyphMethod,
    pass: RenderPass<B>,
}

impl<B: RenderBackend> AnaglyphPass<B> {
    pub fn new(
        backend: &B,
        input: &B::Texture,
        uniforms: &B::UniformBuffer,
        method: AnaglyphMethod,
    ) -> PipelineResult<Self> {
        let extent = input.extent().half_width();
        let pass = RenderPass::new(
            backend,
            format!("anaglyph pass ({})", method),
            input,
            extent,
            uniforms,
            ShaderVariant::Anaglyph(method),
        )?;
        Ok(Self { method, pass })
    }

    pub fn execute(&self, backend: &B, encoder: &mut B::Encoder) {
        self.pass.execute(backend, encoder);
    }

    pub fn output_texture(&self) -> &B::Texture {
        self.pass.output_texture()
    }

    pub fn input_texture(&self) -> &B::Texture {
        self.pass.source_texture()
    }

    pub fn method(&self) -> AnaglyphMethod {
        self.method
    }

    pub fn pass(&self) -> &RenderPass<B> {
        &self.pass
    }
}
