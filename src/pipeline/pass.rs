//! Single full-screen-quad pass into an owned off-screen target.

use super::{Extent, RenderBackend, TextureHandle};
use crate::error::{PipelineError, PipelineResult};
use crate::shader::ShaderVariant;
use tracing::debug;

/// One shader draw reading `source` and writing the pass's own target.
///
/// The target size is fixed at construction; a different size needs a new
/// pass. The source texture is only borrowed: the pass keeps a handle so the
/// binding stays valid, but whoever created the source owns it.
pub struct RenderPass<B: RenderBackend> {
    label: String,
    variant: ShaderVariant,
    source: B::Texture,
    // Field order is drop order: binding before the target and program.
    binding: B::Binding,
    program: B::Program,
    target: B::Texture,
}

impl<B: RenderBackend> RenderPass<B> {
    /// Compiles `variant`, allocates a `extent` target and binds `source`
    /// into the image slot next to the shared uniform buffer.
    ///
    /// Nothing is kept if any step fails.
    pub fn new(
        backend: &B,
        label: impl Into<String>,
        source: &B::Texture,
        extent: Extent,
        uniforms: &B::UniformBuffer,
        variant: ShaderVariant,
    ) -> PipelineResult<Self> {
        let label = label.into();
        if extent.is_empty() {
            return Err(PipelineError::construction(
                &label,
                format!("target dimensions must be positive, got {}", extent),
            ));
        }

        let program = backend.create_program(variant)?;
        let target = backend.create_target(&label, extent)?;
        let binding = backend.bind(&label, &program, source, uniforms)?;
        debug!("Created {} ({}, {} -> {})", label, variant, source.extent(), extent);

        Ok(Self {
            label,
            variant,
            source: source.clone(),
            binding,
            program,
            target,
        })
    }

    /// Records the draw. Overwrites the whole target every call.
    pub fn execute(&self, backend: &B, encoder: &mut B::Encoder) {
        backend.draw(encoder, &self.program, &self.binding, &self.target);
    }

    pub fn output_texture(&self) -> &B::Texture {
        &self.target
    }

    pub fn source_texture(&self) -> &B::Texture {
        &self.source
    }

    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }

    pub fn extent(&self) -> Extent {
        self.target.extent()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::MockBackend;
    use crate::pipeline::UniformSet;
    use crate::shader::FilterKind;

    const GAUSSIAN: ShaderVariant = ShaderVariant::Filter(FilterKind::Gaussian);

    #[test]
    fn test_pass_owns_a_target_of_the_requested_size() {
        let backend = MockBackend::new();
        let source = backend.source_texture(Extent::new(1280, 720));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();

        let pass = RenderPass::new(&backend, "blur", &source, Extent::new(1280, 720), &uniforms, GAUSSIAN).unwrap();

        assert_eq!(pass.extent(), Extent::new(1280, 720));
        assert_eq!(pass.source_texture().id(), source.id());
        assert_ne!(pass.output_texture().id(), source.id());
        assert_eq!(backend.live_textures(), 2);
    }

    #[test]
    fn test_execute_is_repeatable_and_keeps_the_output_identity() {
        let backend = MockBackend::new();
        let source = backend.source_texture(Extent::new(64, 32));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();
        let pass = RenderPass::new(&backend, "blur", &source, Extent::new(64, 32), &uniforms, GAUSSIAN).unwrap();
        let output = pass.output_texture().id();

        let mut encoder = Vec::new();
        pass.execute(&backend, &mut encoder);
        pass.execute(&backend, &mut encoder);

        assert_eq!(encoder.len(), 2);
        assert!(encoder.iter().all(|d| d.source == source.id() && d.target == output));
        assert_eq!(pass.output_texture().id(), output);
    }

    #[test]
    fn test_non_positive_dimensions_are_rejected_before_allocation() {
        let backend = MockBackend::new();
        let source = backend.source_texture(Extent::new(64, 32));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();

        let err = RenderPass::new(&backend, "blur", &source, Extent::new(0, 32), &uniforms, GAUSSIAN)
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::Construction { .. }));
        assert!(backend.compiled.borrow().is_empty());
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn test_link_failure_leaves_no_target_behind() {
        let backend = MockBackend::new();
        backend.fail_variant.set(Some(GAUSSIAN));
        let source = backend.source_texture(Extent::new(64, 32));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();

        let result = RenderPass::new(&backend, "blur", &source, Extent::new(64, 32), &uniforms, GAUSSIAN);

        assert!(matches!(result, Err(PipelineError::Construction { .. })));
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn test_oversized_target_is_a_resource_error() {
        let mut backend = MockBackend::new();
        backend.max_dimension = 1024;
        let source = backend.source_texture(Extent::new(4096, 1024));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();

        let result = RenderPass::new(&backend, "blur", &source, Extent::new(4096, 1024), &uniforms, GAUSSIAN);

        assert!(matches!(result, Err(PipelineError::Resource { .. })));
    }

    #[test]
    fn test_draw_sees_uniform_values_written_before_it() {
        let backend = MockBackend::new();
        let source = backend.source_texture(Extent::new(64, 32));
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();
        let pass = RenderPass::new(&backend, "blur", &source, Extent::new(64, 32), &uniforms, GAUSSIAN).unwrap();

        let mut set = UniformSet::new();
        set.set("sigma", crate::pipeline::UniformValue::Float(2.0)).unwrap();
        backend.write_uniforms(&uniforms, &set.to_block());
        let mut encoder = Vec::new();
        pass.execute(&backend, &mut encoder);

        assert_eq!(encoder[0].uniforms.sigma, 2.0);
    }
}
