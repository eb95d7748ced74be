//! One filter chain plus its terminal anaglyph pass, rebuilt by key.

use super::{AnaglyphPass, FilterChain, RenderBackend, SourceId, TextureHandle, UniformSet};
use crate::error::PipelineResult;
use crate::shader::{AnaglyphMethod, FilterKind};
use tracing::info;

/// Everything whose change requires new passes.
///
/// Uniform values are deliberately absent: they reach the passes through the
/// uniform buffer at render time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    pub source: SourceId,
    pub filters: Vec<Option<FilterKind>>,
    pub anaglyph: AnaglyphMethod,
}

impl StructuralKey {
    pub fn new(source: SourceId, filters: Vec<Option<FilterKind>>, anaglyph: AnaglyphMethod) -> Self {
        Self {
            source,
            filters,
            anaglyph,
        }
    }

    /// True when both keys produce the same filter chain.
    pub fn same_chain(&self, other: &StructuralKey) -> bool {
        self.source == other.source && self.filters == other.filters
    }
}

/// A fully constructed replacement, ready to be swapped in by
/// [`PipelineOrchestrator::commit`].
pub enum Rebuild<B: RenderBackend> {
    /// The key did not change.
    Unchanged,
    /// Only the anaglyph method changed; the chain is kept.
    Terminal {
        key: StructuralKey,
        anaglyph: AnaglyphPass<B>,
    },
    /// Source or filters changed.
    Full(PipelineOrchestrator<B>),
}

impl<B: RenderBackend> Rebuild<B> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Rebuild::Unchanged)
    }
}

pub struct PipelineOrchestrator<B: RenderBackend> {
    key: StructuralKey,
    anaglyph: AnaglyphPass<B>,
    chain: FilterChain<B>,
    uniforms: B::UniformBuffer,
}

impl<B: RenderBackend> PipelineOrchestrator<B> {
    /// Builds the filter chain at the source's size, then the anaglyph pass
    /// over the chain output.
    pub fn compose(backend: &B, source: &B::Texture, key: StructuralKey) -> PipelineResult<Self> {
        let extent = source.extent();
        let uniforms = backend.create_uniform_buffer("pipeline uniforms")?;
        let chain = FilterChain::build(backend, source, &key.filters, extent, &uniforms)?;
        let anaglyph = AnaglyphPass::new(backend, chain.output_texture(), &uniforms, key.anaglyph)?;
        info!(
            "Composed pipeline: {} filter pass(es) at {}, {} -> {}",
            chain.len(),
            extent,
            key.anaglyph,
            anaglyph.output_texture().extent()
        );

        Ok(Self {
            key,
            anaglyph,
            chain,
            uniforms,
        })
    }

    /// Uploads `uniforms`, then records the chain and the anaglyph pass.
    pub fn render(&self, backend: &B, encoder: &mut B::Encoder, uniforms: &UniformSet) {
        backend.write_uniforms(&self.uniforms, &uniforms.to_block());
        self.chain.execute(backend, encoder);
        self.anaglyph.execute(backend, encoder);
    }

    /// Builds whatever `key` needs without touching `self`.
    pub fn prepare(&self, backend: &B, source: &B::Texture, key: StructuralKey) -> PipelineResult<Rebuild<B>> {
        if key == self.key {
            return Ok(Rebuild::Unchanged);
        }
        if key.same_chain(&self.key) {
            let anaglyph = AnaglyphPass::new(backend, self.chain.output_texture(), &self.uniforms, key.anaglyph)?;
            return Ok(Rebuild::Terminal { key, anaglyph });
        }
        Ok(Rebuild::Full(Self::compose(backend, source, key)?))
    }

    /// Swaps in a prepared rebuild. Replaced passes are dropped here.
    pub fn commit(&mut self, rebuild: Rebuild<B>) {
        match rebuild {
            Rebuild::Unchanged => {}
            Rebuild::Terminal { key, anaglyph } => {
                info!("Swapped anaglyph pass: {} -> {}", self.key.anaglyph, key.anaglyph);
                self.key = key;
                self.anaglyph = anaglyph;
            }
            Rebuild::Full(next) => {
                *self = next;
            }
        }
    }

    pub fn display_texture(&self) -> &B::Texture {
        self.anaglyph.output_texture()
    }

    pub fn chain(&self) -> &FilterChain<B> {
        &self.chain
    }

    pub fn anaglyph(&self) -> &AnaglyphPass<B> {
        &self.anaglyph
    }

    pub fn key(&self) -> &StructuralKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::{MockBackend, MockTexture};
    use crate::pipeline::{Extent, UniformValue};
    use crate::shader::ShaderVariant;

    fn setup(extent: Extent) -> (MockBackend, MockTexture, SourceId) {
        let backend = MockBackend::new();
        let source = backend.source_texture(extent);
        (backend, source, SourceId::next())
    }

    #[test]
    fn test_gaussian_then_empty_slot_with_true_anaglyph() {
        let (backend, source, id) = setup(Extent::new(1280, 720));
        let key = StructuralKey::new(id, vec![Some(FilterKind::Gaussian), None], AnaglyphMethod::True);

        let pipeline = PipelineOrchestrator::compose(&backend, &source, key).unwrap();

        assert_eq!(pipeline.chain().len(), 1);
        assert_eq!(pipeline.chain().passes()[0].extent(), Extent::new(1280, 720));
        assert_eq!(pipeline.anaglyph().pass().extent(), Extent::new(640, 720));
        assert_eq!(pipeline.display_texture().extent(), Extent::new(640, 720));
        assert_eq!(
            pipeline.anaglyph().input_texture().id(),
            pipeline.chain().output_texture().id()
        );
    }

    #[test]
    fn test_empty_filter_list_feeds_the_source_to_the_anaglyph_pass() {
        let (backend, source, id) = setup(Extent::new(800, 400));
        let key = StructuralKey::new(id, vec![], AnaglyphMethod::Color);

        let pipeline = PipelineOrchestrator::compose(&backend, &source, key).unwrap();

        assert!(pipeline.chain().is_empty());
        assert_eq!(pipeline.anaglyph().input_texture().id(), source.id());
        assert_eq!(
            *backend.compiled.borrow(),
            [ShaderVariant::Anaglyph(AnaglyphMethod::Color)]
        );
    }

    #[test]
    fn test_render_runs_filters_before_the_anaglyph_pass_with_current_uniforms() {
        let (backend, source, id) = setup(Extent::new(64, 32));
        let key = StructuralKey::new(
            id,
            vec![Some(FilterKind::Laplacian), Some(FilterKind::Median)],
            AnaglyphMethod::Optimized,
        );
        let pipeline = PipelineOrchestrator::compose(&backend, &source, key).unwrap();
        let mut uniforms = UniformSet::new();
        uniforms.set("laplacianFactor", UniformValue::Float(1.5)).unwrap();

        let mut encoder = Vec::new();
        pipeline.render(&backend, &mut encoder, &uniforms);

        let variants: Vec<_> = encoder.iter().map(|d| d.variant).collect();
        assert_eq!(
            variants,
            [
                ShaderVariant::Filter(FilterKind::Laplacian),
                ShaderVariant::Filter(FilterKind::Median),
                ShaderVariant::Anaglyph(AnaglyphMethod::Optimized),
            ]
        );
        assert!(encoder.iter().all(|d| d.uniforms.laplacian_factor == 1.5));
        assert_eq!(encoder[2].target, pipeline.display_texture().id());
    }

    #[test]
    fn test_same_key_needs_no_rebuild() {
        let (backend, source, id) = setup(Extent::new(64, 32));
        let key = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::True);
        let pipeline = PipelineOrchestrator::compose(&backend, &source, key.clone()).unwrap();
        let compiled = backend.compiled.borrow().len();

        let rebuild = pipeline.prepare(&backend, &source, key).unwrap();

        assert!(rebuild.is_unchanged());
        assert_eq!(backend.compiled.borrow().len(), compiled);
    }

    #[test]
    fn test_anaglyph_change_keeps_filter_passes() {
        let (backend, source, id) = setup(Extent::new(64, 32));
        let key = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::True);
        let mut pipeline = PipelineOrchestrator::compose(&backend, &source, key).unwrap();
        let filter_output = pipeline.chain().output_texture().id();
        let display = pipeline.display_texture().id();

        let next = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::Gray);
        let rebuild = pipeline.prepare(&backend, &source, next.clone()).unwrap();
        assert!(matches!(rebuild, Rebuild::Terminal { .. }));
        // Nothing visible changes before the commit.
        assert_eq!(pipeline.display_texture().id(), display);
        pipeline.commit(rebuild);

        assert_eq!(pipeline.chain().output_texture().id(), filter_output);
        assert_ne!(pipeline.display_texture().id(), display);
        assert_eq!(pipeline.anaglyph().method(), AnaglyphMethod::Gray);
        assert_eq!(pipeline.key(), &next);
    }

    #[test]
    fn test_filter_change_replaces_everything() {
        let (backend, source, id) = setup(Extent::new(64, 32));
        let key = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::True);
        let mut pipeline = PipelineOrchestrator::compose(&backend, &source, key).unwrap();
        let filter_output = pipeline.chain().output_texture().id();

        let next = StructuralKey::new(id, vec![Some(FilterKind::Median)], AnaglyphMethod::True);
        let rebuild = pipeline.prepare(&backend, &source, next).unwrap();
        assert!(matches!(rebuild, Rebuild::Full(_)));
        pipeline.commit(rebuild);

        assert_ne!(pipeline.chain().output_texture().id(), filter_output);
        assert_eq!(
            pipeline.chain().passes()[0].variant(),
            ShaderVariant::Filter(FilterKind::Median)
        );
        // Source, one filter target, one anaglyph target.
        assert_eq!(backend.live_textures(), 3);
    }

    #[test]
    fn test_failed_prepare_leaves_the_pipeline_untouched() {
        let (backend, source, id) = setup(Extent::new(64, 32));
        let key = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::True);
        let pipeline = PipelineOrchestrator::compose(&backend, &source, key.clone()).unwrap();
        let live = backend.live_textures();
        backend.fail_variant.set(Some(ShaderVariant::Anaglyph(AnaglyphMethod::Gray)));

        let next = StructuralKey::new(id, vec![Some(FilterKind::Gaussian)], AnaglyphMethod::Gray);
        assert!(pipeline.prepare(&backend, &source, next).is_err());

        assert_eq!(pipeline.key(), &key);
        assert_eq!(backend.live_textures(), live);
    }
}
