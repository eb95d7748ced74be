//! Ordered filter passes, each reading the previous one's output.

use super::{Extent, RenderBackend, RenderPass};
use crate::error::PipelineResult;
use crate::shader::{FilterKind, ShaderVariant};

pub struct FilterChain<B: RenderBackend> {
    source: B::Texture,
    passes: Vec<RenderPass<B>>,
}

impl<B: RenderBackend> FilterChain<B> {
    /// Builds one pass per non-empty slot, in slot order.
    ///
    /// An empty slot adds nothing and leaves the running texture as it was,
    /// so the next active slot reads whatever the last active one produced.
    /// On error every pass built so far is dropped.
    pub fn build(
        backend: &B,
        source: &B::Texture,
        selections: &[Option<FilterKind>],
        extent: Extent,
        uniforms: &B::UniformBuffer,
    ) -> PipelineResult<Self> {
        let mut passes: Vec<RenderPass<B>> = Vec::with_capacity(selections.len());
        for (slot, kind) in selections.iter().enumerate() {
            let Some(kind) = kind else {
                continue;
            };
            let input = passes.last().map(|p| p.output_texture()).unwrap_or(source);
            let pass = RenderPass::new(
                backend,
                format!("filter pass {} ({})", slot, kind),
                input,
                extent,
                uniforms,
                ShaderVariant::Filter(*kind),
            )?;
            passes.push(pass);
        }

        Ok(Self {
            source: source.clone(),
            passes,
        })
    }

    /// Runs every pass in list order. Each pass depends on the previous
    /// pass's completed write, which the encoder's ordering guarantees.
    pub fn execute(&self, backend: &B, encoder: &mut B::Encoder) {
        for pass in &self.passes {
            pass.execute(backend, encoder);
        }
    }

    /// Output of the last pass, or the untouched source when empty.
    pub fn output_texture(&self) -> &B::Texture {
        self.passes.last().map(|p| p.output_texture()).unwrap_or(&self.source)
    }

    pub fn source_texture(&self) -> &B::Texture {
        &self.source
    }

    pub fn passes(&self) -> &[RenderPass<B>] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::mock::MockBackend;
    use crate::pipeline::TextureHandle;
    use proptest::prelude::*;

    const HD: Extent = Extent::new(1280, 720);

    fn build(backend: &MockBackend, selections: &[Option<FilterKind>]) -> (crate::pipeline::mock::MockTexture, PipelineResult<FilterChain<MockBackend>>) {
        let source = backend.source_texture(HD);
        let uniforms = backend.create_uniform_buffer("uniforms").unwrap();
        let chain = FilterChain::build(backend, &source, selections, HD, &uniforms);
        (source, chain)
    }

    #[test]
    fn test_empty_chain_passes_the_source_through() {
        let backend = MockBackend::new();
        let (source, chain) = build(&backend, &[]);
        let chain = chain.unwrap();

        assert!(chain.is_empty());
        assert_eq!(chain.output_texture().id(), source.id());
        let mut encoder = Vec::new();
        chain.execute(&backend, &mut encoder);
        assert!(encoder.is_empty());
    }

    #[test]
    fn test_empty_slots_are_skipped_without_breaking_the_chain() {
        let backend = MockBackend::new();
        let (source, chain) = build(
            &backend,
            &[None, Some(FilterKind::Gaussian), None, Some(FilterKind::Median)],
        );
        let chain = chain.unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.passes()[0].source_texture().id(), source.id());
        assert_eq!(
            chain.passes()[1].source_texture().id(),
            chain.passes()[0].output_texture().id()
        );
        assert_eq!(chain.output_texture().id(), chain.passes()[1].output_texture().id());
        assert!(chain.passes().iter().all(|p| p.extent() == HD));
    }

    #[test]
    fn test_execute_runs_passes_in_order() {
        let backend = MockBackend::new();
        let (_source, chain) = build(
            &backend,
            &[Some(FilterKind::SeparableHorizontal), Some(FilterKind::SeparableVertical)],
        );
        let chain = chain.unwrap();

        let mut encoder = Vec::new();
        chain.execute(&backend, &mut encoder);

        let variants: Vec<_> = encoder.iter().map(|d| d.variant).collect();
        assert_eq!(
            variants,
            [
                ShaderVariant::Filter(FilterKind::SeparableHorizontal),
                ShaderVariant::Filter(FilterKind::SeparableVertical)
            ]
        );
        assert_eq!(encoder[1].source, encoder[0].target);
    }

    #[test]
    fn test_failure_in_a_later_slot_releases_earlier_passes() {
        let backend = MockBackend::new();
        backend.fail_variant.set(Some(ShaderVariant::Filter(FilterKind::Median)));
        let (_source, chain) = build(&backend, &[Some(FilterKind::Gaussian), Some(FilterKind::Median)]);

        assert!(matches!(chain, Err(PipelineError::Construction { .. })));
        // Only the source is left.
        assert_eq!(backend.live_textures(), 1);
    }

    fn selection() -> impl Strategy<Value = Option<FilterKind>> {
        prop_oneof![
            Just(None),
            prop::sample::select(FilterKind::ALL.to_vec()).prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn prop_one_pass_per_selected_slot(selections in prop::collection::vec(selection(), 0..6)) {
            let backend = MockBackend::new();
            let (source, chain) = build(&backend, &selections);
            let chain = chain.unwrap();

            let expected = selections.iter().filter(|s| s.is_some()).count();
            prop_assert_eq!(chain.len(), expected);

            let mut input = source.id();
            for pass in chain.passes() {
                prop_assert_eq!(pass.source_texture().id(), input);
                input = pass.output_texture().id();
            }
            prop_assert_eq!(chain.output_texture().id(), input);
        }
    }
}
