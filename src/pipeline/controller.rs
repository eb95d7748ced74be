//! Two orchestrators over one source, and the state machine around them.

use super::{
    FrameSource, PipelineOrchestrator, RenderBackend, StructuralKey, UniformSet, UniformValue,
};
use crate::error::{PipelineError, PipelineResult};
use crate::shader::{AnaglyphMethod, FilterChoice, FilterKind, SlotAssignment};
use std::fmt;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No source has been promoted yet.
    Uninitialized,
    /// A source is pending; whatever was ready before keeps rendering.
    VideoLoading,
    Ready,
}

/// Which of the two display pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Filter chain plus anaglyph.
    Processed,
    /// Anaglyph only.
    Original,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Processed, Slot::Original];
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Processed => write!(f, "processed"),
            Slot::Original => write!(f, "original"),
        }
    }
}

/// Owns the frame source, the selections, the uniform table and both
/// orchestrators, and routes every change to the rebuild it needs.
///
/// Filter changes only touch the processed slot, anaglyph changes touch both,
/// and a new source rebuilds both once its first frame is in. Any rebuild is
/// constructed in full before anything is swapped, so a failure leaves the
/// previous pipelines rendering.
pub struct PipelineController<B: RenderBackend, S: FrameSource<B>> {
    state: ControllerState,
    filters: Vec<Option<FilterKind>>,
    anaglyph: AnaglyphMethod,
    uniforms: UniformSet,
    processed: Option<PipelineOrchestrator<B>>,
    original: Option<PipelineOrchestrator<B>>,
    source: Option<S>,
    pending: Option<S>,
}

impl<B: RenderBackend, S: FrameSource<B>> PipelineController<B, S> {
    pub fn new(filter_slots: usize, anaglyph: AnaglyphMethod) -> Self {
        Self {
            state: ControllerState::Uninitialized,
            filters: vec![None; filter_slots],
            anaglyph,
            uniforms: UniformSet::new(),
            processed: None,
            original: None,
            source: None,
            pending: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn filters(&self) -> &[Option<FilterKind>] {
        &self.filters
    }

    pub fn filter_slots(&self) -> usize {
        self.filters.len()
    }

    pub fn anaglyph(&self) -> AnaglyphMethod {
        self.anaglyph
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn pending(&self) -> Option<&S> {
        self.pending.as_ref()
    }

    pub fn orchestrator(&self, slot: Slot) -> Option<&PipelineOrchestrator<B>> {
        match slot {
            Slot::Processed => self.processed.as_ref(),
            Slot::Original => self.original.as_ref(),
        }
    }

    pub fn display_texture(&self, slot: Slot) -> Option<&B::Texture> {
        self.orchestrator(slot).map(|o| o.display_texture())
    }

    /// Whether loading a source called `name` would be a no-op: it is the
    /// active source and nothing else is pending.
    pub fn is_active(&self, name: &str) -> bool {
        self.pending.is_none() && self.source.as_ref().is_some_and(|s| s.name() == name)
    }

    /// Starts loading `source`. Returns false if it is already active.
    pub fn load_source(&mut self, source: S) -> bool {
        if self.is_active(source.name()) {
            debug!("Source {} is already active, not reloading", source.name());
            return false;
        }

        if let Some(previous) = self.pending.replace(source) {
            debug!("Dropping pending source {}", previous.name());
        }
        self.state = ControllerState::VideoLoading;
        true
    }

    /// Advances the sources to `time` and promotes the pending source once
    /// its first frame has arrived.
    ///
    /// The active source is frozen while another one loads, so the last
    /// frame stays on screen until the switch.
    pub fn update(&mut self, backend: &B, time: f32) -> PipelineResult<()> {
        if self.state == ControllerState::Ready {
            if let Some(source) = self.source.as_mut() {
                source.advance(backend, time)?;
            }
        }

        let ready = match self.pending.as_mut() {
            Some(pending) => pending.advance(backend, time).map(|_| pending.is_ready()),
            None => return Ok(()),
        };
        match ready {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                self.abandon_pending(&e);
                return Err(e);
            }
        }

        let composed = match &self.pending {
            Some(pending) => self.compose_for(backend, pending),
            None => return Ok(()),
        };
        match composed {
            Ok((processed, original)) => {
                // Swap first, the old pipelines and source drop afterwards.
                self.processed = Some(processed);
                self.original = Some(original);
                self.source = self.pending.take();
                self.state = ControllerState::Ready;
                if let Some(source) = &self.source {
                    info!("Source {} ready ({})", source.name(), source.extent());
                }
                Ok(())
            }
            Err(e) => {
                self.abandon_pending(&e);
                Err(e)
            }
        }
    }

    /// Tells the sources the playback clock jumped to `time`.
    pub fn seek(&mut self, time: f32) -> PipelineResult<()> {
        for source in self.source.iter_mut().chain(self.pending.iter_mut()) {
            source.seek(time)?;
        }
        Ok(())
    }

    /// Selects `choice` for filter slot `slot` and rebuilds the processed
    /// pipeline if the selection changed.
    ///
    /// The separable Gaussian fills `slot` and `slot + 1`; asking for it at
    /// the last slot is rejected without any change.
    pub fn set_filter(&mut self, backend: &B, slot: usize, choice: FilterChoice) -> PipelineResult<bool> {
        if slot >= self.filters.len() {
            return Err(PipelineError::invalid_selection(format!(
                "filter slot {} out of range (0..{})",
                slot,
                self.filters.len()
            )));
        }

        let mut filters = self.filters.clone();
        match choice.assignment() {
            SlotAssignment::Single(kind) => filters[slot] = kind,
            SlotAssignment::Pair(first, second) => {
                if slot + 1 >= filters.len() {
                    return Err(PipelineError::invalid_selection(format!(
                        "{} needs two slots but slot {} is the last",
                        choice, slot
                    )));
                }
                filters[slot] = Some(first);
                filters[slot + 1] = Some(second);
            }
        }

        self.apply(backend, filters, self.anaglyph)
    }

    pub fn set_filter_key(&mut self, backend: &B, slot: usize, key: &str) -> PipelineResult<bool> {
        let choice: FilterChoice = key.parse()?;
        self.set_filter(backend, slot, choice)
    }

    /// Selects the anaglyph method for both pipelines.
    pub fn set_anaglyph(&mut self, backend: &B, method: AnaglyphMethod) -> PipelineResult<bool> {
        self.apply(backend, self.filters.clone(), method)
    }

    pub fn set_anaglyph_key(&mut self, backend: &B, key: &str) -> PipelineResult<bool> {
        let method: AnaglyphMethod = key.parse()?;
        self.set_anaglyph(backend, method)
    }

    /// Changes a continuous parameter. Never rebuilds anything.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> PipelineResult<UniformValue> {
        self.uniforms.set(name, value)
    }

    /// Records processed then original. Nothing is recorded before the first
    /// source is ready.
    pub fn render(&self, backend: &B, encoder: &mut B::Encoder) {
        for slot in Slot::ALL {
            if let Some(pipeline) = self.orchestrator(slot) {
                pipeline.render(backend, encoder, &self.uniforms);
            }
        }
    }

    fn keys(&self, source: &S, filters: Vec<Option<FilterKind>>, anaglyph: AnaglyphMethod) -> (StructuralKey, StructuralKey) {
        (
            StructuralKey::new(source.id(), filters, anaglyph),
            StructuralKey::new(source.id(), Vec::new(), anaglyph),
        )
    }

    fn compose_for(&self, backend: &B, source: &S) -> PipelineResult<(PipelineOrchestrator<B>, PipelineOrchestrator<B>)> {
        let (processed, original) = self.keys(source, self.filters.clone(), self.anaglyph);
        Ok((
            PipelineOrchestrator::compose(backend, source.texture(), processed)?,
            PipelineOrchestrator::compose(backend, source.texture(), original)?,
        ))
    }

    /// Prepares both slots for the new selections, then commits both.
    fn apply(&mut self, backend: &B, filters: Vec<Option<FilterKind>>, anaglyph: AnaglyphMethod) -> PipelineResult<bool> {
        if filters == self.filters && anaglyph == self.anaglyph {
            return Ok(false);
        }

        if let (Some(source), Some(processed), Some(original)) = (&self.source, &self.processed, &self.original) {
            let (processed_key, original_key) = self.keys(source, filters.clone(), anaglyph);
            let plans = processed
                .prepare(backend, source.texture(), processed_key)
                .and_then(|p| Ok((p, original.prepare(backend, source.texture(), original_key)?)));
            let (processed_plan, original_plan) = match plans {
                Ok(plans) => plans,
                Err(e) => {
                    error!("Rebuild failed, keeping the current pipelines: {}", e);
                    return Err(e);
                }
            };
            if let Some(processed) = self.processed.as_mut() {
                processed.commit(processed_plan);
            }
            if let Some(original) = self.original.as_mut() {
                original.commit(original_plan);
            }
        }

        self.filters = filters;
        self.anaglyph = anaglyph;
        Ok(true)
    }

    fn abandon_pending(&mut self, e: &PipelineError) {
        if let Some(pending) = self.pending.take() {
            error!("Failed to load source {}: {}", pending.name(), e);
        }
        self.state = if self.processed.is_some() {
            ControllerState::Ready
        } else {
            ControllerState::Uninitialized
        };
    }
}
