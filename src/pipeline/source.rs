//! Frame sources feeding the pipeline.

use super::{Extent, RenderBackend, TextureHandle};
use crate::error::PipelineResult;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one loaded source. Part of the structural key, so loading
/// a source always produces a new id even for a path seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A side-by-side stereo source publishing frames into one texture.
///
/// The texture handle never changes; `advance` overwrites its contents with
/// the newest whole frame. Dimensions are those of the full stereo pair.
pub trait FrameSource<B: RenderBackend> {
    fn id(&self) -> SourceId;

    /// Human readable name, used to skip reloading the active source.
    fn name(&self) -> &str;

    fn texture(&self) -> &B::Texture;

    /// True once the first frame has been published into the texture.
    fn is_ready(&self) -> bool;

    /// Publishes the frame due at `time` (seconds), if any.
    fn advance(&mut self, backend: &B, time: f32) -> PipelineResult<()>;

    /// Called after the playback clock jumps to `time`. Sources without a
    /// timeline ignore it.
    fn seek(&mut self, _time: f32) -> PipelineResult<()> {
        Ok(())
    }

    fn extent(&self) -> Extent {
        self.texture().extent()
    }

    fn width(&self) -> u32 {
        self.extent().width
    }

    fn height(&self) -> u32 {
        self.extent().height
    }
}
