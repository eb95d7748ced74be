//! Multi-pass rendering pipeline.
//!
//! A [`RenderPass`] draws a full-screen quad with one shader variant into an
//! off-screen target it owns. A [`FilterChain`] strings passes together, an
//! [`AnaglyphPass`] folds the side-by-side stereo pair into one image, and a
//! [`PipelineOrchestrator`] owns one of each. The [`PipelineController`] keeps
//! two orchestrators (processed and original) over one frame source and
//! decides which of them to rebuild when a setting changes.
//!
//! All GPU work goes through the [`RenderBackend`] trait, implemented over
//! `wgpu` by [`crate::shader::WgpuBackend`].

mod anaglyph;
mod chain;
mod controller;
mod orchestrator;
mod pass;
mod source;
pub mod uniforms;

#[cfg(test)]
pub(crate) mod mock;

pub use anaglyph::AnaglyphPass;
pub use chain::FilterChain;
pub use controller::{ControllerState, PipelineController, Slot};
pub use orchestrator::{PipelineOrchestrator, Rebuild, StructuralKey};
pub use pass::RenderPass;
pub use source::{FrameSource, SourceId};
pub use uniforms::{ParameterSpec, UniformBlock, UniformKind, UniformSet, UniformValue};

use crate::error::PipelineResult;
use crate::shader::ShaderVariant;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Width and height of a texture in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of one eye of a side-by-side stereo pair.
    pub fn half_width(self) -> Self {
        Self::new(self.width / 2, self.height)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Process-unique texture identity. Stable for the lifetime of the texture;
/// only its contents change between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A cheap, clonable handle to a GPU texture.
pub trait TextureHandle: Clone {
    fn id(&self) -> TextureId;
    fn extent(&self) -> Extent;
}

/// GPU operations needed by the pipeline.
///
/// Every call happens on the thread that owns the GPU context. Dropping a
/// `Texture`, `Program` or `Binding` releases it.
pub trait RenderBackend {
    type Texture: TextureHandle;
    type Program;
    type UniformBuffer: Clone;
    type Binding;
    /// Recording context passed to `execute`/`render`.
    type Encoder;

    /// Compiles and links the program for a variant.
    fn create_program(&self, variant: ShaderVariant) -> PipelineResult<Self::Program>;

    /// Allocates a floating-point RGBA off-screen target with nearest sampling.
    fn create_target(&self, label: &str, extent: Extent) -> PipelineResult<Self::Texture>;

    fn create_uniform_buffer(&self, label: &str) -> PipelineResult<Self::UniformBuffer>;

    /// Uploads current uniform values. Visible to every draw recorded after it.
    fn write_uniforms(&self, buffer: &Self::UniformBuffer, block: &UniformBlock);

    /// Binds `source` into the image slot alongside the uniform buffer.
    fn bind(
        &self,
        label: &str,
        program: &Self::Program,
        source: &Self::Texture,
        uniforms: &Self::UniformBuffer,
    ) -> PipelineResult<Self::Binding>;

    /// Records one full-screen-quad draw into `target`.
    fn draw(
        &self,
        encoder: &mut Self::Encoder,
        program: &Self::Program,
        binding: &Self::Binding,
        target: &Self::Texture,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_width_floors() {
        assert_eq!(Extent::new(1280, 720).half_width(), Extent::new(640, 720));
        assert_eq!(Extent::new(1281, 720).half_width(), Extent::new(640, 720));
        assert!(Extent::new(1, 720).half_width().is_empty());
    }

    #[test]
    fn test_texture_ids_are_unique() {
        let a = TextureId::next();
        let b = TextureId::next();
        assert_ne!(a, b);
    }
}
