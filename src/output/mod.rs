//! Output backends for displaying or saving rendered frames.

pub mod image_output;
pub mod window_output;

pub use image_output::ImageOutput;
pub use window_output::{Presenter, Viewport};

use crate::frame::VideoFrame;
use anyhow::Result;

/// Trait for frame sinks fed with CPU frames.
pub trait OutputBackend {
    /// Write a frame to the output.
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;
}
