//! Anaglyph: side-by-side stereo video to red/cyan 3D
//!
//! Decodes a side-by-side stereo source, runs it through a chain of GPU
//! filter passes and combines the two halves into an anaglyph image.

pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod shader;
pub mod utils;
pub mod video;
