//! PNG export of read-back display textures.

use super::OutputBackend;
use crate::frame::{PixelFormat, VideoFrame};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes every frame it receives to the same image file. The format follows
/// the file extension.
pub struct ImageOutput {
    path: PathBuf,
    frames_written: u32,
}

impl ImageOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// `out/frame.png` -> `out/frame_original.png`.
    pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");
        let name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
            None => format!("{}_{}", stem, suffix),
        };
        path.with_file_name(name)
    }
}

impl OutputBackend for ImageOutput {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let rgba = match frame.format {
            PixelFormat::Rgba => frame.clone(),
            PixelFormat::Rgb => frame.to_rgba(),
        };
        let image = image::RgbaImage::from_raw(rgba.width, rgba.height, rgba.data)
            .ok_or_else(|| anyhow!("frame data does not match {}x{}", frame.width, frame.height))?;
        image
            .save(&self.path)
            .map_err(|e| anyhow!("Failed to write {:?}: {}", self.path, e))?;
        self.frames_written += 1;
        info!("Wrote {}x{} frame to {:?}", frame.width, frame.height, self.path);
        Ok(())
    }
}
