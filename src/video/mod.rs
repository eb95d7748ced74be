//! Side-by-side stereo sources.
//!
//! Videos are decoded by the `ffmpeg` command-line tool in a background
//! thread; still images are decoded once with the `image` crate. Either way
//! whole frames are uploaded into one source texture on the render thread.

mod decoder;

pub use decoder::{parse_fps, parse_probe, seek_position, DecodedFrame, ProbeInfo, VideoDecoder};

use crate::error::{PipelineError, PipelineResult};
use crate::frame::VideoFrame;
use crate::pipeline::{Extent, FrameSource, SourceId};
use crate::shader::{GpuTexture, WgpuBackend};
use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::info;

/// File extensions opened as still images instead of video.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A looping video decoded by ffmpeg.
pub struct VideoSource {
    id: SourceId,
    name: String,
    texture: GpuTexture,
    decoder: VideoDecoder,
    uploaded: Option<u64>,
}

impl VideoSource {
    pub fn open(backend: &WgpuBackend, path: &Path) -> Result<Self> {
        let decoder = VideoDecoder::new(path)?;
        let name = path.display().to_string();
        let extent = Extent::new(decoder.width, decoder.height);
        let texture = backend.create_source_texture(&name, extent)?;
        Ok(Self {
            id: SourceId::next(),
            name,
            texture,
            decoder,
            uploaded: None,
        })
    }
}

impl FrameSource<WgpuBackend> for VideoSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn texture(&self) -> &GpuTexture {
        &self.texture
    }

    fn is_ready(&self) -> bool {
        self.uploaded.is_some()
    }

    fn advance(&mut self, backend: &WgpuBackend, time: f32) -> PipelineResult<()> {
        let sequence = match self.decoder.frame_at(time) {
            Some(frame) if self.uploaded != Some(frame.sequence) => {
                let upload_start = std::time::Instant::now();
                backend
                    .upload_frame(&self.texture, &frame.frame)
                    .map_err(|e| PipelineError::resource(&self.name, e))?;
                tracing::debug!("[Perf] Texture Upload: {:?}", upload_start.elapsed());
                frame.sequence
            }
            _ => {
                if self.uploaded.is_none() && self.decoder.is_finished() {
                    return Err(PipelineError::resource(
                        &self.name,
                        "decoder stopped before producing a frame",
                    ));
                }
                return Ok(());
            }
        };
        self.uploaded = Some(sequence);
        Ok(())
    }

    fn seek(&mut self, time: f32) -> PipelineResult<()> {
        self.decoder
            .seek(time)
            .map_err(|e| PipelineError::resource(&self.name, e))
    }
}

/// A single side-by-side still image.
pub struct ImageSource {
    id: SourceId,
    name: String,
    texture: GpuTexture,
    frame: Option<VideoFrame>,
}

impl ImageSource {
    pub fn open(backend: &WgpuBackend, path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| anyhow!("Failed to open image {:?}: {}", path, e))?;
        let frame = VideoFrame::from_image(image).scale_to_fit(backend.max_dimension())?;
        let name = path.display().to_string();
        info!("Image: {}x{}", frame.width, frame.height);
        let texture = backend.create_source_texture(&name, Extent::new(frame.width, frame.height))?;
        Ok(Self {
            id: SourceId::next(),
            name,
            texture,
            frame: Some(frame),
        })
    }
}

impl FrameSource<WgpuBackend> for ImageSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn texture(&self) -> &GpuTexture {
        &self.texture
    }

    fn is_ready(&self) -> bool {
        self.frame.is_none()
    }

    /// Uploads the image on the first call; later calls do nothing.
    fn advance(&mut self, backend: &WgpuBackend, _time: f32) -> PipelineResult<()> {
        if let Some(frame) = self.frame.take() {
            backend
                .upload_frame(&self.texture, &frame)
                .map_err(|e| PipelineError::resource(&self.name, e))?;
        }
        Ok(())
    }
}

/// Whichever kind of source a path names.
pub enum StereoSource {
    Video(VideoSource),
    Image(ImageSource),
}

impl StereoSource {
    pub fn open(backend: &WgpuBackend, path: &Path) -> Result<Self> {
        if is_image_path(path) {
            Ok(StereoSource::Image(ImageSource::open(backend, path)?))
        } else {
            Ok(StereoSource::Video(VideoSource::open(backend, path)?))
        }
    }

    fn inner(&self) -> &dyn FrameSource<WgpuBackend> {
        match self {
            StereoSource::Video(source) => source,
            StereoSource::Image(source) => source,
        }
    }
}

impl FrameSource<WgpuBackend> for StereoSource {
    fn id(&self) -> SourceId {
        self.inner().id()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn texture(&self) -> &GpuTexture {
        self.inner().texture()
    }

    fn is_ready(&self) -> bool {
        self.inner().is_ready()
    }

    fn advance(&mut self, backend: &WgpuBackend, time: f32) -> PipelineResult<()> {
        match self {
            StereoSource::Video(source) => source.advance(backend, time),
            StereoSource::Image(source) => source.advance(backend, time),
        }
    }

    fn seek(&mut self, time: f32) -> PipelineResult<()> {
        match self {
            StereoSource::Video(source) => source.seek(time),
            StereoSource::Image(source) => source.seek(time),
        }
    }
}
