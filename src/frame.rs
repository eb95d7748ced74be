//! CPU-side frames and the full-screen quad.

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};

/// Supported pixel formats for frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// A frame of pixel data, either decoded from a source or read back from
/// a display texture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Presentation time in seconds since playback started, if known.
    pub timestamp: Option<f32>,
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            timestamp: None,
            data,
        }
    }

    /// Converts a decoded still image.
    pub fn from_image(image: image::DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_data(width, height, PixelFormat::Rgba, rgba.into_raw())
    }

    /// Quantizes tightly packed float RGBA texels (as read back from a
    /// render target) to 8 bits per channel. Values are clamped to [0, 1].
    pub fn from_rgba_f32(width: u32, height: u32, texels: &[f32]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if texels.len() != expected {
            return Err(anyhow!(
                "expected {} float channels for {}x{}, got {}",
                expected,
                width,
                height,
                texels.len()
            ));
        }
        let data = texels
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Ok(Self::from_data(width, height, PixelFormat::Rgba, data))
    }

    /// Scale this frame down if either dimension exceeds `max_dimension`.
    /// Preserves aspect ratio and always returns RGBA.
    pub fn scale_to_fit(&self, max_dimension: u32) -> Result<VideoFrame> {
        let max_dim = self.width.max(self.height);
        let rgba = self.to_rgba();
        if max_dim <= max_dimension {
            return Ok(rgba);
        }

        let scale = max_dimension as f32 / max_dim as f32;
        let new_width = ((self.width as f32 * scale) as u32).max(1);
        let new_height = ((self.height as f32 * scale) as u32).max(1);

        let resize_start = std::time::Instant::now();
        let img = image::RgbaImage::from_raw(rgba.width, rgba.height, rgba.data)
            .ok_or_else(|| anyhow!("frame data does not match {}x{}", self.width, self.height))?;
        let resized = image::imageops::resize(&img, new_width, new_height, image::imageops::FilterType::Triangle);
        tracing::debug!(
            "[Perf] scale_to_fit {}x{} -> {}x{}: {:?}",
            self.width,
            self.height,
            new_width,
            new_height,
            resize_start.elapsed()
        );

        Ok(VideoFrame {
            width: new_width,
            height: new_height,
            format: PixelFormat::Rgba,
            timestamp: self.timestamp,
            data: resized.into_raw(),
        })
    }

    /// Converts this frame to RGBA format.
    pub fn to_rgba(&self) -> VideoFrame {
        match self.format {
            PixelFormat::Rgba => self.clone(),
            PixelFormat::Rgb => {
                let mut rgba_data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
                for px in self.data.chunks_exact(3) {
                    rgba_data.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                VideoFrame {
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Rgba,
                    timestamp: self.timestamp,
                    data: rgba_data,
                }
            }
        }
    }
}

/// Vertex for rendering a full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    /// Vertices for a full-screen quad. Texture row 0 is the top of the image.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
        QuadVertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
        QuadVertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
    ];

    /// Indices for the quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}
