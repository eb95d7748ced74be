//! [`RenderBackend`] over `wgpu`.

use super::compile::{compile_variant, VERTEX_SHADER};
use super::gpu_context::GpuContext;
use super::ShaderVariant;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{QuadVertex, VideoFrame};
use crate::pipeline::{Extent, RenderBackend, TextureHandle, TextureId, UniformBlock};
use anyhow::{anyhow, Result};
use std::borrow::Cow;
use tracing::debug;
use wgpu::util::DeviceExt;

/// Format of every pass target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Format of textures sources upload decoded frames into.
pub const SOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A texture plus the view passes bind. Clones share the GPU object.
#[derive(Debug, Clone)]
pub struct GpuTexture {
    id: TextureId,
    extent: Extent,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

impl TextureHandle for GpuTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn extent(&self) -> Extent {
        self.extent
    }
}

/// A linked render pipeline for one shader variant.
#[derive(Debug)]
pub struct GpuProgram {
    variant: ShaderVariant,
    pipeline: wgpu::RenderPipeline,
}

impl GpuProgram {
    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }
}

/// Creates and records every GPU object the pipeline uses.
///
/// All passes share one bind group layout: the source image at binding 0, a
/// nearest sampler at binding 1 and the `Params` uniform block at binding 2.
/// Targets are float textures, which are not filterable, hence nearest.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    vertex_module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    max_dimension: u32,
}

impl WgpuBackend {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = gpu.device.clone();

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<UniformBlock>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pass Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            max_dimension: gpu.max_texture_dimension(),
            queue: gpu.queue.clone(),
            device,
            vertex_module,
            bind_group_layout,
            pipeline_layout,
            sampler,
            vertex_buffer,
            index_buffer,
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn begin_frame(&self) -> wgpu::CommandEncoder {
        self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pipeline Encoder"),
        })
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn check_extent(&self, label: &str, extent: Extent) -> PipelineResult<()> {
        if extent.is_empty() {
            return Err(PipelineError::construction(label, format!("invalid texture size {}", extent)));
        }
        if extent.width > self.max_dimension || extent.height > self.max_dimension {
            return Err(PipelineError::resource(
                label,
                format!("{} exceeds the device limit of {}", extent, self.max_dimension),
            ));
        }
        Ok(())
    }

    fn create_texture(
        &self,
        label: &str,
        extent: Extent,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> PipelineResult<GpuTexture> {
        self.check_extent(label, extent)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            id: TextureId::next(),
            extent,
            texture,
            view,
        })
    }

    /// Texture a source uploads its frames into.
    pub fn create_source_texture(&self, label: &str, extent: Extent) -> PipelineResult<GpuTexture> {
        self.create_texture(
            label,
            extent,
            SOURCE_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )
    }

    /// Replaces the contents of a source texture with a whole frame.
    pub fn upload_frame(&self, texture: &GpuTexture, frame: &VideoFrame) -> Result<()> {
        let rgba = frame.to_rgba();
        if rgba.width != texture.extent.width || rgba.height != texture.extent.height {
            return Err(anyhow!(
                "frame is {}x{} but the texture is {}",
                rgba.width,
                rgba.height,
                texture.extent
            ));
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(rgba.width * 4),
                rows_per_image: Some(rgba.height),
            },
            wgpu::Extent3d {
                width: rgba.width,
                height: rgba.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Copies a render target back to the CPU as an 8-bit RGBA frame.
    /// Blocks until the GPU is done with everything submitted so far.
    pub fn read_texture(&self, texture: &GpuTexture) -> Result<VideoFrame> {
        if texture.format() != TARGET_FORMAT {
            return Err(anyhow!("only {:?} targets can be read back", TARGET_FORMAT));
        }
        let readback_start = std::time::Instant::now();
        let Extent { width, height } = texture.extent;
        let bytes_per_pixel = 16u32;
        let unpadded_row = width * bytes_per_pixel;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row as wgpu::BufferAddress * height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow!("GPU poll failed: {:?}", e))?;
        receiver.recv()??;

        let mut texels = Vec::with_capacity(width as usize * height as usize * 4);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded_row as usize) {
                texels.extend(
                    row[..unpadded_row as usize]
                        .chunks_exact(4)
                        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
                );
            }
        }
        buffer.unmap();
        debug!("[Perf] GPU Readback {}: {:?}", texture.extent, readback_start.elapsed());

        VideoFrame::from_rgba_f32(width, height, &texels)
    }
}

impl RenderBackend for WgpuBackend {
    type Texture = GpuTexture;
    type Program = GpuProgram;
    type UniformBuffer = wgpu::Buffer;
    type Binding = wgpu::BindGroup;
    type Encoder = wgpu::CommandEncoder;

    fn create_program(&self, variant: ShaderVariant) -> PipelineResult<GpuProgram> {
        let compiled = compile_variant(variant)?;
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&compiled.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(compiled.wgsl)),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&compiled.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(compiled.entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Ok(GpuProgram { variant, pipeline })
    }

    fn create_target(&self, label: &str, extent: Extent) -> PipelineResult<GpuTexture> {
        self.create_texture(
            label,
            extent,
            TARGET_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    fn create_uniform_buffer(&self, label: &str) -> PipelineResult<wgpu::Buffer> {
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<UniformBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn write_uniforms(&self, buffer: &wgpu::Buffer, block: &UniformBlock) {
        self.queue.write_buffer(buffer, 0, bytemuck::bytes_of(block));
    }

    fn bind(
        &self,
        label: &str,
        _program: &GpuProgram,
        source: &GpuTexture,
        uniforms: &wgpu::Buffer,
    ) -> PipelineResult<wgpu::BindGroup> {
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        }))
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        program: &GpuProgram,
        binding: &wgpu::BindGroup,
        target: &GpuTexture,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.variant.key()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        render_pass.set_pipeline(&program.pipeline);
        render_pass.set_bind_group(0, binding, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
    }
}
