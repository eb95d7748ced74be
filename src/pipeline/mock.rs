//! Recording backend and source for exercising the pipeline without a GPU.

use super::{Extent, FrameSource, RenderBackend, SourceId, TextureHandle, TextureId, UniformBlock};
use crate::error::{PipelineError, PipelineResult};
use crate::shader::ShaderVariant;
use bytemuck::Zeroable;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct MockTexture {
    id: TextureId,
    extent: Extent,
    // Clones share the inner token, so the backend counts textures, not handles.
    _alive: Rc<Rc<()>>,
}

impl TextureHandle for MockTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn extent(&self) -> Extent {
        self.extent
    }
}

#[derive(Debug)]
pub struct MockProgram(pub ShaderVariant);

#[derive(Debug, Clone)]
pub struct MockUniforms(Rc<RefCell<UniformBlock>>);

#[derive(Debug)]
pub struct MockBinding {
    source: TextureId,
    uniforms: MockUniforms,
}

/// One recorded draw, with the uniform values visible when it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub variant: ShaderVariant,
    pub source: TextureId,
    pub target: TextureId,
    pub uniforms: UniformBlock,
}

pub struct MockBackend {
    /// Every texture created by this backend holds one clone.
    alive: Rc<()>,
    pub max_dimension: u32,
    pub fail_variant: Cell<Option<ShaderVariant>>,
    pub compiled: RefCell<Vec<ShaderVariant>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            alive: Rc::new(()),
            max_dimension: 8192,
            fail_variant: Cell::new(None),
            compiled: RefCell::new(Vec::new()),
        }
    }

    /// Textures created by this backend that are still referenced.
    pub fn live_textures(&self) -> usize {
        Rc::strong_count(&self.alive) - 1
    }

    pub fn source_texture(&self, extent: Extent) -> MockTexture {
        MockTexture {
            id: TextureId::next(),
            extent,
            _alive: Rc::new(self.alive.clone()),
        }
    }
}

impl RenderBackend for MockBackend {
    type Texture = MockTexture;
    type Program = MockProgram;
    type UniformBuffer = MockUniforms;
    type Binding = MockBinding;
    type Encoder = Vec<DrawCall>;

    fn create_program(&self, variant: ShaderVariant) -> PipelineResult<MockProgram> {
        if self.fail_variant.get() == Some(variant) {
            return Err(PipelineError::construction(variant.to_string(), "injected link failure"));
        }
        self.compiled.borrow_mut().push(variant);
        Ok(MockProgram(variant))
    }

    fn create_target(&self, label: &str, extent: Extent) -> PipelineResult<MockTexture> {
        if extent.width > self.max_dimension || extent.height > self.max_dimension {
            return Err(PipelineError::resource(label, format!("{} exceeds {}", extent, self.max_dimension)));
        }
        Ok(self.source_texture(extent))
    }

    fn create_uniform_buffer(&self, _label: &str) -> PipelineResult<MockUniforms> {
        Ok(MockUniforms(Rc::new(RefCell::new(UniformBlock::zeroed()))))
    }

    fn write_uniforms(&self, buffer: &MockUniforms, block: &UniformBlock) {
        *buffer.0.borrow_mut() = *block;
    }

    fn bind(
        &self,
        _label: &str,
        _program: &MockProgram,
        source: &MockTexture,
        uniforms: &MockUniforms,
    ) -> PipelineResult<MockBinding> {
        Ok(MockBinding {
            source: source.id(),
            uniforms: uniforms.clone(),
        })
    }

    fn draw(&self, encoder: &mut Vec<DrawCall>, program: &MockProgram, binding: &MockBinding, target: &MockTexture) {
        encoder.push(DrawCall {
            variant: program.0,
            source: binding.source,
            target: target.id(),
            uniforms: *binding.uniforms.0.borrow(),
        });
    }
}

/// A source that becomes ready after a fixed number of `advance` calls.
pub struct MockSource {
    id: SourceId,
    name: String,
    texture: MockTexture,
    frames_until_ready: u32,
    pub advanced: u32,
    pub seeks: Vec<f32>,
}

impl MockSource {
    pub fn new(backend: &MockBackend, name: &str, extent: Extent, frames_until_ready: u32) -> Self {
        Self {
            id: SourceId::next(),
            name: name.to_string(),
            texture: backend.source_texture(extent),
            frames_until_ready,
            advanced: 0,
            seeks: Vec::new(),
        }
    }
}

impl FrameSource<MockBackend> for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn texture(&self) -> &MockTexture {
        &self.texture
    }

    fn is_ready(&self) -> bool {
        self.advanced >= self.frames_until_ready
    }

    fn advance(&mut self, _backend: &MockBackend, _time: f32) -> PipelineResult<()> {
        self.advanced += 1;
        Ok(())
    }

    fn seek(&mut self, time: f32) -> PipelineResult<()> {
        self.seeks.push(time);
        Ok(())
    }
}
