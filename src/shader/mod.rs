//! Shader variants and the `wgpu` side of the pipeline.

pub mod compile;
mod gpu_context;
mod variant;
mod wgpu_backend;

pub use gpu_context::GpuContext;
pub use variant::{AnaglyphMethod, FilterChoice, FilterKind, MacroTable, ShaderFamily, ShaderVariant, SlotAssignment};
pub use wgpu_backend::{GpuProgram, GpuTexture, WgpuBackend, SOURCE_FORMAT, TARGET_FORMAT};
