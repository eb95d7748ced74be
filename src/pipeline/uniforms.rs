//! Shared uniform table.
//!
//! One [`UniformSet`] holds the current value of every continuous and boolean
//! parameter. Passes never copy it: the orchestrator packs the table into a
//! [`UniformBlock`] and uploads it right before each render, so a changed
//! value reaches the next frame without touching any pass.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Name of the texture slot each pass binds its source into.
pub const IMAGE_SLOT: &str = "image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Bool,
}

/// A parameter value. Written untagged in config files (`2.0`, `5`, `true`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl UniformValue {
    pub fn kind(self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Bool(_) => UniformKind::Bool,
        }
    }

    pub fn as_f32(self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(v),
            UniformValue::Int(v) => Some(v as f32),
            UniformValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Float(v) => write!(f, "{}", v),
            UniformValue::Int(v) => write!(f, "{}", v),
            UniformValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Name, type, range and default of one configurable parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: UniformKind,
    pub min: f32,
    pub max: f32,
    pub default: UniformValue,
}

impl ParameterSpec {
    const fn float(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self { name, kind: UniformKind::Float, min, max, default: UniformValue::Float(default) }
    }

    const fn int(name: &'static str, min: i32, max: i32, default: i32) -> Self {
        Self {
            name,
            kind: UniformKind::Int,
            min: min as f32,
            max: max as f32,
            default: UniformValue::Int(default),
        }
    }

    const fn boolean(name: &'static str, default: bool) -> Self {
        Self { name, kind: UniformKind::Bool, min: 0.0, max: 1.0, default: UniformValue::Bool(default) }
    }

    /// Whether a numeric `value` lies outside this slot's range.
    fn is_out_of_range(&self, value: UniformValue) -> bool {
        match (self.kind, value.as_f32()) {
            (UniformKind::Bool, _) | (_, None) => false,
            (UniformKind::Float, Some(f)) => f < self.min || f > self.max,
            (UniformKind::Int, Some(f)) => f.round() < self.min || f.round() > self.max,
        }
    }

    /// Coerces and clamps `value` to this slot. Returns `None` on a type mismatch.
    fn accept(&self, value: UniformValue) -> Option<UniformValue> {
        match (self.kind, value) {
            (UniformKind::Bool, UniformValue::Bool(b)) => Some(UniformValue::Bool(b)),
            (UniformKind::Bool, _) | (_, UniformValue::Bool(_)) => None,
            (UniformKind::Float, v) => v.as_f32().map(|f| UniformValue::Float(f.clamp(self.min, self.max))),
            (UniformKind::Int, v) => v
                .as_f32()
                .map(|f| UniformValue::Int(f.round().clamp(self.min, self.max) as i32)),
        }
    }
}

const PARAMETER_COUNT: usize = 7;

/// Every slot of the table, in block order.
pub const PARAMETERS: [ParameterSpec; PARAMETER_COUNT] = [
    ParameterSpec::float("scale", 0.1, 10.0, 1.0),
    ParameterSpec::float("translateX", -1.0, 1.0, 0.0),
    ParameterSpec::float("translateY", -1.0, 1.0, 0.0),
    ParameterSpec::int("kernelSizeDiv2", 1, 21, 3),
    ParameterSpec::float("sigma", 0.1, 10.0, 0.85),
    ParameterSpec::float("laplacianFactor", 0.0, 2.0, 0.5),
    ParameterSpec::boolean("invert", false),
];

/// std140 layout of the `Params` block in both fragment templates.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBlock {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub kernel_size_div2: i32,
    pub sigma: f32,
    pub laplacian_factor: f32,
    pub invert: i32,
    pub padding: f32,
}

/// Current values of all parameters, indexed like [`PARAMETERS`].
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSet {
    values: [UniformValue; PARAMETER_COUNT],
}

impl Default for UniformSet {
    fn default() -> Self {
        Self {
            values: PARAMETERS.map(|p| p.default),
        }
    }
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(name: &str) -> PipelineResult<usize> {
        if name == IMAGE_SLOT {
            return Err(PipelineError::uniform(format!(
                "`{}` is the reserved texture slot and is bound per pass",
                IMAGE_SLOT
            )));
        }
        PARAMETERS
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| PipelineError::uniform(format!("unknown uniform `{}`", name)))
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        Self::index(name).ok().map(|i| self.values[i])
    }

    /// Stores `value` in slot `name`, clamped to the slot's range.
    /// Returns the value actually stored.
    pub fn set(&mut self, name: &str, value: UniformValue) -> PipelineResult<UniformValue> {
        let idx = Self::index(name)?;
        let spec = &PARAMETERS[idx];
        let accepted = spec.accept(value).ok_or_else(|| {
            PipelineError::uniform(format!("`{}` expects a {:?} value, got {:?}", name, spec.kind, value))
        })?;
        if spec.is_out_of_range(value) {
            warn!("{} = {} is outside [{}, {}], clamped to {}", name, value, spec.min, spec.max, accepted);
        }
        self.values[idx] = accepted;
        Ok(accepted)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(UniformValue::as_f32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
        PARAMETERS.iter().zip(self.values.iter()).map(|(p, v)| (p.name, *v))
    }

    /// Packs the current values for upload.
    pub fn to_block(&self) -> UniformBlock {
        let f = |i: usize| self.values[i].as_f32().unwrap_or(0.0);
        let i = |i: usize| match self.values[i] {
            UniformValue::Int(v) => v,
            UniformValue::Bool(b) => b as i32,
            UniformValue::Float(v) => v as i32,
        };
        UniformBlock {
            scale: f(0),
            translate_x: f(1),
            translate_y: f(2),
            kernel_size_div2: i(3),
            sigma: f(4),
            laplacian_factor: f(5),
            invert: i(6),
            padding: 0.0,
        }
    }
}
