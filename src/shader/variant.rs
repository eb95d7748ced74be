//! Shader variant registry.
//!
//! Every pass runs one of two fragment templates; which code path a pass takes
//! is decided by a fixed table of preprocessor defines. The tables are
//! process-wide constants keyed by closed enums, so an unknown key can only
//! come from the outside world (config files, key strings) and is rejected
//! when parsed.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A (name, value) define handed to the GLSL preprocessor.
pub type MacroTable = &'static [(&'static str, &'static str)];

/// Stereo combination formula of the terminal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnaglyphMethod {
    #[default]
    #[serde(rename = "trueAnaglyphs")]
    True,
    #[serde(rename = "colorAnaglyphs")]
    Color,
    #[serde(rename = "grayAnaglyphs")]
    Gray,
    #[serde(rename = "halfColorAnaglyphs")]
    HalfColor,
    #[serde(rename = "optimizedAnaglyphs")]
    Optimized,
}

impl AnaglyphMethod {
    pub const ALL: [AnaglyphMethod; 5] = [
        AnaglyphMethod::True,
        AnaglyphMethod::Color,
        AnaglyphMethod::Gray,
        AnaglyphMethod::HalfColor,
        AnaglyphMethod::Optimized,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AnaglyphMethod::True => "trueAnaglyphs",
            AnaglyphMethod::Color => "colorAnaglyphs",
            AnaglyphMethod::Gray => "grayAnaglyphs",
            AnaglyphMethod::HalfColor => "halfColorAnaglyphs",
            AnaglyphMethod::Optimized => "optimizedAnaglyphs",
        }
    }

    pub fn macros(self) -> MacroTable {
        match self {
            AnaglyphMethod::True => &[("ANAGLYPH_FN", "trueAnaglyph")],
            AnaglyphMethod::Color => &[("ANAGLYPH_FN", "colorAnaglyph")],
            AnaglyphMethod::Gray => &[("ANAGLYPH_FN", "grayAnaglyph")],
            AnaglyphMethod::HalfColor => &[("ANAGLYPH_FN", "halfColorAnaglyph")],
            AnaglyphMethod::Optimized => &[("ANAGLYPH_FN", "optimizedAnaglyph")],
        }
    }

    /// The method after this one, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl FromStr for AnaglyphMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| PipelineError::invalid_selection(format!("unknown anaglyph method `{}`", s)))
    }
}

impl fmt::Display for AnaglyphMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A concrete filter pass. Each value maps to exactly one compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Identity,
    Gaussian,
    Laplacian,
    SeparableHorizontal,
    SeparableVertical,
    Median,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::Identity,
        FilterKind::Gaussian,
        FilterKind::Laplacian,
        FilterKind::SeparableHorizontal,
        FilterKind::SeparableVertical,
        FilterKind::Median,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FilterKind::Identity => "identity",
            FilterKind::Gaussian => "gaussian",
            FilterKind::Laplacian => "laplacian",
            FilterKind::SeparableHorizontal => "separableGaussianHorizontal",
            FilterKind::SeparableVertical => "separableGaussianVertical",
            FilterKind::Median => "median",
        }
    }

    pub fn macros(self) -> MacroTable {
        match self {
            FilterKind::Identity => &[("FILTER_FN", "identityFilter")],
            FilterKind::Gaussian => &[("FILTER_FN", "gaussianFilter")],
            FilterKind::Laplacian => &[("FILTER_FN", "laplacianFilter")],
            FilterKind::SeparableHorizontal => &[
                ("FILTER_FN", "separableGaussianFilter"),
                ("SEPARABLE_DIRECTION", "vec2(1.0, 0.0)"),
            ],
            FilterKind::SeparableVertical => &[
                ("FILTER_FN", "separableGaussianFilter"),
                ("SEPARABLE_DIRECTION", "vec2(0.0, 1.0)"),
            ],
            FilterKind::Median => &[("FILTER_FN", "medianFilter")],
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a user can pick for one filter slot.
///
/// Unlike [`FilterKind`] this includes the empty slot and the composite
/// separable Gaussian, which occupies two consecutive slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterChoice {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "identity")]
    Identity,
    #[serde(rename = "gaussian")]
    Gaussian,
    #[serde(rename = "laplacian")]
    Laplacian,
    #[serde(rename = "separableGaussian")]
    SeparableGaussian,
    #[serde(rename = "separableGaussianHorizontal")]
    SeparableGaussianHorizontal,
    #[serde(rename = "separableGaussianVertical")]
    SeparableGaussianVertical,
    #[serde(rename = "median")]
    Median,
}

/// Concrete slot assignments produced by a [`FilterChoice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAssignment {
    /// Fills only the requested slot (`None` leaves it empty).
    Single(Option<FilterKind>),
    /// Fills the requested slot and the one after it.
    Pair(FilterKind, FilterKind),
}

impl FilterChoice {
    pub const ALL: [FilterChoice; 8] = [
        FilterChoice::None,
        FilterChoice::Identity,
        FilterChoice::Gaussian,
        FilterChoice::Laplacian,
        FilterChoice::SeparableGaussian,
        FilterChoice::SeparableGaussianHorizontal,
        FilterChoice::SeparableGaussianVertical,
        FilterChoice::Median,
    ];

    /// Single-slot choices offered when cycling a slot from the keyboard.
    const CYCLE: [FilterChoice; 5] = [
        FilterChoice::None,
        FilterChoice::Identity,
        FilterChoice::Gaussian,
        FilterChoice::Laplacian,
        FilterChoice::Median,
    ];

    pub fn key(self) -> &'static str {
        match self.assignment() {
            SlotAssignment::Single(None) => "none",
            SlotAssignment::Single(Some(kind)) => kind.key(),
            SlotAssignment::Pair(..) => "separableGaussian",
        }
    }

    pub fn assignment(self) -> SlotAssignment {
        match self {
            FilterChoice::None => SlotAssignment::Single(None),
            FilterChoice::Identity => SlotAssignment::Single(Some(FilterKind::Identity)),
            FilterChoice::Gaussian => SlotAssignment::Single(Some(FilterKind::Gaussian)),
            FilterChoice::Laplacian => SlotAssignment::Single(Some(FilterKind::Laplacian)),
            FilterChoice::SeparableGaussian => {
                SlotAssignment::Pair(FilterKind::SeparableHorizontal, FilterKind::SeparableVertical)
            }
            FilterChoice::SeparableGaussianHorizontal => {
                SlotAssignment::Single(Some(FilterKind::SeparableHorizontal))
            }
            FilterChoice::SeparableGaussianVertical => {
                SlotAssignment::Single(Some(FilterKind::SeparableVertical))
            }
            FilterChoice::Median => SlotAssignment::Single(Some(FilterKind::Median)),
        }
    }

    /// Choice that reproduces a concrete slot value.
    pub fn from_kind(kind: Option<FilterKind>) -> Self {
        match kind {
            None => FilterChoice::None,
            Some(FilterKind::Identity) => FilterChoice::Identity,
            Some(FilterKind::Gaussian) => FilterChoice::Gaussian,
            Some(FilterKind::Laplacian) => FilterChoice::Laplacian,
            Some(FilterKind::SeparableHorizontal) => FilterChoice::SeparableGaussianHorizontal,
            Some(FilterKind::SeparableVertical) => FilterChoice::SeparableGaussianVertical,
            Some(FilterKind::Median) => FilterChoice::Median,
        }
    }

    /// Next single-slot choice for keyboard cycling.
    pub fn cycle(self) -> Self {
        match Self::CYCLE.iter().position(|c| *c == self) {
            Some(idx) => Self::CYCLE[(idx + 1) % Self::CYCLE.len()],
            None => FilterChoice::None,
        }
    }
}

impl FromStr for FilterChoice {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| PipelineError::invalid_selection(format!("unknown filter `{}`", s)))
    }
}

impl fmt::Display for FilterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which fragment template a variant instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderFamily {
    Filter,
    Anaglyph,
}

/// A fully selected program: template family plus its define table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    Filter(FilterKind),
    Anaglyph(AnaglyphMethod),
}

impl ShaderVariant {
    pub fn family(self) -> ShaderFamily {
        match self {
            ShaderVariant::Filter(_) => ShaderFamily::Filter,
            ShaderVariant::Anaglyph(_) => ShaderFamily::Anaglyph,
        }
    }

    pub fn macros(self) -> MacroTable {
        match self {
            ShaderVariant::Filter(kind) => kind.macros(),
            ShaderVariant::Anaglyph(method) => method.macros(),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ShaderVariant::Filter(kind) => kind.key(),
            ShaderVariant::Anaglyph(method) => method.key(),
        }
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderVariant::Filter(kind) => write!(f, "filter:{}", kind),
            ShaderVariant::Anaglyph(method) => write!(f, "anaglyph:{}", method),
        }
    }
}
