//! YAML configuration and the changes between two versions of it.
//!
//! ```yaml
//! video: stereo/left-right.mp4
//! anaglyph: halfColorAnaglyphs
//! filters: [separableGaussian]
//! uniforms:
//!   sigma: 2.0
//!   kernelSizeDiv2: 5
//!   invert: false
//! ```

use crate::pipeline::UniformValue;
use crate::shader::{AnaglyphMethod, FilterChoice};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Side-by-side video or image.
    pub video: Option<PathBuf>,
    pub anaglyph: Option<AnaglyphMethod>,
    /// One choice per filter slot, in slot order.
    pub filters: Vec<FilterChoice>,
    pub uniforms: BTreeMap<String, UniformValue>,
}

/// One setting that differs between two configs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigChange {
    Video(PathBuf),
    Anaglyph(AnaglyphMethod),
    Filter { slot: usize, choice: FilterChoice },
    Uniform { name: String, value: UniformValue },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Changes that turn `self` into `next`.
    ///
    /// Filter changes come in slot order. A slot dropped from the list is
    /// reported as cleared. A separable Gaussian that goes away also
    /// reports the slot after it, which it filled too. Uniforms removed from
    /// `next` keep their current value.
    pub fn diff(&self, next: &Config) -> Vec<ConfigChange> {
        let mut changes = Vec::new();

        if let Some(video) = &next.video {
            if self.video.as_ref() != Some(video) {
                changes.push(ConfigChange::Video(video.clone()));
            }
        }

        if let Some(method) = next.anaglyph {
            if self.anaglyph != Some(method) {
                changes.push(ConfigChange::Anaglyph(method));
            }
        }

        let slots = self.filters.len().max(next.filters.len());
        let mut pair_removed = false;
        for slot in 0..=slots {
            let old = self.filters.get(slot).copied().unwrap_or_default();
            let new = next.filters.get(slot).copied().unwrap_or_default();
            if old != new || pair_removed {
                changes.push(ConfigChange::Filter { slot, choice: new });
            }
            pair_removed = old == FilterChoice::SeparableGaussian && new != old;
        }

        for (name, value) in &next.uniforms {
            if self.uniforms.get(name) != Some(value) {
                changes.push(ConfigChange::Uniform {
                    name: name.clone(),
                    value: *value,
                });
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
video: stereo/left-right.mp4
anaglyph: halfColorAnaglyphs
filters: [gaussian, none]
uniforms:
  sigma: 2.0
  kernelSizeDiv2: 5
  invert: true
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.video, Some(PathBuf::from("stereo/left-right.mp4")));
        assert_eq!(config.anaglyph, Some(AnaglyphMethod::HalfColor));
        assert_eq!(config.filters, vec![FilterChoice::Gaussian, FilterChoice::None]);
        assert_eq!(config.uniforms["sigma"], UniformValue::Float(2.0));
        assert_eq!(config.uniforms["invert"], UniformValue::Bool(true));
        assert_eq!(config.uniforms["kernelSizeDiv2"].as_f32(), Some(5.0));
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::parse("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(Config::parse("anaglyph: sepia").is_err());
        assert!(Config::parse("filters: [blur]").is_err());
    }

    #[test]
    fn test_diff_from_default_lists_every_setting() {
        let config = Config::parse(SAMPLE).unwrap();
        let changes = Config::default().diff(&config);

        assert_eq!(changes[0], ConfigChange::Video(PathBuf::from("stereo/left-right.mp4")));
        assert_eq!(changes[1], ConfigChange::Anaglyph(AnaglyphMethod::HalfColor));
        assert_eq!(
            changes[2],
            ConfigChange::Filter {
                slot: 0,
                choice: FilterChoice::Gaussian
            }
        );
        // Slot 1 is `none` in both.
        assert_eq!(changes.len(), 6);
    }

    #[test]
    fn test_diff_only_reports_what_changed() {
        let old = Config::parse(SAMPLE).unwrap();
        let new = Config::parse(
            r#"
video: stereo/left-right.mp4
anaglyph: halfColorAnaglyphs
filters: [separableGaussian]
uniforms:
  sigma: 3.0
  kernelSizeDiv2: 5
  invert: true
"#,
        )
        .unwrap();

        assert_eq!(
            old.diff(&new),
            vec![
                ConfigChange::Filter {
                    slot: 0,
                    choice: FilterChoice::SeparableGaussian
                },
                ConfigChange::Uniform {
                    name: "sigma".to_string(),
                    value: UniformValue::Float(3.0)
                },
            ]
        );
        assert!(new.diff(&new).is_empty());
    }

    #[test]
    fn test_removing_a_separable_pair_clears_both_slots() {
        let old = Config::parse("filters: [separableGaussian]").unwrap();

        assert_eq!(
            old.diff(&Config::parse("filters: []").unwrap()),
            vec![
                ConfigChange::Filter {
                    slot: 0,
                    choice: FilterChoice::None
                },
                ConfigChange::Filter {
                    slot: 1,
                    choice: FilterChoice::None
                },
            ]
        );
        assert_eq!(
            old.diff(&Config::parse("filters: [median]").unwrap()),
            vec![
                ConfigChange::Filter {
                    slot: 0,
                    choice: FilterChoice::Median
                },
                ConfigChange::Filter {
                    slot: 1,
                    choice: FilterChoice::None
                },
            ]
        );
    }

    #[test]
    fn test_replacing_a_separable_pair_reports_each_slot_once() {
        let old = Config::parse("filters: [separableGaussian, none, gaussian]").unwrap();
        let new = Config::parse("filters: [none, laplacian, gaussian]").unwrap();

        assert_eq!(
            old.diff(&new),
            vec![
                ConfigChange::Filter {
                    slot: 0,
                    choice: FilterChoice::None
                },
                ConfigChange::Filter {
                    slot: 1,
                    choice: FilterChoice::Laplacian
                },
            ]
        );
    }
}
