//! # Printer Models
//!
//! Capability table for the known cat printer models. Devices advertise their
//! model as their BLE name, which is how scan results are matched.
//!
//! | Model | Paper width | Compressed start | Feed defect |
//! |-------|-------------|------------------|-------------|
//! | _ZZ00 (generic) | 384 | no | no |
//! | GB01, GB02, GT01, YT01 | 384 | no | no |
//! | GB03 | 384 | yes | no |
//! | MX05, MX06, MX08, MX09, MX10 | 384 | no | yes |
//!
//! "Compressed start" models want the `0x12`-prefixed start frame. "Feed
//! defect" models mishandle the feed command, so paper is advanced by
//! printing blank rows instead.
//!
//! ## Usage
//!
//! ```
//! use catprint::printer::model::ModelRegistry;
//!
//! let registry = ModelRegistry::builtin();
//! assert!(registry.resolve("GB03").supports_compressed_start);
//! // Unknown names fall back to the generic profile
//! assert_eq!(registry.resolve("XYZ").paper_width, 384);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PrinterError, Result};

/// Name of the generic fallback model.
pub const FALLBACK_MODEL: &str = "_ZZ00";

const PLAIN_MODELS: [&str; 4] = ["GB01", "GB02", "GT01", "YT01"];
const COMPRESSED_START_MODELS: [&str; 1] = ["GB03"];
const FEED_DEFECT_MODELS: [&str; 5] = ["MX05", "MX06", "MX08", "MX09", "MX10"];

/// Hardware capabilities of one printer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Pixels per line, a multiple of 8
    pub paper_width: u16,
    /// Expects the `0x12`-prefixed "start printing" frame
    #[serde(default)]
    pub supports_compressed_start: bool,
    /// Mishandles the feed command
    #[serde(default)]
    pub has_feed_defect: bool,
}

impl Model {
    pub const GENERIC: Self = Self {
        paper_width: 384,
        supports_compressed_start: false,
        has_feed_defect: false,
    };

    /// Bytes per printed row.
    #[inline]
    pub fn data_width(&self) -> usize {
        self.paper_width as usize / 8
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::GENERIC
    }
}

/// Immutable name → [`Model`] lookup, built once and passed around explicitly.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, Model>,
}

impl ModelRegistry {
    /// Registry of all built-in models.
    pub fn builtin() -> Self {
        let mut models = BTreeMap::new();
        models.insert(FALLBACK_MODEL.to_string(), Model::GENERIC);
        for name in PLAIN_MODELS {
            models.insert(name.to_string(), Model::GENERIC);
        }
        for name in COMPRESSED_START_MODELS {
            models.insert(
                name.to_string(),
                Model {
                    supports_compressed_start: true,
                    ..Model::GENERIC
                },
            );
        }
        for name in FEED_DEFECT_MODELS {
            models.insert(
                name.to_string(),
                Model {
                    has_feed_defect: true,
                    ..Model::GENERIC
                },
            );
        }
        Self { models }
    }

    /// Add or replace a model entry.
    pub fn with_model(mut self, name: impl Into<String>, model: Model) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Look up a model, falling back to the generic profile for unknown names.
    ///
    /// Unknown devices are printed to with generic settings rather than
    /// refused.
    pub fn resolve(&self, name: &str) -> Model {
        match self.get(name) {
            Some(model) => *model,
            None => {
                warn!(name, "unknown printer model, using generic profile");
                self.fallback()
            }
        }
    }

    /// Look up a model, failing for unknown names.
    pub fn require(&self, name: &str) -> Result<Model> {
        self.get(name)
            .copied()
            .ok_or_else(|| PrinterError::UnknownModel(name.to_string()))
    }

    /// The generic profile.
    pub fn fallback(&self) -> Model {
        self.get(FALLBACK_MODEL).copied().unwrap_or(Model::GENERIC)
    }

    /// Known model names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.names().count(), 11);
        for name in ["_ZZ00", "GB01", "GB02", "GB03", "GT01", "MX05", "MX06", "MX08", "MX09", "MX10", "YT01"] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_capabilities() {
        let registry = ModelRegistry::builtin();
        assert!(registry.resolve("GB03").supports_compressed_start);
        assert!(!registry.resolve("GB01").supports_compressed_start);
        assert!(registry.resolve("MX06").has_feed_defect);
        assert!(!registry.resolve("GT01").has_feed_defect);
    }

    #[test]
    fn test_all_widths_are_byte_aligned() {
        let registry = ModelRegistry::builtin();
        for name in registry.names() {
            let model = registry.resolve(name);
            assert_eq!(model.paper_width % 8, 0);
            assert_eq!(model.data_width(), 48);
        }
    }

    #[test]
    fn test_unknown_falls_back() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.resolve("NOPE"), Model::GENERIC);
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn test_require_unknown() {
        let registry = ModelRegistry::builtin();
        assert!(matches!(
            registry.require("NOPE"),
            Err(PrinterError::UnknownModel(name)) if name == "NOPE"
        ));
        assert!(registry.require("GB01").is_ok());
    }

    #[test]
    fn test_custom_model() {
        let wide = Model {
            paper_width: 576,
            ..Model::GENERIC
        };
        let registry = ModelRegistry::builtin().with_model("WIDE1", wide);
        assert_eq!(registry.resolve("WIDE1").data_width(), 72);
    }

    #[test]
    fn test_model_deserialize_defaults() {
        let model: Model = serde_json::from_str(r#"{"paper_width": 576}"#).unwrap();
        assert_eq!(model.paper_width, 576);
        assert!(!model.has_feed_defect);
    }
}
