//! Build Options
//!
//! Limits and tuning knobs handed to a build by its caller. The core never
//! reads configuration on its own; callers construct these directly or load
//! them from TOML.

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Largest attribute count the element row can hold (5 bits)
pub const MAX_ATTS_LIMIT: usize = 0x1F;

/// Options consumed by the tree builder and the storage backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Attribute count stored per element before truncation (`MAXATTS`)
    pub max_atts: usize,
    /// Capacity of the element name dictionary
    pub max_elem_names: usize,
    /// Capacity of the attribute name dictionary
    pub max_attr_names: usize,
    /// Capacity of the namespace URI table
    pub max_namespaces: usize,
    /// Distinct values tracked per name before its statistics stop being categorical
    pub max_categories: usize,
    /// Whitespace chopping flag; applied upstream, recorded in metadata
    pub chop: bool,
    /// Values shorter than this are never compressed
    pub compress_min: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_atts: MAX_ATTS_LIMIT,
            max_elem_names: 0x8000,
            max_attr_names: 0x8000,
            max_namespaces: 0x100,
            max_categories: 100,
            chop: true,
            compress_min: 64,
        }
    }
}

impl BuildOptions {
    /// Parse options from TOML text; missing keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let options: BuildOptions =
            toml::from_str(text).map_err(|e| BuildError::Options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject limits that the node encoding cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.max_atts == 0 || self.max_atts > MAX_ATTS_LIMIT {
            return Err(BuildError::Options(format!(
                "max_atts must be within 1..={MAX_ATTS_LIMIT}, got {}",
                self.max_atts
            )));
        }
        if self.max_elem_names > 0x8000 || self.max_attr_names > 0x8000 {
            return Err(BuildError::Options(
                "name dictionaries cannot exceed 32768 entries".into(),
            ));
        }
        if self.max_namespaces > 0x100 {
            return Err(BuildError::Options(
                "namespace table cannot exceed 256 entries".into(),
            ));
        }
        Ok(())
    }
}
