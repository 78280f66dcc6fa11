//! Archive configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! json_indent = 4
//! allow_restricted = false
//! default_lod_levels = 3
//!
//! [numeric_compression]
//! method = "zstd"
//! threshold = 4096
//! ```

use crate::compression::CompressionConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Spaces per indent level for JSON written by the archive
    pub json_indent: usize,

    /// Whole-body compression for numeric arrays
    pub numeric_compression: CompressionConfig,

    /// Admit restricted extensions without a per-call override
    pub allow_restricted: bool,

    /// LOD levels requested for models added through `add_file`
    pub default_lod_levels: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            json_indent: 2,
            numeric_compression: CompressionConfig::default(),
            allow_restricted: false,
            default_lod_levels: 1,
        }
    }
}

impl ArchiveConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use crate::error::ArchiveError;

    #[test]
    fn test_empty_toml_is_default() -> Result<()> {
        assert_eq!(ArchiveConfig::from_toml_str("")?, ArchiveConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_toml() -> Result<()> {
        let config = ArchiveConfig::from_toml_str(
            "json_indent = 4\n[numeric_compression]\nmethod = \"none\"\n",
        )?;
        assert_eq!(config.json_indent, 4);
        assert_eq!(config.numeric_compression.method, CompressionMethod::None);
        assert!(!config.allow_restricted);
        assert_eq!(config.default_lod_levels, 1);
        Ok(())
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            ArchiveConfig::from_toml_str("json_indent = \"wide\""),
            Err(ArchiveError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("archive.toml");
        std::fs::write(&path, "allow_restricted = true\n")?;
        assert!(ArchiveConfig::from_toml_file(&path)?.allow_restricted);
        Ok(())
    }
}
