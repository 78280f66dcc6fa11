//! # Crudearch - Typed Single-File Archives
//!
//! `crudearch` stores named entries in one `.crudearch` container. Every entry
//! has a category (text, JSON, image, audio, video, model, numeric, font or
//! binary) and is validated against it when added:
//!
//! - **Type-aware validation**: an image named `.png` must actually be a PNG
//! - **Restricted types**: executables and scripts are refused unless overridden
//! - **Metadata extraction**: dimensions, durations, cover art, LODs, array shapes
//! - **In-place text editing**: row/column addressed edits in the entry's own encoding
//! - **JSON patching**: top-level key updates on JSON entries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crudearch::{Archive, Result};
//!
//! # fn main() -> Result<()> {
//! let mut archive = Archive::create("assets.crudearch");
//! archive.add_file("notes.txt", b"hello".to_vec())?;
//! archive.store_mut().append_text("notes.txt", "\nworld")?;
//! archive.save()?;
//!
//! let archive = Archive::open("assets.crudearch")?;
//! assert_eq!(archive.store().get_text("notes.txt")?, "hello\nworld");
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use crudearch::{ArchiveBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let archive = ArchiveBuilder::new()
//!     .path("scene.crudearch")
//!     .config_file("archive.toml")
//!     .json_indent(4)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// Engine implementation
pub mod core;

// Re-export engine modules so crate:: paths resolve from the root
pub use crate::core::{
    catalog, codec, compression, config, container, error, header, json_patch, registry, store,
    text,
};

pub use crate::core::{
    catalog::{
        AnimationTrack, ByteRange, Category, Entry, EntryInfo, Metadata, MediaInfo, ModelInfo,
    },
    codec::numeric::{ElementType, NumericArray},
    codec::picture::{CoverImage, PixelBuffer, RendererTag},
    compression::{CompressionConfig, CompressionMethod},
    config::ArchiveConfig,
    error::{ArchiveError, Result},
    store::{AddOptions, EntryStore},
};

use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An entry store bound to a file on disk
///
/// Nothing touches the disk until [`Archive::save`]; until then all edits
/// live in memory.
///
/// # Examples
///
/// ```rust,no_run
/// use crudearch::{Archive, Result};
///
/// # fn main() -> Result<()> {
/// let mut archive = Archive::open("assets.crudearch")?;
/// archive.add_file("readme.md", b"# Assets".to_vec())?;
/// for name in archive.list() {
///     println!("{}: {}", name, archive.store().get_info(&name)?.category);
/// }
/// archive.save()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Archive {
    path: Option<PathBuf>,
    store: EntryStore,
}

impl Archive {
    /// New empty archive that will be written to `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        info!("Creating archive at {:?}", path.as_ref());
        Archive {
            path: Some(path.as_ref().to_path_buf()),
            store: EntryStore::create(),
        }
    }

    /// Empty archive with no backing file; use [`Archive::save_as`] or
    /// [`Archive::to_bytes`] to persist it
    pub fn in_memory() -> Self {
        Archive {
            path: None,
            store: EntryStore::create(),
        }
    }

    /// Read and decode the container at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, ArchiveConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening archive at {:?}", path);
        let bytes = std::fs::read(path)?;
        Ok(Archive {
            path: Some(path.to_path_buf()),
            store: EntryStore::load_with_config(&bytes, config)?,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Archive {
            path: None,
            store: EntryStore::load(bytes)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.store.save()
    }

    /// Write the container to the bound path
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| {
            ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "archive has no path; use save_as",
            ))
        })?;
        self.write_to(path)
    }

    /// Write the container to `path` and bind the archive to it
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.write_to(&path)?;
        self.path = Some(path);
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.store.save()?;
        debug!("Writing {} bytes to {:?}", bytes.len(), path);
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add with the category implied by the name's extension
    pub fn add_file(&mut self, name: &str, payload: Vec<u8>) -> Result<()> {
        self.store.add_file(name, payload)
    }

    pub fn get(&self, name: &str) -> Result<&[u8]> {
        self.store.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.store.remove(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.store.list()
    }

    /// The underlying entry store, for category-specific operations
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntryStore {
        &mut self.store
    }
}

/// Builder for archives with a non-default configuration
///
/// Explicit setters win over values read from a config file, regardless of
/// call order.
///
/// # Examples
///
/// ```rust,no_run
/// use crudearch::ArchiveBuilder;
///
/// # fn main() -> crudearch::Result<()> {
/// let archive = ArchiveBuilder::new()
///     .path("bundle.crudearch")
///     .allow_restricted(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ArchiveBuilder {
    path: Option<PathBuf>,
    config: Option<ArchiveConfig>,
    config_file: Option<PathBuf>,
    json_indent: Option<usize>,
    allow_restricted: Option<bool>,
    open_existing: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder {
            path: None,
            config: None,
            config_file: None,
            json_indent: None,
            allow_restricted: None,
            open_existing: false,
        }
    }

    /// Bind the archive to a file (optional, defaults to in-memory)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Start from this configuration instead of the default
    pub fn config(mut self, config: ArchiveConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a TOML file at build time
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn json_indent(mut self, indent: usize) -> Self {
        self.json_indent = Some(indent);
        self
    }

    pub fn allow_restricted(mut self, allow: bool) -> Self {
        self.allow_restricted = Some(allow);
        self
    }

    /// Load the container at `path` if it exists instead of starting empty
    pub fn open_existing(mut self) -> Self {
        self.open_existing = true;
        self
    }

    pub fn build(self) -> Result<Archive> {
        let mut config = match (self.config, &self.config_file) {
            (Some(config), _) => config,
            (None, Some(file)) => ArchiveConfig::from_toml_file(file)?,
            (None, None) => ArchiveConfig::default(),
        };
        if let Some(indent) = self.json_indent {
            config.json_indent = indent;
        }
        if let Some(allow) = self.allow_restricted {
            config.allow_restricted = allow;
        }
        debug!("Archive config: {:?}", config);

        match self.path {
            Some(path) if self.open_existing && path.exists() => Archive::open_with_config(path, config),
            path => {
                info!("Building archive at {:?}", path);
                Ok(Archive {
                    path,
                    store: EntryStore::new(config),
                })
            }
        }
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
