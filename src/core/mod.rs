//! Crudearch container engine
//!
//! A `.crudearch` file is a single container holding named, typed entries.
//! Each entry carries its category and whatever metadata the category's
//! codec could extract when the entry was added.
//!
//! ## Modules
//!
//! - [`error`] - Error type shared by every operation
//! - [`header`] - Container magic, version and fixed-size header
//! - [`catalog`] - Entries, categories and per-category metadata
//! - [`container`] - Whole-archive serialization
//! - [`registry`] - Extension tables, restricted types and signature sniffing
//! - [`codec`] - Per-category validation and metadata extraction:
//!   - [`codec::media`] - Image dimensions, audio/video stream info and cover art
//!   - [`codec::picture`] - PNG/BMP decoding for cover rendering
//!   - [`codec::model`] - Model parsing, LOD generation and animation tracks
//!   - [`codec::numeric`] - Native and `.npy` numeric arrays
//!   - [`codec::font`] - Font table directories and lookup keys
//! - [`compression`] - LZ4/Zstd for numeric bodies
//! - [`text`] - Line/column addressed text edits and encodings
//! - [`json_patch`] - Top-level JSON key updates
//! - [`config`] - TOML archive configuration
//! - [`store`] - The entry store tying the above together
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Header: "CRDA" + version + entry count   │
//! ├──────────────────────────────────────────┤
//! │ Entry 0: name, category, metadata, body  │
//! │ Entry 1: ...                             │
//! │ ...                                      │
//! └──────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod codec;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod header;
pub mod json_patch;
pub mod registry;
pub mod store;
pub mod text;
