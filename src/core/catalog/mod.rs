//! Entry catalog types
//!
//! An archive is a flat, ordered list of [`Entry`] values. Each entry carries a
//! [`Category`] tag that decides which codec validates it and what kind of
//! [`Metadata`] it may hold.

pub mod metadata;

pub use metadata::{
    AnimationTrack, ByteRange, CoverArt, FontFormat, FontInfo, ImageFormat, ImageInfo,
    MediaFormat, MediaInfo, Metadata, ModelFormat, ModelInfo, NumericEncoding, NumericInfo,
    TextInfo,
};

use serde::{Deserialize, Serialize};

/// Content family of an entry
///
/// The discriminant is the on-disk category tag.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Text = 0,
    Json = 1,
    Binary = 2,
    Image = 3,
    Audio = 4,
    Video = 5,
    Model = 6,
    Numeric = 7,
    Font = 8,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Text,
        Category::Json,
        Category::Binary,
        Category::Image,
        Category::Audio,
        Category::Video,
        Category::Model,
        Category::Numeric,
        Category::Font,
    ];

    /// Parse a category from its on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Text => "text",
            Category::Json => "json",
            Category::Binary => "binary",
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Video => "video",
            Category::Model => "model",
            Category::Numeric => "numeric",
            Category::Font => "font",
        }
    }

    /// Whether content must pass a structural check before it is admitted
    pub fn requires_validation(&self) -> bool {
        matches!(
            self,
            Category::Image | Category::Audio | Category::Video | Category::Model | Category::Font
        )
    }

    /// Whether the payload is edited as decoded text
    pub fn is_textual(&self) -> bool {
        matches!(self, Category::Text | Category::Json)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named unit of stored content
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Unique, case-sensitive key within the archive
    pub name: String,

    /// Content family
    pub category: Category,

    /// Raw bytes, the authoritative content
    pub payload: Vec<u8>,

    /// Category-specific metadata, if any was extracted
    pub metadata: Option<Metadata>,
}

impl Entry {
    pub fn new(name: impl Into<String>, category: Category, payload: Vec<u8>) -> Self {
        Entry {
            name: name.into(),
            category,
            payload,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Summary view returned by `get_info`
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            category: self.category,
            metadata: self.metadata.clone(),
            size: self.size(),
        }
    }
}

/// Category and metadata of an entry, without its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub category: Category,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Payload size in bytes
    pub size: u64,
}
