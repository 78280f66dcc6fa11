//! Per-category entry metadata
//!
//! Metadata is a tagged union, one variant per category that extracts
//! anything. It is serialized as JSON into the container's table of contents.

use crate::codec::numeric::ElementType;
use serde::{Deserialize, Serialize};

/// Half-open byte range `[offset, offset + len)` into an entry payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(offset: u64, len: u64) -> Self {
        ByteRange { offset, len }
    }

    /// Exclusive end offset, `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.len)
    }

    /// Borrow the range out of `bytes`, `None` if it does not fit
    pub fn slice<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        let start = usize::try_from(self.offset).ok()?;
        let end = usize::try_from(self.end()?).ok()?;
        bytes.get(start..end)
    }
}

/// Category-specific metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Text(TextInfo),
    Image(ImageInfo),
    Audio(MediaInfo),
    Video(MediaInfo),
    Model(ModelInfo),
    Numeric(NumericInfo),
    Font(FontInfo),
}

impl Metadata {
    pub fn as_media(&self) -> Option<&MediaInfo> {
        match self {
            Metadata::Audio(info) | Metadata::Video(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelInfo> {
        match self {
            Metadata::Model(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut ModelInfo> {
        match self {
            Metadata::Model(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_font(&self) -> Option<&FontInfo> {
        match self {
            Metadata::Font(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericInfo> {
        match self {
            Metadata::Numeric(info) => Some(info),
            _ => None,
        }
    }
}

/// Encoding recorded for text written through `add_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInfo {
    /// WHATWG encoding name, e.g. "UTF-8" or "Shift_JIS"
    pub encoding: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    WebP,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Audio and video container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp3,
    Wav,
    Flac,
    Ogg,
    /// ISO base media (MP4, M4A, MOV)
    Mp4,
    Avi,
    /// Matroska and WebM
    Matroska,
}

/// Embedded cover art location inside a media payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArt {
    pub range: ByteRange,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format: MediaFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<CoverArt>,
}

impl MediaInfo {
    pub fn new(format: MediaFormat) -> Self {
        MediaInfo {
            format,
            duration_secs: None,
            sample_rate: None,
            channels: None,
            width: None,
            height: None,
            cover: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Obj,
    Gltf,
    Glb,
    Stl,
    Ply,
    Fbx,
}

/// A named animation track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationTrack {
    pub name: String,
    pub frame_count: u32,

    /// Per-frame channel values; may be empty when only the frame count is known
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Vec<f32>>,
}

impl AnimationTrack {
    /// Track whose frame count is taken from its frame data
    pub fn new(name: impl Into<String>, frames: Vec<Vec<f32>>) -> Self {
        AnimationTrack {
            name: name.into(),
            frame_count: frames.len() as u32,
            frames,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub format: ModelFormat,

    /// LOD ranges into the stored payload, index 0 = highest detail
    pub lods: Vec<ByteRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<AnimationTrack>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericEncoding {
    /// The crate's own `CNUM` layout
    Native,
    /// NumPy `.npy`
    Npy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericInfo {
    pub shape: Vec<u64>,
    pub dtype: ElementType,
    pub encoding: NumericEncoding,
    pub compressed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    /// sfnt with TrueType outlines
    TrueType,
    /// sfnt with CFF outlines (`OTTO`)
    OpenType,
    /// TrueType collection (`ttcf`)
    Collection,
    Woff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontInfo {
    pub format: FontFormat,
    pub table_count: u16,
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}
