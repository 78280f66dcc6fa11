//! Category codecs
//!
//! Each category maps to one [`EntryCodec`], a validator/extractor pair.
//! The mapping is closed: [`codec_for`] matches on [`Category`] and returns a
//! static codec, so adding a category means adding a variant and an arm.
//!
//! - [`media`] - images, audio and video (dimensions, duration, cover art)
//! - [`picture`] - cover-art decoding into generic pixel buffers
//! - [`model`] - 3D models (LODs, animation tracks, vertex extraction)
//! - [`numeric`] - numeric arrays (native `CNUM` and `.npy`)
//! - [`font`] - sfnt/WOFF table directories and lookup keys

pub mod font;
pub mod media;
pub mod model;
pub mod numeric;
pub mod picture;

use crate::catalog::{Category, Metadata};
use crate::error::Result;
use crate::registry::{self, Format};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Validator/extractor pair for one category
pub trait EntryCodec: Sync {
    /// Structural check of `payload`, returning the detected format if the
    /// category has formats at all
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>>;

    /// Category metadata for an already validated payload
    fn extract_metadata(&self, payload: &[u8], format: Option<Format>) -> Result<Option<Metadata>>;
}

/// Text, JSON and generic binary: no structure to check or extract
pub struct PlainCodec;

impl EntryCodec for PlainCodec {
    fn validate(&self, _ext: Option<&str>, _payload: &[u8]) -> Result<Option<Format>> {
        Ok(None)
    }

    fn extract_metadata(&self, _payload: &[u8], _format: Option<Format>) -> Result<Option<Metadata>> {
        Ok(None)
    }
}

static PLAIN: PlainCodec = PlainCodec;
static IMAGE: media::ImageCodec = media::ImageCodec;
static AUDIO: media::MediaCodec = media::MediaCodec::new(Category::Audio);
static VIDEO: media::MediaCodec = media::MediaCodec::new(Category::Video);
static MODEL: model::ModelCodec = model::ModelCodec;
static NUMERIC: numeric::NumericCodec = numeric::NumericCodec;
static FONT: font::FontCodec = font::FontCodec;

/// The codec responsible for `category`
pub fn codec_for(category: Category) -> &'static dyn EntryCodec {
    match category {
        Category::Text | Category::Json | Category::Binary => &PLAIN,
        Category::Image => &IMAGE,
        Category::Audio => &AUDIO,
        Category::Video => &VIDEO,
        Category::Model => &MODEL,
        Category::Numeric => &NUMERIC,
        Category::Font => &FONT,
    }
}

/// Validate `payload` as `category` and extract its metadata
pub fn inspect(category: Category, name: &str, payload: &[u8]) -> Result<Option<Metadata>> {
    let ext = registry::extension_of(name);
    let codec = codec_for(category);
    let format = codec.validate(ext.as_deref(), payload)?;
    codec.extract_metadata(payload, format)
}

// Bounds-checked fixed-width reads. `None` means the field runs past the end.

pub(crate) fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at.checked_add(2)?).map(BigEndian::read_u16)
}

pub(crate) fn be_u24(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at.checked_add(3)?).map(BigEndian::read_u24)
}

pub(crate) fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at.checked_add(4)?).map(BigEndian::read_u32)
}

pub(crate) fn be_u64(bytes: &[u8], at: usize) -> Option<u64> {
    bytes.get(at..at.checked_add(8)?).map(BigEndian::read_u64)
}

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at.checked_add(2)?).map(LittleEndian::read_u16)
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes.get(at..at.checked_add(4)?).map(LittleEndian::read_u32)
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> Option<u64> {
    bytes.get(at..at.checked_add(8)?).map(LittleEndian::read_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    #[test]
    fn test_plain_categories_accept_anything() -> Result<()> {
        for category in [Category::Text, Category::Json, Category::Binary] {
            assert_eq!(inspect(category, "x.png", &[0xFF, 0xD8, 0xFF])?, None);
        }
        Ok(())
    }

    #[test]
    fn test_validated_categories_reject_garbage() {
        for category in [
            Category::Image,
            Category::Audio,
            Category::Video,
            Category::Model,
            Category::Font,
        ] {
            assert!(
                matches!(
                    inspect(category, "blob", b"\x00garbage"),
                    Err(ArchiveError::Validation(_))
                ),
                "{} should reject garbage",
                category
            );
        }
    }

    #[test]
    fn test_bounded_reads() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(be_u16(&bytes, 0), Some(0x1234));
        assert_eq!(le_u16(&bytes, 2), Some(0x7856));
        assert_eq!(be_u24(&bytes, 1), Some(0x345678));
        assert_eq!(be_u32(&bytes, 0), Some(0x12345678));
        assert_eq!(be_u32(&bytes, 1), None);
        assert_eq!(le_u64(&bytes, 0), None);
        assert_eq!(be_u16(&bytes, usize::MAX), None);
    }
}
