//! Font table directories and lookup keys
//!
//! Only the table directory (and the `name` table, for the family) is read;
//! glyph data is never touched.

use super::{be_u16, be_u32, EntryCodec};
use crate::catalog::{Category, FontFormat, FontInfo, Metadata};
use crate::error::{ArchiveError, Result};
use crate::registry::{self, Format};
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::trace;

/// Extensions stripped when computing a lookup key
const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc", "woff"];

const NAME_ID_FAMILY: u16 = 1;

pub struct FontCodec;

impl EntryCodec for FontCodec {
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>> {
        registry::validate(Category::Font, ext, payload).map(Some)
    }

    fn extract_metadata(&self, payload: &[u8], format: Option<Format>) -> Result<Option<Metadata>> {
        let Some(Format::Font(format)) = format else {
            return Err(ArchiveError::validation("font format was not detected"));
        };
        let info = parse(payload, format)?;
        trace!(
            "{:?} font with {} tables, family {:?}",
            info.format,
            info.table_count,
            info.family
        );
        Ok(Some(Metadata::Font(info)))
    }
}

/// Canonical lookup key: last path segment, lowercased, font extension removed
///
/// ```
/// use crudearch::codec::font::font_key;
///
/// assert_eq!(font_key("Arial"), "arial");
/// assert_eq!(font_key("arial.ttf"), "arial");
/// assert_eq!(font_key("/fonts/ARIAL.TTF"), "arial");
/// assert_eq!(font_key("C:\\Fonts\\Noto.Sans.woff"), "noto.sans");
/// ```
pub fn font_key(name: &str) -> String {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name).to_lowercase();
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && FONT_EXTENSIONS.contains(&ext) => stem.to_string(),
        _ => file_name,
    }
}

struct TableRecord<'a> {
    tag: &'a [u8],
    offset: usize,
    /// Stored length
    length: usize,
    /// Inflated length; differs from `length` only for compressed WOFF tables
    orig_length: usize,
}

fn invalid(what: &str) -> ArchiveError {
    ArchiveError::validation(format!("font {}", what))
}

/// Parse the table directory of an sfnt, collection (first face) or WOFF font
pub fn parse(bytes: &[u8], format: FontFormat) -> Result<FontInfo> {
    let records = match format {
        FontFormat::TrueType | FontFormat::OpenType => sfnt_records(bytes, 0)?,
        FontFormat::Collection => {
            let count = be_u32(bytes, 8).ok_or_else(|| invalid("collection header is truncated"))?;
            if count == 0 {
                return Err(invalid("collection holds no faces"));
            }
            let first = be_u32(bytes, 12).ok_or_else(|| invalid("collection header is truncated"))?;
            sfnt_records(bytes, first as usize)?
        }
        FontFormat::Woff => woff_records(bytes)?,
    };

    let family = records
        .iter()
        .find(|r| r.tag == b"name")
        .and_then(|r| table_bytes(bytes, r))
        .and_then(|table| family_name(&table));

    Ok(FontInfo {
        format,
        table_count: records.len() as u16,
        tags: records
            .iter()
            .map(|r| String::from_utf8_lossy(r.tag).into_owned())
            .collect(),
        family,
    })
}

fn sfnt_records(bytes: &[u8], at: usize) -> Result<Vec<TableRecord<'_>>> {
    let count = be_u16(bytes, at + 4).ok_or_else(|| invalid("offset table is truncated"))?;
    (0..count as usize)
        .map(|i| {
            let rec = at + 12 + i * 16;
            let tag = bytes
                .get(rec..rec + 4)
                .ok_or_else(|| invalid("table directory is truncated"))?;
            let offset = be_u32(bytes, rec + 8).ok_or_else(|| invalid("table directory is truncated"))?;
            let length = be_u32(bytes, rec + 12).ok_or_else(|| invalid("table directory is truncated"))?;
            Ok(TableRecord {
                tag,
                offset: offset as usize,
                length: length as usize,
                orig_length: length as usize,
            })
        })
        .collect()
}

fn woff_records(bytes: &[u8]) -> Result<Vec<TableRecord<'_>>> {
    let count = be_u16(bytes, 12).ok_or_else(|| invalid("WOFF header is truncated"))?;
    (0..count as usize)
        .map(|i| {
            let rec = 44 + i * 20;
            let field = |off| be_u32(bytes, rec + off).ok_or_else(|| invalid("WOFF directory is truncated"));
            let tag = bytes
                .get(rec..rec + 4)
                .ok_or_else(|| invalid("WOFF directory is truncated"))?;
            Ok(TableRecord {
                tag,
                offset: field(4)? as usize,
                length: field(8)? as usize,
                orig_length: field(12)? as usize,
            })
        })
        .collect()
}

/// Table contents, inflating compressed WOFF tables
fn table_bytes(bytes: &[u8], record: &TableRecord<'_>) -> Option<Vec<u8>> {
    let stored = bytes.get(record.offset..record.offset.checked_add(record.length)?)?;
    if record.length >= record.orig_length {
        return Some(stored.to_vec());
    }
    let mut inflated = Vec::with_capacity(record.orig_length);
    ZlibDecoder::new(stored)
        .take(record.orig_length as u64)
        .read_to_end(&mut inflated)
        .ok()?;
    Some(inflated)
}

/// Font family from a `name` table, preferring Windows English records
fn family_name(table: &[u8]) -> Option<String> {
    let count = be_u16(table, 2)? as usize;
    let storage = be_u16(table, 4)? as usize;

    let mut best: Option<(u8, String)> = None;
    for i in 0..count {
        let rec = 6 + i * 12;
        let platform = be_u16(table, rec)?;
        let encoding = be_u16(table, rec + 2)?;
        let language = be_u16(table, rec + 4)?;
        let name_id = be_u16(table, rec + 6)?;
        if name_id != NAME_ID_FAMILY {
            continue;
        }
        let length = be_u16(table, rec + 8)? as usize;
        let offset = storage + be_u16(table, rec + 10)? as usize;
        let Some(raw) = table.get(offset..offset + length) else {
            continue;
        };

        let (rank, text) = match (platform, encoding) {
            (3, _) | (0, _) => {
                let units: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let rank = if platform == 3 && language == 0x0409 { 0 } else { 1 };
                (rank, String::from_utf16_lossy(&units))
            }
            (1, 0) => {
                let (text, _) = encoding_rs::MACINTOSH.decode_without_bom_handling(raw);
                (2, text.into_owned())
            }
            _ => continue,
        };
        if best.as_ref().map_or(true, |(r, _)| rank < *r) {
            best = Some((rank, text));
        }
    }
    best.map(|(_, text)| text).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal sfnt with a `name` table naming `family` and a dummy `head`
    fn sfnt(family: &str) -> Vec<u8> {
        let utf16: Vec<u8> = family.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let mut name = Vec::new();
        name.extend_from_slice(&0u16.to_be_bytes()); // format
        name.extend_from_slice(&1u16.to_be_bytes()); // count
        name.extend_from_slice(&18u16.to_be_bytes()); // storage offset
        for field in [3u16, 1, 0x0409, NAME_ID_FAMILY, utf16.len() as u16, 0] {
            name.extend_from_slice(&field.to_be_bytes());
        }
        name.extend_from_slice(&utf16);

        let head = vec![0u8; 54];
        let dir_len = 12 + 2 * 16;
        let mut out = vec![0x00, 0x01, 0x00, 0x00];
        out.extend_from_slice(&2u16.to_be_bytes());
        out.extend_from_slice(&[0u8; 6]);
        let tables: [(&[u8; 4], &[u8]); 2] = [(b"head", &head), (b"name", &name)];
        let mut offset = dir_len;
        for (tag, data) in tables {
            out.extend_from_slice(tag);
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            offset += data.len();
        }
        for (_, data) in tables {
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn test_font_key_normalization() {
        assert_eq!(font_key("Arial"), font_key("arial.ttf"));
        assert_eq!(font_key("arial.ttf"), font_key("/fonts/ARIAL.TTF"));
        assert_eq!(font_key("fonts\\Arial.otf"), "arial");
        assert_eq!(font_key("archive.zip"), "archive.zip");
        assert_eq!(font_key(".ttf"), ".ttf");
    }

    #[test]
    fn test_sfnt_directory_and_family() -> Result<()> {
        let info = parse(&sfnt("Arial"), FontFormat::TrueType)?;
        assert_eq!(info.table_count, 2);
        assert_eq!(info.tags, vec!["head", "name"]);
        assert_eq!(info.family.as_deref(), Some("Arial"));
        Ok(())
    }

    #[test]
    fn test_collection_uses_first_face() -> Result<()> {
        let face = sfnt("Mono");
        let mut ttc = b"ttcf".to_vec();
        ttc.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        ttc.extend_from_slice(&1u32.to_be_bytes());
        ttc.extend_from_slice(&16u32.to_be_bytes());
        // Table offsets in a collection are from the start of the file
        let mut shifted = face.clone();
        for i in 0..2 {
            let at = 12 + i * 16 + 8;
            let offset = u32::from_be_bytes([face[at], face[at + 1], face[at + 2], face[at + 3]]) + 16;
            shifted[at..at + 4].copy_from_slice(&offset.to_be_bytes());
        }
        ttc.extend_from_slice(&shifted);

        let info = parse(&ttc, FontFormat::Collection)?;
        assert_eq!(info.table_count, 2);
        assert_eq!(info.family.as_deref(), Some("Mono"));
        Ok(())
    }

    #[test]
    fn test_truncated_directory_is_validation_error() {
        let font = sfnt("Arial");
        assert!(matches!(
            parse(&font[..20], FontFormat::TrueType),
            Err(ArchiveError::Validation(_))
        ));
    }

    #[test]
    fn test_codec_rejects_wrong_signature() {
        assert!(FontCodec.validate(Some("ttf"), b"OTTO\0\0\0\0").is_ok());
        assert!(matches!(
            FontCodec.validate(Some("ttf"), b"wOFF\0\0\0\0"),
            Err(ArchiveError::Validation(_))
        ));
    }
}
