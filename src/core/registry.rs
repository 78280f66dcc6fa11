//! Type registry
//!
//! Maps names to categories by extension, sniffs magic numbers, and decides
//! whether content matches the category (and format) it is declared as.
//!
//! # Rules
//! - Extension matching is case-insensitive and uses the last path segment
//! - Text, JSON, binary and numeric categories bypass structural validation
//! - A restricted extension is rejected before any validation happens

use crate::catalog::{Category, FontFormat, ImageFormat, MediaFormat, ModelFormat, NumericEncoding};
use crate::error::{ArchiveError, Result};
use tracing::trace;

/// Extensions that are never admitted without an explicit override
pub const RESTRICTED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bat", "cmd", "com", "scr", "msi", "sys", "ps1", "vbs", "cpl",
    "jar", "app",
];

/// Concrete format detected from content or implied by an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Image(ImageFormat),
    Media(MediaFormat),
    Model(ModelFormat),
    Font(FontFormat),
    Numeric(NumericEncoding),
}

impl Format {
    /// Whether content of this format may be stored under `category`
    pub fn fits(&self, category: Category) -> bool {
        matches!(
            (self, category),
            (Format::Image(_), Category::Image)
                | (Format::Media(_), Category::Audio | Category::Video)
                | (Format::Model(_), Category::Model)
                | (Format::Font(_), Category::Font)
                | (Format::Numeric(_), Category::Numeric)
        )
    }

    /// Whether a detected format satisfies the format implied by an extension
    fn satisfies(&self, expected: &Format) -> bool {
        match (self, expected) {
            // .ttf and .otf are both sfnt; outline flavour does not matter
            (
                Format::Font(FontFormat::TrueType | FontFormat::OpenType),
                Format::Font(FontFormat::TrueType | FontFormat::OpenType),
            ) => true,
            _ => self == expected,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Image(format) => write!(f, "{:?} image", format),
            Format::Media(format) => write!(f, "{:?} media", format),
            Format::Model(format) => write!(f, "{:?} model", format),
            Format::Font(format) => write!(f, "{:?} font", format),
            Format::Numeric(encoding) => write!(f, "{:?} numeric array", encoding),
        }
    }
}

/// Lowercased extension of the last path segment of `name`
///
/// ```
/// use crudearch::registry::extension_of;
///
/// assert_eq!(extension_of("Photo.JPG").as_deref(), Some("jpg"));
/// assert_eq!(extension_of("/fonts/arial.ttf").as_deref(), Some("ttf"));
/// assert_eq!(extension_of("README"), None);
/// assert_eq!(extension_of(".hidden"), None);
/// ```
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Category implied by an extension, `None` if the extension is unknown
pub fn category_for_extension(ext: &str) -> Option<Category> {
    let ext = ext.to_ascii_lowercase();
    let category = match ext.as_str() {
        "txt" | "text" | "md" | "markdown" | "rst" | "py" | "rs" | "c" | "h" | "cpp" | "hpp"
        | "js" | "ts" | "html" | "htm" | "css" | "csv" | "tsv" | "xml" | "yaml" | "yml"
        | "toml" | "ini" | "cfg" | "log" | "sh" | "sql" => Category::Text,
        "json" => Category::Json,
        "bin" | "dat" => Category::Binary,
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => Category::Image,
        "mp3" | "wav" | "flac" | "ogg" | "oga" | "opus" | "m4a" => Category::Audio,
        "mp4" | "m4v" | "mov" | "avi" | "mkv" | "webm" => Category::Video,
        "obj" | "gltf" | "glb" | "stl" | "ply" | "fbx" => Category::Model,
        "npy" | "cnum" => Category::Numeric,
        "ttf" | "otf" | "ttc" | "woff" => Category::Font,
        _ => return None,
    };
    Some(category)
}

/// Category for a name: its extension's category, or binary
pub fn category_for_name(name: &str) -> Category {
    extension_of(name)
        .and_then(|ext| category_for_extension(&ext))
        .unwrap_or(Category::Binary)
}

/// Format implied by an extension, for extensions that pin one down
pub fn format_for_extension(ext: &str) -> Option<Format> {
    let ext = ext.to_ascii_lowercase();
    let format = match ext.as_str() {
        "png" => Format::Image(ImageFormat::Png),
        "jpg" | "jpeg" => Format::Image(ImageFormat::Jpeg),
        "gif" => Format::Image(ImageFormat::Gif),
        "bmp" => Format::Image(ImageFormat::Bmp),
        "webp" => Format::Image(ImageFormat::WebP),
        "mp3" => Format::Media(MediaFormat::Mp3),
        "wav" => Format::Media(MediaFormat::Wav),
        "flac" => Format::Media(MediaFormat::Flac),
        "ogg" | "oga" | "opus" => Format::Media(MediaFormat::Ogg),
        "m4a" | "mp4" | "m4v" | "mov" => Format::Media(MediaFormat::Mp4),
        "avi" => Format::Media(MediaFormat::Avi),
        "mkv" | "webm" => Format::Media(MediaFormat::Matroska),
        "obj" => Format::Model(ModelFormat::Obj),
        "gltf" => Format::Model(ModelFormat::Gltf),
        "glb" => Format::Model(ModelFormat::Glb),
        "stl" => Format::Model(ModelFormat::Stl),
        "ply" => Format::Model(ModelFormat::Ply),
        "fbx" => Format::Model(ModelFormat::Fbx),
        "ttf" => Format::Font(FontFormat::TrueType),
        "otf" => Format::Font(FontFormat::OpenType),
        "ttc" => Format::Font(FontFormat::Collection),
        "woff" => Format::Font(FontFormat::Woff),
        "npy" => Format::Numeric(NumericEncoding::Npy),
        "cnum" => Format::Numeric(NumericEncoding::Native),
        _ => return None,
    };
    Some(format)
}

/// Whether an extension is on the restricted denylist
///
/// ```
/// use crudearch::registry::is_restricted;
///
/// assert!(is_restricted("exe"));
/// assert!(is_restricted("DLL"));
/// assert!(!is_restricted("txt"));
/// ```
pub fn is_restricted(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    RESTRICTED_EXTENSIONS.contains(&ext.as_str())
}

/// Detect a format from magic numbers
///
/// Only formats with a fixed signature are recognized here; text-based model
/// formats need [`validate`] with an expected format.
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    let riff_kind = |kind: &[u8; 4]| bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == kind;

    let format = if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Format::Image(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Format::Image(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Format::Image(ImageFormat::Gif)
    } else if bytes.starts_with(b"BM") && bytes.len() >= 26 {
        Format::Image(ImageFormat::Bmp)
    } else if riff_kind(b"WEBP") {
        Format::Image(ImageFormat::WebP)
    } else if riff_kind(b"WAVE") {
        Format::Media(MediaFormat::Wav)
    } else if riff_kind(b"AVI ") {
        Format::Media(MediaFormat::Avi)
    } else if bytes.starts_with(b"fLaC") {
        Format::Media(MediaFormat::Flac)
    } else if bytes.starts_with(b"OggS") {
        Format::Media(MediaFormat::Ogg)
    } else if bytes.starts_with(b"ID3") || is_mpeg_frame_sync(bytes) {
        Format::Media(MediaFormat::Mp3)
    } else if bytes.len() >= 8 && matches!(&bytes[4..8], b"ftyp" | b"moov" | b"mdat" | b"wide") {
        Format::Media(MediaFormat::Mp4)
    } else if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Format::Media(MediaFormat::Matroska)
    } else if bytes.starts_with(b"glTF") {
        Format::Model(ModelFormat::Glb)
    } else if bytes.starts_with(b"Kaydara FBX Binary") || bytes.starts_with(b"; FBX") {
        Format::Model(ModelFormat::Fbx)
    } else if bytes.starts_with(b"ply\n") || bytes.starts_with(b"ply\r\n") {
        Format::Model(ModelFormat::Ply)
    } else if bytes.starts_with(&[0x00, 0x01, 0x00, 0x00]) || bytes.starts_with(b"true") {
        Format::Font(FontFormat::TrueType)
    } else if bytes.starts_with(b"OTTO") {
        Format::Font(FontFormat::OpenType)
    } else if bytes.starts_with(b"ttcf") {
        Format::Font(FontFormat::Collection)
    } else if bytes.starts_with(b"wOFF") {
        Format::Font(FontFormat::Woff)
    } else if bytes.starts_with(b"\x93NUMPY") {
        Format::Numeric(NumericEncoding::Npy)
    } else if bytes.starts_with(b"CNUM") {
        Format::Numeric(NumericEncoding::Native)
    } else {
        return None;
    };

    Some(format)
}

/// MPEG audio frame header: 11 sync bits, a valid version and a valid layer
fn is_mpeg_frame_sync(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && bytes[0] == 0xFF
        && bytes[1] & 0xE0 == 0xE0
        && (bytes[1] >> 3) & 0x03 != 0x01
        && (bytes[1] >> 1) & 0x03 != 0x00
        && bytes[2] >> 4 != 0x0F
}

/// Structural detection for model formats without a fixed signature
fn detect_model_text(bytes: &[u8], expected: Option<Format>) -> Option<ModelFormat> {
    match expected {
        Some(Format::Model(ModelFormat::Stl)) => {
            if is_binary_stl(bytes) || is_ascii_stl(bytes) {
                Some(ModelFormat::Stl)
            } else {
                None
            }
        }
        Some(Format::Model(ModelFormat::Gltf)) => {
            let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
            value.get("asset").is_some().then_some(ModelFormat::Gltf)
        }
        Some(Format::Model(ModelFormat::Obj)) | None => {
            if is_ascii_stl(bytes) {
                return Some(ModelFormat::Stl);
            }
            let text = std::str::from_utf8(bytes).ok()?;
            text.lines()
                .any(|line| line.trim_start().starts_with("v "))
                .then_some(ModelFormat::Obj)
        }
        _ => None,
    }
}

/// Binary STL: 80-byte header, triangle count, 50 bytes per triangle
pub(crate) fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < 84 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as u64;
    84 + 50 * count == bytes.len() as u64
}

pub(crate) fn is_ascii_stl(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    bytes.starts_with(b"solid")
        && !is_binary_stl(bytes)
        && std::str::from_utf8(bytes).is_ok()
        && (head.windows(5).any(|w| w == b"facet") || bytes.windows(8).any(|w| w == b"endsolid"))
}

/// Reject an extension whose implied format belongs to another category
pub fn check_extension(category: Category, ext: Option<&str>) -> Result<()> {
    match ext.zip(ext.and_then(format_for_extension)) {
        Some((ext, implied)) if !implied.fits(category) => Err(ArchiveError::validation(format!(
            "extension .{} implies {} but entry was declared as {}",
            ext, implied, category
        ))),
        _ => Ok(()),
    }
}

/// Validate content declared as `category`, returning the detected format
///
/// `ext` is the name's extension. It must not imply a format of another
/// category, and when it implies one of this category the detected format
/// must match it.
pub fn validate(category: Category, ext: Option<&str>, bytes: &[u8]) -> Result<Format> {
    check_extension(category, ext)?;
    let expected = ext.and_then(format_for_extension);

    // Formats without a signature are checked structurally first, since their
    // leading bytes are arbitrary
    let unsigned_model = matches!(
        expected,
        Some(Format::Model(ModelFormat::Obj | ModelFormat::Stl | ModelFormat::Gltf))
    );
    let detected = if unsigned_model {
        detect_model_text(bytes, expected)
            .map(Format::Model)
            .or_else(|| sniff(bytes))
    } else {
        sniff(bytes).or_else(|| {
            (category == Category::Model)
                .then(|| detect_model_text(bytes, expected).map(Format::Model))
                .flatten()
        })
    };

    let detected = detected.ok_or_else(|| match expected {
        Some(format) => ArchiveError::validation(format!(
            "content does not carry a {} signature",
            format
        )),
        None => ArchiveError::validation(format!("no recognizable {} signature", category)),
    })?;
    trace!("Detected {} for declared {}", detected, category);

    if !detected.fits(category) {
        return Err(ArchiveError::validation(format!(
            "content is a {} but was declared as {}",
            detected, category
        )));
    }

    if let Some(expected) = expected {
        if !detected.satisfies(&expected) {
            return Err(ArchiveError::validation(format!(
                "extension .{} implies {} but content is a {}",
                ext.unwrap_or_default(),
                expected,
                detected
            )));
        }
    }

    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_SIG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.TXT").as_deref(), Some("txt"));
        assert_eq!(extension_of("dir.d/file").as_deref(), None);
        assert_eq!(extension_of("C:\\Fonts\\Arial.TTF").as_deref(), Some("ttf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_category_for_name() {
        assert_eq!(category_for_name("notes.txt"), Category::Text);
        assert_eq!(category_for_name("data.JSON"), Category::Json);
        assert_eq!(category_for_name("cover.jpeg"), Category::Image);
        assert_eq!(category_for_name("song.flac"), Category::Audio);
        assert_eq!(category_for_name("clip.webm"), Category::Video);
        assert_eq!(category_for_name("mesh.glb"), Category::Model);
        assert_eq!(category_for_name("weights.npy"), Category::Numeric);
        assert_eq!(category_for_name("Arial.TTF"), Category::Font);
        assert_eq!(category_for_name("noext"), Category::Binary);
        assert_eq!(category_for_name("odd.xyz"), Category::Binary);
    }

    #[test]
    fn test_restricted_independent_of_category() {
        for ext in ["exe", "EXE", "dll", "so", "bat", "ps1"] {
            assert!(is_restricted(ext), "{} should be restricted", ext);
        }
        for ext in ["txt", "png", "bin", "json"] {
            assert!(!is_restricted(ext));
        }
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(sniff(PNG_SIG), Some(Format::Image(ImageFormat::Png)));
        assert_eq!(sniff(JPEG_SIG), Some(Format::Image(ImageFormat::Jpeg)));
        assert_eq!(sniff(b"GIF89a\x01\x00"), Some(Format::Image(ImageFormat::Gif)));
        assert_eq!(sniff(b"RIFF\0\0\0\0WAVEfmt "), Some(Format::Media(MediaFormat::Wav)));
        assert_eq!(sniff(b"RIFF\0\0\0\0AVI LIST"), Some(Format::Media(MediaFormat::Avi)));
        assert_eq!(sniff(b"ID3\x03\x00"), Some(Format::Media(MediaFormat::Mp3)));
        assert_eq!(sniff(&[0xFF, 0xFB, 0x90, 0x00]), Some(Format::Media(MediaFormat::Mp3)));
        assert_eq!(sniff(b"\0\0\0\x18ftypisom"), Some(Format::Media(MediaFormat::Mp4)));
        assert_eq!(sniff(b"OTTO\x00\x01"), Some(Format::Font(FontFormat::OpenType)));
        assert_eq!(sniff(&[0, 1, 0, 0, 0, 0]), Some(Format::Font(FontFormat::TrueType)));
        assert_eq!(sniff(b"plain text"), None);
    }

    #[test]
    fn test_png_extension_with_jpeg_signature() {
        let err = validate(Category::Image, Some("png"), JPEG_SIG).unwrap_err();
        assert!(matches!(err, ArchiveError::Validation(_)));
    }

    #[test]
    fn test_category_mismatch() {
        // A PNG declared as audio
        let err = validate(Category::Audio, None, PNG_SIG).unwrap_err();
        assert!(matches!(err, ArchiveError::Validation(_)));
    }

    #[test]
    fn test_formats_are_distinct_keys() {
        let formats: ahash::AHashSet<Format> = ["png", "mp3", "obj", "ttf", "npy", "cnum", "NPY"]
            .iter()
            .filter_map(|ext| format_for_extension(ext))
            .collect();
        assert_eq!(formats.len(), 6);
        assert!(formats.contains(&Format::Numeric(NumericEncoding::Npy)));
    }

    #[test]
    fn test_extension_of_other_category() {
        let mp3 = b"ID3\x03\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            validate(Category::Audio, Some("png"), mp3),
            Err(ArchiveError::Validation(_))
        ));
        assert!(matches!(
            validate(Category::Image, Some("ttf"), PNG_SIG),
            Err(ArchiveError::Validation(_))
        ));
        // Container extensions shared by audio and video
        assert!(check_extension(Category::Audio, Some("mp4")).is_ok());
        assert!(check_extension(Category::Video, Some("m4a")).is_ok());
        // Extensions without an implied format say nothing
        assert!(check_extension(Category::Image, Some("dat")).is_ok());
        assert!(check_extension(Category::Font, None).is_ok());
    }

    #[test]
    fn test_no_signature() {
        assert!(matches!(
            validate(Category::Image, Some("png"), b"hello"),
            Err(ArchiveError::Validation(_))
        ));
        assert!(matches!(
            validate(Category::Font, None, b""),
            Err(ArchiveError::Validation(_))
        ));
    }

    #[test]
    fn test_sfnt_flavours_interchangeable() {
        assert!(validate(Category::Font, Some("ttf"), b"OTTO\0\0\0\0").is_ok());
        assert!(validate(Category::Font, Some("otf"), &[0, 1, 0, 0, 0, 0]).is_ok());
        assert!(validate(Category::Font, Some("woff"), &[0, 1, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_text_model_formats() {
        let obj = b"# cube\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(
            validate(Category::Model, Some("obj"), obj).unwrap(),
            Format::Model(ModelFormat::Obj)
        );

        let gltf = br#"{"asset": {"version": "2.0"}}"#;
        assert_eq!(
            validate(Category::Model, Some("gltf"), gltf).unwrap(),
            Format::Model(ModelFormat::Gltf)
        );
        assert!(validate(Category::Model, Some("gltf"), b"{}").is_err());

        let stl = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\nendsolid t\n";
        assert_eq!(
            validate(Category::Model, Some("stl"), stl).unwrap(),
            Format::Model(ModelFormat::Stl)
        );
    }

    #[test]
    fn test_binary_stl_size_rule() {
        let mut stl = vec![0u8; 84 + 50];
        stl[80] = 1;
        assert!(is_binary_stl(&stl));
        stl.push(0);
        assert!(!is_binary_stl(&stl));
    }
}
