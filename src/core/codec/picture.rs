//! Cover-art decoding into generic buffers
//!
//! Embedded covers are decoded to row-major RGBA8 and handed out in the shape
//! a renderer asks for. PNG (non-interlaced, every colour type and bit depth)
//! and uncompressed 24/32-bit BMP are supported.

use super::numeric::{ElementType, NumericArray};
use super::{be_u32, le_u16, le_u32};
use crate::error::{ArchiveError, Result};
use flate2::read::ZlibDecoder;
use std::io::Read;
use std::str::FromStr;
use tracing::trace;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Row-major RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    /// `[height, width, 4]` array of `u8`
    pub fn into_array(self) -> Result<NumericArray> {
        NumericArray::new(
            vec![self.height as usize, self.width as usize, 4],
            ElementType::U8,
            self.rgba,
        )
    }

    /// RGBA of the pixel at (`x`, `y`)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba.get(at..at + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Output shape requested by a cover consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererTag {
    /// Pixel-blit consumers
    Pixmap,
    /// GPU texture uploaders; same buffer as `Pixmap`
    Texture,
    /// Numeric-array consumers
    NdArray,
}

impl FromStr for RendererTag {
    type Err = ArchiveError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "pixmap" => Ok(RendererTag::Pixmap),
            "texture" => Ok(RendererTag::Texture),
            "ndarray" => Ok(RendererTag::NdArray),
            _ => Err(ArchiveError::UnsupportedRenderer(tag.to_string())),
        }
    }
}

/// A decoded cover in the requested shape
#[derive(Debug, Clone, PartialEq)]
pub enum CoverImage {
    Pixels(PixelBuffer),
    Array(NumericArray),
}

impl CoverImage {
    pub fn as_pixels(&self) -> Option<&PixelBuffer> {
        match self {
            CoverImage::Pixels(pixels) => Some(pixels),
            CoverImage::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&NumericArray> {
        match self {
            CoverImage::Array(array) => Some(array),
            CoverImage::Pixels(_) => None,
        }
    }
}

/// Decode `bytes` and shape the result for `tag`
pub fn render(bytes: &[u8], tag: RendererTag) -> Result<CoverImage> {
    let pixels = decode(bytes)?;
    match tag {
        RendererTag::Pixmap | RendererTag::Texture => Ok(CoverImage::Pixels(pixels)),
        RendererTag::NdArray => pixels.into_array().map(CoverImage::Array),
    }
}

/// Decode a PNG or BMP image to RGBA8
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
    if bytes.starts_with(PNG_SIGNATURE) {
        decode_png(bytes)
    } else if bytes.starts_with(b"BM") {
        decode_bmp(bytes)
    } else {
        Err(ArchiveError::UnsupportedFormat(
            "cover image is neither PNG nor BMP".to_string(),
        ))
    }
}

struct PngHeader {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
}

impl PngHeader {
    fn channels(&self) -> usize {
        match self.color_type {
            0 | 3 => 1,
            4 => 2,
            2 => 3,
            _ => 4,
        }
    }

    fn bits_per_pixel(&self) -> usize {
        self.channels() * self.bit_depth as usize
    }

    fn check(&self) -> Result<()> {
        let valid = match self.color_type {
            0 => matches!(self.bit_depth, 1 | 2 | 4 | 8 | 16),
            3 => matches!(self.bit_depth, 1 | 2 | 4 | 8),
            2 | 4 | 6 => matches!(self.bit_depth, 8 | 16),
            _ => false,
        };
        if !valid || self.width == 0 || self.height == 0 {
            return Err(ArchiveError::format(format!(
                "invalid PNG header: {}x{}, colour type {}, depth {}",
                self.width, self.height, self.color_type, self.bit_depth
            )));
        }
        Ok(())
    }
}

fn decode_png(bytes: &[u8]) -> Result<PixelBuffer> {
    let mut header = None;
    let mut palette: &[u8] = &[];
    let mut transparency: &[u8] = &[];
    let mut idat = Vec::new();

    let mut pos = PNG_SIGNATURE.len();
    loop {
        let len = be_u32(bytes, pos)
            .ok_or_else(|| ArchiveError::format("PNG ends before IEND"))? as usize;
        let kind = bytes
            .get(pos + 4..pos + 8)
            .ok_or_else(|| ArchiveError::format("PNG chunk header is truncated"))?;
        let data_end = (pos + 8)
            .checked_add(len)
            .ok_or_else(|| ArchiveError::format("PNG chunk length overflows"))?;
        let data = bytes
            .get(pos + 8..data_end)
            .ok_or_else(|| ArchiveError::format("PNG chunk data is truncated"))?;
        let crc = be_u32(bytes, data_end)
            .ok_or_else(|| ArchiveError::format("PNG chunk CRC is missing"))?;
        if crc32fast::hash(&bytes[pos + 4..data_end]) != crc {
            return Err(ArchiveError::format(format!(
                "PNG {} chunk CRC mismatch",
                String::from_utf8_lossy(kind)
            )));
        }

        match kind {
            b"IHDR" => {
                if data.len() < 13 {
                    return Err(ArchiveError::format("PNG IHDR is too short"));
                }
                if data[12] != 0 {
                    return Err(ArchiveError::UnsupportedFormat(
                        "interlaced PNG".to_string(),
                    ));
                }
                let ihdr = PngHeader {
                    width: be_u32(data, 0).unwrap_or(0),
                    height: be_u32(data, 4).unwrap_or(0),
                    bit_depth: data[8],
                    color_type: data[9],
                };
                ihdr.check()?;
                header = Some(ihdr);
            }
            b"PLTE" => palette = data,
            b"tRNS" => transparency = data,
            b"IDAT" => idat.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
        pos = data_end + 4;
    }

    let header = header.ok_or_else(|| ArchiveError::format("PNG has no IHDR"))?;
    if header.color_type == 3 && palette.is_empty() {
        return Err(ArchiveError::format("indexed PNG has no palette"));
    }

    let stride = (header.width as usize)
        .checked_mul(header.bits_per_pixel())
        .map(|bits| (bits + 7) / 8)
        .ok_or_else(|| ArchiveError::format("PNG row size overflows"))?;
    let expected = (stride + 1)
        .checked_mul(header.height as usize)
        .ok_or_else(|| ArchiveError::format("PNG image size overflows"))?;

    let mut raw = Vec::new();
    ZlibDecoder::new(&idat[..])
        .take(expected as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ArchiveError::format(format!("PNG image data: {}", e)))?;
    if raw.len() != expected {
        return Err(ArchiveError::format(format!(
            "PNG image data inflates to {} bytes, expected {}",
            raw.len(),
            expected
        )));
    }

    let bpp = (header.bits_per_pixel() / 8).max(1);
    let rows = unfilter(&mut raw, stride, bpp)?;
    trace!(
        "Decoded {}x{} PNG, colour type {}, depth {}",
        header.width,
        header.height,
        header.color_type,
        header.bit_depth
    );
    Ok(expand_png(&header, &rows, stride, palette, transparency))
}

/// Undo per-row filters in place and return the filtered-out scanlines
fn unfilter(raw: &mut [u8], stride: usize, bpp: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; raw.len() / (stride + 1) * stride];
    let mut previous = vec![0u8; stride];

    for (row, chunk) in raw.chunks_exact_mut(stride + 1).enumerate() {
        let filter = chunk[0];
        let line = &mut chunk[1..];
        for i in 0..stride {
            let left = if i >= bpp { line[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predictor = match filter {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(ArchiveError::format(format!(
                        "PNG filter type {} on row {}",
                        other, row
                    )))
                }
            };
            line[i] = line[i].wrapping_add(predictor);
        }
        previous.copy_from_slice(line);
        out[row * stride..(row + 1) * stride].copy_from_slice(line);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Sample `index` of a scanline at the given bit depth
fn sample(line: &[u8], index: usize, depth: u8) -> u16 {
    match depth {
        8 => line[index] as u16,
        16 => u16::from_be_bytes([line[index * 2], line[index * 2 + 1]]),
        _ => {
            let bit = index * depth as usize;
            let shift = 8 - depth as usize - bit % 8;
            (line[bit / 8] >> shift) as u16 & ((1u16 << depth) - 1)
        }
    }
}

fn scale(value: u16, depth: u8) -> u8 {
    match depth {
        16 => (value >> 8) as u8,
        8 => value as u8,
        d => (value as u32 * 255 / ((1u32 << d) - 1)) as u8,
    }
}

fn expand_png(
    header: &PngHeader,
    rows: &[u8],
    stride: usize,
    palette: &[u8],
    transparency: &[u8],
) -> PixelBuffer {
    let width = header.width as usize;
    let depth = header.bit_depth;
    let channels = header.channels();
    // tRNS colour key, one big-endian u16 per channel
    let key = |i: usize| match transparency.get(i * 2..i * 2 + 2) {
        Some(pair) => u16::from_be_bytes([pair[0], pair[1]]),
        None => 0,
    };

    let mut rgba = Vec::with_capacity(width * header.height as usize * 4);
    for line in rows.chunks_exact(stride) {
        for x in 0..width {
            let s = |c: usize| sample(line, x * channels + c, depth);
            let pixel = match header.color_type {
                0 => {
                    let v = s(0);
                    let alpha = if transparency.len() >= 2 && v == key(0) { 0 } else { 255 };
                    let g = scale(v, depth);
                    [g, g, g, alpha]
                }
                2 => {
                    let (r, g, b) = (s(0), s(1), s(2));
                    let alpha = if transparency.len() >= 6 && (r, g, b) == (key(0), key(1), key(2)) {
                        0
                    } else {
                        255
                    };
                    [scale(r, depth), scale(g, depth), scale(b, depth), alpha]
                }
                3 => {
                    let index = s(0) as usize;
                    let rgb = palette.get(index * 3..index * 3 + 3).unwrap_or(&[0u8, 0, 0][..]);
                    let alpha = transparency.get(index).copied().unwrap_or(255);
                    [rgb[0], rgb[1], rgb[2], alpha]
                }
                4 => {
                    let g = scale(s(0), depth);
                    [g, g, g, scale(s(1), depth)]
                }
                _ => [
                    scale(s(0), depth),
                    scale(s(1), depth),
                    scale(s(2), depth),
                    scale(s(3), depth),
                ],
            };
            rgba.extend_from_slice(&pixel);
        }
    }

    PixelBuffer {
        width: header.width,
        height: header.height,
        rgba,
    }
}

fn decode_bmp(bytes: &[u8]) -> Result<PixelBuffer> {
    let truncated = || ArchiveError::format("BMP header is truncated");
    let pixel_offset = le_u32(bytes, 10).ok_or_else(truncated)? as usize;
    let info_size = le_u32(bytes, 14).ok_or_else(truncated)?;
    if info_size < 40 {
        return Err(ArchiveError::UnsupportedFormat(format!(
            "BMP info header of {} bytes",
            info_size
        )));
    }
    let width = le_u32(bytes, 18).ok_or_else(truncated)? as i32;
    let height = le_u32(bytes, 22).ok_or_else(truncated)? as i32;
    let bits = le_u16(bytes, 28).ok_or_else(truncated)?;
    let compression = le_u32(bytes, 30).ok_or_else(truncated)?;

    // BI_RGB, or BI_BITFIELDS with the usual BGRA masks
    if !matches!((bits, compression), (24, 0) | (32, 0) | (32, 3)) {
        return Err(ArchiveError::UnsupportedFormat(format!(
            "{}-bit BMP with compression {}",
            bits, compression
        )));
    }
    if width <= 0 || height == 0 {
        return Err(ArchiveError::format(format!("BMP size {}x{}", width, height)));
    }

    let top_down = height < 0;
    let (w, h) = (width as usize, height.unsigned_abs() as usize);
    let bytes_pp = bits as usize / 8;
    let stride = (w * bits as usize + 31) / 32 * 4;
    let needed = stride
        .checked_mul(h)
        .and_then(|len| len.checked_add(pixel_offset))
        .ok_or_else(|| ArchiveError::format("BMP size overflows"))?;
    if bytes.len() < needed {
        return Err(ArchiveError::format(format!(
            "BMP pixel data needs {} bytes, file has {}",
            needed,
            bytes.len()
        )));
    }

    let mut rgba = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        let source_row = if top_down { y } else { h - 1 - y };
        let row = &bytes[pixel_offset + source_row * stride..][..w * bytes_pp];
        for px in row.chunks_exact(bytes_pp) {
            let alpha = if bytes_pp == 4 { px[3] } else { 255 };
            rgba.extend_from_slice(&[px[2], px[1], px[0], alpha]);
        }
    }

    // 32-bit BI_RGB files usually leave the alpha byte zeroed
    if bytes_pp == 4 && rgba.chunks_exact(4).all(|p| p[3] == 0) {
        rgba.chunks_exact_mut(4).for_each(|p| p[3] = 255);
    }

    Ok(PixelBuffer {
        width: w as u32,
        height: h as u32,
        rgba,
    })
}

/// Encode RGBA8 pixels as a minimal PNG (colour type 6, no filtering)
///
/// Used to build fixtures; the output round-trips through [`decode`].
pub fn encode_png(pixels: &PixelBuffer) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let start = out.len();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let crc = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    let stride = pixels.width as usize * 4;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    for line in pixels.rgba.chunks_exact(stride) {
        encoder.write_all(&[0])?;
        encoder.write_all(line)?;
    }
    let idat = encoder.finish()?;

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&pixels.width.to_be_bytes());
    ihdr.extend_from_slice(&pixels.height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut out = PNG_SIGNATURE.to_vec();
    chunk(&mut out, b"IHDR", &ihdr);
    chunk(&mut out, b"IDAT", &idat);
    chunk(&mut out, b"IEND", &[]);
    Ok(out)
}
