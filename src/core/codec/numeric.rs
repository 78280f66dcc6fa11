//! Numeric arrays
//!
//! Two encodings are understood:
//!
//! - **Native** (`CNUM`), written by [`encode`]:
//!
//! ```text
//! magic "CNUM" | version u8 | compression u8 | dtype u8 | rank u8
//! | dims u64 x rank | raw length u64 | body
//! ```
//!
//!   All integers are little-endian. The body is the raw element bytes in
//!   row-major order, optionally compressed as a whole (see
//!   [`CompressionConfig`]).
//!
//! - **NumPy** `.npy` versions 1 to 3, read-only, C order, little-endian or
//!   byte-sized element types.

use super::EntryCodec;
use crate::catalog::{Category, Metadata, NumericEncoding, NumericInfo};
use crate::compression::{self, CompressionConfig, CompressionMethod};
use crate::error::{ArchiveError, Result};
use crate::registry::{self, Format};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use tracing::trace;

pub const NATIVE_MAGIC: [u8; 4] = *b"CNUM";
pub const NATIVE_VERSION: u8 = 1;
const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Element type of a numeric array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ElementType {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    U64 = 6,
    I64 = 7,
    F32 = 8,
    F64 = 9,
}

impl ElementType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use ElementType::*;
        [U8, I8, U16, I16, U32, I32, U64, I64, F32, F64]
            .get(value as usize)
            .copied()
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    /// Element type for a NumPy `descr` string such as `<f4` or `|u1`
    fn from_npy_descr(descr: &str) -> Result<Self> {
        let split = descr.char_indices().nth(1).map_or(descr.len(), |(i, _)| i);
        let (order, code) = descr.split_at(split);
        let dtype = match code {
            "u1" | "b1" => ElementType::U8,
            "i1" => ElementType::I8,
            "u2" => ElementType::U16,
            "i2" => ElementType::I16,
            "u4" => ElementType::U32,
            "i4" => ElementType::I32,
            "u8" => ElementType::U64,
            "i8" => ElementType::I64,
            "f4" => ElementType::F32,
            "f8" => ElementType::F64,
            _ => {
                return Err(ArchiveError::UnsupportedFormat(format!(
                    "npy element type '{}'",
                    descr
                )))
            }
        };
        match order {
            "<" | "|" | "=" => Ok(dtype),
            ">" if dtype.size() == 1 => Ok(dtype),
            _ => Err(ArchiveError::UnsupportedFormat(format!(
                "npy byte order in '{}'",
                descr
            ))),
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A dense row-major array: shape, element type and little-endian element bytes
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub shape: Vec<usize>,
    pub dtype: ElementType,
    pub data: Vec<u8>,
}

impl NumericArray {
    /// Build an array, checking that `data` holds exactly `shape` elements
    pub fn new(shape: Vec<usize>, dtype: ElementType, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(&shape, dtype)?;
        if data.len() != expected {
            return Err(ArchiveError::format(format!(
                "shape {:?} of {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(NumericArray { shape, dtype, data })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(shape, ElementType::F32, data)
    }

    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(shape, ElementType::F64, data)
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements of an `f32` array
    pub fn as_f32(&self) -> Result<Vec<f32>> {
        if self.dtype != ElementType::F32 {
            return Err(ArchiveError::TypeMismatch(format!(
                "array holds {}, not f32",
                self.dtype
            )));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Every element widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let size = self.dtype.size();
        self.data
            .chunks_exact(size)
            .map(|c| {
                let mut buf = [0u8; 8];
                buf[..size].copy_from_slice(c);
                match self.dtype {
                    // `buf` is only meaningful for the 8-byte types
                    ElementType::U8 => c[0] as f64,
                    ElementType::I8 => c[0] as i8 as f64,
                    ElementType::U16 => u16::from_le_bytes([c[0], c[1]]) as f64,
                    ElementType::I16 => i16::from_le_bytes([c[0], c[1]]) as f64,
                    ElementType::U32 => u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    ElementType::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    ElementType::F32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                    ElementType::U64 => u64::from_le_bytes(buf) as f64,
                    ElementType::I64 => i64::from_le_bytes(buf) as f64,
                    ElementType::F64 => f64::from_le_bytes(buf),
                }
            })
            .collect()
    }
}

fn byte_len(shape: &[usize], dtype: ElementType) -> Result<usize> {
    shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| ArchiveError::format(format!("shape {:?} overflows", shape)))
}

/// Decoded header of either encoding
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayHeader {
    pub encoding: NumericEncoding,
    pub shape: Vec<usize>,
    pub dtype: ElementType,
    pub compression: CompressionMethod,
    pub raw_len: usize,
    /// Offset of the body within the payload
    pub body_offset: usize,
}

impl ArrayHeader {
    pub fn info(&self) -> NumericInfo {
        NumericInfo {
            shape: self.shape.iter().map(|&d| d as u64).collect(),
            dtype: self.dtype,
            encoding: self.encoding,
            compressed: self.compression != CompressionMethod::None,
        }
    }
}

/// Serialize `array` in the native layout, compressing the body when `config`
/// says it pays off
pub fn encode(array: &NumericArray, config: &CompressionConfig) -> Result<Vec<u8>> {
    if array.shape.len() > u8::MAX as usize {
        return Err(ArchiveError::format(format!(
            "rank {} exceeds {}",
            array.shape.len(),
            u8::MAX
        )));
    }
    let (body, method) = compression::compress_if_beneficial(&array.data, config)?;
    trace!(
        "Encoding {:?} {} array: {} -> {} bytes ({:?})",
        array.shape,
        array.dtype,
        array.data.len(),
        body.len(),
        method
    );

    let mut out = Vec::with_capacity(16 + array.shape.len() * 8 + body.len());
    out.extend_from_slice(&NATIVE_MAGIC);
    out.write_u8(NATIVE_VERSION)?;
    out.write_u8(method as u8)?;
    out.write_u8(array.dtype as u8)?;
    out.write_u8(array.shape.len() as u8)?;
    for &dim in &array.shape {
        out.write_u64::<LittleEndian>(dim as u64)?;
    }
    out.write_u64::<LittleEndian>(array.data.len() as u64)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Reconstruct an array from native or `.npy` bytes
pub fn decode(bytes: &[u8]) -> Result<NumericArray> {
    let header = read_header(bytes)?;
    let body = &bytes[header.body_offset..];

    let data = match header.compression {
        CompressionMethod::None => {
            if body.len() != header.raw_len {
                return Err(ArchiveError::format(format!(
                    "array body is {} bytes, header declares {}",
                    body.len(),
                    header.raw_len
                )));
            }
            body.to_vec()
        }
        method => compression::decompress(body, method, header.raw_len)?,
    };

    NumericArray::new(header.shape, header.dtype, data)
}

/// Parse just the header, without touching the body
pub fn read_header(bytes: &[u8]) -> Result<ArrayHeader> {
    if bytes.starts_with(&NATIVE_MAGIC) {
        read_native_header(bytes)
    } else if bytes.starts_with(NPY_MAGIC) {
        read_npy_header(bytes)
    } else {
        Err(ArchiveError::format("not a CNUM or .npy array"))
    }
}

fn truncated(_: std::io::Error) -> ArchiveError {
    ArchiveError::format("numeric header is truncated")
}

fn read_native_header(bytes: &[u8]) -> Result<ArrayHeader> {
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(NATIVE_MAGIC.len() as u64);

    let version = cursor.read_u8().map_err(truncated)?;
    if version != NATIVE_VERSION {
        return Err(ArchiveError::format(format!(
            "unsupported numeric version {}",
            version
        )));
    }
    let method_byte = cursor.read_u8().map_err(truncated)?;
    let compression = CompressionMethod::from_u8(method_byte).ok_or_else(|| {
        ArchiveError::format(format!("unknown compression method {}", method_byte))
    })?;
    let dtype_byte = cursor.read_u8().map_err(truncated)?;
    let dtype = ElementType::from_u8(dtype_byte)
        .ok_or_else(|| ArchiveError::format(format!("unknown element type {}", dtype_byte)))?;
    let rank = cursor.read_u8().map_err(truncated)?;

    let mut shape = Vec::with_capacity(rank as usize);
    for _ in 0..rank {
        let dim = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        let dim = usize::try_from(dim)
            .map_err(|_| ArchiveError::format(format!("dimension {} overflows", dim)))?;
        shape.push(dim);
    }
    let raw_len = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
    let raw_len = usize::try_from(raw_len)
        .map_err(|_| ArchiveError::format(format!("raw length {} overflows", raw_len)))?;

    let expected = byte_len(&shape, dtype)?;
    if raw_len != expected {
        return Err(ArchiveError::format(format!(
            "shape {:?} of {} needs {} bytes, header declares {}",
            shape, dtype, expected, raw_len
        )));
    }

    Ok(ArrayHeader {
        encoding: NumericEncoding::Native,
        shape,
        dtype,
        compression,
        raw_len,
        body_offset: cursor.position() as usize,
    })
}

fn read_npy_header(bytes: &[u8]) -> Result<ArrayHeader> {
    let mut cursor = Cursor::new(bytes);
    cursor.set_position(NPY_MAGIC.len() as u64);

    let major = cursor.read_u8().map_err(truncated)?;
    let _minor = cursor.read_u8().map_err(truncated)?;
    let header_len = match major {
        1 => cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize,
        2 | 3 => cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize,
        _ => {
            return Err(ArchiveError::format(format!(
                "unsupported .npy version {}",
                major
            )))
        }
    };

    let mut dict = vec![0u8; header_len];
    cursor.read_exact(&mut dict).map_err(truncated)?;
    // v1/v2 headers are latin-1, v3 is UTF-8; the keys we need are ASCII either way
    let dict = String::from_utf8_lossy(&dict);

    let capture = |pattern: &str| -> Result<String> {
        let re = Regex::new(pattern).map_err(|e| ArchiveError::format(e.to_string()))?;
        re.captures(&dict)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ArchiveError::format(format!(".npy header lacks {}", pattern)))
    };

    let descr = capture(r"'descr'\s*:\s*'([^']*)'")?;
    let fortran = capture(r"'fortran_order'\s*:\s*(True|False)")?;
    let shape_text = capture(r"'shape'\s*:\s*\(([^)]*)\)")?;

    if fortran == "True" {
        return Err(ArchiveError::UnsupportedFormat(
            "Fortran-ordered .npy arrays".to_string(),
        ));
    }
    let dtype = ElementType::from_npy_descr(&descr)?;
    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| ArchiveError::format(format!("bad .npy dimension '{}'", dim)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ArrayHeader {
        encoding: NumericEncoding::Npy,
        raw_len: byte_len(&shape, dtype)?,
        shape,
        dtype,
        compression: CompressionMethod::None,
        body_offset: cursor.position() as usize,
    })
}

pub struct NumericCodec;

impl EntryCodec for NumericCodec {
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>> {
        registry::check_extension(Category::Numeric, ext)?;
        read_header(payload)
            .map(|header| Some(Format::Numeric(header.encoding)))
            .map_err(|e| ArchiveError::validation(format!("numeric payload: {}", e)))
    }

    fn extract_metadata(&self, payload: &[u8], _format: Option<Format>) -> Result<Option<Metadata>> {
        let header = read_header(payload)
            .map_err(|e| ArchiveError::validation(format!("numeric payload: {}", e)))?;
        Ok(Some(Metadata::Numeric(header.info())))
    }
}
