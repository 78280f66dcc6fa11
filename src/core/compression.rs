//! Whole-buffer compression for numeric payloads
//!
//! Provides LZ4 and Zstd compression for numeric array bodies.
//!
//! **Design**:
//! - Compression threshold: only compress bodies >= `threshold` bytes
//! - The method byte is stored in the numeric header, so decoding is self-describing
//! - Fallback: store uncompressed if the ratio is not below `min_ratio`

use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};

/// Compression method for numeric bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// LZ4 compression (fast, moderate ratio)
    Lz4 = 1,
    /// Zstd compression (slower, better ratio)
    Zstd = 2,
}

impl CompressionMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Lz4),
            2 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compression method to use
    pub method: CompressionMethod,

    /// Minimum size to compress (bytes)
    pub threshold: usize,

    /// Compressed output must be smaller than `min_ratio` of the input to be kept
    pub min_ratio: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            threshold: 512,
            min_ratio: 0.9,
        }
    }
}

impl CompressionConfig {
    /// Create config with no compression
    pub fn none() -> Self {
        CompressionConfig {
            method: CompressionMethod::None,
            threshold: usize::MAX,
            min_ratio: 0.0,
        }
    }

    /// Create config with LZ4 compression
    pub fn lz4() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            ..Default::default()
        }
    }

    /// Create config with Zstd compression
    pub fn zstd() -> Self {
        CompressionConfig {
            method: CompressionMethod::Zstd,
            threshold: 1024, // Zstd overhead is higher
            min_ratio: 0.85,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.method != CompressionMethod::None
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionMethod::Zstd => zstd::bulk::compress(data, 3)
            .map_err(|e| ArchiveError::format(format!("Zstd compression failed: {}", e))),
    }
}

/// Decompress data that is expected to inflate to exactly `expected_len` bytes
pub fn decompress(data: &[u8], method: CompressionMethod, expected_len: usize) -> Result<Vec<u8>> {
    let decompressed = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Lz4 => lz4_body(data, expected_len).and_then(|body| {
            lz4_flex::decompress(body, expected_len)
                .map_err(|e| ArchiveError::format(format!("LZ4 decompression failed: {}", e)))
        })?,
        CompressionMethod::Zstd => zstd::bulk::decompress(data, expected_len)
            .map_err(|e| ArchiveError::format(format!("Zstd decompression failed: {}", e)))?,
    };

    if decompressed.len() != expected_len {
        return Err(ArchiveError::format(format!(
            "decompressed {} bytes, expected {}",
            decompressed.len(),
            expected_len
        )));
    }

    Ok(decompressed)
}

/// LZ4 block after its size prefix, once the prefix agrees with `expected_len`
fn lz4_body(data: &[u8], expected_len: usize) -> Result<&[u8]> {
    let prefix: [u8; 4] = data
        .get(..4)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or_else(|| ArchiveError::format("LZ4 block lacks its size prefix"))?;
    let body = &data[4..];
    let stored = u32::from_le_bytes(prefix) as usize;
    if stored != expected_len {
        return Err(ArchiveError::format(format!(
            "LZ4 block inflates to {} bytes, expected {}",
            stored, expected_len
        )));
    }
    // An LZ4 sequence expands at most 255-fold
    if expected_len > body.len().saturating_mul(255).saturating_add(16) {
        return Err(ArchiveError::format(format!(
            "LZ4 block of {} bytes cannot inflate to {}",
            body.len(),
            expected_len
        )));
    }
    Ok(body)
}

/// Compress data if beneficial, returns (data, method_used)
pub fn compress_if_beneficial(
    data: &[u8],
    config: &CompressionConfig,
) -> Result<(Vec<u8>, CompressionMethod)> {
    if data.len() < config.threshold || !config.is_enabled() {
        return Ok((data.to_vec(), CompressionMethod::None));
    }

    let compressed = compress(data, config.method)?;

    let ratio = compressed.len() as f32 / data.len() as f32;
    if ratio < config.min_ratio {
        Ok((compressed, config.method))
    } else {
        Ok((data.to_vec(), CompressionMethod::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method_conversion() {
        assert_eq!(CompressionMethod::from_u8(0), Some(CompressionMethod::None));
        assert_eq!(CompressionMethod::from_u8(1), Some(CompressionMethod::Lz4));
        assert_eq!(CompressionMethod::from_u8(2), Some(CompressionMethod::Zstd));
        assert_eq!(CompressionMethod::from_u8(99), None);
    }

    #[test]
    fn test_lz4_compression() {
        let data = 1.5f32.to_le_bytes().repeat(500);
        let compressed = compress(&data, CompressionMethod::Lz4).unwrap();
        let decompressed = decompress(&compressed, CompressionMethod::Lz4, data.len()).unwrap();

        assert_eq!(data, decompressed);
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_zstd_compression() {
        let data = 42u64.to_le_bytes().repeat(400);
        let compressed = compress(&data, CompressionMethod::Zstd).unwrap();
        let decompressed = decompress(&compressed, CompressionMethod::Zstd, data.len()).unwrap();

        assert_eq!(data, decompressed);
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_length_mismatch_is_format_error() {
        let data = vec![7u8; 2048];
        let compressed = compress(&data, CompressionMethod::Lz4).unwrap();
        assert!(matches!(
            decompress(&compressed, CompressionMethod::Lz4, 100),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn test_lz4_size_prefix_checked_before_inflating() {
        let mut forged = compress(&[7u8; 2048], CompressionMethod::Lz4).unwrap();
        forged[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decompress(&forged, CompressionMethod::Lz4, 2048),
            Err(ArchiveError::Format(_))
        ));

        // Prefix agrees but the block is far too short for the claim
        let claim = 1usize << 30;
        let mut tiny = (claim as u32).to_le_bytes().to_vec();
        tiny.extend_from_slice(&[0x10, 0x07]);
        assert!(matches!(
            decompress(&tiny, CompressionMethod::Lz4, claim),
            Err(ArchiveError::Format(_))
        ));

        assert!(matches!(
            decompress(&[1, 0], CompressionMethod::Lz4, 1),
            Err(ArchiveError::Format(_))
        ));
    }

    #[test]
    fn test_compress_if_beneficial() {
        let config = CompressionConfig::lz4();

        // Small data - should not compress
        let small_data = b"Hello";
        let (result, method) = compress_if_beneficial(small_data, &config).unwrap();
        assert_eq!(method, CompressionMethod::None);
        assert_eq!(result, small_data);

        // Large repetitive data - should compress
        let large_data = vec![0u8; 4000];
        let (result, method) = compress_if_beneficial(&large_data, &config).unwrap();
        assert_eq!(method, CompressionMethod::Lz4);
        assert!(result.len() < large_data.len());
    }

    #[test]
    fn test_disabled_config_never_compresses() {
        let data = vec![0u8; 1 << 16];
        let (result, method) = compress_if_beneficial(&data, &CompressionConfig::none()).unwrap();
        assert_eq!(method, CompressionMethod::None);
        assert_eq!(result.len(), data.len());
    }

    #[test]
    fn test_config_from_toml() {
        let config: CompressionConfig = toml::from_str("method = \"zstd\"\nthreshold = 64").unwrap();
        assert_eq!(config.method, CompressionMethod::Zstd);
        assert_eq!(config.threshold, 64);
        assert_eq!(config.min_ratio, 0.9);
    }
}
