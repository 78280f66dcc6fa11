use crate::error::{ArchiveError, Result};

pub const MAGIC: [u8; 4] = *b"CRDA";
pub const FORMAT_VERSION: u16 = 1;

/// Encoded header size: magic + version + entry count
pub const HEADER_LEN: usize = 4 + 2 + 4;

/// Container header
///
/// Fixed-size prefix of every `.crudearch` stream. All integers are
/// little-endian.
///
/// ```text
/// [0..4)   magic "CRDA"
/// [4..6)   format version (u16)
/// [6..10)  entry count (u32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: "CRDA"
    pub magic: [u8; 4],

    /// Format version
    pub version: u16,

    /// Number of table-of-contents records that follow
    pub entry_count: u32,
}

impl Header {
    /// Create a header for `entry_count` entries
    pub fn new(entry_count: u32) -> Self {
        Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            entry_count,
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::format(format!(
                "invalid magic signature {:02x?}",
                self.magic
            )));
        }

        // Exact match for now
        if self.version != FORMAT_VERSION {
            return Err(ArchiveError::format(format!(
                "unsupported format version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.entry_count.to_le_bytes());
        bytes
    }

    /// Deserialize and validate a header from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ArchiveError::format(format!(
                "truncated header: {} bytes, need {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);

        let header = Header {
            magic,
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            entry_count: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        };

        header.validate()?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(0)
    }
}
