//! Container codec
//!
//! Serializes an ordered list of entries into a single `.crudearch` byte
//! stream and back.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header: magic, version, entry count          │
//! ├──────────────────────────────────────────────┤
//! │ TOC record × entry count                     │
//! │   name length (u16) + UTF-8 name             │
//! │   category tag (u8)                          │
//! │   metadata length (u32) + metadata JSON      │
//! │   payload offset (u64), payload length (u64) │
//! ├──────────────────────────────────────────────┤
//! │ Payload blob (payloads in TOC order)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Offsets are absolute stream offsets. Decoding checks framing only:
//! payload bytes are sliced out as opaque data without category validation.

use crate::catalog::{Category, Entry, Metadata};
use crate::error::{ArchiveError, Result};
use crate::header::{Header, HEADER_LEN};
use ahash::AHashSet;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use tracing::{debug, trace};

/// Smallest possible TOC record: empty name, no metadata
const MIN_RECORD_LEN: usize = 2 + 1 + 4 + 8 + 8;

/// One table-of-contents record as laid out on disk
#[derive(Debug, Clone, PartialEq, Eq)]
struct TocRecord {
    name: String,
    category: u8,
    metadata: Vec<u8>,
    offset: u64,
    len: u64,
}

impl TocRecord {
    fn encoded_len(&self) -> usize {
        2 + self.name.len() + 1 + 4 + self.metadata.len() + 8 + 8
    }
}

/// Encode entries into a container byte stream
pub fn encode(entries: &[Entry]) -> Result<Vec<u8>> {
    let entry_count = u32::try_from(entries.len())
        .map_err(|_| ArchiveError::format("too many entries for a u32 entry count"))?;

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.name.is_empty() {
            return Err(ArchiveError::format("entry name cannot be empty"));
        }
        if entry.name.len() > u16::MAX as usize {
            return Err(ArchiveError::format(format!(
                "entry name too long ({} bytes)",
                entry.name.len()
            )));
        }

        let metadata = match &entry.metadata {
            Some(meta) => serde_json::to_vec(meta)?,
            None => Vec::new(),
        };
        if metadata.len() > u32::MAX as usize {
            return Err(ArchiveError::format(format!(
                "metadata for {} exceeds u32 length",
                entry.name
            )));
        }

        records.push(TocRecord {
            name: entry.name.clone(),
            category: entry.category as u8,
            metadata,
            offset: 0,
            len: entry.size(),
        });
    }

    // Payloads start right after the TOC
    let toc_end = HEADER_LEN + records.iter().map(TocRecord::encoded_len).sum::<usize>();
    let mut offset = toc_end as u64;
    for record in &mut records {
        record.offset = offset;
        offset = offset
            .checked_add(record.len)
            .ok_or_else(|| ArchiveError::format("payload offsets overflow u64"))?;
    }

    let total = usize::try_from(offset)
        .map_err(|_| ArchiveError::format("container too large for this platform"))?;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&Header::new(entry_count).to_bytes());

    for record in &records {
        out.write_u16::<LittleEndian>(record.name.len() as u16)?;
        out.extend_from_slice(record.name.as_bytes());
        out.write_u8(record.category)?;
        out.write_u32::<LittleEndian>(record.metadata.len() as u32)?;
        out.extend_from_slice(&record.metadata);
        out.write_u64::<LittleEndian>(record.offset)?;
        out.write_u64::<LittleEndian>(record.len)?;
    }

    if out.len() != toc_end {
        return Err(ArchiveError::format(format!(
            "TOC size mismatch: wrote {} bytes, expected {}",
            out.len(),
            toc_end
        )));
    }

    for entry in entries {
        out.extend_from_slice(&entry.payload);
    }

    debug!(
        "Encoded {} entries into {} bytes (TOC {} bytes)",
        entries.len(),
        out.len(),
        toc_end
    );

    Ok(out)
}

/// Decode a container byte stream into entries, in TOC order
pub fn decode(bytes: &[u8]) -> Result<Vec<Entry>> {
    let header = Header::from_bytes(bytes)?;
    let count = header.entry_count as usize;
    trace!("Container header: version {}, {} entries", header.version, count);

    // Reject counts that cannot possibly fit before allocating for them
    let remaining = bytes.len() - HEADER_LEN;
    if count
        .checked_mul(MIN_RECORD_LEN)
        .map_or(true, |needed| needed > remaining)
    {
        return Err(ArchiveError::format(format!(
            "entry count {} does not fit in {} remaining bytes",
            count, remaining
        )));
    }

    let mut cursor = Cursor::new(bytes);
    cursor.set_position(HEADER_LEN as u64);

    let mut records = Vec::with_capacity(count);
    let mut seen = AHashSet::with_capacity(count);
    for i in 0..count {
        let record = read_record(&mut cursor).map_err(|e| match e {
            ArchiveError::Io(io) => {
                ArchiveError::format(format!("truncated TOC record {}: {}", i, io))
            }
            other => other,
        })?;

        if !seen.insert(record.name.clone()) {
            return Err(ArchiveError::format(format!(
                "duplicate entry name: {}",
                record.name
            )));
        }
        records.push(record);
    }

    let toc_end = cursor.position();
    check_ranges(&records, toc_end, bytes.len() as u64)?;

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let category = Category::from_u8(record.category).ok_or_else(|| {
            ArchiveError::format(format!(
                "unknown category tag {} for {}",
                record.category, record.name
            ))
        })?;

        let metadata = if record.metadata.is_empty() {
            None
        } else {
            let meta: Metadata = serde_json::from_slice(&record.metadata).map_err(|e| {
                ArchiveError::format(format!("invalid metadata for {}: {}", record.name, e))
            })?;
            Some(meta)
        };

        // Ranges were checked against the stream length above
        let start = record.offset as usize;
        let end = start + record.len as usize;
        entries.push(Entry {
            name: record.name,
            category,
            payload: bytes[start..end].to_vec(),
            metadata,
        });
    }

    debug!("Decoded {} entries from {} bytes", entries.len(), bytes.len());

    Ok(entries)
}

fn read_record(cursor: &mut Cursor<&[u8]>) -> Result<TocRecord> {
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    if name_len == 0 {
        return Err(ArchiveError::format("empty entry name in TOC"));
    }
    let name_bytes = read_exact_vec(cursor, name_len)?;
    let name = String::from_utf8(name_bytes)
        .map_err(|_| ArchiveError::format("entry name is not valid UTF-8"))?;

    let category = cursor.read_u8()?;

    let metadata_len = cursor.read_u32::<LittleEndian>()? as usize;
    let metadata = read_exact_vec(cursor, metadata_len)?;

    let offset = cursor.read_u64::<LittleEndian>()?;
    let len = cursor.read_u64::<LittleEndian>()?;

    Ok(TocRecord {
        name,
        category,
        metadata,
        offset,
        len,
    })
}

/// Read `len` bytes, refusing lengths that run past the end of the stream
fn read_exact_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let available = cursor.get_ref().len() as u64 - cursor.position().min(cursor.get_ref().len() as u64);
    if len as u64 > available {
        return Err(ArchiveError::format(format!(
            "field of {} bytes runs past end of stream",
            len
        )));
    }
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

/// Every payload must lie in `[toc_end, stream_len)` and no two may overlap
fn check_ranges(records: &[TocRecord], toc_end: u64, stream_len: u64) -> Result<()> {
    let mut ranges = Vec::with_capacity(records.len());
    for record in records {
        let end = record.offset.checked_add(record.len).ok_or_else(|| {
            ArchiveError::format(format!("payload range overflows for {}", record.name))
        })?;
        if record.offset < toc_end || end > stream_len {
            return Err(ArchiveError::format(format!(
                "payload range {}..{} for {} outside payload region {}..{}",
                record.offset, end, record.name, toc_end, stream_len
            )));
        }
        if record.len > 0 {
            ranges.push((record.offset, end, record.name.as_str()));
        }
    }

    ranges.sort_unstable_by_key(|&(start, _, _)| start);
    for pair in ranges.windows(2) {
        let (_, prev_end, prev_name) = pair[0];
        let (start, _, name) = pair[1];
        if start < prev_end {
            return Err(ArchiveError::format(format!(
                "payload of {} overlaps payload of {}",
                name, prev_name
            )));
        }
    }

    Ok(())
}
