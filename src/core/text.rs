//! Position-addressed text editing
//!
//! All positions count characters (Unicode scalar values), never bytes.
//!
//! - **index**: offset into the whole text, `0..=len`
//! - **row**: zero-based line number; `\r\n`, `\n` and `\r` all end a line
//! - **col**: offset within a row, not counting the line break
//!
//! Line breaks are kept verbatim, so editing never rewrites a file's line
//! ending convention. A text ending in a break has one empty last row.
//!
//! The module also holds the strict decode/encode primitives used by text and
//! JSON entries.

use crate::error::{ArchiveError, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// One row of a text: where it starts, its length and its line break length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// Character index of the first character
    pub start: usize,
    /// Characters excluding the line break
    pub len: usize,
    /// 0 for the last row, 1 for `\n`/`\r`, 2 for `\r\n`
    pub break_len: usize,
}

impl Line {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Number of characters in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into rows; always returns at least one row
pub fn lines(text: &str) -> Vec<Line> {
    let mut rows = Vec::new();
    let mut start = 0;
    let mut index = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let break_len = match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                2
            }
            '\r' | '\n' => 1,
            _ => 0,
        };
        if break_len > 0 {
            rows.push(Line {
                start,
                len: index - start,
                break_len,
            });
            index += break_len;
            start = index;
        } else {
            index += 1;
        }
    }
    rows.push(Line {
        start,
        len: index - start,
        break_len: 0,
    });
    rows
}

/// Byte offset of character `index`; `index == len` maps to `text.len()`
fn byte_offset(text: &str, index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

fn line_at(text: &str, row: usize) -> Result<Line> {
    let rows = lines(text);
    let count = rows.len();
    rows.into_iter()
        .nth(row)
        .ok_or_else(|| ArchiveError::index(format!("row {} of {} rows", row, count)))
}

/// Insert `new_text` before character `index`
///
/// ```
/// use crudearch::text::insert_at_index;
///
/// assert_eq!(insert_at_index("held", "l", 2).unwrap(), "helld");
/// assert_eq!(insert_at_index("ab", "!", 2).unwrap(), "ab!");
/// assert!(insert_at_index("ab", "!", 3).is_err());
/// ```
pub fn insert_at_index(text: &str, new_text: &str, index: usize) -> Result<String> {
    let at = byte_offset(text, index).ok_or_else(|| {
        ArchiveError::index(format!("index {} past end of {} chars", index, char_len(text)))
    })?;
    let mut out = String::with_capacity(text.len() + new_text.len());
    out.push_str(&text[..at]);
    out.push_str(new_text);
    out.push_str(&text[at..]);
    Ok(out)
}

/// Insert `new_text` at (`row`, `col`); `col` may equal the row length
pub fn insert_at_position(text: &str, new_text: &str, row: usize, col: usize) -> Result<String> {
    let line = line_at(text, row)?;
    if col > line.len {
        return Err(ArchiveError::index(format!(
            "column {} past end of row {} ({} chars)",
            col, row, line.len
        )));
    }
    insert_at_index(text, new_text, line.start + col)
}

/// Remove characters `[start, end)`, shifting the rest left
pub fn truncate_row(text: &str, start: usize, end: usize) -> Result<String> {
    let len = char_len(text);
    if start > end || end > len {
        return Err(ArchiveError::index(format!(
            "range {}..{} in {} chars",
            start, end, len
        )));
    }
    // Both offsets exist since end <= len
    let from = byte_offset(text, start).unwrap_or(text.len());
    let to = byte_offset(text, end).unwrap_or(text.len());
    let mut out = String::with_capacity(text.len() - (to - from));
    out.push_str(&text[..from]);
    out.push_str(&text[to..]);
    Ok(out)
}

/// Remove columns `[col_start, col_end)` of one row
///
/// `col_end` is clamped to the row length; the line break and other rows are
/// untouched.
pub fn remove_row_at_index(text: &str, row: usize, col_start: usize, col_end: usize) -> Result<String> {
    let line = line_at(text, row)?;
    if col_start > col_end {
        return Err(ArchiveError::index(format!(
            "column range {}..{} is reversed",
            col_start, col_end
        )));
    }
    if col_start > line.len {
        return Err(ArchiveError::index(format!(
            "column {} past end of row {} ({} chars)",
            col_start, row, line.len
        )));
    }
    let col_end = col_end.min(line.len);
    truncate_row(text, line.start + col_start, line.start + col_end)
}

/// Remove columns `[col_start, col_end)` from every row
///
/// ```
/// use crudearch::text::remove_column;
///
/// let text = "abcdef\nab\nabcd";
/// assert_eq!(remove_column(text, 2, 4).unwrap(), "abef\nab\nab");
/// ```
pub fn remove_column(text: &str, col_start: usize, col_end: usize) -> Result<String> {
    remove_columns(text, &[(col_start, col_end)])
}

/// Remove several column ranges from every row at once
///
/// Every range is in the original text's coordinates, so the result does not
/// depend on the order of `ranges`. Overlapping ranges are merged.
pub fn remove_columns(text: &str, ranges: &[(usize, usize)]) -> Result<String> {
    if let Some((start, end)) = ranges.iter().find(|(start, end)| start > end) {
        return Err(ArchiveError::index(format!(
            "column range {}..{} is reversed",
            start, end
        )));
    }

    let mut out = String::with_capacity(text.len());
    let mut col = 0;
    for c in text.chars() {
        if c == '\r' || c == '\n' {
            out.push(c);
            col = 0;
            continue;
        }
        if !ranges.iter().any(|&(start, end)| (start..end).contains(&col)) {
            out.push(c);
        }
        col += 1;
    }
    Ok(out)
}

/// Insert at the end
pub fn append(text: &str, new_text: &str) -> String {
    let mut out = String::with_capacity(text.len() + new_text.len());
    out.push_str(text);
    out.push_str(new_text);
    out
}

/// Insert at the start
pub fn prepend(text: &str, new_text: &str) -> String {
    let mut out = String::with_capacity(text.len() + new_text.len());
    out.push_str(new_text);
    out.push_str(text);
    out
}

/// Replace every non-overlapping occurrence of `old`, scanning left to right
///
/// An empty `old` matches nothing.
pub fn replace(text: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return text.to_string();
    }
    text.replace(old, new)
}

/// Resolve a WHATWG encoding label such as `"utf-8"`, `"latin1"` or `"sjis"`
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ArchiveError::Encoding(format!("unknown encoding label '{}'", label)))
}

/// Decode `bytes`, failing on any malformed sequence
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| {
            ArchiveError::Encoding(format!("payload is not valid {}", encoding.name()))
        })
}

/// Encode `text`, failing on characters the encoding cannot represent
pub fn encode(text: &str, encoding: &'static Encoding) -> Result<Vec<u8>> {
    // encoding_rs only decodes UTF-16; its encoder would emit UTF-8
    if encoding == UTF_16LE {
        return Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect());
    }
    if encoding == UTF_16BE {
        return Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect());
    }
    if encoding == UTF_8 {
        return Ok(text.as_bytes().to_vec());
    }

    let (bytes, used, unmappable) = encoding.encode(text);
    if unmappable || used != encoding {
        return Err(ArchiveError::Encoding(format!(
            "text cannot be represented in {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}
