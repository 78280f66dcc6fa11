//! Image, audio and video metadata extraction
//!
//! Every parser here walks container structure only (chunk, box, frame and
//! element headers); no sample data is decoded. Fields that cannot be found
//! are left as `None` rather than failing the add.

use super::{be_u16, be_u24, be_u32, be_u64, le_u16, le_u32, le_u64, EntryCodec};
use crate::catalog::{
    ByteRange, Category, CoverArt, ImageFormat, ImageInfo, MediaFormat, MediaInfo, Metadata,
};
use crate::error::{ArchiveError, Result};
use crate::registry::{self, Format};
use tracing::trace;

pub struct ImageCodec;

impl EntryCodec for ImageCodec {
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>> {
        registry::validate(Category::Image, ext, payload).map(Some)
    }

    fn extract_metadata(&self, payload: &[u8], format: Option<Format>) -> Result<Option<Metadata>> {
        let Some(Format::Image(format)) = format else {
            return Err(ArchiveError::validation("image format was not detected"));
        };
        let (width, height) = image_dimensions(payload, format).ok_or_else(|| {
            ArchiveError::validation(format!("{:?} header is truncated or malformed", format))
        })?;
        trace!("{:?} image: {}x{}", format, width, height);
        Ok(Some(Metadata::Image(ImageInfo {
            format,
            width,
            height,
        })))
    }
}

/// Audio or video codec; the category decides which metadata variant is produced
pub struct MediaCodec {
    category: Category,
}

impl MediaCodec {
    pub const fn new(category: Category) -> Self {
        MediaCodec { category }
    }
}

impl EntryCodec for MediaCodec {
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>> {
        registry::validate(self.category, ext, payload).map(Some)
    }

    fn extract_metadata(&self, payload: &[u8], format: Option<Format>) -> Result<Option<Metadata>> {
        let Some(Format::Media(format)) = format else {
            return Err(ArchiveError::validation("media format was not detected"));
        };
        let info = media_info(payload, format);
        trace!(
            "{:?} {}: duration {:?}, cover {:?}",
            format,
            self.category,
            info.duration_secs,
            info.cover
        );
        Ok(Some(match self.category {
            Category::Video => Metadata::Video(info),
            _ => Metadata::Audio(info),
        }))
    }
}

/// Pixel dimensions from an image header
pub fn image_dimensions(bytes: &[u8], format: ImageFormat) -> Option<(u32, u32)> {
    match format {
        ImageFormat::Png => {
            if bytes.get(12..16)? != b"IHDR" {
                return None;
            }
            Some((be_u32(bytes, 16)?, be_u32(bytes, 20)?))
        }
        ImageFormat::Jpeg => jpeg_dimensions(bytes),
        ImageFormat::Gif => Some((le_u16(bytes, 6)? as u32, le_u16(bytes, 8)? as u32)),
        ImageFormat::Bmp => {
            let width = le_u32(bytes, 18)? as i32;
            let height = le_u32(bytes, 22)? as i32;
            Some((width.unsigned_abs(), height.unsigned_abs()))
        }
        ImageFormat::WebP => webp_dimensions(bytes),
    }
}

/// Scan JPEG segments up to the first start-of-frame marker
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        // Fill bytes
        while *bytes.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = *bytes.get(pos + 1)?;
        pos += 2;

        match marker {
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD8 => continue,
            // Scan data reached without a frame header
            0xD9 | 0xDA => return None,
            // SOF0..SOF15 except DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be_u16(bytes, pos + 3)? as u32;
                let width = be_u16(bytes, pos + 5)? as u32;
                return Some((width, height));
            }
            _ => {
                let len = be_u16(bytes, pos)? as usize;
                if len < 2 {
                    return None;
                }
                pos += len;
            }
        }
    }
}

fn webp_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match bytes.get(12..16)? {
        b"VP8 " => {
            let width = le_u16(bytes, 26)? & 0x3FFF;
            let height = le_u16(bytes, 28)? & 0x3FFF;
            Some((width as u32, height as u32))
        }
        b"VP8L" => {
            let b = bytes.get(21..25)?;
            let width = 1 + (b[0] as u32 | ((b[1] as u32 & 0x3F) << 8));
            let height = 1 + ((b[1] as u32 >> 6) | ((b[2] as u32) << 2) | ((b[3] as u32 & 0x0F) << 10));
            Some((width, height))
        }
        b"VP8X" => {
            let b = bytes.get(24..30)?;
            let width = 1 + (b[0] as u32 | (b[1] as u32) << 8 | (b[2] as u32) << 16);
            let height = 1 + (b[3] as u32 | (b[4] as u32) << 8 | (b[5] as u32) << 16);
            Some((width, height))
        }
        _ => None,
    }
}

/// Duration, stream parameters and cover art for an audio/video payload
pub fn media_info(bytes: &[u8], format: MediaFormat) -> MediaInfo {
    let mut info = MediaInfo::new(format);
    match format {
        MediaFormat::Wav => wav_info(bytes, &mut info),
        MediaFormat::Avi => avi_info(bytes, &mut info),
        MediaFormat::Mp3 => mp3_info(bytes, &mut info),
        MediaFormat::Flac => flac_info(bytes, &mut info),
        MediaFormat::Ogg => ogg_info(bytes, &mut info),
        MediaFormat::Mp4 => mp4_info(bytes, &mut info),
        MediaFormat::Matroska => matroska_info(bytes, &mut info),
    }
    info
}

// RIFF (WAV, AVI)

struct Chunk<'a> {
    id: &'a [u8],
    data: &'a [u8],
}

/// RIFF chunks in `bytes[start..]`; a truncated final chunk is clipped
fn riff_chunks(bytes: &[u8], start: usize) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut pos = start;
    while let Some(size) = le_u32(bytes, pos + 4) {
        let data_start = pos + 8;
        let data_end = data_start.saturating_add(size as usize).min(bytes.len());
        chunks.push(Chunk {
            id: &bytes[pos..pos + 4],
            data: &bytes[data_start..data_end],
        });
        // Chunks are padded to even sizes
        pos = data_start.saturating_add(size as usize + (size as usize & 1));
    }
    chunks
}

fn wav_info(bytes: &[u8], info: &mut MediaInfo) {
    let mut byte_rate = None;
    for chunk in riff_chunks(bytes, 12) {
        match chunk.id {
            b"fmt " => {
                info.channels = le_u16(chunk.data, 2);
                info.sample_rate = le_u32(chunk.data, 4);
                byte_rate = le_u32(chunk.data, 8).filter(|&rate| rate > 0);
            }
            b"data" => {
                if let Some(rate) = byte_rate {
                    info.duration_secs = Some(chunk.data.len() as f64 / rate as f64);
                }
            }
            _ => {}
        }
    }
}

fn avi_info(bytes: &[u8], info: &mut MediaInfo) {
    let Some(hdrl) = riff_chunks(bytes, 12)
        .into_iter()
        .find(|chunk| chunk.id == b"LIST" && chunk.data.starts_with(b"hdrl"))
    else {
        return;
    };
    let Some(avih) = riff_chunks(hdrl.data, 4)
        .into_iter()
        .find(|chunk| chunk.id == b"avih")
    else {
        return;
    };

    let micros_per_frame = le_u32(avih.data, 0);
    let total_frames = le_u32(avih.data, 16);
    if let (Some(micros), Some(frames)) = (micros_per_frame, total_frames) {
        info.duration_secs = Some(micros as f64 * frames as f64 / 1_000_000.0);
    }
    info.width = le_u32(avih.data, 32).filter(|&w| w > 0);
    info.height = le_u32(avih.data, 36).filter(|&h| h > 0);
}

// MP3

fn synchsafe(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    if b.iter().any(|byte| byte & 0x80 != 0) {
        return None;
    }
    Some((b[0] as u32) << 21 | (b[1] as u32) << 14 | (b[2] as u32) << 7 | b[3] as u32)
}

fn mp3_info(bytes: &[u8], info: &mut MediaInfo) {
    let mut audio_start = 0;

    if bytes.starts_with(b"ID3") {
        if let Some(tag_size) = synchsafe(bytes, 6) {
            let major = bytes[3];
            let flags = bytes[5];
            let footer = if flags & 0x10 != 0 { 10 } else { 0 };
            let tag_end = (10 + tag_size as usize).min(bytes.len());
            info.cover = id3_cover(&bytes[..tag_end], major, flags);
            audio_start = (tag_end + footer).min(bytes.len());
        }
    }

    let Some(frame_start) = find_mpeg_frame(bytes, audio_start) else {
        return;
    };
    let Some(frame) = MpegFrame::parse(&bytes[frame_start..]) else {
        return;
    };
    info.sample_rate = Some(frame.sample_rate);
    info.channels = Some(frame.channels);

    // Xing/Info or VBRI header gives an exact frame count
    let xing_at = frame_start + 4 + frame.side_info_len();
    let frame_count = match bytes.get(xing_at..xing_at + 4) {
        Some(b"Xing") | Some(b"Info") => be_u32(bytes, xing_at + 4)
            .filter(|flags| flags & 0x01 != 0)
            .and_then(|_| be_u32(bytes, xing_at + 8)),
        _ if bytes.get(frame_start + 36..frame_start + 40) == Some(b"VBRI") => {
            be_u32(bytes, frame_start + 50)
        }
        _ => None,
    };

    info.duration_secs = match frame_count {
        Some(frames) => Some(frames as f64 * frame.samples_per_frame as f64 / frame.sample_rate as f64),
        None if frame.bitrate_kbps > 0 => {
            let mut audio_len = bytes.len() - frame_start;
            // ID3v1 trailer
            if bytes.len() >= 128 && &bytes[bytes.len() - 128..bytes.len() - 125] == b"TAG" {
                audio_len = audio_len.saturating_sub(128);
            }
            Some(audio_len as f64 * 8.0 / (frame.bitrate_kbps as f64 * 1000.0))
        }
        None => None,
    };
}

fn find_mpeg_frame(bytes: &[u8], from: usize) -> Option<usize> {
    // Encoders pad between the tag and the first frame; a few KiB is plenty
    let limit = bytes.len().min(from.saturating_add(64 * 1024));
    (from..limit).find(|&pos| MpegFrame::parse(&bytes[pos..]).is_some())
}

struct MpegFrame {
    /// 1 = MPEG-1, 2 = MPEG-2, 25 = MPEG-2.5
    version: u8,
    layer: u8,
    bitrate_kbps: u32,
    sample_rate: u32,
    channels: u16,
    samples_per_frame: u32,
}

impl MpegFrame {
    fn parse(bytes: &[u8]) -> Option<Self> {
        let h = bytes.get(0..4)?;
        if h[0] != 0xFF || h[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = match (h[1] >> 3) & 0x03 {
            0 => 25,
            2 => 2,
            3 => 1,
            _ => return None,
        };
        let layer = match (h[1] >> 1) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return None,
        };
        let bitrate_index = (h[2] >> 4) as usize;
        let rate_index = ((h[2] >> 2) & 0x03) as usize;
        if bitrate_index == 0x0F || rate_index == 3 {
            return None;
        }

        const V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
        const V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
        const V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
        const V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
        const V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

        let bitrate_kbps = match (version, layer) {
            (1, 1) => V1_L1[bitrate_index],
            (1, 2) => V1_L2[bitrate_index],
            (1, _) => V1_L3[bitrate_index],
            (_, 1) => V2_L1[bitrate_index],
            _ => V2_L23[bitrate_index],
        };
        let sample_rate = match version {
            1 => [44100, 48000, 32000][rate_index],
            2 => [22050, 24000, 16000][rate_index],
            _ => [11025, 12000, 8000][rate_index],
        };
        let samples_per_frame = match (version, layer) {
            (_, 1) => 384,
            (1, _) | (_, 2) => 1152,
            _ => 576,
        };
        let channels = if h[3] >> 6 == 3 { 1 } else { 2 };

        Some(MpegFrame {
            version,
            layer,
            bitrate_kbps,
            sample_rate,
            channels,
            samples_per_frame,
        })
    }

    /// Layer III side information length, which precedes a Xing header
    fn side_info_len(&self) -> usize {
        if self.layer != 3 {
            return 0;
        }
        match (self.version == 1, self.channels == 1) {
            (true, false) => 32,
            (true, true) | (false, false) => 17,
            (false, true) => 9,
        }
    }
}

/// Locate the first attached picture inside an ID3v2 tag
fn id3_cover(tag: &[u8], major: u8, flags: u8) -> Option<CoverArt> {
    let mut pos = 10;

    // Extended header
    if flags & 0x40 != 0 && major >= 3 {
        let size = if major == 4 {
            synchsafe(tag, pos)? as usize
        } else {
            be_u32(tag, pos)? as usize + 4
        };
        pos += size;
    }

    let (id_len, header_len) = if major == 2 { (3, 6) } else { (4, 10) };
    while pos + header_len <= tag.len() {
        let id = &tag[pos..pos + id_len];
        if id[0] == 0 {
            break; // padding
        }
        let size = match major {
            2 => be_u24(tag, pos + 3)?,
            3 => be_u32(tag, pos + 4)?,
            _ => synchsafe(tag, pos + 4)?,
        } as usize;
        let data_start = pos + header_len;
        let data_end = data_start.checked_add(size)?.min(tag.len());

        if id == b"APIC" || id == b"PIC" {
            return picture_frame(tag, data_start, data_end, major == 2);
        }
        pos = data_end;
    }
    None
}

fn picture_frame(tag: &[u8], start: usize, end: usize, v22: bool) -> Option<CoverArt> {
    let frame = tag.get(start..end)?;
    let encoding = *frame.first()?;
    let mut pos = 1;

    let mime = if v22 {
        let fmt = frame.get(1..4)?;
        pos = 4;
        match fmt {
            b"PNG" => "image/png".to_string(),
            b"JPG" => "image/jpeg".to_string(),
            other => format!("image/{}", String::from_utf8_lossy(other).to_ascii_lowercase()),
        }
    } else {
        let nul = frame[pos..].iter().position(|&b| b == 0)?;
        let mime = String::from_utf8_lossy(&frame[pos..pos + nul]).into_owned();
        pos += nul + 1;
        mime
    };

    pos += 1; // picture type

    // Description, terminated by one or two NULs depending on the text encoding
    if matches!(encoding, 1 | 2) {
        let mut i = pos;
        while i + 1 < frame.len() && !(frame[i] == 0 && frame[i + 1] == 0) {
            i += 2;
        }
        pos = i + 2;
    } else {
        let nul = frame.get(pos..)?.iter().position(|&b| b == 0)?;
        pos += nul + 1;
    }

    if pos >= frame.len() {
        return None;
    }
    Some(CoverArt {
        range: ByteRange::new((start + pos) as u64, (frame.len() - pos) as u64),
        mime: Some(mime),
    })
}

// FLAC

fn flac_info(bytes: &[u8], info: &mut MediaInfo) {
    let mut pos = 4;
    loop {
        let Some(&block_header) = bytes.get(pos) else {
            return;
        };
        let Some(len) = be_u24(bytes, pos + 1) else {
            return;
        };
        let data_start = pos + 4;
        let data_end = data_start + len as usize;
        let Some(data) = bytes.get(data_start..data_end) else {
            return;
        };

        match block_header & 0x7F {
            0 if data.len() >= 18 => {
                let sample_rate = (data[10] as u32) << 12 | (data[11] as u32) << 4 | (data[12] as u32) >> 4;
                let channels = ((data[12] >> 1) & 0x07) as u16 + 1;
                let total_samples = ((data[13] & 0x0F) as u64) << 32 | be_u32(data, 14).unwrap_or(0) as u64;
                info.channels = Some(channels);
                if sample_rate > 0 {
                    info.sample_rate = Some(sample_rate);
                    if total_samples > 0 {
                        info.duration_secs = Some(total_samples as f64 / sample_rate as f64);
                    }
                }
            }
            6 if info.cover.is_none() => {
                info.cover = flac_picture(data).map(|(offset, len, mime)| CoverArt {
                    range: ByteRange::new((data_start + offset) as u64, len as u64),
                    mime: Some(mime),
                });
            }
            _ => {}
        }

        if block_header & 0x80 != 0 {
            return;
        }
        pos = data_end;
    }
}

/// (offset within block, length, MIME type) of a PICTURE block's image
fn flac_picture(data: &[u8]) -> Option<(usize, usize, String)> {
    let mime_len = be_u32(data, 4)? as usize;
    let mime = String::from_utf8_lossy(data.get(8..8 + mime_len)?).into_owned();
    let desc_at = 8 + mime_len;
    let desc_len = be_u32(data, desc_at)? as usize;
    // width, height, depth, colours
    let len_at = desc_at + 4 + desc_len + 16;
    let image_len = be_u32(data, len_at)? as usize;
    let image_at = len_at + 4;
    data.get(image_at..image_at + image_len)?;
    Some((image_at, image_len, mime))
}

// Ogg

fn ogg_info(bytes: &[u8], info: &mut MediaInfo) {
    let Some(&segments) = bytes.get(26) else {
        return;
    };
    let packet = &bytes[(27 + segments as usize).min(bytes.len())..];

    let (rate, pre_skip) = if packet.starts_with(b"\x01vorbis") {
        info.channels = packet.get(11).map(|&c| c as u16);
        (le_u32(packet, 12), 0)
    } else if packet.starts_with(b"OpusHead") {
        info.channels = packet.get(9).map(|&c| c as u16);
        // Opus granule positions always count 48 kHz samples
        (Some(48_000), le_u16(packet, 10).unwrap_or(0) as u64)
    } else {
        (None, 0)
    };
    let Some(rate) = rate.filter(|&r| r > 0) else {
        return;
    };
    info.sample_rate = Some(if packet.starts_with(b"OpusHead") {
        le_u32(packet, 12).filter(|&r| r > 0).unwrap_or(rate)
    } else {
        rate
    });

    let last_page = bytes.windows(4).rposition(|w| w == b"OggS");
    if let Some(granule) = last_page.and_then(|pos| le_u64(bytes, pos + 6)) {
        if granule != u64::MAX {
            info.duration_secs = Some(granule.saturating_sub(pre_skip) as f64 / rate as f64);
        }
    }
}

// ISO base media (MP4, M4A, MOV)

struct Mp4Box {
    kind: [u8; 4],
    start: usize,
    end: usize,
}

fn mp4_boxes(bytes: &[u8], start: usize, end: usize) -> Vec<Mp4Box> {
    let mut boxes = Vec::new();
    let mut pos = start;
    let end = end.min(bytes.len());
    while pos + 8 <= end {
        let Some(size32) = be_u32(bytes, pos) else {
            break;
        };
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&bytes[pos + 4..pos + 8]);

        let (header, size) = match size32 {
            0 => (8, end - pos),
            1 => match be_u64(bytes, pos + 8) {
                Some(size) => (16, usize::try_from(size).unwrap_or(usize::MAX)),
                None => break,
            },
            size => (8, size as usize),
        };
        if size < header {
            break;
        }
        let box_end = pos.saturating_add(size).min(end);
        boxes.push(Mp4Box {
            kind,
            start: pos + header,
            end: box_end,
        });
        pos = box_end;
    }
    boxes
}

fn find_box<'a>(boxes: &'a [Mp4Box], kind: &[u8; 4]) -> Option<&'a Mp4Box> {
    boxes.iter().find(|b| &b.kind == kind)
}

fn mp4_info(bytes: &[u8], info: &mut MediaInfo) {
    let top = mp4_boxes(bytes, 0, bytes.len());
    let Some(moov) = find_box(&top, b"moov") else {
        return;
    };
    let children = mp4_boxes(bytes, moov.start, moov.end);

    if let Some(mvhd) = find_box(&children, b"mvhd") {
        let (timescale, duration) = if bytes.get(mvhd.start) == Some(&1) {
            (be_u32(bytes, mvhd.start + 20), be_u64(bytes, mvhd.start + 24))
        } else {
            (be_u32(bytes, mvhd.start + 12), be_u32(bytes, mvhd.start + 16).map(u64::from))
        };
        if let (Some(timescale), Some(duration)) = (timescale, duration) {
            if timescale > 0 {
                info.duration_secs = Some(duration as f64 / timescale as f64);
            }
        }
    }

    // Track headers carry presentation size as 16.16 fixed point
    for trak in children.iter().filter(|b| &b.kind == b"trak") {
        let trak_children = mp4_boxes(bytes, trak.start, trak.end);
        if let Some(tkhd) = find_box(&trak_children, b"tkhd") {
            let at = if bytes.get(tkhd.start) == Some(&1) { 88 } else { 76 };
            let width = be_u32(bytes, tkhd.start + at).map(|w| w >> 16).unwrap_or(0);
            let height = be_u32(bytes, tkhd.start + at + 4).map(|h| h >> 16).unwrap_or(0);
            if width > 0 && height > 0 {
                info.width = Some(width);
                info.height = Some(height);
                break;
            }
        }
    }

    info.cover = mp4_cover(bytes, &children);
}

/// moov/udta/meta/ilst/covr/data
fn mp4_cover(bytes: &[u8], moov_children: &[Mp4Box]) -> Option<CoverArt> {
    let udta = find_box(moov_children, b"udta")?;
    let udta_children = mp4_boxes(bytes, udta.start, udta.end);
    let meta = find_box(&udta_children, b"meta")?;

    // iTunes-style meta is a full box; QuickTime's is not
    let meta_start = if be_u32(bytes, meta.start) == Some(0) {
        meta.start + 4
    } else {
        meta.start
    };
    let meta_children = mp4_boxes(bytes, meta_start, meta.end);
    let ilst = find_box(&meta_children, b"ilst")?;
    let ilst_children = mp4_boxes(bytes, ilst.start, ilst.end);
    let covr = find_box(&ilst_children, b"covr")?;
    let covr_children = mp4_boxes(bytes, covr.start, covr.end);
    let data = find_box(&covr_children, b"data")?;

    // Type indicator and locale precede the image bytes
    let type_indicator = be_u32(bytes, data.start)? & 0x00FF_FFFF;
    let image_start = data.start + 8;
    if image_start >= data.end {
        return None;
    }
    let mime = match type_indicator {
        13 => Some("image/jpeg".to_string()),
        14 => Some("image/png".to_string()),
        27 => Some("image/bmp".to_string()),
        _ => None,
    };
    Some(CoverArt {
        range: ByteRange::new(image_start as u64, (data.end - image_start) as u64),
        mime,
    })
}

// Matroska / WebM

const EBML_SEGMENT: u32 = 0x1853_8067;
const EBML_INFO: u32 = 0x1549_A966;
const EBML_TIMECODE_SCALE: u32 = 0x2A_D7B1;
const EBML_DURATION: u32 = 0x4489;
const EBML_TRACKS: u32 = 0x1654_AE6B;
const EBML_TRACK_ENTRY: u32 = 0xAE;
const EBML_VIDEO: u32 = 0xE0;
const EBML_PIXEL_WIDTH: u32 = 0xB0;
const EBML_PIXEL_HEIGHT: u32 = 0xBA;

struct Element {
    id: u32,
    start: usize,
    end: usize,
}

/// Element ID with its length marker kept, and the ID's encoded length
fn ebml_id(bytes: &[u8], pos: usize) -> Option<(u32, usize)> {
    let first = *bytes.get(pos)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return None;
    }
    let raw = bytes.get(pos..pos + len)?;
    Some((raw.iter().fold(0u32, |acc, &b| acc << 8 | b as u32), len))
}

/// Data size with the marker stripped; `None` in the value means unknown size
fn ebml_size(bytes: &[u8], pos: usize) -> Option<(Option<u64>, usize)> {
    let first = *bytes.get(pos)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return None;
    }
    let raw = bytes.get(pos..pos + len)?;
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let value = raw[1..]
        .iter()
        .fold((first & mask) as u64, |acc, &b| acc << 8 | b as u64);
    let all_ones = value == (1u64 << (7 * len)) - 1;
    Some((if all_ones { None } else { Some(value) }, len))
}

fn ebml_elements(bytes: &[u8], start: usize, end: usize) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut pos = start;
    let end = end.min(bytes.len());
    while pos < end {
        let Some((id, id_len)) = ebml_id(bytes, pos) else {
            break;
        };
        let Some((size, size_len)) = ebml_size(bytes, pos + id_len) else {
            break;
        };
        let data_start = pos + id_len + size_len;
        let data_end = match size {
            Some(size) => data_start.saturating_add(size as usize).min(end),
            None => end,
        };
        elements.push(Element {
            id,
            start: data_start,
            end: data_end,
        });
        pos = data_end;
    }
    elements
}

fn ebml_uint(bytes: &[u8], element: &Element) -> Option<u64> {
    let data = bytes.get(element.start..element.end)?;
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    Some(data.iter().fold(0u64, |acc, &b| acc << 8 | b as u64))
}

fn ebml_float(bytes: &[u8], element: &Element) -> Option<f64> {
    let data = bytes.get(element.start..element.end)?;
    match data.len() {
        4 => Some(f32::from_be_bytes(data.try_into().ok()?) as f64),
        8 => Some(f64::from_be_bytes(data.try_into().ok()?)),
        _ => None,
    }
}

fn matroska_info(bytes: &[u8], info: &mut MediaInfo) {
    let top = ebml_elements(bytes, 0, bytes.len());
    let Some(segment) = top.iter().find(|e| e.id == EBML_SEGMENT) else {
        return;
    };
    let children = ebml_elements(bytes, segment.start, segment.end);

    if let Some(seg_info) = children.iter().find(|e| e.id == EBML_INFO) {
        let fields = ebml_elements(bytes, seg_info.start, seg_info.end);
        let scale = fields
            .iter()
            .find(|e| e.id == EBML_TIMECODE_SCALE)
            .and_then(|e| ebml_uint(bytes, e))
            .unwrap_or(1_000_000);
        if let Some(duration) = fields
            .iter()
            .find(|e| e.id == EBML_DURATION)
            .and_then(|e| ebml_float(bytes, e))
        {
            info.duration_secs = Some(duration * scale as f64 / 1e9);
        }
    }

    if let Some(tracks) = children.iter().find(|e| e.id == EBML_TRACKS) {
        for entry in ebml_elements(bytes, tracks.start, tracks.end)
            .iter()
            .filter(|e| e.id == EBML_TRACK_ENTRY)
        {
            let fields = ebml_elements(bytes, entry.start, entry.end);
            let Some(video) = fields.iter().find(|e| e.id == EBML_VIDEO) else {
                continue;
            };
            let video_fields = ebml_elements(bytes, video.start, video.end);
            let dim = |id| {
                video_fields
                    .iter()
                    .find(|e| e.id == id)
                    .and_then(|e| ebml_uint(bytes, e))
                    .and_then(|v| u32::try_from(v).ok())
            };
            info.width = dim(EBML_PIXEL_WIDTH);
            info.height = dim(EBML_PIXEL_HEIGHT);
            break;
        }
    }
}
