//! Fixture builders shared by the integration tests

#![allow(dead_code)]

use crudearch::codec::picture::{encode_png, PixelBuffer};

/// 2x2 PNG: red, green, blue, white
pub fn tiny_png() -> Vec<u8> {
    let pixels = PixelBuffer {
        width: 2,
        height: 2,
        rgba: vec![
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 255, 255,
        ],
    };
    encode_png(&pixels).expect("fixture PNG encodes")
}

/// One second of silent MPEG-1 Layer III audio behind an ID3v2.3 tag whose
/// APIC frame holds `cover` (if any)
pub fn mp3_with_cover(cover: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut bytes = b"ID3\x03\x00\x00".to_vec();
    let mut tag = Vec::new();
    if let Some((mime, image)) = cover {
        let mut frame = vec![0x00];
        frame.extend_from_slice(mime.as_bytes());
        frame.push(0);
        frame.push(3);
        frame.extend_from_slice(b"cover\0");
        frame.extend_from_slice(image);

        tag.extend_from_slice(b"APIC");
        tag.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        tag.extend_from_slice(&[0, 0]);
        tag.extend_from_slice(&frame);
    }
    let size = tag.len() as u32;
    bytes.extend_from_slice(&[
        (size >> 21) as u8 & 0x7F,
        (size >> 14) as u8 & 0x7F,
        (size >> 7) as u8 & 0x7F,
        size as u8 & 0x7F,
    ]);
    bytes.extend_from_slice(&tag);

    // 128 kbps, 44.1 kHz, stereo
    let audio_start = bytes.len();
    bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
    bytes.resize(audio_start + 16_000, 0);
    bytes
}

/// PCM WAV with `seconds` of silence
pub fn wav(sample_rate: u32, channels: u16, seconds: u32) -> Vec<u8> {
    let byte_rate = sample_rate * channels as u32 * 2;
    let data_len = byte_rate * seconds;
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);
    bytes
}

/// TrueType offset table with no tables
pub fn empty_ttf() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x01, 0x00, 0x00];
    bytes.extend_from_slice(&[0u8; 8]);
    bytes
}

/// `n` x `n` vertex grid triangulated into an OBJ mesh
pub fn grid_obj(n: usize) -> Vec<u8> {
    let mut out = String::new();
    for y in 0..n {
        for x in 0..n {
            out.push_str(&format!("v {} {} 0\n", x, y));
        }
    }
    for y in 0..n - 1 {
        for x in 0..n - 1 {
            let i = y * n + x + 1;
            out.push_str(&format!("f {} {} {}\n", i, i + 1, i + n));
            out.push_str(&format!("f {} {} {}\n", i + 1, i + n + 1, i + n));
        }
    }
    out.into_bytes()
}

/// NumPy v1.0 file with the given `descr` and shape tuple text
pub fn npy(descr: &str, shape: &str, body: &[u8]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape
    );
    while (10 + dict.len() + 1) % 64 != 0 {
        dict.push(' ');
    }
    dict.push('\n');

    let mut out = b"\x93NUMPY\x01\x00".to_vec();
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend_from_slice(body);
    out
}
