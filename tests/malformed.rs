//! Damage tolerance and the concrete acceptance scenarios: GIF byte
//! layout, minimal JPEG decode, zero-width PNG rejection, and restart
//! resynchronization after corrupted entropy data.

use rastex_rs::deflate::crc32;
use rastex_rs::image_data::{ImageData, PaletteData, Rgb};
use rastex_rs::jpeg::{JpegDecoder, JpegEncoder};
use rastex_rs::png::PngDecoder;
use rastex_rs::{CodecError, ImageFormat};

#[test]
fn two_by_two_gif_layout() {
    let palette = vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)];
    let mut image = ImageData::new(2, 2, 1, PaletteData::Indexed(palette));
    image.set_pixel(0, 0, 1);
    image.set_pixel(1, 1, 1);
    let bytes = rastex_rs::encode(&image, ImageFormat::Gif).unwrap();

    assert_eq!(&bytes[..6], b"GIF89a");
    // Global color table flag set with a 2-entry table.
    assert_eq!(bytes[10] & 0x80, 0x80);
    assert_eq!(bytes[10] & 0x07, 0);
    assert_eq!(&bytes[13..19], &[0, 0, 0, 255, 255, 255]);
    // One image descriptor and the trailer.
    assert_eq!(bytes.iter().filter(|&&b| b == 0x2C).count(), 1);
    assert_eq!(*bytes.last().unwrap(), 0x3B);
}

#[test]
fn minimal_black_jpeg_decodes_to_black() {
    let palette: Vec<Rgb> = (0..256).map(|i| Rgb::new(i as u8, i as u8, i as u8)).collect();
    let image = ImageData::new(1, 1, 8, PaletteData::Indexed(palette));
    let bytes = JpegEncoder::new().quality(90).encode(&image).unwrap();

    let mut decoder = JpegDecoder::new();
    let decoded = decoder.decode(&bytes).unwrap();
    assert_eq!((decoded.width, decoded.height), (1, 1));
    assert!(decoded.pixel(0, 0) <= 2, "pixel {}", decoded.pixel(0, 0));
    assert!(decoder.warnings().is_empty());
}

fn png_chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    let mut crc_input = kind.to_vec();
    crc_input.extend_from_slice(payload);
    out.extend_from_slice(&crc32(&crc_input).to_be_bytes());
    out
}

#[test]
fn zero_width_png_is_rejected() {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&0u32.to_be_bytes()); // width
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);
    bytes.extend_from_slice(&png_chunk(b"IHDR", &ihdr));
    bytes.extend_from_slice(&png_chunk(b"IEND", &[]));

    let err = PngDecoder::new().decode(&bytes).unwrap_err();
    assert!(
        matches!(err, CodecError::InvalidImage(_) | CodecError::InvalidImageDetail(_)),
        "{err}"
    );
}

#[test]
fn restart_markers_resynchronize_after_corruption() {
    // 16x16 grayscale, one MCU per restart interval: four entropy
    // segments separated by RST0..RST2.
    let palette: Vec<Rgb> = (0..256).map(|i| Rgb::new(i as u8, i as u8, i as u8)).collect();
    let mut image = ImageData::new(16, 16, 8, PaletteData::Indexed(palette));
    for y in 0..16 {
        for x in 0..16 {
            image.set_pixel(x, y, if x < 8 { 64 } else { 192 });
        }
    }
    let bytes = JpegEncoder::new()
        .quality(95)
        .restart_interval(1)
        .encode(&image)
        .unwrap();

    // Corrupt the second MCU: stuffed 0xFF bytes right after RST0 feed
    // the entropy decoder an impossible all-ones Huffman code.
    let rst0 = bytes
        .windows(2)
        .position(|w| w == [0xFF, 0xD0])
        .expect("encoder emits RST0");
    let mut damaged = bytes.clone();
    damaged.splice(rst0 + 2..rst0 + 2, [0xFF, 0x00, 0xFF, 0x00]);

    let mut decoder = JpegDecoder::new();
    let decoded = decoder.decode(&damaged).unwrap();
    assert!(
        !decoder.warnings().is_empty(),
        "corruption should be reported"
    );

    // MCU 0 (top-left block) and the second row of MCUs decode intact.
    for (x, y) in [(0usize, 0usize), (7, 7), (0, 12), (15, 15)] {
        let want = image.pixel(x, y) as i32;
        let got = decoded.pixel(x, y) as i32;
        assert!(
            (want - got).abs() <= 8,
            "pixel ({x},{y}): want {want}, got {got}"
        );
    }
}

#[test]
fn truncated_gif_keeps_decoded_frames() {
    let palette = vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)];
    let mut frame = ImageData::new(4, 4, 1, PaletteData::Indexed(palette));
    frame.set_pixel(1, 1, 1);
    let mut bytes = rastex_rs::gif::GifEncoder::new()
        .encode_frames(&[frame.clone(), frame])
        .unwrap();
    bytes.truncate(bytes.len() - 5);

    let mut decoder = rastex_rs::gif::GifDecoder::new();
    let frames = decoder.decode(&bytes).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(!decoder.warnings().is_empty());
}

#[test]
fn png_crc_mismatch_is_fatal() {
    let mut image = ImageData::new(2, 2, 24, PaletteData::direct_rgb24());
    image.set_pixel(0, 0, 0xFF);
    let mut bytes = rastex_rs::encode(&image, ImageFormat::Png).unwrap();
    let len = bytes.len();
    bytes[len - 5] ^= 0xFF; // inside the IEND CRC
    assert!(PngDecoder::new().decode(&bytes).is_err());
}

#[test]
fn unsupported_jpeg_frames_are_distinguished() {
    // SOI + arithmetic-coded SOF9 header.
    let bytes = [
        0xFFu8, 0xD8, 0xFF, 0xC9, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11,
        0x00,
    ];
    let err = JpegDecoder::new().decode(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::NotImplemented(_)), "{err}");
}
