//! Cross-format round-trip coverage through the public dispatch API.

use rastex_rs::image_data::{ImageData, PaletteData, Rgb};
use rastex_rs::jpeg::{JpegDecoder, JpegEncoder};
use rastex_rs::{decode, decode_all, encode, sniff, ImageFormat};

fn indexed_fixture(width: usize, height: usize, colors: usize) -> ImageData {
    let palette: Vec<Rgb> = (0..colors)
        .map(|i| Rgb::new((i * 41) as u8, (i * 97) as u8, (i * 13) as u8))
        .collect();
    let depth = match colors {
        0..=2 => 1,
        3..=16 => 4,
        _ => 8,
    };
    let mut image = ImageData::new(width, height, depth, PaletteData::Indexed(palette));
    for y in 0..height {
        for x in 0..width {
            image.set_pixel(x, y, ((x * 3 + y * 7) % colors) as u32);
        }
    }
    image
}

fn truecolor_fixture(width: usize, height: usize) -> ImageData {
    let mut image = ImageData::new(width, height, 24, PaletteData::direct_rgb24());
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u32;
            let g = (y * 255 / height.max(1)) as u32;
            let b = ((x + y) * 17 % 256) as u32;
            image.set_pixel(x, y, r | g << 8 | b << 16);
        }
    }
    image
}

fn assert_pixels_equal(a: &ImageData, b: &ImageData, context: &str) {
    assert_eq!((a.width, a.height), (b.width, b.height), "{context}");
    for y in 0..a.height {
        for x in 0..a.width {
            assert_eq!(a.pixel(x, y), b.pixel(x, y), "{context} at ({x},{y})");
        }
    }
}

#[test]
fn indexed_formats_are_bit_exact() {
    for colors in [2usize, 11, 100] {
        let image = indexed_fixture(13, 9, colors);
        for format in [ImageFormat::Gif, ImageFormat::Png, ImageFormat::Bmp] {
            let bytes = encode(&image, format).unwrap();
            assert_eq!(sniff(&bytes), Some(format));
            let decoded = decode(&bytes).unwrap();
            assert_pixels_equal(&image, &decoded, &format!("{} {colors} colors", format.name()));
        }
    }
}

#[test]
fn tiff_packbits_is_bit_exact() {
    let image = indexed_fixture(13, 9, 100);
    let bytes = encode(&image, ImageFormat::Tiff).unwrap();
    assert_eq!(sniff(&bytes), Some(ImageFormat::Tiff));
    let decoded = decode(&bytes).unwrap();
    assert_pixels_equal(&image, &decoded, "tiff indexed");

    let direct = truecolor_fixture(10, 7);
    let bytes = encode(&direct, ImageFormat::Tiff).unwrap();
    assert_pixels_equal(&direct, &decode(&bytes).unwrap(), "tiff rgb");
}

#[test]
fn truecolor_png_and_bmp_are_bit_exact() {
    let image = truecolor_fixture(17, 11);
    for format in [ImageFormat::Png, ImageFormat::Bmp] {
        let bytes = encode(&image, format).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_pixels_equal(&image, &decoded, format.name());
    }
}

#[test]
fn jpeg_roundtrip_stays_within_tolerance() {
    let image = truecolor_fixture(24, 16);
    let bytes = JpegEncoder::new().quality(92).encode(&image).unwrap();
    assert_eq!(sniff(&bytes), Some(ImageFormat::Jpeg));

    let mut decoder = JpegDecoder::new();
    let decoded = decoder.decode(&bytes).unwrap();
    assert!(decoder.warnings().is_empty(), "{:?}", decoder.warnings());
    assert_eq!((decoded.width, decoded.height), (24, 16));
    for y in 0..16 {
        for x in 0..24 {
            let want = image.pixel(x, y);
            let got = decoded.pixel(x, y);
            for shift in [0u32, 8, 16] {
                let a = (want >> shift & 0xFF) as i32;
                let b = (got >> shift & 0xFF) as i32;
                assert!(
                    (a - b).abs() <= 24,
                    "channel off by {} at ({x},{y})",
                    (a - b).abs()
                );
            }
        }
    }
}

#[test]
fn animated_gif_frames_survive() {
    let mut frames = vec![indexed_fixture(8, 8, 4), indexed_fixture(8, 8, 4)];
    frames[1].x = 2;
    frames[1].y = 3;
    frames[1].delay_time_cs = 50;
    let bytes = rastex_rs::gif::GifEncoder::new()
        .loop_count(0)
        .encode_frames(&frames)
        .unwrap();
    let decoded = decode_all(&bytes).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!((decoded[1].x, decoded[1].y), (2, 3));
    assert_eq!(decoded[1].delay_time_cs, 50);
    assert_pixels_equal(&frames[0], &decoded[0], "frame 0");
}

#[test]
fn png_alpha_plane_roundtrips() {
    let mut image = truecolor_fixture(4, 4);
    image.alpha_data = Some((0..16).map(|i| (i * 16) as u8).collect());
    let bytes = encode(&image, ImageFormat::Png).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.alpha_data, image.alpha_data);
    assert_pixels_equal(&image, &decoded, "rgba png");
}
