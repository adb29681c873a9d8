//! Format sniffing and top-level decode/encode dispatch.

use crate::bmp::{self, ico, BmpDecoder, BmpEncoder};
use crate::error::{CodecError, Result};
use crate::gif::{GifDecoder, GifEncoder};
use crate::image_data::{DecodeListener, ImageData, NullListener};
use crate::jpeg::{self, JpegDecoder, JpegEncoder};
use crate::png::{self, PngDecoder, PngEncoder};
use crate::tiff::{self, TiffDecoder, TiffEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Gif,
    Png,
    Jpeg,
    Bmp,
    Ico,
    Tiff,
}

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Gif => "gif",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Ico => "ico",
            ImageFormat::Tiff => "tiff",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "gif" => ImageFormat::Gif,
            "png" => ImageFormat::Png,
            "jpeg" | "jpg" => ImageFormat::Jpeg,
            "bmp" => ImageFormat::Bmp,
            "ico" => ImageFormat::Ico,
            "tiff" | "tif" => ImageFormat::Tiff,
            _ => return None,
        })
    }
}

/// Identify a file by its signature bytes.
pub fn sniff(data: &[u8]) -> Option<ImageFormat> {
    if crate::gif::is_gif(data) {
        Some(ImageFormat::Gif)
    } else if png::is_png(data) {
        Some(ImageFormat::Png)
    } else if jpeg::is_jpeg(data) {
        Some(ImageFormat::Jpeg)
    } else if bmp::is_bmp(data) {
        Some(ImageFormat::Bmp)
    } else if ico::is_ico(data) {
        Some(ImageFormat::Ico)
    } else if tiff::is_tiff(data) {
        Some(ImageFormat::Tiff)
    } else {
        None
    }
}

/// Decode the first (or only) image in `data`, sniffing the format.
pub fn decode(data: &[u8]) -> Result<ImageData> {
    let mut images = decode_all(data)?;
    let first = images.drain(..).next();
    first.ok_or(CodecError::InvalidImage("no image decoded"))
}

/// Decode every image in `data` (GIF frames, ICO entries).
pub fn decode_all(data: &[u8]) -> Result<Vec<ImageData>> {
    decode_all_with_listener(data, &mut NullListener)
}

pub fn decode_all_with_listener(
    data: &[u8],
    listener: &mut dyn DecodeListener,
) -> Result<Vec<ImageData>> {
    match sniff(data).ok_or(CodecError::UnsupportedFormat("unrecognized signature"))? {
        ImageFormat::Gif => GifDecoder::new().decode_with_listener(data, listener),
        ImageFormat::Png => PngDecoder::new()
            .decode_with_listener(data, listener)
            .map(|image| vec![image]),
        ImageFormat::Jpeg => JpegDecoder::new()
            .decode_with_listener(data, listener)
            .map(|image| vec![image]),
        ImageFormat::Bmp => BmpDecoder::new().decode(data).map(|image| vec![image]),
        ImageFormat::Ico => ico::IcoDecoder::new().decode(data),
        ImageFormat::Tiff => TiffDecoder::new().decode(data).map(|image| vec![image]),
    }
}

/// Encode `image` in the requested container.
pub fn encode(image: &ImageData, format: ImageFormat) -> Result<Vec<u8>> {
    match format {
        ImageFormat::Gif => GifEncoder::new().encode(image),
        ImageFormat::Png => PngEncoder::new().encode(image),
        ImageFormat::Jpeg => JpegEncoder::new().encode(image),
        ImageFormat::Bmp => BmpEncoder::new().encode(image),
        ImageFormat::Tiff => TiffEncoder::new().encode(image),
        ImageFormat::Ico => Err(CodecError::UnsupportedFormat("ico encoding")),
    }
}
