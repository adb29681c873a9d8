//! rastex CLI - decode, encode, and inspect raster image files.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;

use rastex_rs::image_data::{ImageData, PaletteData, Rgb};
use rastex_rs::jpeg::JpegEncoder;
use rastex_rs::ImageFormat;

#[derive(Parser)]
#[command(name = "rastex")]
#[command(version)]
#[command(about = "Raster image codec for GIF, PNG, JPEG, BMP, ICO and TIFF", long_about = None)]
#[command(after_help = "EXAMPLES:
    rastex decode -i image.gif -o pixels.raw
    rastex decode -i photo.jpg -o photo.ppm -f ppm
    rastex encode -i pixels.raw -o out.png -w 640 -H 480
    rastex info -i icon.ico")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an image to raw RGB pixels or a PPM file
    ///
    /// The input format is detected from its signature bytes.
    #[command(visible_alias = "d")]
    Decode {
        /// Input image file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: raw (packed RGB) or ppm
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,
    },

    /// Encode raw packed RGB pixels to an image file
    ///
    /// Palette formats (gif) require the input to use 256 or fewer
    /// distinct colors.
    #[command(visible_alias = "e")]
    Encode {
        /// Input raw RGB pixel file (3 bytes per pixel, row-major)
        #[arg(short, long)]
        input: PathBuf,

        /// Output image file
        #[arg(short, long)]
        output: PathBuf,

        /// Image width in pixels
        #[arg(short, long)]
        width: usize,

        /// Image height in pixels
        #[arg(short = 'H', long)]
        height: usize,

        /// Target format
        #[arg(short, long, default_value = "png", value_enum)]
        format: TargetFormat,

        /// JPEG quality (1-100)
        #[arg(short, long, default_value = "85")]
        quality: u8,
    },

    /// Print image metadata
    #[command(visible_alias = "i")]
    Info {
        /// Input image file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Packed 8-bit RGB triples
    Raw,
    /// Portable PixMap (P6)
    Ppm,
}

#[derive(Clone, ValueEnum)]
enum TargetFormat {
    Gif,
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Decode {
            input,
            output,
            format,
        } => decode_image(&input, &output, &format),
        Commands::Encode {
            input,
            output,
            width,
            height,
            format,
            quality,
        } => encode_image(&input, &output, width, height, &format, quality),
        Commands::Info { input } => show_info(&input),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn decode_image(input: &PathBuf, output: &PathBuf, format: &OutputFormat) -> CliResult {
    let data = fs::read(input)?;
    let image = rastex_rs::decode(&data)?;
    let rgb = to_rgb_bytes(&image);
    match format {
        OutputFormat::Raw => fs::write(output, &rgb)?,
        OutputFormat::Ppm => {
            let mut out = format!("P6\n{} {}\n255\n", image.width, image.height).into_bytes();
            out.extend_from_slice(&rgb);
            fs::write(output, &out)?;
        }
    }
    println!(
        "Decoded {}x{} image ({} bpp) to {:?}",
        image.width, image.height, image.depth, output
    );
    Ok(())
}

fn encode_image(
    input: &PathBuf,
    output: &PathBuf,
    width: usize,
    height: usize,
    format: &TargetFormat,
    quality: u8,
) -> CliResult {
    let pixels = fs::read(input)?;
    if pixels.len() < width * height * 3 {
        return Err(format!(
            "need {} bytes of RGB data, got {}",
            width * height * 3,
            pixels.len()
        )
        .into());
    }

    let encoded = match format {
        TargetFormat::Jpeg => {
            let image = truecolor_image(&pixels, width, height);
            JpegEncoder::new().quality(quality).encode(&image)?
        }
        TargetFormat::Png => {
            rastex_rs::encode(&truecolor_image(&pixels, width, height), ImageFormat::Png)?
        }
        TargetFormat::Bmp => {
            rastex_rs::encode(&truecolor_image(&pixels, width, height), ImageFormat::Bmp)?
        }
        TargetFormat::Tiff => {
            rastex_rs::encode(&truecolor_image(&pixels, width, height), ImageFormat::Tiff)?
        }
        TargetFormat::Gif => {
            let image = indexed_image(&pixels, width, height)
                .ok_or("gif output requires 256 or fewer distinct colors")?;
            rastex_rs::encode(&image, ImageFormat::Gif)?
        }
    };
    fs::write(output, &encoded)?;
    println!("Encoded {}x{} image to {:?}", width, height, output);
    Ok(())
}

fn show_info(input: &PathBuf) -> CliResult {
    let data = fs::read(input)?;
    let format = rastex_rs::sniff(&data).ok_or("unrecognized image format")?;
    let images = rastex_rs::decode_all(&data)?;
    println!("Format: {}", format.name());
    println!("Images: {}", images.len());
    for (index, image) in images.iter().enumerate() {
        let color = match &image.palette {
            PaletteData::Indexed(colors) => format!("indexed ({} colors)", colors.len()),
            PaletteData::Direct { .. } => "direct".to_string(),
        };
        println!(
            "  [{}] {}x{} {} bpp, {}{}{}",
            index,
            image.width,
            image.height,
            image.depth,
            color,
            if image.alpha_data.is_some() {
                ", alpha"
            } else {
                ""
            },
            if image.transparent_pixel.is_some() {
                ", transparent index"
            } else {
                ""
            },
        );
    }
    Ok(())
}

/// Expand any decoded image to packed 8-bit RGB triples.
fn to_rgb_bytes(image: &ImageData) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.width * image.height * 3);
    for y in 0..image.height {
        for x in 0..image.width {
            let pixel = image.pixel(x, y);
            let rgb = match &image.palette {
                PaletteData::Indexed(colors) => colors
                    .get(pixel as usize)
                    .copied()
                    .unwrap_or(Rgb::new(0, 0, 0)),
                PaletteData::Direct {
                    red_mask,
                    green_mask,
                    blue_mask,
                } => Rgb::new(
                    mask_channel(pixel, *red_mask),
                    mask_channel(pixel, *green_mask),
                    mask_channel(pixel, *blue_mask),
                ),
            };
            out.extend_from_slice(&[rgb.red, rgb.green, rgb.blue]);
        }
    }
    out
}

/// Extract a channel through its mask and scale it to 8 bits.
fn mask_channel(pixel: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let bits = (mask >> shift).count_ones();
    let value = (pixel & mask) >> shift;
    if bits >= 8 {
        (value >> (bits - 8)) as u8
    } else {
        // Replicate high bits into the low positions, e.g. 5-bit 0x1F -> 0xFF.
        let scaled = value << (8 - bits);
        (scaled | (scaled >> bits)) as u8
    }
}

fn truecolor_image(pixels: &[u8], width: usize, height: usize) -> ImageData {
    let mut image = ImageData::new(width, height, 24, PaletteData::direct_rgb24());
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 3;
            let value =
                pixels[i] as u32 | (pixels[i + 1] as u32) << 8 | (pixels[i + 2] as u32) << 16;
            image.set_pixel(x, y, value);
        }
    }
    image
}

/// Build an indexed image if the pixels use at most 256 distinct colors.
fn indexed_image(pixels: &[u8], width: usize, height: usize) -> Option<ImageData> {
    let mut palette: Vec<Rgb> = Vec::new();
    let mut indices = Vec::with_capacity(width * height);
    for chunk in pixels[..width * height * 3].chunks_exact(3) {
        let color = Rgb::new(chunk[0], chunk[1], chunk[2]);
        let index = match palette.iter().position(|&c| c == color) {
            Some(index) => index,
            None => {
                if palette.len() == 256 {
                    return None;
                }
                palette.push(color);
                palette.len() - 1
            }
        };
        indices.push(index as u32);
    }
    let depth = match palette.len() {
        0..=2 => 1,
        3..=16 => 4,
        _ => 8,
    };
    let mut image = ImageData::new(width, height, depth, PaletteData::Indexed(palette));
    for y in 0..height {
        for x in 0..width {
            image.set_pixel(x, y, indices[y * width + x]);
        }
    }
    Some(image)
}
