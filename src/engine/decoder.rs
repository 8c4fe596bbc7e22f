// src/engine/decoder.rs
//
// Decoder adapters: JPEG (mozjpeg), PNG (zune-png), GIF (image crate)

use crate::engine::common::run_with_panic_policy;
use crate::engine::format::ImageKind;
use crate::error::{ImagicError, Result};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use std::io::Cursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
/// This is SIGNIFICANTLY faster than image crate's pure Rust decoder
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ImagicError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ImagicError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        // Header dimensions, bomb-checked before decompression starts
        check_dimensions(decompress.width() as u32, decompress.height() as u32)?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ImagicError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width_u32 = decompress.width() as u32;
        let height_u32 = decompress.height() as u32;

        // Read all scanlines
        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ImagicError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        // Safe conversion from Vec<[u8; 3]> to Vec<u8>
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
            ImagicError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);

        // Headers first: dimensions are bomb-checked before the pixel buffer
        // for the full image is allocated
        decoder
            .decode_headers()
            .map_err(|e| ImagicError::decode_failed(format!("png: header parse failed: {e}")))?;
        let (width, height) = {
            let info = decoder
                .get_info()
                .ok_or_else(|| ImagicError::decode_failed("png: missing header info"))?;
            (info.width as u32, info.height as u32)
        };
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| ImagicError::decode_failed(format!("png: decode failed: {e}")))?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ImagicError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| ImagicError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ImagicError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| ImagicError::decode_failed("png: failed to build RGBA image"))?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ImagicError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| ImagicError::decode_failed("png: failed to build LumaA image"))?,
            other => {
                return Err(ImagicError::decode_failed(format!(
                    "png: unsupported colorspace {:?}",
                    other
                )))
            }
        };

        Ok(img)
    })
}

/// Decode GIF using the image crate (first frame of animated inputs).
pub fn decode_gif_image(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:gif", || {
        // Logical screen descriptor first: bomb-check before any frame decode
        let (width, height) = ImageReader::with_format(Cursor::new(data), ImageFormat::Gif)
            .into_dimensions()
            .map_err(|e| ImagicError::decode_failed(format!("gif: header parse failed: {e}")))?;
        check_dimensions(width, height)?;

        let img = image::load_from_memory_with_format(data, ImageFormat::Gif)
            .map_err(|e| ImagicError::decode_failed(format!("gif: decode failed: {e}")))?;
        Ok(img)
    })
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes); unknown signatures fail before any
///   decode work is attempted
/// - Route JPEG to mozjpeg, PNG to zune-png, GIF to the image crate
/// - Return decoded image and detected format
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, ImageKind)> {
    let kind = ImageKind::detect(bytes)
        .ok_or_else(|| ImagicError::unsupported_format("unknown signature"))?;
    let img = match kind {
        ImageKind::Jpeg => decode_jpeg_mozjpeg(bytes)?,
        ImageKind::Png => decode_png_zune(bytes)?,
        ImageKind::Gif => decode_gif_image(bytes)?,
    };
    Ok((img, kind))
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImagicError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImagicError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}
