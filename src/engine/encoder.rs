// src/engine/encoder.rs
//
// Encoder adapters: JPEG (mozjpeg), PNG and GIF (image crate).
// Output format always equals input format; all settings are fixed so a
// given pixel buffer encodes to identical bytes on every run.

use crate::engine::common::run_with_panic_policy;
use crate::engine::format::ImageKind;
use crate::error::{ImagicError, Result};
use image::{DynamicImage, ImageFormat};
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

/// JPEG re-encode quality. The source quality cannot be recovered from the
/// decoded stream, so re-encoding uses this fixed value.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encode a pixel buffer back into `kind`, re-embedding `icc` where the
/// container supports it (JPEG APP2, PNG iCCP; GIF carries no profile).
pub fn encode_image(img: &DynamicImage, kind: ImageKind, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    match kind {
        ImageKind::Jpeg => encode_jpeg(img, DEFAULT_JPEG_QUALITY, icc),
        ImageKind::Png => encode_png(img, icc),
        ImageKind::Gif => encode_gif(img),
    }
}

/// Encode to JPEG using mozjpeg with fixed web-optimized settings
pub fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        use mozjpeg::{ColorSpace, Compress, ScanMode};
        use std::borrow::Cow;

        let quality = quality.min(100);

        // Zero-copy optimization: avoid conversion if already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ImagicError::encode_failed(
                "jpeg",
                "width or height is zero",
            ));
        }

        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ImagicError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }

        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ImagicError::corrupted_image());
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ImagicError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ImagicError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ImagicError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;

            output
        };

        if let Some(icc_data) = icc {
            embed_icc_jpeg(encoded, icc_data)
        } else {
            Ok(encoded)
        }
    })
}

/// Embed ICC profile into JPEG using img-parts
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:embed_icc", || {
        use img_parts::jpeg::{markers::APP2, JpegSegment};
        use img_parts::Bytes;

        let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data))
            .map_err(|e| ImagicError::decode_failed(format!("failed to parse JPEG for ICC: {e}")))?;

        let mut marker_data = Vec::with_capacity(14 + icc.len());
        marker_data.extend_from_slice(b"ICC_PROFILE\0");
        marker_data.push(1);
        marker_data.push(1);
        marker_data.extend_from_slice(icc);

        let segment = JpegSegment::new_with_contents(APP2, Bytes::from(marker_data));

        let segments = jpeg.segments_mut();
        segments.insert(0, segment);

        let mut output = Vec::new();
        jpeg.encoder().write_to(&mut output).map_err(|e| {
            ImagicError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

/// Encode to PNG using the image crate. The color type of the buffer is
/// preserved (an RGBA buffer stays RGBA, a Luma buffer stays grayscale).
pub fn encode_png(img: &DynamicImage, icc: Option<&[u8]>) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ImagicError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        if let Some(icc_data) = icc {
            embed_icc_png(buf, icc_data)
        } else {
            Ok(buf)
        }
    })
}

/// Embed ICC profile into PNG using img-parts
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png:embed_icc", || {
        use img_parts::Bytes;

        let mut png = Png::from_bytes(Bytes::from(png_data))
            .map_err(|e| ImagicError::decode_failed(format!("failed to parse PNG for ICC: {e}")))?;

        png.set_icc_profile(Some(Bytes::from(icc.to_vec())));

        let mut output = Vec::new();
        png.encoder().write_to(&mut output).map_err(|e| {
            ImagicError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

/// Encode to GIF using the image crate (single frame, palette quantized by
/// the encoder - deterministic for a fixed pixel buffer).
pub fn encode_gif(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
            .map_err(|e| ImagicError::encode_failed("gif", format!("GIF encode failed: {e}")))?;
        Ok(buf)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::decode_image;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_encode_jpeg_round_trips() {
        let img = create_test_image(16, 16);
        let bytes = encode_jpeg(&img, 90, None).unwrap();
        let (decoded, kind) = decode_image(&bytes).unwrap();
        assert_eq!(kind, ImageKind::Jpeg);
        assert_eq!(decoded.dimensions(), (16, 16));
    }

    #[test]
    fn test_encode_png_preserves_rgba_color_type() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 200])));
        let bytes = encode_png(&img, None).unwrap();
        let (decoded, kind) = decode_image(&bytes).unwrap();
        assert_eq!(kind, ImageKind::Png);
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 200]);
    }

    #[test]
    fn test_encode_gif_round_trips() {
        let img = create_test_image(8, 6);
        let bytes = encode_gif(&img).unwrap();
        let (decoded, kind) = decode_image(&bytes).unwrap();
        assert_eq!(kind, ImageKind::Gif);
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[test]
    fn test_encode_image_dispatches_by_kind() {
        let img = create_test_image(5, 5);
        for kind in [ImageKind::Png, ImageKind::Jpeg, ImageKind::Gif] {
            let bytes = encode_image(&img, kind, None).unwrap();
            assert_eq!(ImageKind::detect(&bytes), Some(kind));
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let img = create_test_image(32, 20);
        for kind in [ImageKind::Png, ImageKind::Jpeg, ImageKind::Gif] {
            let first = encode_image(&img, kind, None).unwrap();
            let second = encode_image(&img, kind, None).unwrap();
            assert_eq!(first, second, "{kind} encode must be reproducible");
        }
    }

    #[test]
    fn test_encode_jpeg_rejects_zero_dimension() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = encode_jpeg(&img, 90, None).unwrap_err();
        assert!(matches!(err, ImagicError::EncodeFailed { .. }));
    }
}
