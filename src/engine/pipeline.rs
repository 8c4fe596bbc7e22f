// src/engine/pipeline.rs
//
// Transformation pipeline: resize calculation, Lanczos3 resampling,
// padding composition and background flattening.
//
// Determinism is part of the contract: every function here is a pure
// function of (buffer, parameters), so a fixed input always produces a
// bit-identical output. The resampling algorithm is pinned to Lanczos3
// convolution over straight-alpha buffers (premultiplied internally for the
// convolution, divided back out afterwards).

use crate::engine::decoder::check_dimensions;
use crate::error::{ImagicError, Result};
use crate::ops::Transformation;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage, RgbImage};

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_imagic_error(self) -> ImagicError {
        ImagicError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// Calculate resize dimensions from the longer-axis rule: the longer of
/// (width, height) becomes `target`, the other axis scales by the same
/// factor with round-to-nearest. A square source yields (target, target).
pub fn calc_resize_dimensions(orig_w: u32, orig_h: u32, target: u32) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (0, 0);
    }
    if orig_w >= orig_h {
        let scaled = (orig_h as f64 * target as f64 / orig_w as f64).round() as u32;
        (target, scaled)
    } else {
        let scaled = (orig_w as f64 * target as f64 / orig_h as f64).round() as u32;
        (scaled, target)
    }
}

/// Apply transformations left to right. The first failing stage aborts the
/// whole pipeline; no partial buffer escapes.
pub fn apply_transformations(
    img: DynamicImage,
    transformations: &[Transformation],
) -> Result<DynamicImage> {
    let mut img = img;
    for transformation in transformations {
        img = match *transformation {
            Transformation::Resize { size } => resize_to_target(img, size)?,
            Transformation::Padding { pixels } => pad_image(img, pixels)?,
            Transformation::ChangeBackground { color } => flatten_background(img, color),
        };
    }
    Ok(img)
}

fn resize_to_target(img: DynamicImage, size: u32) -> Result<DynamicImage> {
    let (orig_w, orig_h) = (img.width(), img.height());
    let (dst_w, dst_h) = calc_resize_dimensions(orig_w, orig_h, size);
    if size == 0 || dst_w == 0 || dst_h == 0 {
        return Err(ImagicError::invalid_dimensions(dst_w, dst_h));
    }
    check_dimensions(dst_w, dst_h)?;

    if (dst_w, dst_h) == (orig_w, orig_h) {
        return Ok(img);
    }

    // The resize kernels work on packed RGB8/RGBA8; normalize other layouts
    let src_image = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    };

    fast_resize_owned(src_image, dst_w, dst_h).map_err(|err| err.into_imagic_error())
}

/// Expand the canvas by `pixels` on every side, copying the source centered.
///
/// The border fill is transparent black on an RGBA canvas regardless of the
/// source layout; alpha-less re-encodes drop the alpha channel, which leaves
/// the border black there. `pixels = 0` returns the input untouched.
fn pad_image(img: DynamicImage, pixels: u32) -> Result<DynamicImage> {
    if pixels == 0 {
        return Ok(img);
    }

    let padded_w = img.width() as u64 + 2 * pixels as u64;
    let padded_h = img.height() as u64 + 2 * pixels as u64;
    if padded_w > MAX_DIMENSION as u64 || padded_h > MAX_DIMENSION as u64 {
        return Err(ImagicError::dimension_exceeds_limit(
            padded_w.max(padded_h).min(u32::MAX as u64) as u32,
            MAX_DIMENSION,
        ));
    }
    if padded_w * padded_h > MAX_PIXELS {
        return Err(ImagicError::pixel_count_exceeds_limit(
            padded_w * padded_h,
            MAX_PIXELS,
        ));
    }

    // RgbaImage::new zero-fills, i.e. transparent black
    let mut canvas = RgbaImage::new(padded_w as u32, padded_h as u32);
    let source = img.into_rgba8();
    imageops::replace(&mut canvas, &source, pixels as i64, pixels as i64);
    Ok(DynamicImage::ImageRgba8(canvas))
}

/// Composite every pixel over `color` with straight (unpremultiplied) alpha:
/// `out = src * a + color * (255 - a)`, exactly rounded, then force the
/// output alpha to 255. Buffers without an alpha channel pass through
/// untouched, and an already-opaque buffer re-flattens to identical pixels.
fn flatten_background(img: DynamicImage, color: Rgba<u8>) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }

    let mut rgba = img.into_rgba8();
    for pixel in rgba.pixels_mut() {
        let alpha = pixel.0[3] as u32;
        for channel in 0..3 {
            let src = pixel.0[channel] as u32;
            let bg = color.0[channel] as u32;
            pixel.0[channel] = ((src * alpha + bg * (255 - alpha) + 127) / 255) as u8;
        }
        pixel.0[3] = 255;
    }
    DynamicImage::ImageRgba8(rgba)
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Lanczos3 resize with owned DynamicImage (zero-copy for RGB/RGBA)
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Select pixel layout without forcing RGBA when not needed.
    // into_raw() transfers buffer ownership instead of copying.
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => {
            let rgba = other.to_rgba8();
            (PixelType::U8x4, rgba.into_raw())
        }
    };

    fast_resize_impl(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

fn fast_resize_impl(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let premultiply = needs_premultiply(&src_pixels, pixel_type);

    let primary_result = if premultiply {
        // Premultiply an owned copy; `src_pixels` stays straight-alpha so the
        // fallback below never resizes a premultiplied buffer
        copy_pixels_to_aligned_image(src_width, src_height, pixel_type, &src_pixels, required_bytes)
            .and_then(|mut owned| {
                MulDiv::default()
                    .multiply_alpha_inplace(&mut owned)
                    .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
                resize_with_source_image(owned, pixel_type, dst_width, dst_height, true)
            })
    } else {
        match fir::images::Image::from_slice_u8(
            src_width,
            src_height,
            src_pixels.as_mut_slice(),
            pixel_type,
        ) {
            Ok(src_image) => {
                resize_with_source_image(src_image, pixel_type, dst_width, dst_height, false)
            }
            Err(ImageBufferError::InvalidBufferAlignment) => {
                let aligned = copy_pixels_to_aligned_image(
                    src_width,
                    src_height,
                    pixel_type,
                    &src_pixels,
                    required_bytes,
                )?;
                resize_with_source_image(aligned, pixel_type, dst_width, dst_height, false)
            }
            Err(other) => Err(format!("fir source image error: {other:?}")),
        }
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => resize_with_image_crate_fallback(
            &src_pixels,
            src_width,
            src_height,
            pixel_type,
            dst_width,
            dst_height,
        )
        .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}")),
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {required_bytes} bytes, got {} bytes",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    Ok(aligned_image)
}

/// Decide whether alpha premultiplication is required for a given buffer.
/// RGB has no alpha; an RGBA buffer that is already fully opaque can skip
/// the multiply/divide round trip.
fn needs_premultiply(pixels: &[u8], pixel_type: PixelType) -> bool {
    if pixel_type != PixelType::U8x4 {
        return false;
    }
    pixels.iter().skip(3).step_by(4).any(|&alpha| alpha != 255)
}

fn resize_with_source_image(
    src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    premultiplied: bool,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiplied {
        MulDiv::default()
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{BLACK, WHITE};
    use image::GenericImageView;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn create_transparent_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([200, 100, 50, ((x * 7 + y * 13) % 256) as u8])
        }))
    }

    mod resize_dimension_tests {
        use super::*;

        #[test]
        fn square_source_hits_target_exactly() {
            assert_eq!(calc_resize_dimensions(300, 300, 200), (200, 200));
        }

        #[test]
        fn landscape_scales_height_by_width_ratio() {
            // round(2184 * 200 / 2624) = 166
            assert_eq!(calc_resize_dimensions(2624, 2184, 200), (200, 166));
        }

        #[test]
        fn portrait_scales_width_by_height_ratio() {
            // round(822 * 200 / 1165)... width is the shorter axis here
            assert_eq!(calc_resize_dimensions(1165, 822, 200), (200, 141));
            assert_eq!(calc_resize_dimensions(822, 1165, 200), (141, 200));
        }

        #[test]
        fn upscaling_is_allowed() {
            assert_eq!(calc_resize_dimensions(400, 400, 1000), (1000, 1000));
        }

        #[test]
        fn extreme_ratio_rounds_to_zero() {
            // 10000:1 strip shrunk to 5 collapses the short axis
            assert_eq!(calc_resize_dimensions(10000, 1, 5), (5, 0));
        }

        #[test]
        fn zero_source_collapses() {
            assert_eq!(calc_resize_dimensions(0, 100, 50), (0, 0));
        }
    }

    mod resize_tests {
        use super::*;

        #[test]
        fn resize_square_to_target() {
            let out =
                apply_transformations(create_test_image(300, 300), &[Transformation::resize(200)])
                    .unwrap();
            assert_eq!(out.dimensions(), (200, 200));
        }

        #[test]
        fn resize_preserves_aspect_ratio() {
            let out =
                apply_transformations(create_test_image(2624, 2184), &[Transformation::resize(200)])
                    .unwrap();
            assert_eq!(out.dimensions(), (200, 166));
        }

        #[test]
        fn resize_1x1_upscale() {
            let out =
                apply_transformations(create_test_image(1, 1), &[Transformation::resize(100)])
                    .unwrap();
            assert_eq!(out.dimensions(), (100, 100));
        }

        #[test]
        fn resize_to_current_size_is_identity() {
            let src = create_test_image(64, 64);
            let expected = src.clone();
            let out = apply_transformations(src, &[Transformation::resize(64)]).unwrap();
            assert_eq!(out.to_rgb8().as_raw(), expected.to_rgb8().as_raw());
        }

        #[test]
        fn resize_zero_target_is_invalid() {
            let err = apply_transformations(create_test_image(10, 10), &[Transformation::resize(0)])
                .unwrap_err();
            assert!(matches!(err, ImagicError::InvalidDimensions { .. }));
        }

        #[test]
        fn resize_collapsing_an_axis_is_invalid() {
            let err =
                apply_transformations(create_test_image(10000, 1), &[Transformation::resize(5)])
                    .unwrap_err();
            assert!(matches!(err, ImagicError::InvalidDimensions { .. }));
        }

        #[test]
        fn resize_keeps_straight_alpha_colors() {
            // A uniform semi-transparent buffer must come back with (nearly)
            // the same straight-alpha color; premultiplied pixels leaking
            // through would darken the channels toward [100, 50, 25].
            let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                16,
                16,
                Rgba([200, 100, 50, 128]),
            ));
            let out = apply_transformations(src, &[Transformation::resize(8)]).unwrap();
            let pixel = out.to_rgba8().get_pixel(4, 4).0;
            assert_eq!(pixel[3], 128);
            for (got, want) in pixel.iter().zip([200u8, 100, 50]) {
                let diff = (*got as i16 - want as i16).abs();
                assert!(diff <= 2, "channel {got} drifted from {want}");
            }
        }

        #[test]
        fn fallback_resize_preserves_straight_alpha() {
            let rgba = RgbaImage::from_pixel(10, 10, Rgba([200, 100, 50, 128]));
            let out =
                resize_with_image_crate_fallback(rgba.as_raw(), 10, 10, PixelType::U8x4, 5, 5)
                    .unwrap();
            let pixel = out.to_rgba8().get_pixel(2, 2).0;
            assert_eq!(pixel[3], 128);
            for (got, want) in pixel.iter().zip([200u8, 100, 50]) {
                let diff = (*got as i16 - want as i16).abs();
                assert!(diff <= 1, "channel {got} drifted from {want}");
            }
        }

        #[test]
        fn resize_is_deterministic() {
            let first = apply_transformations(
                create_transparent_image(123, 77),
                &[Transformation::resize(50)],
            )
            .unwrap();
            let second = apply_transformations(
                create_transparent_image(123, 77),
                &[Transformation::resize(50)],
            )
            .unwrap();
            assert_eq!(first.to_rgba8().as_raw(), second.to_rgba8().as_raw());
        }
    }

    mod padding_tests {
        use super::*;

        #[test]
        fn padding_zero_is_identity() {
            let src = create_test_image(30, 20);
            let expected = src.clone();
            let out = apply_transformations(src, &[Transformation::padding(0)]).unwrap();
            assert_eq!(out.to_rgb8().as_raw(), expected.to_rgb8().as_raw());
        }

        #[test]
        fn padding_expands_canvas_on_all_sides() {
            let out = apply_transformations(create_test_image(30, 20), &[Transformation::padding(5)])
                .unwrap();
            assert_eq!(out.dimensions(), (40, 30));
        }

        #[test]
        fn padding_border_is_transparent_and_source_centered() {
            let out = apply_transformations(
                create_test_image(2, 2),
                &[Transformation::padding(3)],
            )
            .unwrap();
            let rgba = out.to_rgba8();
            assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0]);
            assert_eq!(rgba.get_pixel(7, 7).0, [0, 0, 0, 0]);
            // Source pixel (0,0) of the test image is [0, 0, 128]
            assert_eq!(rgba.get_pixel(3, 3).0, [0, 0, 128, 255]);
        }

        #[test]
        fn resize_then_padding_adds_to_target() {
            let out = apply_transformations(
                create_test_image(300, 300),
                &[Transformation::resize(200), Transformation::padding(20)],
            )
            .unwrap();
            assert_eq!(out.dimensions(), (240, 240));
        }

        #[test]
        fn padding_past_dimension_limit_is_rejected() {
            let err = apply_transformations(
                create_test_image(4, 4),
                &[Transformation::padding(20000)],
            )
            .unwrap_err();
            assert!(matches!(err, ImagicError::DimensionExceedsLimit { .. }));
        }
    }

    mod background_tests {
        use super::*;

        #[test]
        fn flatten_makes_output_opaque() {
            let out = apply_transformations(
                create_transparent_image(16, 16),
                &[Transformation::change_background(WHITE)],
            )
            .unwrap();
            assert!(out.to_rgba8().pixels().all(|p| p.0[3] == 255));
        }

        #[test]
        fn flatten_white_and_black_differ() {
            let white = apply_transformations(
                create_transparent_image(16, 16),
                &[Transformation::change_background(WHITE)],
            )
            .unwrap();
            let black = apply_transformations(
                create_transparent_image(16, 16),
                &[Transformation::change_background(BLACK)],
            )
            .unwrap();
            assert_ne!(white.to_rgba8().as_raw(), black.to_rgba8().as_raw());
        }

        #[test]
        fn flatten_is_idempotent() {
            let once = apply_transformations(
                create_transparent_image(16, 16),
                &[Transformation::change_background(WHITE)],
            )
            .unwrap();
            let twice = apply_transformations(
                once.clone(),
                &[Transformation::change_background(WHITE)],
            )
            .unwrap();
            assert_eq!(once.to_rgba8().as_raw(), twice.to_rgba8().as_raw());
        }

        #[test]
        fn flatten_is_noop_for_rgb() {
            let src = create_test_image(8, 8);
            let expected = src.clone();
            let out = apply_transformations(src, &[Transformation::change_background(BLACK)])
                .unwrap();
            assert!(matches!(out, DynamicImage::ImageRgb8(_)));
            assert_eq!(out.to_rgb8().as_raw(), expected.to_rgb8().as_raw());
        }

        #[test]
        fn flatten_blends_half_transparent_pixel() {
            let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                1,
                1,
                Rgba([200, 100, 50, 128]),
            ));
            let out = apply_transformations(src, &[Transformation::change_background(WHITE)])
                .unwrap();
            // out = (src * 128 + 255 * 127 + 127) / 255, truncating
            let pixel = out.to_rgba8().get_pixel(0, 0).0;
            assert_eq!(pixel, [227, 177, 152, 255]);
        }
    }

    #[test]
    fn empty_transformation_list_is_identity() {
        let src = create_test_image(12, 9);
        let expected = src.clone();
        let out = apply_transformations(src, &[]).unwrap();
        assert_eq!(out.to_rgb8().as_raw(), expected.to_rgb8().as_raw());
    }
}
