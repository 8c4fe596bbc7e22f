// src/engine.rs
//
// The core of imagic. A synchronous pipeline that:
// 1. Sniffs the format from magic bytes
// 2. Decodes through the per-format codec adapters
// 3. Applies transformations in caller order
// 4. Re-encodes to the original format
//
// This file is a facade that delegates to the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
/// This is the same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

mod api;
mod common;
mod decoder;
mod encoder;
mod format;
mod icc;
mod pipeline;

// Re-export commonly used types and functions
pub use api::{apply, parse, ImageInfo};
pub use decoder::{check_dimensions, decode_image, decode_jpeg_mozjpeg, decode_png_zune};
pub use encoder::{
    embed_icc_jpeg, embed_icc_png, encode_gif, encode_image, encode_jpeg, encode_png,
    DEFAULT_JPEG_QUALITY,
};
pub use format::ImageKind;
pub use icc::extract_icc_profile;
pub use pipeline::{apply_transformations, calc_resize_dimensions, fast_resize_owned};
