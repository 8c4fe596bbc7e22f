// src/engine/api.rs
//
// The public entry points: parse() for metadata, apply() for the
// detect -> decode -> transform -> encode pipeline.

use crate::engine::decoder::decode_image;
use crate::engine::encoder::encode_image;
use crate::engine::format::ImageKind;
use crate::engine::icc::extract_icc_profile;
use crate::engine::pipeline::apply_transformations;
use crate::error::Result;
use crate::ops::Transformation;

/// Intrinsic metadata of an encoded image, captured once per decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Length of the encoded input in bytes
    pub size: usize,
    /// Detected format
    pub format: ImageKind,
}

/// Decode enough of `bytes` to report width, height, byte length and format.
///
/// An unrecognized signature fails with `UnsupportedFormat` before any decode
/// work; a recognized but corrupt payload fails with `DecodeFailed`. There is
/// no partial `ImageInfo` - the `Err` arm carries the absence.
pub fn parse(bytes: &[u8]) -> Result<ImageInfo> {
    let (img, kind) = decode_image(bytes)?;
    Ok(ImageInfo {
        width: img.width(),
        height: img.height(),
        size: bytes.len(),
        format: kind,
    })
}

/// Decode `bytes`, apply `transformations` in the given order, and re-encode
/// to the original format.
///
/// The first failing stage aborts the pipeline; no partial output is
/// returned. An empty transformation list is a plain decode/re-encode round
/// trip. ICC profiles found in the source are carried over to the output
/// where the container supports them.
pub fn apply(bytes: &[u8], transformations: &[Transformation]) -> Result<Vec<u8>> {
    let icc = extract_icc_profile(bytes);
    let (img, kind) = decode_image(bytes)?;
    let img = apply_transformations(img, transformations)?;
    encode_image(&img, kind, icc.as_deref())
}
