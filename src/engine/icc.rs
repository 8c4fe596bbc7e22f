// src/engine/icc.rs
//
// ICC profile extraction for pass-through re-encoding.
// JPEG carries profiles in APP2 markers, PNG in the iCCP chunk. GIF has no
// profile container, so GIF inputs always yield None.

use crate::engine::format::ImageKind;
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};

/// Extract the ICC profile from encoded image data, if present and valid.
///
/// Absent, unparseable, or malformed profiles all yield `None` - a missing
/// profile never fails the pipeline.
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    let icc_data = match ImageKind::detect(data)? {
        ImageKind::Jpeg => extract_icc_from_jpeg(data)?,
        ImageKind::Png => extract_icc_from_png(data)?,
        ImageKind::Gif => return None,
    };

    if validate_icc_profile(&icc_data) {
        Some(icc_data)
    } else {
        // Invalid ICC profile - skip it
        None
    }
}

/// Extract ICC profile from JPEG data
pub(crate) fn extract_icc_from_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    let jpeg = Jpeg::from_bytes(data.to_vec().into()).ok()?;
    jpeg.icc_profile().map(|icc| icc.to_vec())
}

/// Extract ICC profile from PNG data
pub(crate) fn extract_icc_from_png(data: &[u8]) -> Option<Vec<u8>> {
    let png = Png::from_bytes(data.to_vec().into()).ok()?;
    png.icc_profile().map(|icc| icc.to_vec())
}

/// Validate ICC profile header
/// ICC profiles must start with a 128-byte header containing specific fields
pub(crate) fn validate_icc_profile(icc_data: &[u8]) -> bool {
    // Minimum ICC profile size is 128 bytes (header)
    if icc_data.len() < 128 {
        return false;
    }

    // Check profile size field (bytes 0-3, big-endian)
    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;

    // Profile size must match actual data length
    if profile_size != icc_data.len() {
        return false;
    }

    // Check preferred CMM type (bytes 4-7) - should be ASCII
    // Common values: "ADBE", "appl", "lcms", etc.
    for &byte in &icc_data[4..8] {
        if !(32..=126).contains(&byte) && byte != 0 {
            return false;
        }
    }

    // Check profile version (bytes 8-11)
    // Major version should be reasonable (typically 2, 4, or 5)
    let major_version = icc_data[8];
    if major_version > 10 {
        return false;
    }

    // Profile class (bytes 12-15), data color space (16-19) and PCS (20-23)
    // are all four-character ASCII signatures
    for &byte in &icc_data[12..24] {
        if !(32..=126).contains(&byte) && byte != 0 {
            return false;
        }
    }

    true
}
