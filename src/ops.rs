// src/ops.rs
//
// Transformation descriptors.
// These are cheap to create and store - the expensive work happens in apply().

use image::Rgba;

/// Fully opaque white, for background flattening.
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Fully opaque black, for background flattening.
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Image transformations applied by [`apply`](crate::apply) in caller order,
/// left to right. No reordering or normalization happens behind the caller's
/// back: `Resize` before `Padding` yields `target + 2 * pixels` final
/// dimensions, the reverse pads first and then scales the padded canvas.
///
/// Design principle: each transformation is self-contained and stateless -
/// a pure function of (pixel buffer, parameters).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transformation {
    /// Scale so the longer axis equals `size`, preserving aspect ratio.
    /// Lanczos3 convolution; upscaling is allowed.
    Resize { size: u32 },

    /// Expand the canvas by `pixels` on every side, source centered.
    /// The border is transparent black; `pixels = 0` is the identity.
    Padding { pixels: u32 },

    /// Flatten alpha over a solid color; output is fully opaque.
    /// No-op for buffers without an alpha channel.
    ChangeBackground { color: Rgba<u8> },
}

impl Transformation {
    /// Resize so the longer axis equals `size`.
    pub fn resize(size: u32) -> Self {
        Self::Resize { size }
    }

    /// Pad every side by `pixels`.
    pub fn padding(pixels: u32) -> Self {
        Self::Padding { pixels }
    }

    /// Composite over `color` and drop transparency.
    pub fn change_background(color: Rgba<u8>) -> Self {
        Self::ChangeBackground { color }
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::Padding { .. } => "padding",
            Self::ChangeBackground { .. } => "change_background",
        }
    }
}
