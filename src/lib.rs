// lib.rs
//
// imagic: format-preserving image normalization
//
// Design goals:
// - Decode PNG/JPEG/GIF without caller-side format dispatch
// - Deterministic transformations (Lanczos3 resize, padding, background
//   flattening) suitable for byte-exact regression fixtures
// - Re-encode to the source format, carrying ICC profiles through
// - Stateless per call: safe to invoke concurrently over caller-owned buffers

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{apply, parse, ImageInfo, ImageKind};
pub use error::{ErrorCategory, ImagicError, Result};
pub use ops::{Transformation, BLACK, WHITE};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Formats accepted and produced by [`parse`] and [`apply`].
pub fn supported_formats() -> &'static [ImageKind] {
    &[ImageKind::Png, ImageKind::Jpeg, ImageKind::Gif]
}
