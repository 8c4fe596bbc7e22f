// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic boundary around native codec calls.

use crate::error::{ImagicError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec stage with a panic boundary.
///
/// mozjpeg and the resize kernels call into code that can panic on malformed
/// input; a panic must never cross the library boundary. Any caught panic is
/// converted into `ImagicError::InternalPanic` tagged with the stage name.
pub fn run_with_panic_policy<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ImagicError::internal_panic(format!("{stage}: {message}")))
        }
    }
}
