//! Optional WebP re-encoding stage
//!
//! - [`Encoder`] - bytes-in/bytes-out encoder seam
//! - [`CwebpEncoder`] - runs the external `cwebp` binary on scratch files
//! - [`clamp_quality`] - maps configured quality onto the encoder's range

mod cwebp;
mod traits;

pub use cwebp::CwebpEncoder;
pub use traits::{Encoder, TranscodeError};

pub const DEFAULT_QUALITY: u8 = 95;

/// Values outside 1..=100 fall back to [`DEFAULT_QUALITY`]
pub fn clamp_quality(quality: i64) -> u8 {
    match u8::try_from(quality) {
        Ok(q @ 1..=100) => q,
        _ => DEFAULT_QUALITY,
    }
}
