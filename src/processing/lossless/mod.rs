//! Format-specific lossless recompression.

mod jpeg;
mod png;

pub use jpeg::transcode_progressive;
pub use png::recompress_png;
