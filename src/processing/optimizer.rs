// src/processing/optimizer.rs

//! Lossless pre-optimization of matched images.
//!
//! Each file is read with `tokio::fs` and recompressed inside
//! `tokio::task::spawn_blocking` so the async runtime is never blocked. Files
//! are dispatched one at a time, in the order the glob expansion returned them.

use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::core::OptimizedFile;
use crate::processing::lossless::{recompress_png, transcode_progressive};
use crate::processing::matcher::expand_glob;
use crate::utils::{ConverterError, ConverterResult, ImageFormat, extract_filename, format_from_path};

/// Produces the batch for one run.
///
/// Implementations must yield one deterministic order per call; the encoder
/// folds files in exactly that order.
pub trait Optimizer: Send + Sync {
    fn optimize(&self, glob: &str) -> impl Future<Output = ConverterResult<Vec<OptimizedFile>>> + Send;

    /// Batch used when optimization is switched off: the matched files as
    /// they are on disk.
    fn passthrough(&self, glob: &str) -> impl Future<Output = ConverterResult<Vec<OptimizedFile>>> + Send {
        read_matches(glob)
    }
}

/// Reads every file matching `glob`, in path order, without modifying it.
pub async fn read_matches(glob: &str) -> ConverterResult<Vec<OptimizedFile>> {
    let pattern = glob.to_string();
    let paths = tokio::task::spawn_blocking(move || expand_glob(&pattern))
        .await
        .map_err(|e| ConverterError::optimization(format!("Glob expansion panicked: {e}")))??;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = tokio::fs::read(&path).await.map_err(|e| {
            ConverterError::optimization(format!("Cannot read {}: {e}", path.display()))
        })?;
        files.push(OptimizedFile::unchanged(path, contents));
    }
    Ok(files)
}

/// Default optimizer: PNG image data is re-deflated at maximum compression,
/// sequential JPEGs are transcoded to progressive, and each result is kept
/// only when smaller. Every other format passes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct LosslessOptimizer;

impl Optimizer for LosslessOptimizer {
    async fn optimize(&self, glob: &str) -> ConverterResult<Vec<OptimizedFile>> {
        let mut files = Vec::new();
        for file in read_matches(glob).await? {
            let file = tokio::task::spawn_blocking(move || optimize_single(file.path, file.contents))
                .await
                .map_err(|e| ConverterError::optimization(format!("Task panicked: {e}")))??;

            debug!(
                "'{}' → {} bytes saved ({:.1}%)",
                extract_filename(&file.path),
                file.saved_bytes(),
                file.compression_ratio()
            );
            files.push(file);
        }

        let saved: i64 = files.iter().map(OptimizedFile::saved_bytes).sum();
        info!("Optimized {} files ({} bytes saved)", files.len(), saved);
        Ok(files)
    }
}

// ── Blocking image processing (runs on tokio's blocking thread pool) ──────────────────

/// Optimises one file synchronously.
fn optimize_single(path: PathBuf, contents: Vec<u8>) -> ConverterResult<OptimizedFile> {
    // Unknown extensions are left for the MIME lookup to reject
    let candidate = match format_from_path(&path) {
        Ok(format) if format.supports_lossless_recompression() => recompress(format, &contents),
        _ => Ok(None),
    };

    let candidate = candidate.map_err(|e| match e {
        ConverterError::Optimization(msg) => {
            ConverterError::optimization(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;

    let original_size = contents.len() as u64;
    let contents = match candidate {
        Some(smaller) if smaller.len() < contents.len() => smaller,
        _ => contents,
    };

    Ok(OptimizedFile {
        path,
        contents,
        original_size,
    })
}

/// `None` when the file is already in its target encoding.
fn recompress(format: ImageFormat, contents: &[u8]) -> ConverterResult<Option<Vec<u8>>> {
    match format {
        ImageFormat::PNG => recompress_png(contents).map(Some),
        ImageFormat::JPEG => transcode_progressive(contents),
        _ => Ok(None),
    }
}
