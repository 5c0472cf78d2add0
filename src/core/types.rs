//! Core types shared by the optimizer, the encoder and the transformers.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

/// One image as it leaves the optimization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedFile {
    /// Path the file was matched at
    pub path: PathBuf,
    /// Bytes to encode (recompressed when that was smaller)
    pub contents: Vec<u8>,
    /// Size on disk before optimization
    pub original_size: u64,
}

impl OptimizedFile {
    /// A file that went through unchanged
    pub fn unchanged(path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        let original_size = contents.len() as u64;
        Self {
            path: path.into(),
            contents,
            original_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes saved by optimization (negative never happens, the optimizer keeps the smaller)
    pub fn saved_bytes(&self) -> i64 {
        self.original_size as i64 - self.contents.len() as i64
    }

    /// Savings as a percentage of the original size
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size > 0 {
            self.saved_bytes() as f64 / self.original_size as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// One file's logical representation in the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Key derived by the name transformer
    pub name: String,
    /// `data:<mime>;base64,<payload>`
    pub data: String,
}

impl Entry {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}
