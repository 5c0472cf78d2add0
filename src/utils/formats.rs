use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use lazy_static::lazy_static;
use crate::utils::{ConverterError, ConverterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    GIF,
    JPEG,
    PNG,
    SVG,
    WebP,
    AVIF,
    BMP,
    ICO,
    TIFF,
}

lazy_static! {
    /// Lowercase extension to format, built from [`ImageFormat::extensions`].
    static ref EXTENSION_TABLE: HashMap<&'static str, ImageFormat> = ImageFormat::ALL
        .iter()
        .flat_map(|format| format.extensions().iter().map(move |ext| (*ext, *format)))
        .collect();
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 9] = [
        Self::GIF,
        Self::JPEG,
        Self::PNG,
        Self::SVG,
        Self::WebP,
        Self::AVIF,
        Self::BMP,
        Self::ICO,
        Self::TIFF,
    ];

    /// MIME type used in the data URI prefix
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::GIF => "image/gif",
            Self::JPEG => "image/jpeg",
            Self::PNG => "image/png",
            Self::SVG => "image/svg+xml",
            Self::WebP => "image/webp",
            Self::AVIF => "image/avif",
            Self::BMP => "image/bmp",
            Self::ICO => "image/x-icon",
            Self::TIFF => "image/tiff",
        }
    }

    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::GIF => &["gif"],
            Self::JPEG => &["jpg", "jpeg", "jpe"],
            Self::PNG => &["png"],
            Self::SVG => &["svg", "svgz"],
            Self::WebP => &["webp"],
            Self::AVIF => &["avif"],
            Self::BMP => &["bmp"],
            Self::ICO => &["ico"],
            Self::TIFF => &["tif", "tiff"],
        }
    }

    /// Check if the extension matches this format
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions().contains(&ext.as_str())
    }

    /// Whether the optimizer has a lossless recompression path for this format
    pub fn supports_lossless_recompression(&self) -> bool {
        matches!(self, Self::PNG | Self::JPEG)
    }
}

impl FromStr for ImageFormat {
    type Err = ConverterError;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        EXTENSION_TABLE
            .get(ext.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| ConverterError::UnknownMimeType(Path::new(ext).to_path_buf()))
    }
}

/// Get format from file extension
pub fn format_from_path(path: impl AsRef<Path>) -> ConverterResult<ImageFormat> {
    let path = path.as_ref();
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| EXTENSION_TABLE.get(ext.to_lowercase().as_str()).copied())
        .ok_or_else(|| ConverterError::UnknownMimeType(path.to_path_buf()))
}

/// MIME lookup for a file path
pub fn mime_type_for(path: impl AsRef<Path>) -> ConverterResult<&'static str> {
    format_from_path(path).map(|format| format.mime_type())
}
