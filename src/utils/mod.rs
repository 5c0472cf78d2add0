pub mod error;
pub mod formats;
pub mod fs;

pub use error::{ConfigError, ConverterError, ConverterResult, NameTransformError};
pub use formats::{ImageFormat, format_from_path, mime_type_for};
pub use fs::{
    extract_filename,
    output_file_path,
    write_json,
};
