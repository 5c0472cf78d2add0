use std::path::{Path, PathBuf};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tokio::fs;
use crate::utils::{ConverterError, ConverterResult};

/// Year-day-month-hour-minute-second, zero padded, 24-hour clock.
const TIMESTAMP_FORMAT: &str = "%Y-%d-%m-%H-%M-%S";

const JSON_INDENT: &[u8] = b"    ";

/// Base name of a path, extension included
pub fn extract_filename(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Formats a timestamp the way output file names expect it
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// `<output_dir>/data-<timestamp>.json` for the current local time
pub fn output_file_path(output_dir: impl AsRef<Path>) -> PathBuf {
    output_file_path_at(output_dir, &Local::now().naive_local())
}

pub fn output_file_path_at(output_dir: impl AsRef<Path>, time: &NaiveDateTime) -> PathBuf {
    output_dir
        .as_ref()
        .join(format!("data-{}.json", format_timestamp(time)))
}

/// Encodes `value` as 4-space indented JSON
pub fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> ConverterResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(JSON_INDENT));
    value
        .serialize(&mut serializer)
        .map_err(|e| ConverterError::serialization(format!("Failed to encode JSON: {}", e)))?;
    Ok(out)
}

/// Writes `value` to `path` as indented JSON.
///
/// The parent directory must already exist. The write is not atomic.
pub async fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> ConverterResult<()> {
    let path = path.as_ref();
    let contents = to_indented_json(value)?;
    fs::write(path, contents)
        .await
        .map_err(|e| ConverterError::serialization(format!("Failed to write {}: {}", path.display(), e)))
}
