//! Output shapes and the shared entry transform.
//!
//! An [`OutputTransformer`] decides what the aggregate document looks like:
//! - [`OutputTransformer::List`]: `[{ "name": ..., "data": ... }, ...]` in batch order
//! - [`OutputTransformer::Keyed`]: `{ "<name>": "<data>", ... }`, last write wins
//! - [`OutputTransformer::Custom`]: caller-defined shape over a JSON value
//!
//! All shapes share [`OutputTransformer::transform`]; only buffer creation and
//! folding differ.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;
use crate::core::{Entry, OptimizedFile};
use crate::transform::NameTransformer;
use crate::utils::{ConfigError, ConverterResult, extract_filename, mime_type_for};

const BASE64_SEPARATOR: &str = ";base64,";

/// Buffer operations of a caller-defined output shape.
pub trait BufferShape: Send + Sync {
    fn create_buffer(&self) -> Value;
    fn update_buffer(&self, buffer: &mut Value, entry: Entry);
}

/// Strategy defining the aggregate buffer shape.
#[derive(Clone, Default)]
pub enum OutputTransformer {
    /// Ordered list of entries, duplicates retained
    #[default]
    List,
    /// Name to data mapping, duplicates collapse to the last entry
    Keyed,
    Custom(Arc<dyn BufferShape>),
}

/// Accumulator built by the batch encoder and handed to the serializer.
pub enum AggregateBuffer {
    List(Vec<Entry>),
    Keyed(Map<String, Value>),
    Custom {
        shape: Arc<dyn BufferShape>,
        value: Value,
    },
}

impl OutputTransformer {
    pub fn custom(shape: impl BufferShape + 'static) -> Self {
        Self::Custom(Arc::new(shape))
    }

    /// Symbolic name, `custom` for caller-defined shapes
    pub fn name(&self) -> &'static str {
        match self {
            Self::List => "verbose",
            Self::Keyed => "dictionary",
            Self::Custom(_) => "custom",
        }
    }

    pub fn create_buffer(&self) -> AggregateBuffer {
        match self {
            Self::List => AggregateBuffer::List(Vec::new()),
            Self::Keyed => AggregateBuffer::Keyed(Map::new()),
            Self::Custom(shape) => AggregateBuffer::Custom {
                shape: Arc::clone(shape),
                value: shape.create_buffer(),
            },
        }
    }

    /// Folds `entry` into a buffer created by [`Self::create_buffer`].
    pub fn update_buffer(&self, buffer: &mut AggregateBuffer, entry: Entry) {
        buffer.fold(entry);
    }

    /// Builds the entry for one file: MIME from the path, data URI from the
    /// contents, name from the base file name.
    pub fn transform(&self, names: &NameTransformer, file: &OptimizedFile) -> ConverterResult<Entry> {
        let mime = mime_type_for(&file.path)?;
        let name = names.apply(&extract_filename(&file.path))?;
        Ok(Entry::new(name, data_uri(mime, &file.contents)))
    }
}

impl FromStr for OutputTransformer {
    type Err = ConfigError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "default" | "verbose" => Ok(Self::List),
            "dictionary" => Ok(Self::Keyed),
            unknown => Err(ConfigError::UnknownTransformer(unknown.to_string())),
        }
    }
}

impl fmt::Debug for OutputTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for AggregateBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(entries) => f.debug_tuple("List").field(entries).finish(),
            Self::Keyed(map) => f.debug_tuple("Keyed").field(map).finish(),
            Self::Custom { value, .. } => f.debug_struct("Custom").field("value", value).finish_non_exhaustive(),
        }
    }
}

impl AggregateBuffer {
    fn fold(&mut self, entry: Entry) {
        match self {
            Self::List(entries) => entries.push(entry),
            Self::Keyed(map) => {
                let Entry { name, data } = entry;
                if map.contains_key(&name) {
                    debug!("Entry {} overwritten by a later file", name);
                }
                map.insert(name, Value::String(data));
            }
            Self::Custom { shape, value } => shape.update_buffer(value, entry),
        }
    }

    /// Number of top-level items; custom buffers count array/object members.
    pub fn len(&self) -> usize {
        match self {
            Self::List(entries) => entries.len(),
            Self::Keyed(map) => map.len(),
            Self::Custom { value, .. } => match value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                _ => 1,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for AggregateBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::List(entries) => entries.serialize(serializer),
            Self::Keyed(map) => map.serialize(serializer),
            Self::Custom { value, .. } => value.serialize(serializer),
        }
    }
}

/// `data:<mime>;base64,<payload>`
pub fn data_uri(mime: &str, contents: &[u8]) -> String {
    format!("data:{}{}{}", mime, BASE64_SEPARATOR, STANDARD.encode(contents))
}

/// Splits a data URI back into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Option<(&str, Vec<u8>)> {
    let (mime, payload) = uri.strip_prefix("data:")?.split_once(BASE64_SEPARATOR)?;
    STANDARD.decode(payload).ok().map(|bytes| (mime, bytes))
}
