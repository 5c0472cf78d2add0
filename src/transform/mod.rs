//! Name and output-shape transformers.
//!
//! - [`NameTransformer`]: derives an entry name from a file's base name
//! - [`OutputTransformer`]: shapes the aggregate document and folds entries into it

mod name;
mod output;

pub use name::{NameFn, NameTransformer};
pub use output::{AggregateBuffer, BufferShape, OutputTransformer, data_uri, decode_data_uri};
