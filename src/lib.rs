// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod transform;
pub mod processing;
pub mod commands;

use std::path::PathBuf;

// Public exports for external consumers
pub use core::{ConverterOptions, Entry, OptimizedFile, Reporter, Settings};
pub use processing::{Converter, LosslessOptimizer, Optimizer};
pub use transform::{BufferShape, NameTransformer, OutputTransformer};
pub use utils::{ConfigError, ConverterError, ConverterResult, NameTransformError};

/// Runs one conversion with the default lossless optimizer.
///
/// With `skip_optimization` set the matched files are embedded as they are.
pub async fn convert(options: ConverterOptions) -> ConverterResult<PathBuf> {
    Converter::new(options).run(&LosslessOptimizer).await
}
