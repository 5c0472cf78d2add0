//! Core types and run configuration.
//!
//! This module contains the fundamental types used throughout the crate:
//! - [`Entry`]: one file's name and data URI
//! - [`OptimizedFile`]: a file as produced by the optimization step
//! - [`ConverterOptions`] / [`Config`]: caller options and their resolved form
//! - [`Progress`] / [`Reporter`]: per-run progress reporting
//! - [`RunState`]: stage tracking for one run

mod config;
mod progress;
mod state;
mod types;

pub use config::{
    Config, ConverterOptions, DEFAULT_GLOB, DEFAULT_OUTPUT_DIR, ErrorHook, NameChoice, Settings,
    SuccessHook, TransformerChoice,
};
pub use progress::{LogProgress, Progress, ProgressSink, ProgressType, Reporter, SilentProgress};
pub use state::{PipelineState, RunState};
pub use types::{Entry, OptimizedFile};
