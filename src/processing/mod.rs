mod batch;
mod lossless;
mod matcher;
mod optimizer;
mod pipeline;

pub use batch::BatchEncoder;
pub use matcher::{InputPattern, expand_glob};
pub use lossless::{recompress_png, transcode_progressive};
pub use optimizer::{LosslessOptimizer, Optimizer, read_matches};
pub use pipeline::Converter;
