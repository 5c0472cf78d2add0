mod processor;

pub use processor::BatchEncoder;
