mod convert;

pub use convert::Args;
