pub mod batcher;
pub mod reader;
