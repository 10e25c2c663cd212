pub mod failure;
pub mod job;
pub mod progress;
pub mod write;
