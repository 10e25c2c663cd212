pub mod executor;
pub mod summary;
pub mod workers;
