pub mod failures;
pub mod metrics;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod settings;
pub mod shutdown;
