//! Dispense requests, capacity splitting and the scheduler that executes them.

pub mod request;
pub mod scheduler;
pub mod splitter;

pub use request::DispenseRequest;
pub use scheduler::DispenseScheduler;
pub use splitter::{split_batch, SplitBatch, SplitPolicy};
