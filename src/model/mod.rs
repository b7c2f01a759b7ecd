//! Data model shared by the pipeline units
//!
//! # Components
//!
//! - `Task`: a unit of crawl work flowing through the frontier
//! - `FailureReport`: a task a worker gave up on, consumed by the supervisor
//! - `Record`: a normalized item flowing to the persistence sink

mod record;
mod task;

// Re-export main types
pub use record::{Record, RecordKey};
pub use task::{FailureReport, Task, TaskKind};
