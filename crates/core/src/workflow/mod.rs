//! End-to-end acquisition runs.

mod coordinator;
mod types;
mod wanted;

pub use coordinator::WorkflowCoordinator;
pub use types::{RunSummary, WorkflowError};
pub use wanted::{TargetFailure, WantedCollector};
