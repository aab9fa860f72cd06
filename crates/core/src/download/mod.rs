//! Enqueueing and monitoring peer downloads.

mod enqueuer;
mod monitor;
mod types;

pub use enqueuer::DownloadEnqueuer;
pub use monitor::{DownloadMonitor, MonitorReport, TickReport};
pub use types::*;
