//! Small text files persisted between runs.

mod failure_log;
mod page_store;

pub use failure_log::{FailureLog, FailureLogEntry};
pub use page_store::{next_page, PageStore};

/// File names inside the configured data directory.
pub const PAGE_FILE_NAME: &str = ".current_page.txt";
pub const FAILURE_LOG_NAME: &str = "failure_list.txt";
