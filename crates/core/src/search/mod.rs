//! Searching the file-sharing network and picking a file to download.

mod cache;
mod candidates;
mod orchestrator;
mod types;

pub use cache::DirectoryCache;
pub use candidates::{blacklisted_word, filetype_priority, CandidateIndex};
pub use orchestrator::SearchOrchestrator;
pub use types::AcquisitionError;
