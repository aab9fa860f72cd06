pub mod config;
pub mod download;
pub mod events;
pub mod fileshare;
pub mod import;
pub mod library;
pub mod matcher;
pub mod metrics;
pub mod retry;
pub mod search;
pub mod state;
pub mod testing;
pub mod workflow;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use events::{create_event_system, AcquisitionEvent, EventHandle, EventReporter};
pub use fileshare::{FileShare, FileShareError, SlskdClient};
pub use library::{LibraryError, LibraryService, ReadarrClient};
pub use workflow::{RunSummary, WorkflowCoordinator, WorkflowError};
