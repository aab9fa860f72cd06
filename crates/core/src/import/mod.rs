//! Post-download import: metadata validation, folder organization,
//! quarantine and library scan commands.

mod commands;
mod metadata;
mod organizer;
mod processor;
mod types;
mod validator;

pub use commands::ImportCommands;
pub use metadata::{epub_title, mobi_isbn, BookFormat, MetadataError};
pub use organizer::{sanitize_folder_name, FileOrganizer};
pub use processor::ImportProcessor;
pub use types::*;
pub use validator::{titles_match, MetadataValidator, ValidationOutcome};
