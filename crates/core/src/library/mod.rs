//! Library-management service abstraction.
//!
//! The library owns the catalog of wanted books, their authors and quality
//! profiles, and runs import commands over downloaded files.

mod readarr;
mod types;

pub use readarr::ReadarrClient;
pub use types::*;
