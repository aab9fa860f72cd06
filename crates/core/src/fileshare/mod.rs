//! File-sharing service abstraction.
//!
//! This module provides a `FileShare` trait over the peer network client
//! (search, browse, transfers) and its slskd implementation.

mod slskd;
mod types;

pub use slskd::SlskdClient;
pub use types::*;
