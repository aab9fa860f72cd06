//! Per-search cache of peer directory listings.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::fileshare::{DirectoryListing, FileShare};

/// Listings fetched during one search, keyed by (peer, directory).
///
/// Failed fetches are remembered too, so a directory that could not be
/// listed is skipped for the rest of the search instead of being retried.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    listings: HashMap<(String, String), Option<DirectoryListing>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing of `directory` on `peer`, fetched on first use.
    pub async fn listing(
        &mut self,
        fileshare: &dyn FileShare,
        peer: &str,
        directory: &str,
    ) -> Option<&DirectoryListing> {
        let key = (peer.to_string(), directory.to_string());
        if !self.listings.contains_key(&key) {
            let fetched = match fileshare.browse_directory(peer, directory).await {
                Ok(listing) => {
                    debug!(peer, directory, files = listing.files.len(), "Fetched directory listing");
                    Some(listing)
                }
                Err(e) => {
                    warn!(peer, directory, error = %e, "Failed to list directory, skipping it");
                    None
                }
            };
            self.listings.insert(key.clone(), fetched);
        }
        self.listings.get(&key).and_then(Option::as_ref)
    }

    /// Number of (peer, directory) pairs looked up, failed ones included.
    pub fn lookups(&self) -> usize {
        self.listings.len()
    }
}
