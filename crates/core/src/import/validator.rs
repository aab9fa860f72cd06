//! Metadata validation of downloaded files against the wanted item.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ValidationPolicy;
use crate::library::LibraryService;
use crate::matcher::{similarity_ratio, word_jaccard};
use crate::metrics;

use super::metadata::{epub_title, mobi_isbn, BookFormat};

/// Result of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(String),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

/// Whether an embedded title and the wanted title name the same book.
///
/// Accepts when the raw ratio exceeds 0.8, the punctuation-free lowercase
/// ratio exceeds 0.85, or the lowercase word sets overlap by more than 0.7.
pub fn titles_match(found: &str, expected: &str) -> bool {
    if similarity_ratio(found, expected) > 0.8 {
        return true;
    }
    if similarity_ratio(&strip_punctuation(found), &strip_punctuation(expected)) > 0.85 {
        return true;
    }
    word_jaccard(&found.to_lowercase(), &expected.to_lowercase()) > 0.7
}

fn strip_punctuation(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Checks embedded metadata of downloaded files.
///
/// MOBI-family files are checked by resolving their ISBN through the library;
/// EPUB files by comparing their embedded title. Other formats pass
/// unchecked. Missing metadata, unknown ISBNs and unreadable files are
/// decided by the configured [`ValidationPolicy`].
pub struct MetadataValidator {
    library: Arc<dyn LibraryService>,
    policy: ValidationPolicy,
}

impl MetadataValidator {
    pub fn new(library: Arc<dyn LibraryService>, policy: ValidationPolicy) -> Self {
        Self { library, policy }
    }

    pub async fn validate(&self, path: &Path, expected_title: &str, item_id: i64) -> ValidationOutcome {
        let Some(format) = BookFormat::from_path(path) else {
            debug!(file = %path.display(), "No metadata check for this format");
            return ValidationOutcome::Accepted;
        };

        let outcome = match tokio::fs::read(path).await {
            Ok(data) => match format {
                BookFormat::Mobi => self.validate_mobi(&data, item_id).await,
                BookFormat::Epub => self.validate_epub(&data, expected_title),
            },
            Err(e) => self.undecided(format!("cannot read file: {}", e)),
        };

        let result = if outcome.is_accepted() { "accepted" } else { "rejected" };
        metrics::VALIDATIONS_TOTAL
            .with_label_values(&[format.label(), result])
            .inc();
        outcome
    }

    async fn validate_mobi(&self, data: &[u8], item_id: i64) -> ValidationOutcome {
        let isbn = match mobi_isbn(data) {
            Ok(Some(isbn)) => isbn,
            Ok(None) => return self.undecided("no ISBN in metadata".to_string()),
            Err(e) => return self.undecided(format!("unreadable metadata: {}", e)),
        };
        info!(isbn = %isbn, "Found ISBN in metadata");

        match self.library.lookup_isbn(&isbn).await {
            Ok(Some(found)) if found == item_id => ValidationOutcome::Accepted,
            Ok(Some(found)) => {
                warn!(isbn = %isbn, expected = item_id, found, "ISBN belongs to another item");
                ValidationOutcome::Rejected(format!(
                    "ISBN {} resolves to item {}, expected {}",
                    isbn, found, item_id
                ))
            }
            Ok(None) => self.undecided(format!("ISBN {} not known to the library", isbn)),
            Err(e) => self.undecided(format!("ISBN lookup failed: {}", e)),
        }
    }

    fn validate_epub(&self, data: &[u8], expected_title: &str) -> ValidationOutcome {
        match epub_title(data) {
            Ok(Some(title)) if titles_match(&title, expected_title) => {
                debug!(found = %title, expected = %expected_title, "Title matches");
                ValidationOutcome::Accepted
            }
            Ok(Some(title)) => ValidationOutcome::Rejected(format!(
                "embedded title '{}' does not match '{}'",
                title, expected_title
            )),
            Ok(None) => self.undecided("no title in metadata".to_string()),
            Err(e) => self.undecided(format!("unreadable metadata: {}", e)),
        }
    }

    fn undecided(&self, reason: String) -> ValidationOutcome {
        match self.policy {
            ValidationPolicy::FailClosed => ValidationOutcome::Rejected(reason),
            ValidationPolicy::FailOpen => {
                warn!(reason = %reason, "Cannot verify metadata, accepting");
                ValidationOutcome::Accepted
            }
        }
    }
}
