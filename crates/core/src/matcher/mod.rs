//! Fuzzy filename matching.
//!
//! Pure scoring of remote filenames against a wanted book's title and author.

mod filename;
mod similarity;

pub use filename::{
    check_ratio, matches_filetype, normalize, primary_token, title_contained, FilenameMatcher,
    MatcherConfig, ScoredFile,
};
pub use similarity::{similarity_ratio, word_jaccard};
