//! Filename scoring against a wanted book.
//!
//! A candidate's score is the best similarity between its raw filename and a
//! handful of conventional naming patterns built from the title and author,
//! plus a bonus when the title visibly appears in the filename.

use std::collections::HashSet;

use crate::fileshare::RemoteFile;

use super::similarity::similarity_ratio;

/// Configuration for the filename matcher.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum final score for a candidate to be accepted.
    pub minimum_ratio: f64,
    /// Added to a candidate's score when its filename contains the title.
    pub title_bonus: f64,
    /// Peers whose files are never accepted.
    pub ignored_users: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            minimum_ratio: 0.5,
            title_bonus: 0.3,
            ignored_users: Vec::new(),
        }
    }
}

/// A candidate together with its final score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFile {
    pub file: RemoteFile,
    pub score: f64,
}

/// Scores and selects remote files for a wanted book.
#[derive(Debug, Clone)]
pub struct FilenameMatcher {
    config: MatcherConfig,
}

impl FilenameMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Pick the best candidate of `filetype` from one peer's files.
    ///
    /// Returns `None` when no candidate has the right extension, the peer is
    /// ignored, or the best score stays below the minimum ratio. Ties keep the
    /// earlier candidate.
    pub fn find_match(
        &self,
        title: &str,
        author: &str,
        filetype: &str,
        candidates: &[RemoteFile],
    ) -> Option<ScoredFile> {
        let mut best: Option<ScoredFile> = None;

        for file in candidates.iter().filter(|f| matches_filetype(f, filetype)) {
            let score = self.score(title, author, filetype, &file.filename);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ScoredFile {
                    file: file.clone(),
                    score,
                });
            }
        }

        let best = best?;
        if self.is_ignored(&best.file.peer) || best.score < self.config.minimum_ratio {
            return None;
        }
        Some(best)
    }

    /// Final score of one filename: best pattern ratio plus containment bonus.
    pub fn score(&self, title: &str, author: &str, filetype: &str, filename: &str) -> f64 {
        let bonus = if title_contained(title, filename) {
            self.config.title_bonus
        } else {
            0.0
        };
        self.pattern_ratio(title, author, filetype, filename) + bonus
    }

    /// Best similarity of `filename` against the naming patterns.
    pub fn pattern_ratio(&self, title: &str, author: &str, filetype: &str, filename: &str) -> f64 {
        let ext = primary_token(filetype);
        let normalized_filename = normalize(filename);
        let patterns = [
            format!("{} - {}.{}", title, author, ext),
            format!("{} - {}.{}", author, title, ext),
            format!("{}.{}", title, ext),
            format!("{} {}.{}", author, title, ext),
        ];

        let mut max_ratio: f64 = 0.0;
        for pattern in &patterns {
            let direct = similarity_ratio(pattern, filename);
            max_ratio = max_ratio.max(direct);

            let normalized = similarity_ratio(&normalize(pattern), &normalized_filename);
            max_ratio = max_ratio.max(normalized);

            let spaced = check_ratio(" ", direct, pattern, filename, self.config.minimum_ratio);
            max_ratio = max_ratio.max(spaced);

            let underscored =
                check_ratio("_", spaced, pattern, filename, self.config.minimum_ratio);
            max_ratio = max_ratio.max(underscored);
        }
        max_ratio
    }

    fn is_ignored(&self, peer: &str) -> bool {
        self.config.ignored_users.iter().any(|u| u == peer)
    }
}

/// First whitespace token of a filetype name ("epub", "mobi", ...).
pub fn primary_token(filetype: &str) -> &str {
    filetype.split(' ').next().unwrap_or(filetype)
}

/// Whether a file's extension equals the filetype's primary token.
pub fn matches_filetype(file: &RemoteFile, filetype: &str) -> bool {
    file.extension() == primary_token(filetype).to_lowercase()
}

/// Lower-case, treat `_` and punctuation as spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the normalized title appears in the normalized filename, either
/// verbatim or with at least 70% of its words present.
pub fn title_contained(title: &str, filename: &str) -> bool {
    let title = normalize(title);
    let filename = normalize(filename);

    if filename.contains(&title) {
        return true;
    }

    let title_words: HashSet<&str> = title.split_whitespace().collect();
    let filename_words: HashSet<&str> = filename.split_whitespace().collect();
    let overlap = title_words.intersection(&filename_words).count();
    overlap as f64 >= title_words.len() as f64 * 0.7
}

/// Rescore a below-threshold ratio against the tail of the filename.
///
/// The filename is split on `separator` and only its last N pieces are kept,
/// N being the word count of `pattern`, rejoined with spaces. Ratios already
/// at or above `minimum_ratio` are returned unchanged.
pub fn check_ratio(
    separator: &str,
    ratio: f64,
    pattern: &str,
    filename: &str,
    minimum_ratio: f64,
) -> f64 {
    if ratio >= minimum_ratio {
        return ratio;
    }
    if separator.is_empty() {
        return similarity_ratio(pattern, filename);
    }

    let words = pattern.split_whitespace().count();
    let pieces: Vec<&str> = filename.split(separator).collect();
    let start = if words == 0 {
        0
    } else {
        pieces.len().saturating_sub(words)
    };
    let truncated = pieces[start..].join(" ");
    similarity_ratio(pattern, &truncated)
}
