//! One search-and-download attempt for a wanted item.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::download::{DownloadEnqueuer, DownloadRecord};
use crate::events::{emit_to, AcquisitionEvent, EventHandle};
use crate::fileshare::{FileShare, PeerResponse, SearchRequest};
use crate::library::DownloadTarget;
use crate::matcher::{FilenameMatcher, MatcherConfig, ScoredFile};
use crate::metrics;

use super::{blacklisted_word, filetype_priority, AcquisitionError, CandidateIndex, DirectoryCache};

impl From<&SearchConfig> for MatcherConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            minimum_ratio: config.minimum_match_ratio,
            title_bonus: config.title_bonus,
            ignored_users: config.ignored_users.clone(),
        }
    }
}

/// A finished search: its id and everything peers returned.
struct SearchOutcome {
    id: String,
    responses: Vec<PeerResponse>,
}

/// Runs the search, candidate selection and enqueue for one wanted item.
pub struct SearchOrchestrator {
    fileshare: Arc<dyn FileShare>,
    enqueuer: DownloadEnqueuer,
    matcher: FilenameMatcher,
    config: SearchConfig,
    delete_searches: bool,
    events: Option<EventHandle>,
}

impl SearchOrchestrator {
    pub fn new(
        fileshare: Arc<dyn FileShare>,
        enqueuer: DownloadEnqueuer,
        config: SearchConfig,
        delete_searches: bool,
    ) -> Self {
        Self {
            fileshare,
            enqueuer,
            matcher: FilenameMatcher::new(MatcherConfig::from(&config)),
            config,
            delete_searches,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Search for `target`, pick the best file and enqueue it.
    ///
    /// Filetypes are tried in profile priority order; the first filetype with
    /// an accepted match that enqueues successfully wins.
    pub async fn search_and_download(
        &self,
        target: &DownloadTarget,
    ) -> Result<DownloadRecord, AcquisitionError> {
        let title = &target.item.title;
        let author = &target.author.author_name;

        if let Some(word) = blacklisted_word(title, &self.config.title_blacklist) {
            info!(title = %title, word, "Skipping blacklisted title");
            return Err(AcquisitionError::Blacklisted(word.to_string()));
        }

        let filetypes = filetype_priority(&target.profile);
        if filetypes.is_empty() {
            return Err(AcquisitionError::NoAllowedFiletypes);
        }

        let mut search = self.run_search(&format!("{} - {}", author, title), false).await?;

        if search.responses.is_empty() {
            if let Some((main_title, _)) = title.split_once(':') {
                self.cleanup(&search.id).await;
                metrics::FALLBACK_SEARCHES.inc();
                let query = format!("{} - {}", author, main_title.trim());
                info!(query = %query, "No results, retrying with main title");
                search = self.run_search(&query, true).await?;
            }
        }

        let index = CandidateIndex::build(&search.responses, &filetypes);
        let result = self.select_and_enqueue(target, &filetypes, &index).await;
        self.cleanup(&search.id).await;
        result
    }

    /// Issue one search and wait for it to finish, bounded by the deadline.
    async fn run_search(
        &self,
        query: &str,
        fallback: bool,
    ) -> Result<SearchOutcome, AcquisitionError> {
        let request = SearchRequest {
            text: query.to_string(),
            search_timeout_ms: self.config.search_timeout_ms,
            maximum_peer_queue: self.config.maximum_peer_queue,
            minimum_peer_upload_speed: self.config.minimum_peer_upload_speed,
            filter_responses: true,
        };

        let id = match self.fileshare.start_search(&request).await {
            Ok(id) => id,
            Err(e) => {
                metrics::SEARCHES_TOTAL.with_label_values(&["error"]).inc();
                return Err(e.into());
            }
        };
        debug!(search_id = %id, query, "Search started");

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let deadline = Instant::now() + Duration::from_secs(self.config.deadline_secs);
        let poll = Duration::from_millis(self.config.state_poll_interval_ms);
        loop {
            let state = match self.fileshare.search_state(&id).await {
                Ok(state) => state,
                Err(e) => {
                    metrics::SEARCHES_TOTAL.with_label_values(&["error"]).inc();
                    self.cleanup(&id).await;
                    return Err(e.into());
                }
            };
            if !state.is_in_progress() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(search_id = %id, query, "Search did not finish before the deadline");
                metrics::SEARCHES_TOTAL.with_label_values(&["timeout"]).inc();
                self.cleanup(&id).await;
                return Err(AcquisitionError::SearchTimedOut(query.to_string()));
            }
            tokio::time::sleep(poll).await;
        }

        let responses = match self.fileshare.search_responses(&id).await {
            Ok(responses) => responses,
            Err(e) => {
                metrics::SEARCHES_TOTAL.with_label_values(&["error"]).inc();
                self.cleanup(&id).await;
                return Err(e.into());
            }
        };

        let label = if responses.is_empty() { "empty" } else { "results" };
        metrics::SEARCHES_TOTAL.with_label_values(&[label]).inc();
        metrics::SEARCH_RESPONSES.observe(responses.len() as f64);
        info!(query, responses = responses.len(), "Search finished");
        emit_to(
            &self.events,
            AcquisitionEvent::SearchCompleted {
                query: query.to_string(),
                responses: responses.len(),
                fallback,
            },
        )
        .await;

        Ok(SearchOutcome { id, responses })
    }

    async fn select_and_enqueue(
        &self,
        target: &DownloadTarget,
        filetypes: &[String],
        index: &CandidateIndex,
    ) -> Result<DownloadRecord, AcquisitionError> {
        let mut cache = DirectoryCache::new();
        let mut last_error = None;

        for filetype in filetypes {
            let Some(scored) = self.best_for_filetype(target, filetype, index, &mut cache).await
            else {
                debug!(filetype = %filetype, "No acceptable candidate");
                continue;
            };

            metrics::MATCH_SCORE
                .with_label_values(&[filetype.as_str()])
                .observe(scored.score);
            info!(
                title = %target.item.title,
                file = %scored.file.filename,
                peer = %scored.file.peer,
                score = scored.score,
                "Match found"
            );
            emit_to(
                &self.events,
                AcquisitionEvent::MatchFound {
                    title: target.item.title.clone(),
                    filename: scored.file.filename.clone(),
                    peer: scored.file.peer.clone(),
                    filetype: filetype.clone(),
                    score: scored.score,
                },
            )
            .await;

            match self.enqueuer.start(target, &scored.file).await {
                Ok(record) => {
                    emit_to(
                        &self.events,
                        AcquisitionEvent::DownloadEnqueued {
                            title: record.title.clone(),
                            peer: record.peer.clone(),
                            files: record.files.len(),
                        },
                    )
                    .await;
                    return Ok(record);
                }
                Err(e) => {
                    warn!(peer = %scored.file.peer, error = %e, "Enqueue failed, trying next filetype");
                    last_error = Some(e);
                }
            }
        }

        debug!(
            title = %target.item.title,
            directories = cache.lookups(),
            "No filetype produced a download"
        );
        Err(last_error.map_or(AcquisitionError::NoMatch, AcquisitionError::Download))
    }

    /// First peer (in first-seen order) with an accepted match for `filetype`.
    async fn best_for_filetype(
        &self,
        target: &DownloadTarget,
        filetype: &str,
        index: &CandidateIndex,
        cache: &mut DirectoryCache,
    ) -> Option<ScoredFile> {
        let title = &target.item.title;
        let author = &target.author.author_name;

        for peer in index.peers_with(filetype) {
            if !self.config.browse_directories {
                let candidates = index.candidates(peer, filetype);
                if let Some(found) = self.matcher.find_match(title, author, filetype, candidates) {
                    return Some(found);
                }
                continue;
            }

            for directory in index.directories(peer, filetype) {
                let Some(listing) = cache
                    .listing(self.fileshare.as_ref(), peer, &directory)
                    .await
                else {
                    continue;
                };
                if let Some(found) =
                    self.matcher
                        .find_match(title, author, filetype, &listing.files)
                {
                    return Some(found);
                }
            }
        }
        None
    }

    async fn cleanup(&self, search_id: &str) {
        if !self.delete_searches {
            return;
        }
        if let Err(e) = self.fileshare.delete_search(search_id).await {
            warn!(search_id, error = %e, "Failed to delete search");
        }
    }
}
